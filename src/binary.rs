//! Copyright © 2025-2026 Wenze Wei. All Rights Reserved.
//!
//! This file is part of Zi.
//! The Zi project belongs to the Dunimd project team.
//!
//! Licensed under the Apache License, Version 2.0 (the "License");
//! You may not use this file except in compliance with the License.
//! You may obtain a copy of the License at
//!
//!     http://www.apache.org/licenses/LICENSE-2.0
//!
//! Unless required by applicable law or agreed to in writing, software
//! distributed under the License is distributed on an "AS IS" BASIS,
//! WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//! See the License for the specific language governing permissions and
//! limitations under the License.

//! # Binary Extractor Module
//!
//! Moves binary payloads out of serialized records into side files.
//!
//! Payloads stored outside the row are fetched up front with
//! [`ZiPayloadCache::prefetch`]; every request is issued at once and the
//! results are buffered. The serializer then hands each payload to
//! [`ZiBinaryExtractor::extract`], which either inlines it (small payloads,
//! when configured) or stores it under
//! `static/binary/<model>/<record id>-<name>` and returns the reference.

use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use futures::future::join_all;
use regex::Regex;

use crate::errors::{ZiWarning, ZiWarningKind};
use crate::record::{ZiCandidateRecord, ZiFieldValue, ZiRecordRef, ZiStoredRecord};
use crate::store::ZiRecordStore;

pub const SIDE_FILE_ROOT: &str = "static/binary";

fn unsafe_chars() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[^A-Za-z0-9._-]+").expect("static file name pattern"))
}

/// File name safe on every common filesystem.
pub fn sanitize_file_name(name: &str) -> String {
    let replaced = unsafe_chars().replace_all(name.trim(), "_");
    let cleaned = replaced.trim_matches(|c| c == '.' || c == '_');
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Relative side-file path inside the module.
pub fn side_file_path(model: &str, record_id: i64, name: &str) -> String {
    format!(
        "{}/{}/{}-{}",
        SIDE_FILE_ROOT,
        model.replace('.', "_"),
        record_id,
        sanitize_file_name(name)
    )
}

/// Payloads of `BinaryRef` values, keyed by row and field.
#[derive(Debug, Default)]
pub struct ZiPayloadCache {
    payloads: HashMap<(ZiRecordRef, String), Vec<u8>>,
}

impl ZiPayloadCache {
    pub async fn prefetch<'a, I>(store: &dyn ZiRecordStore, candidates: I) -> (Self, Vec<ZiWarning>)
    where
        I: IntoIterator<Item = &'a ZiCandidateRecord>,
    {
        let mut requests: Vec<(ZiRecordRef, String, String)> = Vec::new();
        for candidate in candidates {
            for (field, value) in &candidate.record.values {
                if candidate.excluded_fields.contains(field) {
                    continue;
                }
                if let ZiFieldValue::BinaryRef(key) = value {
                    if !key.is_empty() {
                        requests.push((candidate.key(), field.clone(), key.clone()));
                    }
                }
            }
        }

        let results = join_all(requests.iter().map(|(_, _, key)| store.load_binary(key))).await;

        let mut cache = Self::default();
        let mut warnings = Vec::new();
        for ((record, field, key), result) in requests.into_iter().zip(results) {
            match result {
                Ok(bytes) => {
                    cache.payloads.insert((record, field), bytes);
                }
                Err(err) => {
                    log::warn!(
                        "export.binary.fetch_failed: payload unavailable - record={}, field={}, key={}, error={}",
                        record,
                        field,
                        key,
                        err
                    );
                    warnings.push(ZiWarning::new(
                        ZiWarningKind::BinaryPayload,
                        Some(&record.model),
                        format!("{} field '{}' omitted: {}", record, field, err),
                    ));
                }
            }
        }
        (cache, warnings)
    }

    pub fn insert(&mut self, record: ZiRecordRef, field: &str, bytes: Vec<u8>) {
        self.payloads.insert((record, field.to_string()), bytes);
    }

    pub fn get(&self, record: &ZiRecordRef, field: &str) -> Option<&[u8]> {
        self.payloads
            .get(&(record.clone(), field.to_string()))
            .map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.payloads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }
}

/// How a binary field is written into its record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ZiBinaryField {
    /// Base64 text embedded in the record.
    Inline(String),
    /// `file=` attribute value, prefixed with the module name.
    File(String),
}

/// Collects side files for one export run.
#[derive(Debug)]
pub struct ZiBinaryExtractor {
    module: String,
    inline_limit: usize,
    attachment_models: Vec<String>,
    side_files: BTreeMap<String, Vec<u8>>,
}

impl ZiBinaryExtractor {
    pub fn new(module: &str, inline_limit: usize, attachment_models: &[String]) -> Self {
        Self {
            module: module.to_string(),
            inline_limit,
            attachment_models: attachment_models.to_vec(),
            side_files: BTreeMap::new(),
        }
    }

    pub fn extract(&mut self, record: &ZiStoredRecord, field: &str, bytes: &[u8]) -> ZiBinaryField {
        if self.inline_limit > 0 && bytes.len() <= self.inline_limit {
            return ZiBinaryField::Inline(STANDARD.encode(bytes));
        }

        // attachments are named after the file they hold
        let name = if self.attachment_models.iter().any(|m| *m == record.model) {
            record.label("name").unwrap_or(field)
        } else {
            field
        };
        let base = side_file_path(&record.model, record.id, name);
        let mut path = base.clone();
        let mut suffix = 1;
        while self.side_files.get(&path).is_some_and(|existing| existing.as_slice() != bytes) {
            path = if suffix == 1 {
                format!("{}-{}", base, sanitize_file_name(field))
            } else {
                format!("{}-{}-{}", base, sanitize_file_name(field), suffix)
            };
            suffix += 1;
        }
        log::debug!(
            "export.binary.extract: side file - record={}, field={}, path={}, bytes={}",
            record.key(),
            field,
            path,
            bytes.len()
        );
        self.side_files.insert(path.clone(), bytes.to_vec());
        ZiBinaryField::File(format!("{}/{}", self.module, path))
    }

    pub fn side_files(&self) -> &BTreeMap<String, Vec<u8>> {
        &self.side_files
    }

    pub fn into_side_files(self) -> BTreeMap<String, Vec<u8>> {
        self.side_files
    }
}
