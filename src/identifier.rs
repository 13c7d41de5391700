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

//! # Identifier Registry Module
//!
//! Assigns every exported row a stable, human-readable identifier of the form
//! `<namespace>.<slug>`.
//!
//! - A row that already carries an identifier keeps it verbatim.
//! - A row seen in an earlier run gets the identifier recorded then, so the
//!   mapping must be persisted with [`ZiIdentifierRegistry::save`] and reloaded
//!   with [`ZiIdentifierRegistry::load`].
//! - New slugs are `<model>_<label>`; clashes get `_2`, `_3`, ... in order of
//!   first assignment.
//! - An identifier belongs to one row. Pre-existing identifiers are claimed
//!   with [`ZiIdentifierRegistry::register`] or [`ZiIdentifierRegistry::reserve`]
//!   before any slug is generated, so generated slugs step around them.
//!
//! The registry is the only shared mutable state of a run. All writes go
//! through one mutex.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, ZiError};
use crate::record::{ZiRecordRef, ZiStoredRecord};

const MAX_SLUG_PART: usize = 48;

fn slug_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[^a-z0-9]+").expect("static slug pattern"))
}

/// Lowercase ASCII slug with runs of other characters collapsed to `_`.
pub fn slugify(text: &str) -> String {
    let lowered = text.to_lowercase();
    let replaced = slug_pattern().replace_all(&lowered, "_");
    let trimmed = replaced.trim_matches('_');
    let mut slug: String = trimmed.chars().take(MAX_SLUG_PART).collect();
    while slug.ends_with('_') {
        slug.pop();
    }
    slug
}

#[derive(Debug, Default)]
struct RegistryState {
    by_record: BTreeMap<ZiRecordRef, String>,
    /// Identifier to the row holding it, reserved rows outside the export included.
    owners: HashMap<String, ZiRecordRef>,
}

impl RegistryState {
    fn bind(&mut self, key: ZiRecordRef, identifier: String) {
        if let Some(previous) = self.by_record.insert(key.clone(), identifier.clone()) {
            if previous != identifier {
                self.owners.remove(&previous);
            }
        }
        self.owners.insert(identifier, key);
    }

    fn holder(&self, identifier: &str) -> Option<&ZiRecordRef> {
        self.owners.get(identifier)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct RegistryFile {
    namespace: String,
    entries: Vec<RegistryEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RegistryEntry {
    model: String,
    id: i64,
    identifier: String,
}

/// Stable identifier assignment for one namespace.
#[derive(Debug)]
pub struct ZiIdentifierRegistry {
    namespace: String,
    state: Mutex<RegistryState>,
}

impl ZiIdentifierRegistry {
    pub fn new(namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            state: Mutex::new(RegistryState::default()),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn state(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Loads the mapping saved by an earlier run; a missing file yields an
    /// empty registry.
    pub fn load(namespace: &str, path: &Path) -> Result<Self> {
        let registry = Self::new(namespace);
        if !path.exists() {
            return Ok(registry);
        }
        let content = std::fs::read_to_string(path)?;
        let file: RegistryFile = serde_json::from_str(&content)?;
        if file.namespace != namespace {
            return Err(ZiError::validation(format!(
                "identifier registry at {} belongs to namespace '{}', not '{}'",
                path.display(),
                file.namespace,
                namespace
            )));
        }
        {
            let mut state = registry.state();
            for entry in file.entries {
                state.bind(ZiRecordRef::new(&entry.model, entry.id), entry.identifier);
            }
        }
        Ok(registry)
    }

    /// Persists the mapping; the file is replaced atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        let file = {
            let state = self.state();
            RegistryFile {
                namespace: self.namespace.clone(),
                entries: state
                    .by_record
                    .iter()
                    .map(|(key, identifier)| RegistryEntry {
                        model: key.model.clone(),
                        id: key.id,
                        identifier: identifier.clone(),
                    })
                    .collect(),
            }
        };
        let json = serde_json::to_string_pretty(&file)?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let temp = temp_path(path);
        std::fs::write(&temp, json)?;
        std::fs::rename(&temp, path)?;
        Ok(())
    }

    /// Identifier already bound to a row.
    pub fn lookup(&self, key: &ZiRecordRef) -> Option<String> {
        self.state().by_record.get(key).cloned()
    }

    /// Binds the identifier a row already carries.
    ///
    /// Fails with the current holder when another row owns `identifier`; the
    /// row then gets a generated identifier from [`Self::assign`].
    pub fn register(&self, key: ZiRecordRef, identifier: &str) -> std::result::Result<(), ZiRecordRef> {
        let mut state = self.state();
        match state.holder(identifier).cloned() {
            Some(holder) if holder == key => Ok(()),
            Some(holder) => Err(holder),
            None => {
                state.bind(key, identifier.to_string());
                Ok(())
            }
        }
    }

    /// Marks an identifier of a row outside the export as taken. The row is
    /// not recorded in the saved mapping.
    pub fn reserve(&self, key: ZiRecordRef, identifier: &str) {
        let mut state = self.state();
        if state.holder(identifier).is_none() {
            state.owners.insert(identifier.to_string(), key);
        }
    }

    /// Returns the identifier of `record`, assigning one on first sight.
    pub fn assign(&self, record: &ZiStoredRecord, rec_name: &str) -> String {
        let key = record.key();
        let mut state = self.state();
        if let Some(existing) = state.by_record.get(&key) {
            return existing.clone();
        }
        if let Some(xid) = &record.provenance.external_id {
            let free = state.holder(xid).map_or(true, |holder| *holder == key);
            if free {
                state.bind(key, xid.clone());
                return xid.clone();
            }
        }

        let label = record
            .label(rec_name)
            .map(slugify)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| record.id.to_string());
        let base = format!("{}.{}_{}", self.namespace, slugify(&record.model), label);
        let mut candidate = base.clone();
        let mut suffix = 2;
        while state.holder(&candidate).is_some() {
            candidate = format!("{}_{}", base, suffix);
            suffix += 1;
        }
        log::debug!(
            "export.identifier.assign: new identifier - record={}, identifier={}",
            key,
            candidate
        );
        state.bind(key, candidate.clone());
        candidate
    }

    pub fn len(&self) -> usize {
        self.state().by_record.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("registry.json");
    let parent = path.parent().unwrap_or(Path::new("."));
    parent.join(format!(".{}.tmp", name))
}
