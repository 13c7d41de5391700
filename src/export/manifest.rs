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

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::record::ZiBucket;

pub const MANIFEST_FILE: &str = "__manifest__.json";

/// What a data file holds relative to its model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZiFileRole {
    Records,
    /// Attachments the owner model references; loaded right before it.
    AttachmentPre,
    /// Attachments pointing at the owner model; loaded right after it.
    AttachmentPost,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZiManifestFile {
    pub path: String,
    /// Model whose rows the file holds; the owner model for attachment files.
    pub model: String,
    pub bucket: ZiBucket,
    pub role: ZiFileRole,
    pub records: usize,
    pub no_update: bool,
    /// BLAKE3 hex digest of the file content.
    pub hash: String,
}

/// Load order and declared dependencies of a generated module.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZiManifest {
    pub name: String,
    pub version: String,
    pub depends: Vec<String>,
    pub data: Vec<String>,
    pub demo: Vec<String>,
    pub files: Vec<ZiManifestFile>,
    pub side_files: Vec<String>,
}

impl ZiManifest {
    pub fn to_json(&self) -> crate::errors::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> crate::errors::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Data paths followed by demo paths.
    pub fn load_order(&self) -> impl Iterator<Item = &str> {
        self.data.iter().chain(self.demo.iter()).map(String::as_str)
    }

    pub fn position(&self, path: &str) -> Option<usize> {
        self.load_order().position(|p| p == path)
    }

    pub fn file(&self, path: &str) -> Option<&ZiManifestFile> {
        self.files.iter().find(|f| f.path == path)
    }
}

pub fn compute_hash(content: &[u8]) -> String {
    blake3::hash(content).to_hex().to_string()
}

#[derive(Debug, Default)]
pub struct ZiManifestBuilder {
    manifest: ZiManifest,
    depends: BTreeSet<String>,
}

impl ZiManifestBuilder {
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            manifest: ZiManifest {
                name: name.to_string(),
                version: version.to_string(),
                ..Default::default()
            },
            depends: BTreeSet::new(),
        }
    }

    pub fn depend_on(&mut self, module: &str) {
        if !module.is_empty() && module != self.manifest.name {
            self.depends.insert(module.to_string());
        }
    }

    pub fn add_file(&mut self, file: ZiManifestFile) {
        match file.bucket {
            ZiBucket::Data => self.manifest.data.push(file.path.clone()),
            ZiBucket::Demo => self.manifest.demo.push(file.path.clone()),
        }
        self.manifest.files.push(file);
    }

    pub fn add_side_file(&mut self, path: &str) {
        self.manifest.side_files.push(path.to_string());
    }

    pub fn build(mut self) -> ZiManifest {
        self.manifest.depends = self.depends.into_iter().collect();
        self.manifest.side_files.sort();
        self.manifest
    }
}
