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

//! # Module Output
//!
//! Final artifacts of an export run.
//!
//! ## Module Components
//!
//! - **Assembler** ([assembler.rs](assembler/index.html)): File layout, load order and dependencies
//! - **Manifest** ([manifest.rs](manifest/index.html)): Serializable description of the generated module
//! - **Writer** ([writer.rs](writer/index.html)): Atomic materialization as a directory or zip archive
//!
//! ## Output Layout
//!
//! ```text
//! <module>/
//!   __manifest__.json
//!   warnings.txt                      only when cycles were found
//!   data/<model>.xml
//!   data/ir_attachment_<owner>_pre.xml
//!   demo/<model>.xml
//!   static/binary/<model>/<id>-<name>
//! ```

pub mod assembler;
pub mod manifest;
pub mod writer;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use assembler::{ZiAssembly, ZiFilePlan, ZiModuleAssembler, WARNINGS_FILE};
pub use manifest::{compute_hash, ZiFileRole, ZiManifest, ZiManifestBuilder, ZiManifestFile, MANIFEST_FILE};
pub use writer::{ZiModuleWriter, ZiOutputFormat};

/// Relative path to content, ordered by path.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ZiOutputSet {
    files: BTreeMap<String, Vec<u8>>,
}

impl ZiOutputSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: &str, content: Vec<u8>) {
        self.files.insert(path.to_string(), content);
    }

    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.files.get(path).map(Vec::as_slice)
    }

    /// Content of a text file.
    pub fn text(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(|b| std::str::from_utf8(b).ok())
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.files.iter().map(|(p, c)| (p.as_str(), c.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn total_bytes(&self) -> u64 {
        self.files.values().map(|c| c.len() as u64).sum()
    }
}

/// Summary counters of an export run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZiExportStats {
    pub data_records: usize,
    pub demo_records: usize,
    /// Structured record files, attachment passes included.
    pub files: usize,
    pub side_files: usize,
    pub cycles: usize,
    pub warnings: usize,
    pub bytes: u64,
}

impl ZiExportStats {
    pub fn records(&self) -> usize {
        self.data_records + self.demo_records
    }
}
