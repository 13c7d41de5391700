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

//! Retention policies deciding which rule-selected rows are worth exporting.

use std::collections::BTreeSet;
use std::fmt::Debug;

use serde::{Deserialize, Serialize};

use crate::record::ZiStoredRecord;

/// Decides whether a rule-selected row is kept.
pub trait ZiRetentionPolicy: Send + Sync + Debug {
    fn keep(&self, record: &ZiStoredRecord) -> bool;
}

/// Drops rows that are framework seed data nobody touched.
///
/// A row is kept when it has no stable identifier yet, when a non-system actor
/// modified it after creation, or when its identifier lives in a
/// customization namespace.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZiPristinePolicy {
    /// Actor ids that stand for the framework itself.
    pub system_actors: BTreeSet<i64>,
    /// Identifier namespaces that only customizations write into.
    pub customization_namespaces: Vec<String>,
    /// Also treat a differing write date as a modification.
    pub compare_timestamps: bool,
}

impl Default for ZiPristinePolicy {
    fn default() -> Self {
        Self {
            system_actors: BTreeSet::from([1]),
            customization_namespaces: vec!["__export__".to_string(), "__custom__".to_string()],
            compare_timestamps: true,
        }
    }
}

impl ZiPristinePolicy {
    pub fn with_system_actor(mut self, uid: i64) -> Self {
        self.system_actors.insert(uid);
        self
    }

    pub fn with_customization_namespace(mut self, namespace: &str) -> Self {
        self.customization_namespaces.push(namespace.to_string());
        self
    }

    fn is_system(&self, uid: Option<i64>) -> bool {
        uid.map(|u| self.system_actors.contains(&u)).unwrap_or(true)
    }

    fn modified_by_human(&self, record: &ZiStoredRecord) -> bool {
        let p = &record.provenance;
        let actor_changed = p.write_uid != p.create_uid;
        let date_changed = self.compare_timestamps
            && matches!((p.create_date, p.write_date), (Some(c), Some(w)) if c != w);
        (actor_changed || date_changed) && !self.is_system(p.write_uid)
    }
}

impl ZiRetentionPolicy for ZiPristinePolicy {
    fn keep(&self, record: &ZiStoredRecord) -> bool {
        let Some(namespace) = record.provenance.namespace() else {
            return true;
        };
        if self.customization_namespaces.iter().any(|ns| ns == namespace) {
            return true;
        }
        self.modified_by_human(record)
    }
}

/// Keeps every row.
#[derive(Clone, Copy, Debug, Default)]
pub struct ZiKeepAll;

impl ZiRetentionPolicy for ZiKeepAll {
    fn keep(&self, _record: &ZiStoredRecord) -> bool {
        true
    }
}

/// Keeps rows whose identifier lives in the export's own namespace and defers
/// everything else to `inner`. Rows installed from an earlier export of the
/// same module are created by the framework but are never seed data.
#[derive(Debug)]
pub struct ZiOwnNamespace<'p> {
    namespace: &'p str,
    inner: &'p dyn ZiRetentionPolicy,
}

impl<'p> ZiOwnNamespace<'p> {
    pub fn new(namespace: &'p str, inner: &'p dyn ZiRetentionPolicy) -> Self {
        Self { namespace, inner }
    }
}

impl ZiRetentionPolicy for ZiOwnNamespace<'_> {
    fn keep(&self, record: &ZiStoredRecord) -> bool {
        record.provenance.namespace() == Some(self.namespace) || self.inner.keep(record)
    }
}
