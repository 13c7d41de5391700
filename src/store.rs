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

//! # Record Store Module
//!
//! The record store is the external collaborator that owns the rows. The
//! export engine only reads from it: filtered searches per model, reads by id,
//! lookups in the pre-existing identifier index and binary payload fetches.
//!
//! [`ZiMemoryStore`] is a complete in-memory implementation used by tests and
//! by callers that already hold a snapshot of the database.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::ZiDomain;
use crate::errors::{Result, ZiError};
use crate::record::{ZiRecordRef, ZiStoredRecord};

/// Failure reported by a record store.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ZiStoreError {
    #[error("access denied on model '{0}'")]
    AccessDenied(String),
    #[error("unknown model '{0}'")]
    UnknownModel(String),
    #[error("binary payload '{0}' is not available")]
    MissingPayload(String),
    #[error("backend failure: {0}")]
    Backend(String),
}

impl From<ZiStoreError> for ZiError {
    fn from(err: ZiStoreError) -> Self {
        let model = match &err {
            ZiStoreError::AccessDenied(m) | ZiStoreError::UnknownModel(m) => m.clone(),
            _ => String::new(),
        };
        ZiError::store(model, err.to_string())
    }
}

/// Read access to the application's rows.
#[async_trait]
pub trait ZiRecordStore: Send + Sync {
    /// Rows of `model` matching `domain`, ordered by id.
    async fn search(&self, model: &str, domain: &ZiDomain) -> std::result::Result<Vec<ZiStoredRecord>, ZiStoreError>;

    /// Rows of `model` with the given ids; unknown ids are left out.
    async fn read(&self, model: &str, ids: &[i64]) -> std::result::Result<Vec<ZiStoredRecord>, ZiStoreError>;

    /// Pre-existing stable identifiers of the given rows, where one exists.
    async fn external_ids(&self, model: &str, ids: &[i64]) -> std::result::Result<HashMap<i64, String>, ZiStoreError>;

    /// Raw bytes of a binary value stored outside the row.
    async fn load_binary(&self, key: &str) -> std::result::Result<Vec<u8>, ZiStoreError>;
}

/// In-memory record store.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ZiMemoryStore {
    #[serde(default)]
    records: BTreeMap<String, BTreeMap<i64, ZiStoredRecord>>,
    /// Identifiers of rows that are known but not necessarily loaded.
    #[serde(default)]
    external_ids: BTreeMap<String, BTreeMap<i64, String>>,
    #[serde(default)]
    payloads: BTreeMap<String, Vec<u8>>,
    #[serde(default)]
    denied_models: BTreeSet<String>,
}

impl ZiMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn insert(&mut self, record: ZiStoredRecord) {
        if let Some(xid) = &record.provenance.external_id {
            self.external_ids
                .entry(record.model.clone())
                .or_default()
                .insert(record.id, xid.clone());
        }
        self.records
            .entry(record.model.clone())
            .or_default()
            .insert(record.id, record);
    }

    pub fn with_record(mut self, record: ZiStoredRecord) -> Self {
        self.insert(record);
        self
    }

    /// Registers an identifier for a row that is not loaded in the store.
    pub fn with_external_id(mut self, model: &str, id: i64, external_id: &str) -> Self {
        self.external_ids
            .entry(model.to_string())
            .or_default()
            .insert(id, external_id.to_string());
        self
    }

    pub fn with_payload(mut self, key: &str, bytes: Vec<u8>) -> Self {
        self.payloads.insert(key.to_string(), bytes);
        self
    }

    /// Every query on `model` fails with [`ZiStoreError::AccessDenied`].
    pub fn deny(mut self, model: &str) -> Self {
        self.denied_models.insert(model.to_string());
        self
    }

    pub fn get(&self, key: &ZiRecordRef) -> Option<&ZiStoredRecord> {
        self.records.get(&key.model).and_then(|rows| rows.get(&key.id))
    }

    fn check_access(&self, model: &str) -> std::result::Result<(), ZiStoreError> {
        if self.denied_models.contains(model) {
            return Err(ZiStoreError::AccessDenied(model.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ZiRecordStore for ZiMemoryStore {
    async fn search(&self, model: &str, domain: &ZiDomain) -> std::result::Result<Vec<ZiStoredRecord>, ZiStoreError> {
        self.check_access(model)?;
        Ok(self
            .records
            .get(model)
            .map(|rows| rows.values().filter(|r| domain.matches(r)).cloned().collect())
            .unwrap_or_default())
    }

    async fn read(&self, model: &str, ids: &[i64]) -> std::result::Result<Vec<ZiStoredRecord>, ZiStoreError> {
        self.check_access(model)?;
        let Some(rows) = self.records.get(model) else {
            return Ok(Vec::new());
        };
        let wanted: BTreeSet<i64> = ids.iter().copied().collect();
        Ok(wanted.iter().filter_map(|id| rows.get(id).cloned()).collect())
    }

    async fn external_ids(&self, model: &str, ids: &[i64]) -> std::result::Result<HashMap<i64, String>, ZiStoreError> {
        let Some(index) = self.external_ids.get(model) else {
            return Ok(HashMap::new());
        };
        Ok(ids
            .iter()
            .filter_map(|id| index.get(id).map(|xid| (*id, xid.clone())))
            .collect())
    }

    async fn load_binary(&self, key: &str) -> std::result::Result<Vec<u8>, ZiStoreError> {
        self.payloads
            .get(key)
            .cloned()
            .ok_or_else(|| ZiStoreError::MissingPayload(key.to_string()))
    }
}
