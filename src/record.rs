//! Copyright © 2025-2026 Wenze Wei. All Rights Reserved.
//!
//! This file is part of Zi.
//! The Zi project belongs to the Dunimd Team.
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

//! # Zimod Record Module
//!
//! Read-only snapshots of the rows an export run works on.
//!
//! A [`ZiStoredRecord`] is what the record store returns: typed field values
//! plus provenance (who created and last wrote the row, and which stable
//! identifier it already carries, if any). The selector wraps the rows it keeps
//! into [`ZiCandidateRecord`] values, which add the bucket, the `no_update`
//! flag and the reason the row was selected.
//!
//! ## Usage Example
//!
//! ```rust
//! use zimod::record::{ZiFieldValue, ZiStoredRecord};
//!
//! let record = ZiStoredRecord::new("res.partner", 7)
//!     .with_value("name", ZiFieldValue::text("Azure Interior"))
//!     .with_value("parent_id", ZiFieldValue::ManyToOne(3));
//! assert_eq!(record.label("name"), Some("Azure Interior"));
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Typed value of one field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZiFieldValue {
    Empty,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    /// Inline binary payload, base64 in serialized snapshots.
    Binary(#[serde(with = "base64_bytes")] Vec<u8>),
    /// Binary payload kept in an external filestore under this key.
    BinaryRef(String),
    ManyToOne(i64),
    ManyToMany(Vec<i64>),
    OneToMany(Vec<i64>),
    /// Id of a record whose model is held by another field.
    Reference(i64),
}

impl ZiFieldValue {
    pub fn text(value: impl Into<String>) -> Self {
        ZiFieldValue::Text(value.into())
    }

    /// Falsy values are skipped on serialization unless the field is required.
    pub fn is_falsy(&self) -> bool {
        match self {
            ZiFieldValue::Empty => true,
            ZiFieldValue::Boolean(b) => !b,
            ZiFieldValue::Integer(i) => *i == 0,
            ZiFieldValue::Float(f) => *f == 0.0,
            ZiFieldValue::Text(s) => s.is_empty(),
            ZiFieldValue::Binary(b) => b.is_empty(),
            ZiFieldValue::BinaryRef(k) => k.is_empty(),
            ZiFieldValue::ManyToOne(id) | ZiFieldValue::Reference(id) => *id == 0,
            ZiFieldValue::ManyToMany(ids) | ZiFieldValue::OneToMany(ids) => ids.is_empty(),
        }
    }

    /// Ids held by a many-to-one or many-to-many value.
    pub fn relation_ids(&self) -> Vec<i64> {
        match self {
            ZiFieldValue::ManyToOne(id) if *id != 0 => vec![*id],
            ZiFieldValue::ManyToMany(ids) => ids.clone(),
            _ => Vec::new(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ZiFieldValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ZiFieldValue::Integer(i) | ZiFieldValue::ManyToOne(i) | ZiFieldValue::Reference(i) => {
                Some(*i)
            }
            _ => None,
        }
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

/// `(model, id)` pair addressing one row.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ZiRecordRef {
    pub model: String,
    pub id: i64,
}

impl ZiRecordRef {
    pub fn new(model: &str, id: i64) -> Self {
        Self {
            model: model.to_string(),
            id,
        }
    }
}

impl fmt::Display for ZiRecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.model, self.id)
    }
}

/// Who created and last modified a row, and its pre-existing identifier.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ZiProvenance {
    #[serde(default)]
    pub create_uid: Option<i64>,
    #[serde(default)]
    pub write_uid: Option<i64>,
    #[serde(default)]
    pub create_date: Option<NaiveDateTime>,
    #[serde(default)]
    pub write_date: Option<NaiveDateTime>,
    /// Stable identifier already known for the row, e.g. `base.main_company`.
    #[serde(default)]
    pub external_id: Option<String>,
}

impl ZiProvenance {
    pub fn created_by(uid: i64) -> Self {
        Self {
            create_uid: Some(uid),
            write_uid: Some(uid),
            ..Default::default()
        }
    }

    pub fn written_by(mut self, uid: i64) -> Self {
        self.write_uid = Some(uid);
        self
    }

    pub fn with_dates(mut self, created: NaiveDateTime, written: NaiveDateTime) -> Self {
        self.create_date = Some(created);
        self.write_date = Some(written);
        self
    }

    pub fn with_external_id(mut self, external_id: &str) -> Self {
        self.external_id = Some(external_id.to_string());
        self
    }

    /// Namespace part of the pre-existing identifier.
    pub fn namespace(&self) -> Option<&str> {
        self.external_id
            .as_deref()
            .and_then(|xid| xid.split_once('.').map(|(ns, _)| ns))
    }
}

/// Row snapshot returned by the record store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ZiStoredRecord {
    pub model: String,
    pub id: i64,
    #[serde(default)]
    pub values: BTreeMap<String, ZiFieldValue>,
    #[serde(default)]
    pub provenance: ZiProvenance,
}

impl ZiStoredRecord {
    pub fn new(model: &str, id: i64) -> Self {
        Self {
            model: model.to_string(),
            id,
            values: BTreeMap::new(),
            provenance: ZiProvenance::default(),
        }
    }

    pub fn with_value(mut self, field: &str, value: ZiFieldValue) -> Self {
        self.values.insert(field.to_string(), value);
        self
    }

    pub fn with_provenance(mut self, provenance: ZiProvenance) -> Self {
        self.provenance = provenance;
        self
    }

    pub fn key(&self) -> ZiRecordRef {
        ZiRecordRef::new(&self.model, self.id)
    }

    pub fn get(&self, field: &str) -> Option<&ZiFieldValue> {
        self.values.get(field)
    }

    /// Text value of the label field, if any.
    pub fn label(&self, rec_name: &str) -> Option<&str> {
        self.get(rec_name)
            .and_then(ZiFieldValue::as_str)
            .filter(|s| !s.trim().is_empty())
    }
}

/// Output partition of a record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZiBucket {
    Data,
    Demo,
}

impl ZiBucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            ZiBucket::Data => "data",
            ZiBucket::Demo => "demo",
        }
    }

    pub fn from_demo_flag(is_demo: bool) -> Self {
        if is_demo {
            ZiBucket::Demo
        } else {
            ZiBucket::Data
        }
    }
}

/// Placement of an attachment record relative to its owner's file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZiAttachmentPass {
    /// Referenced by the owner through a many-to-one; loaded before the owner.
    Pre,
    /// Pointing at the owner through `res_model`/`res_id`; loaded after it.
    Post,
}

/// Why a record was selected.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZiCandidateOrigin {
    Customization,
    Rule,
    /// Dropped by the pristine heuristic, then pulled back in through a
    /// relation of an included record.
    Forced,
    Attachment { owner: String, pass: ZiAttachmentPass },
}

/// Record selected for export.
#[derive(Clone, Debug, PartialEq)]
pub struct ZiCandidateRecord {
    pub record: ZiStoredRecord,
    pub bucket: ZiBucket,
    pub no_update: bool,
    pub origin: ZiCandidateOrigin,
    pub excluded_fields: BTreeSet<String>,
}

impl ZiCandidateRecord {
    pub fn new(record: ZiStoredRecord, bucket: ZiBucket, origin: ZiCandidateOrigin) -> Self {
        Self {
            record,
            bucket,
            no_update: false,
            origin,
            excluded_fields: BTreeSet::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.record.model
    }

    pub fn key(&self) -> ZiRecordRef {
        self.record.key()
    }

    pub fn attachment_pass(&self) -> Option<(&str, ZiAttachmentPass)> {
        match &self.origin {
            ZiCandidateOrigin::Attachment { owner, pass } => Some((owner.as_str(), *pass)),
            _ => None,
        }
    }
}
