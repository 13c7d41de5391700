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

//! # Field Metadata Module
//!
//! Static description of the models an export touches. The metadata provider
//! is an external collaborator; the engine reads it once per run into a
//! [`ZiSchemaCatalog`] and never asks it again while records are processed.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Type of a scalar (non-relational, non-binary) field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZiScalarType {
    Char,
    Text,
    Html,
    /// Markup embedded verbatim, such as view architectures.
    Xml,
    Integer,
    Float,
    Boolean,
    Date,
    Datetime,
    Selection,
}

/// Kind of a field as seen by the export engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ZiFieldKind {
    Scalar { scalar: ZiScalarType },
    Binary,
    ManyToOne { target: String },
    ManyToMany { target: String },
    OneToMany { target: String, inverse: String },
    /// Integer id whose model is named by another field of the same record.
    Reference { model_field: String },
}

impl ZiFieldKind {
    pub fn scalar(scalar: ZiScalarType) -> Self {
        ZiFieldKind::Scalar { scalar }
    }

    /// Target model of a many-to-one or many-to-many field.
    pub fn relation_target(&self) -> Option<&str> {
        match self {
            ZiFieldKind::ManyToOne { target } | ZiFieldKind::ManyToMany { target } => {
                Some(target.as_str())
            }
            _ => None,
        }
    }
}

/// Metadata of one field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZiFieldMeta {
    pub name: String,
    #[serde(flatten)]
    pub kind: ZiFieldKind,
    #[serde(default = "default_true")]
    pub stored: bool,
    #[serde(default)]
    pub required: bool,
}

fn default_true() -> bool {
    true
}

impl ZiFieldMeta {
    pub fn new(name: &str, kind: ZiFieldKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            stored: true,
            required: false,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn computed(mut self) -> Self {
        self.stored = false;
        self
    }
}

/// Field schema of one model.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZiModelSchema {
    pub model: String,
    /// Package that defines the model, used for declared dependencies.
    #[serde(default)]
    pub module: Option<String>,
    /// Primary label field, emitted first in serialized records.
    #[serde(default = "default_rec_name")]
    pub rec_name: String,
    #[serde(default)]
    pub fields: Vec<ZiFieldMeta>,
}

fn default_rec_name() -> String {
    "name".to_string()
}

impl ZiModelSchema {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            module: None,
            rec_name: default_rec_name(),
            fields: Vec::new(),
        }
    }

    pub fn with_module(mut self, module: &str) -> Self {
        self.module = Some(module.to_string());
        self
    }

    pub fn with_rec_name(mut self, rec_name: &str) -> Self {
        self.rec_name = rec_name.to_string();
        self
    }

    pub fn field(mut self, field: ZiFieldMeta) -> Self {
        self.fields.push(field);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ZiFieldMeta> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Stored many-to-one and many-to-many fields, in declaration order.
    pub fn relational_fields(&self) -> impl Iterator<Item = &ZiFieldMeta> {
        self.fields
            .iter()
            .filter(|f| f.stored && f.kind.relation_target().is_some())
    }
}

/// Source of field schemas.
pub trait ZiMetadataProvider: Send + Sync {
    fn schema(&self, model: &str) -> Option<ZiModelSchema>;
}

/// Schemas loaded once for a run.
#[derive(Clone, Debug, Default)]
pub struct ZiSchemaCatalog {
    schemas: HashMap<String, ZiModelSchema>,
}

impl ZiSchemaCatalog {
    /// Loads the schema of every listed model that the provider knows.
    pub fn load<'a, I>(provider: &dyn ZiMetadataProvider, models: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut schemas = HashMap::new();
        for model in models {
            if schemas.contains_key(model) {
                continue;
            }
            match provider.schema(model) {
                Some(schema) => {
                    schemas.insert(model.to_string(), schema);
                }
                None => {
                    log::debug!("export.metadata.missing: no schema for model - model={}", model);
                }
            }
        }
        Self { schemas }
    }

    pub fn get(&self, model: &str) -> Option<&ZiModelSchema> {
        self.schemas.get(model)
    }

    pub fn insert(&mut self, schema: ZiModelSchema) {
        self.schemas.insert(schema.model.clone(), schema);
    }

    pub fn contains(&self, model: &str) -> bool {
        self.schemas.contains_key(model)
    }

    /// Adds the schemas of models targeted by relational fields of loaded
    /// schemas, one level deep.
    pub fn extend_with_targets(&mut self, provider: &dyn ZiMetadataProvider) {
        let targets: Vec<String> = self
            .schemas
            .values()
            .flat_map(|s| s.relational_fields().filter_map(|f| f.kind.relation_target()))
            .map(str::to_string)
            .collect();
        for target in targets {
            if self.schemas.contains_key(&target) {
                continue;
            }
            if let Some(schema) = provider.schema(&target) {
                self.schemas.insert(target, schema);
            }
        }
    }
}

/// In-memory metadata provider.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ZiStaticMetadata {
    #[serde(default)]
    pub models: Vec<ZiModelSchema>,
}

impl ZiStaticMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, schema: ZiModelSchema) -> Self {
        self.models.retain(|m| m.model != schema.model);
        self.models.push(schema);
        self
    }

    pub fn from_json(json: &str) -> crate::errors::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl ZiMetadataProvider for ZiStaticMetadata {
    fn schema(&self, model: &str) -> Option<ZiModelSchema> {
        self.models.iter().find(|m| m.model == model).cloned()
    }
}
