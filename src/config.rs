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

//! # Export Configuration Module
//!
//! Operator-facing configuration of an export run: the export-model rules, the
//! manually customized records, and the knobs of the pristine-record policy and
//! binary extraction.
//!
//! Configuration is immutable during a run. [`ZiExportConfig::validate`] is the
//! only check allowed to reject a run outright.
//!
//! ```yaml
//! module_name: studio_customization
//! rules:
//!   - model: res.partner
//!     domain: "[('is_company', '=', True)]"
//!     include_attachment: true
//!   - model: product.template
//!     is_demo_data: true
//!     excluded_fields: [image_128]
//! customizations:
//!   - { model: ir.ui.view, id: 812 }
//! ```

use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::ZiDomain;
use crate::errors::{Result, ZiError};
use crate::policy::ZiPristinePolicy;
use crate::record::{ZiBucket, ZiRecordRef};

/// Bulk export rule for one model.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZiExportModelRule {
    pub model: String,
    /// Filter expression; empty selects every row.
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub is_demo_data: bool,
    #[serde(default)]
    pub no_update: bool,
    #[serde(default)]
    pub include_attachment: bool,
    #[serde(default)]
    pub excluded_fields: BTreeSet<String>,
    #[serde(default = "default_sequence")]
    pub sequence: i32,
}

fn default_sequence() -> i32 {
    10
}

impl ZiExportModelRule {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            domain: None,
            is_demo_data: false,
            no_update: false,
            include_attachment: false,
            excluded_fields: BTreeSet::new(),
            sequence: default_sequence(),
        }
    }

    pub fn with_domain(mut self, domain: &str) -> Self {
        self.domain = Some(domain.to_string());
        self
    }

    pub fn demo(mut self) -> Self {
        self.is_demo_data = true;
        self
    }

    pub fn no_update(mut self) -> Self {
        self.no_update = true;
        self
    }

    pub fn include_attachment(mut self) -> Self {
        self.include_attachment = true;
        self
    }

    pub fn exclude(mut self, field: &str) -> Self {
        self.excluded_fields.insert(field.to_string());
        self
    }

    pub fn with_sequence(mut self, sequence: i32) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn bucket(&self) -> ZiBucket {
        ZiBucket::from_demo_flag(self.is_demo_data)
    }

    /// Parsed filter expression.
    pub fn parsed_domain(&self) -> Result<ZiDomain> {
        ZiDomain::parse(self.domain.as_deref().unwrap_or(""))
    }
}

/// Complete configuration of an export run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ZiExportConfig {
    /// Name of the generated module; also the namespace of new identifiers.
    pub module_name: String,
    #[serde(default = "default_version")]
    pub version: String,
    /// Dependencies declared regardless of what the export references.
    #[serde(default = "default_depends")]
    pub depends: Vec<String>,
    #[serde(default)]
    pub rules: Vec<ZiExportModelRule>,
    #[serde(default)]
    pub customizations: Vec<ZiRecordRef>,
    #[serde(default)]
    pub policy: ZiPristinePolicy,
    #[serde(default = "default_attachment_models")]
    pub attachment_models: Vec<String>,
    /// Binary payloads up to this many bytes are inlined as base64.
    #[serde(default)]
    pub inline_binary_limit: usize,
}

fn default_version() -> String {
    "1.0".to_string()
}

fn default_depends() -> Vec<String> {
    vec!["base".to_string()]
}

fn default_attachment_models() -> Vec<String> {
    vec!["ir.attachment".to_string()]
}

impl ZiExportConfig {
    pub fn new(module_name: &str) -> Self {
        Self {
            module_name: module_name.to_string(),
            version: default_version(),
            depends: default_depends(),
            rules: Vec::new(),
            customizations: Vec::new(),
            policy: ZiPristinePolicy::default(),
            attachment_models: default_attachment_models(),
            inline_binary_limit: 0,
        }
    }

    pub fn with_rule(mut self, rule: ZiExportModelRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn with_customization(mut self, model: &str, id: i64) -> Self {
        self.customizations.push(ZiRecordRef::new(model, id));
        self
    }

    pub fn with_policy(mut self, policy: ZiPristinePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_inline_binary_limit(mut self, limit: usize) -> Self {
        self.inline_binary_limit = limit;
        self
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Loads a configuration file; `.json` is parsed as JSON, anything else as YAML.
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();
        match extension.as_str() {
            "json" => Self::from_json(&content),
            _ => Self::from_yaml(&content),
        }
    }

    /// Pre-flight check run before any record is read.
    pub fn validate(&self) -> Result<()> {
        let namespace = Regex::new(r"^[a-z_][a-z0-9_]*$")
            .map_err(|e| ZiError::internal(e.to_string()))?;
        if !namespace.is_match(&self.module_name) {
            return Err(ZiError::rejected(
                "",
                format!("module name '{}' is not a valid identifier namespace", self.module_name),
            ));
        }

        let mut seen = HashSet::new();
        for rule in &self.rules {
            if rule.model.trim().is_empty() {
                return Err(ZiError::rejected(&rule.model, "model name cannot be empty"));
            }
            if !seen.insert(rule.model.as_str()) {
                return Err(ZiError::rejected(
                    &rule.model,
                    "only one export rule per model is allowed",
                ));
            }
            rule.parsed_domain()
                .map_err(|e| ZiError::rejected(&rule.model, e.to_string()))?;
        }

        for custom in &self.customizations {
            if custom.model.trim().is_empty() || custom.id <= 0 {
                return Err(ZiError::rejected(
                    &custom.model,
                    format!("invalid customized record {}", custom),
                ));
            }
        }
        Ok(())
    }

    /// Rules ordered by sequence, ties kept in configuration order.
    pub fn ordered_rules(&self) -> Vec<&ZiExportModelRule> {
        let mut rules: Vec<&ZiExportModelRule> = self.rules.iter().collect();
        rules.sort_by_key(|r| r.sequence);
        rules
    }

    pub fn rule_for(&self, model: &str) -> Option<&ZiExportModelRule> {
        self.rules.iter().find(|r| r.model == model)
    }

    pub fn is_attachment_model(&self, model: &str) -> bool {
        self.attachment_models.iter().any(|m| m == model)
    }
}
