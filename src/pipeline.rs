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

//! # Export Pipeline Module
//!
//! Runs one export end to end:
//!
//! ```text
//! validate -> select -> assign identifiers -> graph -> schedule
//!          -> fetch payloads and identifiers -> serialize and assemble
//! ```
//!
//! Each phase consumes the complete output of the previous one. Store
//! queries inside a phase run concurrently and are awaited as a batch.
//! Recoverable problems accumulate as warnings; only the pre-flight
//! configuration check can fail the run.
//!
//! ## Usage Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use zimod::{ZiExportConfig, ZiExportModelRule, ZiExporter, ZiMemoryStore, ZiStaticMetadata};
//!
//! let config = ZiExportConfig::new("custom").with_rule(ZiExportModelRule::new("res.partner"));
//! let exporter = ZiExporter::new(config, Arc::new(store), Arc::new(metadata));
//! let result = exporter.run().await?;
//! ZiModuleWriter::new("custom").write(&result.output, Path::new("out"))?;
//! ```

use std::sync::Arc;

use crate::binary::ZiPayloadCache;
use crate::config::ZiExportConfig;
use crate::errors::{Result, ZiError, ZiWarning, ZiWarningKind};
use crate::export::{ZiExportStats, ZiManifest, ZiModuleAssembler, ZiOutputSet};
use crate::graph::ZiModelGraph;
use crate::identifier::ZiIdentifierRegistry;
use crate::metadata::{ZiMetadataProvider, ZiSchemaCatalog};
use crate::policy::{ZiOwnNamespace, ZiRetentionPolicy};
use crate::record::ZiBucket;
use crate::scheduler::{ZiCycle, ZiSchedule, ZiTopologicalScheduler};
use crate::selector::ZiExportSelector;
use crate::serializer::ZiReferenceIndex;
use crate::store::ZiRecordStore;

/// Outcome of a completed run.
#[derive(Clone, Debug)]
pub struct ZiExportResult {
    pub output: ZiOutputSet,
    pub manifest: ZiManifest,
    pub warnings: Vec<ZiWarning>,
    pub cycles: Vec<ZiCycle>,
    pub stats: ZiExportStats,
}

pub struct ZiExporter {
    config: ZiExportConfig,
    store: Arc<dyn ZiRecordStore>,
    metadata: Arc<dyn ZiMetadataProvider>,
    registry: Arc<ZiIdentifierRegistry>,
    policy: Option<Arc<dyn ZiRetentionPolicy>>,
}

impl ZiExporter {
    pub fn new(
        config: ZiExportConfig,
        store: Arc<dyn ZiRecordStore>,
        metadata: Arc<dyn ZiMetadataProvider>,
    ) -> Self {
        let registry = Arc::new(ZiIdentifierRegistry::new(&config.module_name));
        Self {
            config,
            store,
            metadata,
            registry,
            policy: None,
        }
    }

    /// Uses a registry loaded from an earlier run.
    pub fn with_registry(mut self, registry: Arc<ZiIdentifierRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Replaces the configured pristine-record policy.
    pub fn with_policy(mut self, policy: Arc<dyn ZiRetentionPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn config(&self) -> &ZiExportConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ZiIdentifierRegistry> {
        &self.registry
    }

    pub async fn run(&self) -> Result<ZiExportResult> {
        self.config.validate()?;
        if self.registry.namespace() != self.config.module_name {
            return Err(ZiError::rejected(
                "",
                format!(
                    "identifier registry namespace '{}' does not match module '{}'",
                    self.registry.namespace(),
                    self.config.module_name
                ),
            ));
        }
        log::info!(
            "export.pipeline.start: export started - module={}, rules={}, customizations={}",
            self.config.module_name,
            self.config.rules.len(),
            self.config.customizations.len()
        );

        let mut catalog = ZiSchemaCatalog::load(
            self.metadata.as_ref(),
            self.config
                .rules
                .iter()
                .map(|r| r.model.as_str())
                .chain(self.config.customizations.iter().map(|c| c.model.as_str()))
                .chain(self.config.attachment_models.iter().map(String::as_str)),
        );

        let configured: &dyn ZiRetentionPolicy = match &self.policy {
            Some(policy) => policy.as_ref(),
            None => &self.config.policy,
        };
        // rows installed from an earlier export of this module
        let policy = ZiOwnNamespace::new(&self.config.module_name, configured);
        let selection = ZiExportSelector::new(&self.config, &catalog, &policy)
            .select(self.store.as_ref())
            .await;

        for model in &selection.model_order {
            if !catalog.contains(model) {
                if let Some(schema) = self.metadata.schema(model) {
                    catalog.insert(schema);
                }
            }
        }
        catalog.extend_with_targets(self.metadata.as_ref());

        let (index, index_warnings) =
            ZiReferenceIndex::build(self.store.as_ref(), &self.registry, &selection.candidates, &catalog).await;

        // pre-existing identifiers are claimed before any slug is generated
        let mut identifier_warnings = Vec::new();
        for (key, identifier) in index.external_identifiers() {
            self.registry.reserve(key.clone(), identifier);
        }
        for candidate in &selection.candidates {
            let Some(identifier) = &candidate.record.provenance.external_id else {
                continue;
            };
            if let Err(holder) = self.registry.register(candidate.key(), identifier) {
                log::warn!(
                    "export.pipeline.identifier_conflict: identifier held by another row - record={}, identifier={}, holder={}",
                    candidate.key(),
                    identifier,
                    holder
                );
                identifier_warnings.push(ZiWarning::new(
                    ZiWarningKind::IdentifierConflict,
                    Some(candidate.model()),
                    format!(
                        "{} carries identifier '{}' already held by {}; a new identifier is generated",
                        candidate.key(),
                        identifier,
                        holder
                    ),
                ));
            }
        }

        // rule order, then id
        for candidate in &selection.candidates {
            let rec_name = catalog
                .get(candidate.model())
                .map(|s| s.rec_name.as_str())
                .unwrap_or("name");
            self.registry.assign(&candidate.record, rec_name);
        }

        let scheduler = ZiTopologicalScheduler::new();
        let schedules: Vec<ZiSchedule> = [ZiBucket::Data, ZiBucket::Demo]
            .into_iter()
            .map(|bucket| {
                let graph = ZiModelGraph::build(&selection.model_order, selection.in_bucket(bucket), &catalog);
                scheduler.schedule(&graph, bucket)
            })
            .collect();

        let (payloads, payload_warnings) =
            ZiPayloadCache::prefetch(self.store.as_ref(), &selection.candidates).await;
        let assembly = ZiModuleAssembler::new(&self.config, &catalog).assemble(&selection, &schedules, &index, &payloads);

        let cycles: Vec<ZiCycle> = schedules.iter().flat_map(|s| s.cycles.iter().cloned()).collect();
        let mut warnings = selection.warnings.clone();
        warnings.extend(payload_warnings);
        warnings.extend(index_warnings);
        warnings.extend(identifier_warnings);
        warnings.extend(assembly.warnings);
        warnings.extend(cycles.iter().map(ZiCycle::to_warning));

        let mut stats = assembly.stats;
        stats.warnings = warnings.len();
        log::info!(
            "export.pipeline.done: export finished - records={}, files={}, side_files={}, cycles={}, warnings={}",
            stats.records(),
            stats.files,
            stats.side_files,
            stats.cycles,
            stats.warnings
        );

        Ok(ZiExportResult {
            output: assembly.output,
            manifest: assembly.manifest,
            warnings,
            cycles,
            stats,
        })
    }
}
