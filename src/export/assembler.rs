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

//! # Module Assembler
//!
//! Lays the serialized rows out as files and writes the manifest.
//!
//! Files follow the bucket schedules: all data files in dependency order, then
//! all demo files. Attachment pass files sit directly before (pre-pass) or
//! after (post-pass) the file of their owner model. A file is only produced
//! when it holds at least one record.

use std::collections::{BTreeMap, BTreeSet};

use crate::binary::{ZiBinaryExtractor, ZiPayloadCache};
use crate::config::ZiExportConfig;
use crate::errors::{ZiWarning, ZiWarningKind};
use crate::export::manifest::{
    compute_hash, ZiFileRole, ZiManifest, ZiManifestBuilder, ZiManifestFile, MANIFEST_FILE,
};
use crate::export::{ZiExportStats, ZiOutputSet};
use crate::metadata::ZiSchemaCatalog;
use crate::record::{ZiAttachmentPass, ZiBucket, ZiCandidateRecord};
use crate::scheduler::{ZiCycle, ZiSchedule};
use crate::selector::ZiSelection;
use crate::serializer::{ZiRecordSerializer, ZiReferenceIndex};

pub const WARNINGS_FILE: &str = "warnings.txt";

/// Planned output file before serialization.
#[derive(Clone, Debug)]
pub struct ZiFilePlan<'c> {
    pub path: String,
    pub bucket: ZiBucket,
    pub model: String,
    pub role: ZiFileRole,
    pub records: Vec<&'c ZiCandidateRecord>,
}

impl ZiFilePlan<'_> {
    pub fn no_update(&self) -> bool {
        !self.records.is_empty() && self.records.iter().all(|r| r.no_update)
    }
}

/// Everything an assembled module consists of.
#[derive(Clone, Debug, Default)]
pub struct ZiAssembly {
    pub output: ZiOutputSet,
    pub manifest: ZiManifest,
    pub warnings: Vec<ZiWarning>,
    pub stats: ZiExportStats,
}

pub fn file_path(bucket: ZiBucket, model: &str) -> String {
    format!("{}/{}.xml", bucket.as_str(), model.replace('.', "_"))
}

pub fn attachment_file_path(bucket: ZiBucket, attachment_model: &str, owner: &str, pass: ZiAttachmentPass) -> String {
    let suffix = match pass {
        ZiAttachmentPass::Pre => "pre",
        ZiAttachmentPass::Post => "post",
    };
    format!(
        "{}/{}_{}_{}.xml",
        bucket.as_str(),
        attachment_model.replace('.', "_"),
        owner.replace('.', "_"),
        suffix
    )
}

/// `warnings.txt` content, one line per cycle.
pub fn cycle_report(cycles: &[ZiCycle]) -> String {
    let mut out = String::new();
    for cycle in cycles {
        out.push_str(&cycle.warning_line());
        out.push('\n');
    }
    out
}

pub struct ZiModuleAssembler<'a> {
    config: &'a ZiExportConfig,
    catalog: &'a ZiSchemaCatalog,
}

impl<'a> ZiModuleAssembler<'a> {
    pub fn new(config: &'a ZiExportConfig, catalog: &'a ZiSchemaCatalog) -> Self {
        Self { config, catalog }
    }

    /// Ordered file plans for the given bucket schedules.
    pub fn plan<'c>(&self, selection: &'c ZiSelection, schedules: &[ZiSchedule]) -> Vec<ZiFilePlan<'c>> {
        let mut plans = Vec::new();
        for schedule in schedules {
            let bucket = schedule.bucket;
            let mut rows: BTreeMap<&str, Vec<&'c ZiCandidateRecord>> = BTreeMap::new();
            // (owner, pass) -> attachment model -> rows
            let mut attachments: BTreeMap<(&str, ZiAttachmentPass), BTreeMap<&str, Vec<&'c ZiCandidateRecord>>> =
                BTreeMap::new();
            for candidate in selection.in_bucket(bucket) {
                match candidate.attachment_pass() {
                    Some((owner, pass)) => attachments
                        .entry((owner, pass))
                        .or_default()
                        .entry(candidate.model())
                        .or_default()
                        .push(candidate),
                    None => rows.entry(candidate.model()).or_default().push(candidate),
                }
            }

            for model in &schedule.order {
                let model = model.as_str();
                if let Some(groups) = attachments.remove(&(model, ZiAttachmentPass::Pre)) {
                    push_attachment_plans(&mut plans, bucket, model, ZiAttachmentPass::Pre, groups);
                }
                if let Some(records) = rows.remove(model) {
                    plans.push(ZiFilePlan {
                        path: file_path(bucket, model),
                        bucket,
                        model: model.to_string(),
                        role: ZiFileRole::Records,
                        records,
                    });
                }
                if let Some(groups) = attachments.remove(&(model, ZiAttachmentPass::Post)) {
                    push_attachment_plans(&mut plans, bucket, model, ZiAttachmentPass::Post, groups);
                }
            }

            // rows of models the schedule does not know, by name
            for (model, records) in rows {
                log::debug!(
                    "export.assembler.unscheduled: model appended after schedule - bucket={}, model={}",
                    bucket.as_str(),
                    model
                );
                plans.push(ZiFilePlan {
                    path: file_path(bucket, model),
                    bucket,
                    model: model.to_string(),
                    role: ZiFileRole::Records,
                    records,
                });
            }
            for ((owner, pass), groups) in attachments {
                push_attachment_plans(&mut plans, bucket, owner, pass, groups);
            }
        }
        plans.retain(|p| !p.records.is_empty());
        plans
    }

    /// Serializes every planned file and builds the manifest.
    pub fn assemble(
        &self,
        selection: &ZiSelection,
        schedules: &[ZiSchedule],
        index: &ZiReferenceIndex<'_>,
        payloads: &ZiPayloadCache,
    ) -> ZiAssembly {
        let plans = self.plan(selection, schedules);
        let mut extractor = ZiBinaryExtractor::new(
            &self.config.module_name,
            self.config.inline_binary_limit,
            &self.config.attachment_models,
        );
        let mut output = ZiOutputSet::new();
        let mut builder = ZiManifestBuilder::new(&self.config.module_name, &self.config.version);
        let mut warnings = Vec::new();
        let mut stats = ZiExportStats::default();
        let mut identifiers: BTreeSet<String> = BTreeSet::new();

        for module in &self.config.depends {
            builder.depend_on(module);
        }

        let external_refs = {
            let mut serializer = ZiRecordSerializer::new(self.catalog, index, payloads, &mut extractor);
            for plan in &plans {
                let content = match serializer.write_file(&plan.records, plan.no_update()) {
                    Ok(content) => content,
                    Err(err) => {
                        log::warn!(
                            "export.assembler.file_failed: file skipped - path={}, error={}",
                            plan.path,
                            err
                        );
                        warnings.push(ZiWarning::new(
                            ZiWarningKind::Selection,
                            Some(&plan.model),
                            format!("{} not written: {}", plan.path, err),
                        ));
                        continue;
                    }
                };
                for record in &plan.records {
                    if let Some(identifier) = index.resolve(&record.key()) {
                        identifiers.insert(identifier);
                    }
                }
                match plan.bucket {
                    ZiBucket::Data => stats.data_records += plan.records.len(),
                    ZiBucket::Demo => stats.demo_records += plan.records.len(),
                }
                builder.add_file(ZiManifestFile {
                    path: plan.path.clone(),
                    model: plan.model.clone(),
                    bucket: plan.bucket,
                    role: plan.role,
                    records: plan.records.len(),
                    no_update: plan.no_update(),
                    hash: compute_hash(&content),
                });
                output.insert(&plan.path, content);
                stats.files += 1;
            }
            warnings.extend(serializer.take_warnings());
            serializer.external_refs().clone()
        };

        // modules defining referenced models and owning referenced identifiers
        for target in &external_refs {
            if let Some(module) = self.catalog.get(&target.model).and_then(|s| s.module.as_deref()) {
                builder.depend_on(module);
            }
            if let Some(identifier) = index.resolve(target) {
                identifiers.insert(identifier);
            }
        }
        for identifier in &identifiers {
            if let Some((namespace, _)) = identifier.split_once('.') {
                if !self.is_customization_namespace(namespace) {
                    builder.depend_on(namespace);
                }
            }
        }

        for (path, bytes) in extractor.into_side_files() {
            builder.add_side_file(&path);
            output.insert(&path, bytes);
            stats.side_files += 1;
        }

        let cycles: Vec<ZiCycle> = schedules.iter().flat_map(|s| s.cycles.iter().cloned()).collect();
        if !cycles.is_empty() {
            output.insert(WARNINGS_FILE, cycle_report(&cycles).into_bytes());
        }
        stats.cycles = cycles.len();

        let manifest = builder.build();
        match manifest.to_json() {
            Ok(json) => {
                let mut bytes = json.into_bytes();
                bytes.push(b'\n');
                output.insert(MANIFEST_FILE, bytes);
            }
            Err(err) => warnings.push(ZiWarning::new(
                ZiWarningKind::Selection,
                None,
                format!("manifest not written: {}", err),
            )),
        }
        stats.bytes = output.total_bytes();

        log::info!(
            "export.assembler.done: module assembled - files={}, side_files={}, depends={}",
            stats.files,
            stats.side_files,
            manifest.depends.join(",")
        );
        ZiAssembly {
            output,
            manifest,
            warnings,
            stats,
        }
    }

    fn is_customization_namespace(&self, namespace: &str) -> bool {
        self.config
            .policy
            .customization_namespaces
            .iter()
            .any(|ns| ns == namespace)
    }
}

fn push_attachment_plans<'c>(
    plans: &mut Vec<ZiFilePlan<'c>>,
    bucket: ZiBucket,
    owner: &str,
    pass: ZiAttachmentPass,
    groups: BTreeMap<&str, Vec<&'c ZiCandidateRecord>>,
) {
    let role = match pass {
        ZiAttachmentPass::Pre => ZiFileRole::AttachmentPre,
        ZiAttachmentPass::Post => ZiFileRole::AttachmentPost,
    };
    for (attachment_model, records) in groups {
        plans.push(ZiFilePlan {
            path: attachment_file_path(bucket, attachment_model, owner, pass),
            bucket,
            model: owner.to_string(),
            role,
            records,
        });
    }
}
