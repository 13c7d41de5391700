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

//! # Export Selector Module
//!
//! Decides which rows an export run emits.
//!
//! 1. Every rule's filter is evaluated against the record store. Security
//!    sensitive models get a mandatory extra filter that rule configuration
//!    cannot remove.
//! 2. Rule-selected rows go through the retention policy; manually customized
//!    rows bypass it.
//! 3. Rows dropped by the policy come back when an included row of a rule with
//!    `include_attachment` points at them.
//! 4. Attachment rows of `include_attachment` owners are collected as pre-pass
//!    or post-pass records.
//!
//! All store queries of a step are issued together and awaited as a batch; a
//! query failure only removes the affected model from the run.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

use futures::future::join_all;

use crate::config::{ZiExportConfig, ZiExportModelRule};
use crate::domain::{ZiDomain, ZiDomainOperator, ZiDomainValue};
use crate::errors::{ZiWarning, ZiWarningKind};
use crate::metadata::ZiSchemaCatalog;
use crate::policy::ZiRetentionPolicy;
use crate::record::{
    ZiAttachmentPass, ZiBucket, ZiCandidateOrigin, ZiCandidateRecord, ZiRecordRef,
    ZiStoredRecord,
};
use crate::store::{ZiRecordStore, ZiStoreError};

/// Filter ANDed into every rule on a security-sensitive model.
pub fn security_domain(model: &str) -> Option<ZiDomain> {
    match model {
        // partners behind login accounts are never exported through rules
        "res.partner" => Some(ZiDomain::leaf(
            "user_ids",
            ZiDomainOperator::Eq,
            ZiDomainValue::Bool(false),
        )),
        // login accounts themselves never are
        "res.users" => Some(ZiDomain::leaf("id", ZiDomainOperator::Eq, ZiDomainValue::Int(0))),
        _ => None,
    }
}

/// Outcome of the selection phase.
#[derive(Clone, Debug, Default)]
pub struct ZiSelection {
    /// Selected rows, ordered by model order then id.
    pub candidates: Vec<ZiCandidateRecord>,
    /// Models in rule order, then customization-only models, then attachment models.
    pub model_order: Vec<String>,
    pub warnings: Vec<ZiWarning>,
}

impl ZiSelection {
    pub fn keys(&self) -> HashSet<ZiRecordRef> {
        self.candidates.iter().map(ZiCandidateRecord::key).collect()
    }

    pub fn in_bucket(&self, bucket: ZiBucket) -> impl Iterator<Item = &ZiCandidateRecord> {
        self.candidates.iter().filter(move |c| c.bucket == bucket)
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// Candidate selection over one configuration.
pub struct ZiExportSelector<'a> {
    config: &'a ZiExportConfig,
    catalog: &'a ZiSchemaCatalog,
    policy: &'a dyn ZiRetentionPolicy,
}

impl<'a> ZiExportSelector<'a> {
    pub fn new(
        config: &'a ZiExportConfig,
        catalog: &'a ZiSchemaCatalog,
        policy: &'a dyn ZiRetentionPolicy,
    ) -> Self {
        Self {
            config,
            catalog,
            policy,
        }
    }

    pub async fn select(&self, store: &dyn ZiRecordStore) -> ZiSelection {
        let mut warnings = Vec::new();
        let rules = self.config.ordered_rules();

        let mut model_order: Vec<String> = Vec::new();
        for rule in &rules {
            push_unique(&mut model_order, &rule.model);
        }
        for custom in &self.config.customizations {
            if !self.config.is_attachment_model(&custom.model) {
                push_unique(&mut model_order, &custom.model);
            }
        }

        let mut selected: BTreeMap<ZiRecordRef, ZiCandidateRecord> = BTreeMap::new();

        // customizations are always exported
        for (model, rows) in self.read_customizations(store, &mut warnings).await {
            let rule = self.config.rule_for(&model);
            for row in rows {
                let candidate = self.candidate(row, rule, ZiCandidateOrigin::Customization);
                selected.insert(candidate.key(), candidate);
            }
        }

        // rule-governed rows
        let mut dropped: HashMap<ZiRecordRef, ZiStoredRecord> = HashMap::new();
        for (rule, rows) in self.search_rules(store, &rules, &mut warnings).await {
            let mut kept = 0usize;
            for row in rows {
                let key = row.key();
                if selected.contains_key(&key) {
                    continue;
                }
                if self.policy.keep(&row) {
                    kept += 1;
                    selected.insert(key, self.candidate(row, Some(rule), ZiCandidateOrigin::Rule));
                } else {
                    log::debug!("export.selector.pristine: dropping untouched record - record={}", key);
                    dropped.insert(key, row);
                }
            }
            log::info!(
                "export.selector.rule: rule evaluated - model={}, kept={}",
                rule.model,
                kept
            );
        }

        self.force_reachable(&mut selected, &mut dropped);

        let attachments = self.collect_attachments(store, &selected, &mut warnings).await;
        for candidate in attachments {
            push_unique(&mut model_order, candidate.model());
            selected.entry(candidate.key()).or_insert(candidate);
        }

        let rank: HashMap<&str, usize> = model_order
            .iter()
            .enumerate()
            .map(|(i, m)| (m.as_str(), i))
            .collect();
        let mut candidates: Vec<ZiCandidateRecord> = selected.into_values().collect();
        candidates.sort_by_key(|c| (rank.get(c.model()).copied().unwrap_or(usize::MAX), c.record.id));
        let present: BTreeSet<&str> = candidates.iter().map(|c| c.model()).collect();
        let model_order: Vec<String> = model_order
            .iter()
            .filter(|m| present.contains(m.as_str()))
            .cloned()
            .collect();

        log::info!(
            "export.selector.done: selection complete - records={}, models={}, warnings={}",
            candidates.len(),
            model_order.len(),
            warnings.len()
        );

        ZiSelection {
            candidates,
            model_order,
            warnings,
        }
    }

    fn candidate(
        &self,
        row: ZiStoredRecord,
        rule: Option<&ZiExportModelRule>,
        origin: ZiCandidateOrigin,
    ) -> ZiCandidateRecord {
        let bucket = rule.map(|r| r.bucket()).unwrap_or(ZiBucket::Data);
        let mut candidate = ZiCandidateRecord::new(row, bucket, origin);
        if let Some(rule) = rule {
            candidate.no_update = rule.no_update;
            candidate.excluded_fields = rule.excluded_fields.clone();
        }
        candidate
    }

    async fn read_customizations(
        &self,
        store: &dyn ZiRecordStore,
        warnings: &mut Vec<ZiWarning>,
    ) -> Vec<(String, Vec<ZiStoredRecord>)> {
        let mut by_model: Vec<(String, Vec<i64>)> = Vec::new();
        for custom in &self.config.customizations {
            match by_model.iter_mut().find(|(m, _)| *m == custom.model) {
                Some((_, ids)) => ids.push(custom.id),
                None => by_model.push((custom.model.clone(), vec![custom.id])),
            }
        }

        let results = join_all(by_model.iter().map(|(model, ids)| store.read(model, ids))).await;
        let mut out = Vec::new();
        for ((model, ids), result) in by_model.into_iter().zip(results) {
            match result {
                Ok(rows) => {
                    if rows.len() < ids.len() {
                        let found: HashSet<i64> = rows.iter().map(|r| r.id).collect();
                        for id in ids.iter().filter(|id| !found.contains(id)) {
                            warnings.push(selection_warning(
                                &model,
                                format!("customized record {} no longer exists", id),
                            ));
                        }
                    }
                    out.push((model, rows));
                }
                Err(err) => warnings.push(store_warning(&model, &err)),
            }
        }
        out
    }

    async fn search_rules<'r>(
        &self,
        store: &dyn ZiRecordStore,
        rules: &[&'r ZiExportModelRule],
        warnings: &mut Vec<ZiWarning>,
    ) -> Vec<(&'r ZiExportModelRule, Vec<ZiStoredRecord>)> {
        let mut queries = Vec::new();
        for rule in rules {
            let domain = match rule.parsed_domain() {
                Ok(domain) => domain,
                Err(err) => {
                    warnings.push(selection_warning(&rule.model, err.to_string()));
                    continue;
                }
            };
            let domain = match security_domain(&rule.model) {
                Some(mandatory) => domain.and(mandatory),
                None => domain,
            };
            queries.push((*rule, domain));
        }

        let results = join_all(
            queries
                .iter()
                .map(|(rule, domain)| store.search(&rule.model, domain)),
        )
        .await;

        let mut out = Vec::new();
        for ((rule, _), result) in queries.into_iter().zip(results) {
            match result {
                Ok(mut rows) => {
                    rows.sort_by_key(|r| r.id);
                    out.push((rule, rows));
                }
                Err(err) => warnings.push(store_warning(&rule.model, &err)),
            }
        }
        out
    }

    /// Re-includes dropped rows that an included row of an `include_attachment`
    /// rule points at.
    fn force_reachable(
        &self,
        selected: &mut BTreeMap<ZiRecordRef, ZiCandidateRecord>,
        dropped: &mut HashMap<ZiRecordRef, ZiStoredRecord>,
    ) {
        if dropped.is_empty() {
            return;
        }
        let mut queue: VecDeque<ZiRecordRef> = selected.keys().cloned().collect();
        while let Some(key) = queue.pop_front() {
            let Some(rule) = self.config.rule_for(&key.model) else {
                continue;
            };
            if !rule.include_attachment {
                continue;
            }
            let (Some(schema), Some(owner)) = (self.catalog.get(&key.model), selected.get(&key)) else {
                continue;
            };
            let mut reachable = Vec::new();
            for field in schema.relational_fields() {
                let Some(target) = field.kind.relation_target() else {
                    continue;
                };
                if let Some(value) = owner.record.get(&field.name) {
                    for id in value.relation_ids() {
                        reachable.push(ZiRecordRef::new(target, id));
                    }
                }
            }
            for target in reachable {
                if let Some(row) = dropped.remove(&target) {
                    log::debug!(
                        "export.selector.forced: record reachable from included record - record={}, from={}",
                        target,
                        key
                    );
                    let rule = self.config.rule_for(&target.model);
                    let candidate = self.candidate(row, rule, ZiCandidateOrigin::Forced);
                    selected.insert(target.clone(), candidate);
                    queue.push_back(target);
                }
            }
        }
    }

    async fn collect_attachments(
        &self,
        store: &dyn ZiRecordStore,
        selected: &BTreeMap<ZiRecordRef, ZiCandidateRecord>,
        warnings: &mut Vec<ZiWarning>,
    ) -> Vec<ZiCandidateRecord> {
        let mut owners: Vec<(&ZiExportModelRule, ZiBucket, Vec<i64>)> = Vec::new();
        for rule in self.config.ordered_rules() {
            if !rule.include_attachment || self.config.is_attachment_model(&rule.model) {
                continue;
            }
            let ids: Vec<i64> = selected
                .values()
                .filter(|c| c.model() == rule.model)
                .map(|c| c.record.id)
                .collect();
            if !ids.is_empty() {
                owners.push((rule, rule.bucket(), ids));
            }
        }
        if owners.is_empty() {
            return Vec::new();
        }

        struct Request<'q> {
            rule: &'q ZiExportModelRule,
            bucket: ZiBucket,
            attachment_model: &'q str,
            pass: ZiAttachmentPass,
            ids: Option<Vec<i64>>,
            domain: Option<ZiDomain>,
        }

        let mut requests = Vec::new();
        for (rule, bucket, ids) in &owners {
            for attachment_model in &self.config.attachment_models {
                let domain = ZiDomain::leaf(
                    "res_model",
                    ZiDomainOperator::Eq,
                    ZiDomainValue::Str(rule.model.clone()),
                )
                .and(ZiDomain::leaf(
                    "res_id",
                    ZiDomainOperator::In,
                    ZiDomainValue::List(ids.iter().map(|id| ZiDomainValue::Int(*id)).collect()),
                ));
                requests.push(Request {
                    rule,
                    bucket: *bucket,
                    attachment_model,
                    pass: ZiAttachmentPass::Post,
                    ids: None,
                    domain: Some(domain),
                });

                let referenced = self.referenced_ids(selected, &rule.model, attachment_model);
                if !referenced.is_empty() {
                    requests.push(Request {
                        rule,
                        bucket: *bucket,
                        attachment_model,
                        pass: ZiAttachmentPass::Pre,
                        ids: Some(referenced),
                        domain: None,
                    });
                }
            }
        }

        let results = join_all(requests.iter().map(|req| async move {
            match (&req.ids, &req.domain) {
                (Some(ids), _) => store.read(req.attachment_model, ids).await,
                (None, Some(domain)) => store.search(req.attachment_model, domain).await,
                (None, None) => Ok(Vec::new()),
            }
        }))
        .await;

        // a row the owner points at must load before it, even when it also
        // points back at the owner
        let mut out: BTreeMap<ZiRecordRef, ZiCandidateRecord> = BTreeMap::new();
        for (req, result) in requests.iter().zip(results) {
            match result {
                Ok(rows) => {
                    for row in rows {
                        let mut candidate = ZiCandidateRecord::new(
                            row,
                            req.bucket,
                            ZiCandidateOrigin::Attachment {
                                owner: req.rule.model.clone(),
                                pass: req.pass,
                            },
                        );
                        candidate.no_update = req.rule.no_update;
                        let key = candidate.key();
                        let previous = out.get(&key).and_then(|c| c.attachment_pass().map(|(_, pass)| pass));
                        match previous {
                            None => {
                                out.insert(key, candidate);
                            }
                            Some(pass) if pass == req.pass => {}
                            Some(_) => {
                                warnings.push(back_reference_warning(&key, &req.rule.model));
                                if req.pass == ZiAttachmentPass::Pre {
                                    out.insert(key, candidate);
                                }
                            }
                        }
                    }
                }
                Err(err) => warnings.push(store_warning(req.attachment_model, &err)),
            }
        }
        out.into_values().collect()
    }

    /// Ids of `target` rows referenced through many-to-one fields of selected
    /// `owner` rows.
    fn referenced_ids(
        &self,
        selected: &BTreeMap<ZiRecordRef, ZiCandidateRecord>,
        owner: &str,
        target: &str,
    ) -> Vec<i64> {
        let Some(schema) = self.catalog.get(owner) else {
            return Vec::new();
        };
        let fields: Vec<&str> = schema
            .relational_fields()
            .filter(|f| f.kind.relation_target() == Some(target))
            .map(|f| f.name.as_str())
            .collect();
        let mut ids = BTreeSet::new();
        for candidate in selected.values().filter(|c| c.model() == owner) {
            for field in &fields {
                if let Some(value) = candidate.record.get(field) {
                    ids.extend(value.relation_ids());
                }
            }
        }
        ids.into_iter().collect()
    }
}

fn push_unique(order: &mut Vec<String>, model: &str) {
    if !order.iter().any(|m| m == model) {
        order.push(model.to_string());
    }
}

fn store_warning(model: &str, err: &ZiStoreError) -> ZiWarning {
    let kind = match err {
        ZiStoreError::AccessDenied(_) => ZiWarningKind::AccessDenied,
        _ => ZiWarningKind::Selection,
    };
    log::warn!(
        "export.selector.store_failure: model skipped - model={}, error={}",
        model,
        err
    );
    ZiWarning::new(kind, Some(model), format!("model skipped: {}", err))
}

fn back_reference_warning(attachment: &ZiRecordRef, owner: &str) -> ZiWarning {
    log::warn!(
        "export.selector.back_reference: attachment loaded before the owner it points at - attachment={}, owner={}",
        attachment,
        owner
    );
    ZiWarning::new(
        ZiWarningKind::CircularDependency,
        Some(&attachment.model),
        format!(
            "{} is referenced by {} and points back at it; it loads before its owner, so the back reference points forward",
            attachment, owner
        ),
    )
}

fn selection_warning(model: &str, message: String) -> ZiWarning {
    log::warn!("export.selector.skip: {} - model={}", message, model);
    ZiWarning::new(ZiWarningKind::Selection, Some(model), message)
}
