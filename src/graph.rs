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

//! Model dependency graph of one bucket.
//!
//! Nodes are models, addressed by arena indices assigned in insertion order.
//! An edge `a -> b` means some selected row of `a` points at a selected row of
//! `b` through a many-to-one or many-to-many field, so `b` must load first.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::metadata::{ZiFieldKind, ZiSchemaCatalog};
use crate::record::{ZiCandidateRecord, ZiRecordRef};

/// Arena index of a model node.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ZiNodeId(pub usize);

impl fmt::Display for ZiNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ZiModelNode {
    pub id: ZiNodeId,
    pub model: String,
    /// Models this one depends on, in order of discovery.
    pub dependencies: Vec<ZiNodeId>,
    /// Rows of this model point at other rows of the same model.
    pub self_referencing: bool,
}

#[derive(Clone, Debug, Default)]
pub struct ZiModelGraph {
    nodes: Vec<ZiModelNode>,
    index: HashMap<String, ZiNodeId>,
}

impl ZiModelGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `model` if absent and returns its id.
    pub fn add_model(&mut self, model: &str) -> ZiNodeId {
        if let Some(id) = self.index.get(model) {
            return *id;
        }
        let id = ZiNodeId(self.nodes.len());
        self.nodes.push(ZiModelNode {
            id,
            model: model.to_string(),
            dependencies: Vec::new(),
            self_referencing: false,
        });
        self.index.insert(model.to_string(), id);
        id
    }

    /// Records that `from` depends on `to`. Duplicates are ignored and
    /// self-references only set the node flag.
    pub fn add_dependency(&mut self, from: ZiNodeId, to: ZiNodeId) {
        let Some(node) = self.nodes.get_mut(from.0) else {
            return;
        };
        if from == to {
            node.self_referencing = true;
        } else if to.0 < self.index.len() && !node.dependencies.contains(&to) {
            node.dependencies.push(to);
        }
    }

    pub fn id_of(&self, model: &str) -> Option<ZiNodeId> {
        self.index.get(model).copied()
    }

    pub fn node(&self, id: ZiNodeId) -> Option<&ZiModelNode> {
        self.nodes.get(id.0)
    }

    pub fn model(&self, id: ZiNodeId) -> &str {
        self.nodes.get(id.0).map(|n| n.model.as_str()).unwrap_or("")
    }

    pub fn nodes(&self) -> &[ZiModelNode] {
        &self.nodes
    }

    pub fn dependencies(&self, id: ZiNodeId) -> &[ZiNodeId] {
        self.nodes
            .get(id.0)
            .map(|n| n.dependencies.as_slice())
            .unwrap_or(&[])
    }

    pub fn depends_on(&self, from: &str, to: &str) -> bool {
        match (self.id_of(from), self.id_of(to)) {
            (Some(f), Some(t)) => self.dependencies(f).contains(&t),
            _ => false,
        }
    }

    pub fn is_self_referencing(&self, model: &str) -> bool {
        self.id_of(model)
            .and_then(|id| self.node(id))
            .map(|n| n.self_referencing)
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.nodes.iter().map(|n| n.dependencies.len()).sum()
    }

    /// Builds the graph of the given rows.
    ///
    /// `model_order` fixes node insertion order; models of `candidates` not
    /// listed there are appended in order of first appearance. Attachment
    /// pass rows are placed next to their owner and take no part here.
    pub fn build<'a, I>(model_order: &[String], candidates: I, catalog: &ZiSchemaCatalog) -> Self
    where
        I: IntoIterator<Item = &'a ZiCandidateRecord>,
    {
        let rows: Vec<&ZiCandidateRecord> = candidates
            .into_iter()
            .filter(|c| c.attachment_pass().is_none())
            .collect();
        let present: HashSet<ZiRecordRef> = rows.iter().map(|c| c.key()).collect();
        let models: HashSet<&str> = rows.iter().map(|c| c.model()).collect();

        let mut graph = Self::new();
        for model in model_order {
            if models.contains(model.as_str()) {
                graph.add_model(model);
            }
        }
        for row in &rows {
            graph.add_model(row.model());
        }

        for row in &rows {
            let Some(schema) = catalog.get(row.model()) else {
                continue;
            };
            let from = graph.add_model(row.model());
            for field in schema.relational_fields() {
                if row.excluded_fields.contains(&field.name) {
                    continue;
                }
                // only the many side owns a relation
                if matches!(field.kind, ZiFieldKind::OneToMany { .. }) {
                    continue;
                }
                let Some(target) = field.kind.relation_target() else {
                    continue;
                };
                let Some(to) = graph.id_of(target) else {
                    continue;
                };
                let Some(value) = row.record.get(&field.name) else {
                    continue;
                };
                let exercised = value
                    .relation_ids()
                    .into_iter()
                    .any(|id| present.contains(&ZiRecordRef::new(target, id)));
                if exercised {
                    graph.add_dependency(from, to);
                }
            }
        }

        log::debug!(
            "export.graph.build: graph built - models={}, edges={}",
            graph.len(),
            graph.edge_count()
        );
        graph
    }
}
