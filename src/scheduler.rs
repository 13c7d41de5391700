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

//! # Topological Scheduler Module
//!
//! Orders the models of one bucket so that every model loads after the
//! models it depends on.
//!
//! The traversal is a depth-first search in node insertion order where each
//! node moves from `Unvisited` to `Visiting` to `Done`. Meeting a `Visiting`
//! node closes a cycle: its path is recorded and that back-edge is treated as
//! satisfied. Scheduling therefore never fails; a cyclic graph yields a valid
//! but non-minimal order plus one [`ZiCycle`] per distinct cycle.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::{ZiWarning, ZiWarningKind};
use crate::graph::{ZiModelGraph, ZiNodeId};
use crate::record::ZiBucket;

const CYCLE_HINT: &str =
    "(you may have to change data loading order to avoid issues when importing)";

/// Closed dependency path between models of one bucket.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZiCycle {
    pub bucket: ZiBucket,
    /// Models in traversal order; the first model is not repeated at the end.
    pub models: Vec<String>,
}

impl ZiCycle {
    /// `a -> b -> c -> a`
    pub fn path(&self) -> String {
        let mut parts: Vec<&str> = self.models.iter().map(String::as_str).collect();
        if let Some(first) = self.models.first() {
            parts.push(first);
        }
        parts.join(" -> ")
    }

    /// Whether `from -> to` is one of the cycle's edges.
    pub fn contains_edge(&self, from: &str, to: &str) -> bool {
        let n = self.models.len();
        (0..n).any(|i| self.models[i] == from && self.models[(i + 1) % n] == to)
    }

    /// Line written to `warnings.txt`.
    pub fn warning_line(&self) -> String {
        format!(
            "Found {} circular dependencies {}: {}",
            self.models.len(),
            CYCLE_HINT,
            self.path()
        )
    }

    pub fn to_warning(&self) -> ZiWarning {
        ZiWarning::new(
            ZiWarningKind::CircularDependency,
            self.models.first().map(String::as_str),
            self.warning_line(),
        )
    }
}

impl fmt::Display for ZiCycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.bucket.as_str(), self.path())
    }
}

/// Load order of one bucket.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZiSchedule {
    pub bucket: ZiBucket,
    pub order: Vec<String>,
    pub cycles: Vec<ZiCycle>,
}

impl ZiSchedule {
    pub fn position(&self, model: &str) -> Option<usize> {
        self.order.iter().position(|m| m == model)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum VisitState {
    Unvisited,
    Visiting,
    Done,
}

/// Depth-first scheduler over a [`ZiModelGraph`].
#[derive(Clone, Copy, Debug, Default)]
pub struct ZiTopologicalScheduler;

impl ZiTopologicalScheduler {
    pub fn new() -> Self {
        Self
    }

    pub fn schedule(&self, graph: &ZiModelGraph, bucket: ZiBucket) -> ZiSchedule {
        let n = graph.len();
        let mut state = vec![VisitState::Unvisited; n];
        let mut order = Vec::with_capacity(n);
        let mut cycles = Vec::new();
        let mut seen_cycles: HashSet<Vec<ZiNodeId>> = HashSet::new();

        for root in 0..n {
            if state[root] != VisitState::Unvisited {
                continue;
            }
            // frames of (node, index of the next dependency to try)
            let mut stack: Vec<(ZiNodeId, usize)> = vec![(ZiNodeId(root), 0)];
            state[root] = VisitState::Visiting;

            while let Some(frame) = stack.last_mut() {
                let (node, next) = *frame;
                let deps = sorted_dependencies(graph, node);
                if next >= deps.len() {
                    state[node.0] = VisitState::Done;
                    order.push(graph.model(node).to_string());
                    stack.pop();
                    continue;
                }
                frame.1 += 1;
                let dep = deps[next];
                match state[dep.0] {
                    VisitState::Done => {}
                    VisitState::Unvisited => {
                        state[dep.0] = VisitState::Visiting;
                        stack.push((dep, 0));
                    }
                    VisitState::Visiting => {
                        let start = stack.iter().position(|(id, _)| *id == dep).unwrap_or(0);
                        let path: Vec<ZiNodeId> = stack[start..].iter().map(|(id, _)| *id).collect();
                        if seen_cycles.insert(canonical(&path)) {
                            let cycle = ZiCycle {
                                bucket,
                                models: path.iter().map(|id| graph.model(*id).to_string()).collect(),
                            };
                            log::warn!(
                                "export.scheduler.cycle: circular dependency - bucket={}, path={}",
                                bucket.as_str(),
                                cycle.path()
                            );
                            cycles.push(cycle);
                        }
                    }
                }
            }
        }

        log::info!(
            "export.scheduler.done: bucket scheduled - bucket={}, models={}, cycles={}",
            bucket.as_str(),
            order.len(),
            cycles.len()
        );
        ZiSchedule {
            bucket,
            order,
            cycles,
        }
    }
}

/// Dependencies in node order, which is configuration order.
fn sorted_dependencies(graph: &ZiModelGraph, node: ZiNodeId) -> Vec<ZiNodeId> {
    let mut deps = graph.dependencies(node).to_vec();
    deps.sort();
    deps
}

/// Rotation of a cycle that starts at its smallest node.
fn canonical(path: &[ZiNodeId]) -> Vec<ZiNodeId> {
    let start = path
        .iter()
        .enumerate()
        .min_by_key(|(_, id)| **id)
        .map(|(i, _)| i)
        .unwrap_or(0);
    path[start..].iter().chain(path[..start].iter()).copied().collect()
}
