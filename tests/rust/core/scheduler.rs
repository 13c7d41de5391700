//! Copyright © 2025-2026 Wenze Wei. All Rights Reserved.
//!
//! This file is part of Zi.
//! The Zi project belongs to the Dunimd project team.

use proptest::prelude::*;
use zimod::{ZiBucket, ZiModelGraph, ZiTopologicalScheduler};

fn graph(models: &[&str], edges: &[(&str, &str)]) -> ZiModelGraph {
    let mut graph = ZiModelGraph::new();
    for model in models {
        graph.add_model(model);
    }
    for (from, to) in edges {
        let from = graph.add_model(from);
        let to = graph.add_model(to);
        graph.add_dependency(from, to);
    }
    graph
}

#[test]
fn test_scheduler_orders_chain() {
    let g = graph(&["a", "b", "c"], &[("a", "b"), ("b", "c")]);
    let schedule = ZiTopologicalScheduler::new().schedule(&g, ZiBucket::Data);
    assert_eq!(schedule.order, vec!["c", "b", "a"]);
    assert!(schedule.cycles.is_empty());
}

#[test]
fn test_scheduler_ties_follow_insertion_order() {
    // both b and c are ready once a is reached; b was configured first
    let g = graph(&["a", "b", "c"], &[("a", "c"), ("a", "b")]);
    let schedule = ZiTopologicalScheduler::new().schedule(&g, ZiBucket::Data);
    assert_eq!(schedule.order, vec!["b", "c", "a"]);
}

#[test]
fn test_scheduler_self_reference_is_not_a_cycle() {
    let g = graph(&["a"], &[("a", "a")]);
    let schedule = ZiTopologicalScheduler::new().schedule(&g, ZiBucket::Data);
    assert_eq!(schedule.order, vec!["a"]);
    assert!(schedule.cycles.is_empty());
    assert!(g.is_self_referencing("a"));
}

#[test]
fn test_scheduler_reports_distinct_cycles() {
    let g = graph(
        &["a", "b", "c", "d"],
        &[("a", "b"), ("b", "a"), ("c", "d"), ("d", "c"), ("b", "c")],
    );
    let schedule = ZiTopologicalScheduler::new().schedule(&g, ZiBucket::Demo);
    assert_eq!(schedule.order.len(), 4);
    let paths: Vec<String> = schedule.cycles.iter().map(|c| c.path()).collect();
    assert_eq!(paths, vec!["a -> b -> a", "c -> d -> c"]);
    assert!(schedule.cycles.iter().all(|c| c.bucket == ZiBucket::Demo));
}

#[test]
fn test_scheduler_same_cycle_from_two_entries_is_reported_once() {
    let g = graph(&["x", "a", "b"], &[("x", "b"), ("a", "b"), ("b", "a")]);
    let schedule = ZiTopologicalScheduler::new().schedule(&g, ZiBucket::Data);
    assert_eq!(schedule.cycles.len(), 1);
}

fn arbitrary_graph() -> impl Strategy<Value = (usize, Vec<(usize, usize)>)> {
    (1usize..8).prop_flat_map(|n| (Just(n), prop::collection::vec((0..n, 0..n), 0..20)))
}

fn build(n: usize, edges: &[(usize, usize)]) -> ZiModelGraph {
    let mut g = ZiModelGraph::new();
    let ids: Vec<_> = (0..n).map(|i| g.add_model(&format!("m{}", i))).collect();
    for (from, to) in edges {
        g.add_dependency(ids[*from], ids[*to]);
    }
    g
}

proptest! {
    #[test]
    fn test_scheduler_respects_every_edge_outside_cycles((n, edges) in arbitrary_graph()) {
        let g = build(n, &edges);
        let schedule = ZiTopologicalScheduler::new().schedule(&g, ZiBucket::Data);
        prop_assert_eq!(schedule.order.len(), n);
        for (from, to) in &edges {
            if from == to {
                continue;
            }
            let (from, to) = (format!("m{}", from), format!("m{}", to));
            let in_cycle = schedule.cycles.iter().any(|c| c.contains_edge(&from, &to));
            let respected = schedule.position(&to) < schedule.position(&from);
            prop_assert!(respected || in_cycle, "edge {} -> {} violated", from, to);
        }
    }

    #[test]
    fn test_scheduler_is_deterministic((n, edges) in arbitrary_graph()) {
        let first = ZiTopologicalScheduler::new().schedule(&build(n, &edges), ZiBucket::Data);
        let second = ZiTopologicalScheduler::new().schedule(&build(n, &edges), ZiBucket::Data);
        prop_assert_eq!(first, second);
    }
}
