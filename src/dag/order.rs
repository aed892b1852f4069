//! Priority-aware topological ordering.
//!
//! Kahn's algorithm over the subtask graph, with the ready set kept as a
//! max-heap on priority. Ties break by creation order so the result is
//! deterministic for identical inputs.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::dag::builder::{NodeIndex, SubtaskGraph};
use crate::errors::PlanningError;

/// Compute a dependency-feasible execution order over the graph.
///
/// Returns subtask ids. Every dependency precedes its dependents; among ready
/// subtasks the highest priority runs first. If the graph contains a cycle,
/// fails naming the subtasks left unordered — they are exactly the cycle
/// members and their downstream dependents.
pub fn execution_order(graph: &SubtaskGraph) -> Result<Vec<String>, PlanningError> {
    let mut in_degree: Vec<usize> = (0..graph.len()).map(|i| graph.dependencies(i).len()).collect();

    // Max-heap on (priority, Reverse(creation index)).
    let mut ready: BinaryHeap<(u8, Reverse<NodeIndex>)> = in_degree
        .iter()
        .enumerate()
        .filter(|&(_, deg)| *deg == 0)
        .map(|(i, _)| (graph.subtasks()[i].priority, Reverse(i)))
        .collect();

    let mut order = Vec::with_capacity(graph.len());

    while let Some((_, Reverse(node))) = ready.pop() {
        order.push(graph.subtasks()[node].id.clone());

        for &dependent in graph.dependents(node) {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                ready.push((graph.subtasks()[dependent].priority, Reverse(dependent)));
            }
        }
    }

    if order.len() != graph.len() {
        let ids: Vec<String> = in_degree
            .iter()
            .enumerate()
            .filter(|&(_, deg)| *deg > 0)
            .filter_map(|(i, _)| graph.get(i).map(|s| s.id.clone()))
            .collect();
        return Err(PlanningError::CyclicDependencies { ids });
    }

    Ok(order)
}
