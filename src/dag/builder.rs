//! Dependency graph construction and validation for subtask plans.
//!
//! The builder takes the subtasks of one plan and constructs a directed
//! acyclic graph keyed by subtask id. All dependencies must reference
//! subtasks within the plan, and the graph must be cycle-free.

use std::collections::HashMap;

use crate::errors::PlanningError;
use crate::subtask::Subtask;

/// Index into the subtask list, in creation order.
pub type NodeIndex = usize;

/// A directed acyclic graph over the subtasks of one plan.
#[derive(Debug)]
pub struct SubtaskGraph {
    subtasks: Vec<Subtask>,
    /// Forward edges: index -> subtasks that depend on it.
    forward_edges: Vec<Vec<NodeIndex>>,
    /// Reverse edges: index -> subtasks it depends on.
    reverse_edges: Vec<Vec<NodeIndex>>,
}

impl SubtaskGraph {
    pub fn len(&self) -> usize {
        self.subtasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subtasks.is_empty()
    }

    pub fn get(&self, index: NodeIndex) -> Option<&Subtask> {
        self.subtasks.get(index)
    }

    pub fn subtasks(&self) -> &[Subtask] {
        &self.subtasks
    }

    /// Subtasks that depend on the given subtask (forward edges).
    pub fn dependents(&self, index: NodeIndex) -> &[NodeIndex] {
        self.forward_edges.get(index).map_or(&[], |v| v.as_slice())
    }

    /// Subtasks the given subtask depends on (reverse edges).
    pub fn dependencies(&self, index: NodeIndex) -> &[NodeIndex] {
        self.reverse_edges.get(index).map_or(&[], |v| v.as_slice())
    }
}

/// Builder for subtask graphs.
pub struct GraphBuilder {
    subtasks: Vec<Subtask>,
}

impl GraphBuilder {
    pub fn new(subtasks: Vec<Subtask>) -> Self {
        Self { subtasks }
    }

    /// Build the graph, validating structure:
    /// - subtask ids must be unique
    /// - all dependencies must reference subtasks within the plan
    /// - no cycles (checked by the ordering pass in `order`)
    pub fn build(self) -> Result<SubtaskGraph, PlanningError> {
        let mut index_map = HashMap::new();
        for (i, subtask) in self.subtasks.iter().enumerate() {
            if index_map.insert(subtask.id.clone(), i).is_some() {
                return Err(PlanningError::DuplicateSubtask {
                    id: subtask.id.clone(),
                });
            }
        }

        let mut forward_edges: Vec<Vec<NodeIndex>> = vec![Vec::new(); self.subtasks.len()];
        let mut reverse_edges: Vec<Vec<NodeIndex>> = vec![Vec::new(); self.subtasks.len()];

        for (to_idx, subtask) in self.subtasks.iter().enumerate() {
            for dep in &subtask.depends_on {
                let from_idx =
                    *index_map
                        .get(dep)
                        .ok_or_else(|| PlanningError::UnknownDependency {
                            subtask: subtask.id.clone(),
                            dependency: dep.clone(),
                        })?;
                forward_edges[from_idx].push(to_idx);
                reverse_edges[to_idx].push(from_idx);
            }
        }

        Ok(SubtaskGraph {
            subtasks: self.subtasks,
            forward_edges,
            reverse_edges,
        })
    }
}
