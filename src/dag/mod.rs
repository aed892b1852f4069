//! Subtask dependency graph and execution ordering.
//!
//! This module turns the subtasks of one plan into a directed acyclic graph
//! and computes the order the supervisor walks during execution.
//!
//! Two components:
//!
//! 1. **Builder** — constructs and validates the graph (unique ids, known
//!    dependencies)
//! 2. **Order** — priority-aware topological sort producing `execution_order`
//!
//! Cycles are fatal: ordering fails naming the unorderable subtask ids rather
//! than silently dropping them.

mod builder;
mod order;

pub use builder::{GraphBuilder, NodeIndex, SubtaskGraph};
pub use order::execution_order;
