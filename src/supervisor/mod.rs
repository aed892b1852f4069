//! Run orchestration.
//!
//! This module provides:
//! - `Supervisor` — plans objectives and drives subtask execution
//! - `SubtaskHandler` / `HandlerRegistry` — pluggable dispatch by type tag
//! - `RunState` — the checkpointable state of one run
//! - `SupervisorEvent` — progress events over an mpsc channel

pub mod handler;
pub mod runner;
pub mod state;

pub use handler::{GenericHandler, HandlerContext, HandlerRegistry, SubtaskHandler};
pub use runner::{Supervisor, SupervisorConfig, SupervisorEvent};
pub use state::RunState;
