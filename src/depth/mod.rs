//! Adaptive research depth control.
//!
//! Handlers that embed an iterative research step consult this module to
//! decide how hard to work: the controller assigns a depth level from the
//! step's complexity, adjusts it as coverage/confidence metrics come in, and
//! calls the stop once the budget or the evidence says so.

mod budget;
mod controller;

pub use budget::{BudgetTracker, TokenBudget};
pub use controller::{
    DepthAdjustment, DepthConfig, DepthController, DepthLevel, DepthState, DepthTransition,
    IterationRange,
};
