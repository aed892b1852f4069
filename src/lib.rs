pub mod checkpoint;
pub mod dag;
pub mod depth;
pub mod errors;
pub mod logging;
pub mod planner;
pub mod subtask;
pub mod supervisor;

pub use checkpoint::{Checkpoint, CheckpointManager, CheckpointStore, MemoryStore, SqliteStore};
pub use depth::{DepthConfig, DepthController, DepthLevel, TokenBudget};
pub use errors::{CheckpointError, HandlerError, PlanningError};
pub use planner::{Planner, PlanResponse, StaticPlanner, SubtaskSpec};
pub use subtask::{Plan, Subtask, SubtaskStatus, Task};
pub use supervisor::{
    GenericHandler, HandlerContext, RunState, SubtaskHandler, Supervisor, SupervisorConfig,
    SupervisorEvent,
};
