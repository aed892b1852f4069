//! Handler dispatch for subtask execution.
//!
//! Handlers are keyed by subtask type tag in an open registry so new agent
//! types can be plugged in at runtime. Types with no registration fall back
//! to the generic handler.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::HandlerError;
use crate::subtask::Subtask;

/// What a handler gets to see besides its own subtask.
#[derive(Debug, Clone, Default)]
pub struct HandlerContext {
    /// The run's top-level objective.
    pub objective: String,
    /// Opaque auxiliary run context.
    pub context: serde_json::Map<String, Value>,
    /// Results of already-completed subtasks, keyed by subtask id.
    pub completed_results: HashMap<String, Value>,
}

/// Executes one subtask.
///
/// Abstraction over subtask execution for testability: real implementations
/// call out to LLMs and retrieval tools; tests use closures and fakes.
#[async_trait]
pub trait SubtaskHandler: Send + Sync {
    /// Name recorded on the subtask at dispatch time.
    fn name(&self) -> &str;

    async fn handle(
        &self,
        subtask: &Subtask,
        context: &HandlerContext,
    ) -> Result<Value, HandlerError>;
}

/// Fallback handler for subtask types nobody registered.
///
/// Echoes what it was asked so the result is still inspectable downstream;
/// embedding applications replace it via `set_fallback`.
pub struct GenericHandler;

#[async_trait]
impl SubtaskHandler for GenericHandler {
    fn name(&self) -> &str {
        "generic"
    }

    async fn handle(
        &self,
        subtask: &Subtask,
        _context: &HandlerContext,
    ) -> Result<Value, HandlerError> {
        Ok(serde_json::json!({
            "handler": "generic",
            "subtask_type": subtask.subtask_type,
            "objective": subtask.objective,
        }))
    }
}

/// Type-tag-keyed handler registry with a default fallback.
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn SubtaskHandler>>,
    fallback: Arc<dyn SubtaskHandler>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            fallback: Arc::new(GenericHandler),
        }
    }

    /// Register a handler for a type tag. The last registration per tag wins.
    pub fn register(&mut self, subtask_type: &str, handler: Arc<dyn SubtaskHandler>) {
        self.handlers.insert(subtask_type.to_string(), handler);
    }

    /// Replace the fallback used for unregistered tags.
    pub fn set_fallback(&mut self, handler: Arc<dyn SubtaskHandler>) {
        self.fallback = handler;
    }

    /// The handler for a type tag, or the fallback.
    pub fn resolve(&self, subtask_type: &str) -> Arc<dyn SubtaskHandler> {
        self.handlers
            .get(subtask_type)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
