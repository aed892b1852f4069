//! Pluggable objective decomposition.
//!
//! A `Planner` turns a free-form research objective into a list of subtask
//! specs with index-based dependencies. A production planner is typically an
//! LLM call that answers in JSON; `PlanResponse::parse` tolerates the usual
//! markdown wrapping around that JSON.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::subtask::{MAX_PRIORITY, MIN_PRIORITY};

/// One subtask produced by decomposition, before ids are assigned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtaskSpec {
    pub objective: String,
    #[serde(default = "default_subtask_type")]
    pub subtask_type: String,
    #[serde(default = "default_priority")]
    pub priority: u8,
    /// 0-based indices into the spec list.
    #[serde(default)]
    pub depends_on: Vec<usize>,
}

fn default_subtask_type() -> String {
    "research".to_string()
}

fn default_priority() -> u8 {
    5
}

impl SubtaskSpec {
    pub fn new(objective: &str, subtask_type: &str, priority: u8) -> Self {
        Self {
            objective: objective.to_string(),
            subtask_type: subtask_type.to_string(),
            priority: priority.clamp(MIN_PRIORITY, MAX_PRIORITY),
            depends_on: Vec::new(),
        }
    }

    pub fn with_depends_on(mut self, deps: Vec<usize>) -> Self {
        self.depends_on = deps;
        self
    }
}

/// Full decomposition response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanResponse {
    #[serde(default)]
    pub reasoning: String,
    pub subtasks: Vec<SubtaskSpec>,
}

impl PlanResponse {
    /// Parse a planner response, extracting JSON from markdown code blocks
    /// if present.
    pub fn parse(raw: &str) -> Result<Self> {
        let cleaned = if let Some(start) = raw.find('{') {
            if let Some(end) = raw.rfind('}') {
                &raw[start..=end]
            } else {
                raw
            }
        } else {
            raw
        };
        serde_json::from_str(cleaned).context("Failed to parse planner response as JSON")
    }

    /// Degenerate decomposition: the whole objective as a single subtask.
    pub fn fallback(objective: &str) -> Self {
        Self {
            reasoning: "Fallback: running objective as a single research subtask".to_string(),
            subtasks: vec![SubtaskSpec::new(objective, "research", 5)],
        }
    }
}

/// Decomposes an objective into subtask specs.
#[async_trait]
pub trait Planner: Send + Sync {
    async fn decompose(&self, objective: &str) -> Result<PlanResponse>;
}

/// Planner that returns a fixed response regardless of objective.
///
/// Used when the caller has already decomposed the work, and as a test double.
pub struct StaticPlanner {
    response: PlanResponse,
}

impl StaticPlanner {
    pub fn new(response: PlanResponse) -> Self {
        Self { response }
    }

    /// A planner that falls back to single-subtask decomposition.
    pub fn single_step() -> Self {
        Self {
            response: PlanResponse {
                reasoning: String::new(),
                subtasks: Vec::new(),
            },
        }
    }
}

#[async_trait]
impl Planner for StaticPlanner {
    async fn decompose(&self, objective: &str) -> Result<PlanResponse> {
        if self.response.subtasks.is_empty() {
            return Ok(PlanResponse::fallback(objective));
        }
        Ok(self.response.clone())
    }
}
