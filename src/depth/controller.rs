//! Adaptive effort-tier control loop.
//!
//! The depth controller decides how much effort an iterative research step
//! should spend: it assigns a discrete depth level (shallow through
//! exhaustive), re-evaluates it as evidence metrics accumulate, and says when
//! to stop iterating. The only external input is a budget tracker read once
//! per metrics update.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::depth::budget::BudgetTracker;

/// Discrete effort tier bounding how many iterations a research step may
/// consume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepthLevel {
    Shallow,
    Moderate,
    Deep,
    Exhaustive,
}

impl DepthLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Shallow => "shallow",
            Self::Moderate => "moderate",
            Self::Deep => "deep",
            Self::Exhaustive => "exhaustive",
        }
    }

    /// The next tier up, if any.
    pub fn step_up(&self) -> Option<Self> {
        match self {
            Self::Shallow => Some(Self::Moderate),
            Self::Moderate => Some(Self::Deep),
            Self::Deep => Some(Self::Exhaustive),
            Self::Exhaustive => None,
        }
    }

    /// The next tier down, if any.
    pub fn step_down(&self) -> Option<Self> {
        match self {
            Self::Shallow => None,
            Self::Moderate => Some(Self::Shallow),
            Self::Deep => Some(Self::Moderate),
            Self::Exhaustive => Some(Self::Deep),
        }
    }
}

impl FromStr for DepthLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "shallow" => Ok(Self::Shallow),
            "moderate" => Ok(Self::Moderate),
            "deep" => Ok(Self::Deep),
            "exhaustive" => Ok(Self::Exhaustive),
            _ => Err(format!("Invalid depth level: {}", s)),
        }
    }
}

/// Inclusive iteration range for one depth level.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IterationRange {
    pub min: u32,
    pub max: u32,
}

/// Configuration for the depth controller: per-level iteration ranges and the
/// metric thresholds driving adjustment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepthConfig {
    pub shallow: IterationRange,
    pub moderate: IterationRange,
    pub deep: IterationRange,
    pub exhaustive: IterationRange,
    /// Confidence at which searching harder stops paying off.
    pub high_confidence: f64,
    /// Coverage that, with high confidence, means we are done.
    pub coverage_target: f64,
    /// Confidence below which escalation is considered.
    pub low_confidence: f64,
    /// Coverage below which escalation is considered.
    pub low_coverage: f64,
    /// Budget ratio under which depth is forced down to shallow.
    pub budget_downgrade: f64,
    /// Budget ratio that must remain before stepping up a tier.
    pub budget_step_up_floor: f64,
    /// Hard budget floor: below this, stop outright.
    pub budget_floor: f64,
    /// Early-success confidence threshold.
    pub early_confidence: f64,
    /// Early-success coverage threshold.
    pub early_coverage: f64,
}

impl Default for DepthConfig {
    fn default() -> Self {
        Self {
            shallow: IterationRange { min: 1, max: 2 },
            moderate: IterationRange { min: 3, max: 5 },
            deep: IterationRange { min: 5, max: 10 },
            exhaustive: IterationRange { min: 10, max: 20 },
            high_confidence: 0.85,
            coverage_target: 0.7,
            low_confidence: 0.3,
            low_coverage: 0.4,
            budget_downgrade: 0.2,
            budget_step_up_floor: 0.5,
            budget_floor: 0.1,
            early_confidence: 0.9,
            early_coverage: 0.8,
        }
    }
}

impl DepthConfig {
    /// Iteration range for a level.
    pub fn range(&self, level: DepthLevel) -> IterationRange {
        match level {
            DepthLevel::Shallow => self.shallow,
            DepthLevel::Moderate => self.moderate,
            DepthLevel::Deep => self.deep,
            DepthLevel::Exhaustive => self.exhaustive,
        }
    }

    /// Override one level's iteration range.
    pub fn with_range(mut self, level: DepthLevel, min: u32, max: u32) -> Self {
        let range = IterationRange { min, max };
        match level {
            DepthLevel::Shallow => self.shallow = range,
            DepthLevel::Moderate => self.moderate = range,
            DepthLevel::Deep => self.deep = range,
            DepthLevel::Exhaustive => self.exhaustive = range,
        }
        self
    }

    /// Override the hard budget floor.
    pub fn with_budget_floor(mut self, floor: f64) -> Self {
        self.budget_floor = floor;
        self
    }

    /// Override the early-success thresholds.
    pub fn with_early_success(mut self, confidence: f64, coverage: f64) -> Self {
        self.early_confidence = confidence;
        self.early_coverage = coverage;
        self
    }
}

/// One recorded level change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepthTransition {
    pub from: DepthLevel,
    pub to: DepthLevel,
    pub reason: String,
    pub at_iteration: u32,
    pub at: DateTime<Utc>,
}

/// Accumulated signal for one iterative research step.
///
/// Owned by the caller; the controller is a transformer over it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepthState {
    pub current_level: DepthLevel,
    pub current_iteration: u32,
    pub max_iterations: u32,
    /// Caller-supplied scores, all clamped to [0, 1].
    pub complexity: f64,
    pub coverage: f64,
    pub confidence: f64,
    pub diversity: f64,
    /// remaining/initial budget, clamped to [0, 1].
    pub budget_ratio: f64,
    pub history: Vec<DepthTransition>,
}

impl DepthState {
    pub fn cap_reached(&self) -> bool {
        self.current_iteration >= self.max_iterations
    }
}

/// The controller's verdict for the current iteration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepthAdjustment {
    pub should_adjust: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_level: Option<DepthLevel>,
    pub reason: String,
    /// Whether the caller should run another iteration.
    pub proceed: bool,
}

impl DepthAdjustment {
    fn hold(reason: &str, proceed: bool) -> Self {
        Self {
            should_adjust: false,
            new_level: None,
            reason: reason.to_string(),
            proceed,
        }
    }

    fn change(new_level: DepthLevel, reason: &str, proceed: bool) -> Self {
        Self {
            should_adjust: true,
            new_level: Some(new_level),
            reason: reason.to_string(),
            proceed,
        }
    }
}

/// Decides effort tier and continuation for an iterative research step.
pub struct DepthController {
    config: DepthConfig,
    budget: Arc<dyn BudgetTracker>,
}

impl DepthController {
    pub fn new(config: DepthConfig, budget: Arc<dyn BudgetTracker>) -> Self {
        Self { config, budget }
    }

    pub fn config(&self) -> &DepthConfig {
        &self.config
    }

    /// Create depth state for a new research step.
    ///
    /// Without an explicit level, complexity picks it: below 0.25 shallow,
    /// below 0.5 moderate, below 0.75 deep, otherwise exhaustive.
    pub fn initialize_state(&self, complexity: f64, initial_level: Option<DepthLevel>) -> DepthState {
        let complexity = complexity.clamp(0.0, 1.0);
        let level = initial_level.unwrap_or(if complexity < 0.25 {
            DepthLevel::Shallow
        } else if complexity < 0.5 {
            DepthLevel::Moderate
        } else if complexity < 0.75 {
            DepthLevel::Deep
        } else {
            DepthLevel::Exhaustive
        });

        DepthState {
            current_level: level,
            current_iteration: 0,
            max_iterations: self.config.range(level).max,
            complexity,
            coverage: 0.0,
            confidence: 0.0,
            diversity: 0.0,
            budget_ratio: 1.0,
            history: Vec::new(),
        }
    }

    /// Overwrite the provided metrics (others keep their prior value) and
    /// refresh `budget_ratio` from the tracker.
    pub async fn update_metrics(
        &self,
        state: &mut DepthState,
        coverage: Option<f64>,
        confidence: Option<f64>,
        diversity: Option<f64>,
    ) {
        if let Some(coverage) = coverage {
            state.coverage = coverage.clamp(0.0, 1.0);
        }
        if let Some(confidence) = confidence {
            state.confidence = confidence.clamp(0.0, 1.0);
        }
        if let Some(diversity) = diversity {
            state.diversity = diversity.clamp(0.0, 1.0);
        }
        state.budget_ratio = self.budget.ratio().await;
    }

    /// Evaluate whether the effort tier should change, first match wins:
    ///
    /// 1. iteration cap reached — stop
    /// 2. budget nearly gone — force shallow (the one rule allowed to skip
    ///    tiers), at most two total iterations
    /// 3. confident: enough coverage means stop, otherwise ease down a tier
    /// 4. weak signal with budget to spare — escalate a tier
    /// 5. hold
    pub fn evaluate_adjustment(&self, state: &DepthState) -> DepthAdjustment {
        let cfg = &self.config;

        if state.cap_reached() {
            return DepthAdjustment::hold("iteration cap reached", false);
        }

        if state.budget_ratio < cfg.budget_downgrade {
            if state.current_level != DepthLevel::Shallow {
                return DepthAdjustment::change(
                    DepthLevel::Shallow,
                    "budget nearly exhausted, dropping to shallow",
                    state.current_iteration < 2,
                );
            }
            return DepthAdjustment::hold("budget nearly exhausted at shallow", false);
        }

        if state.confidence >= cfg.high_confidence {
            if state.coverage >= cfg.coverage_target {
                return DepthAdjustment::hold("confident with sufficient coverage", false);
            }
            if let Some(lower) = state.current_level.step_down() {
                return DepthAdjustment::change(
                    lower,
                    "confident but coverage thin, easing down one tier",
                    true,
                );
            }
            return DepthAdjustment::hold("confident at shallow, widening coverage", true);
        }

        if (state.confidence < cfg.low_confidence || state.coverage < cfg.low_coverage)
            && state.budget_ratio > cfg.budget_step_up_floor
        {
            if let Some(higher) = state.current_level.step_up() {
                return DepthAdjustment::change(
                    higher,
                    "weak signal with budget to spare, escalating one tier",
                    true,
                );
            }
            return DepthAdjustment::hold("weak signal but already exhaustive", true);
        }

        DepthAdjustment::hold("metrics within band", true)
    }

    /// Apply a recommended adjustment, recording the transition.
    ///
    /// After any level change at least one more iteration is guaranteed:
    /// the cap becomes `max(current_iteration + 1, configured max)`.
    pub fn apply_adjustment(&self, state: &mut DepthState, adjustment: &DepthAdjustment) {
        if !adjustment.should_adjust {
            return;
        }
        let Some(new_level) = adjustment.new_level else {
            return;
        };

        debug!(
            from = state.current_level.as_str(),
            to = new_level.as_str(),
            reason = %adjustment.reason,
            "depth level change"
        );
        state.history.push(DepthTransition {
            from: state.current_level,
            to: new_level,
            reason: adjustment.reason.clone(),
            at_iteration: state.current_iteration,
            at: Utc::now(),
        });
        state.current_level = new_level;
        state.max_iterations = (state.current_iteration + 1).max(self.config.range(new_level).max);
    }

    /// Whether another iteration is worth running at all.
    ///
    /// False once the cap is hit, the budget falls under the hard floor, or
    /// confidence and coverage both clear the early-success bar.
    pub fn should_continue(&self, state: &DepthState) -> bool {
        if state.cap_reached() {
            return false;
        }
        if state.budget_ratio < self.config.budget_floor {
            return false;
        }
        if state.confidence >= self.config.early_confidence
            && state.coverage >= self.config.early_coverage
        {
            return false;
        }
        true
    }

    pub fn increment_iteration(&self, state: &mut DepthState) {
        state.current_iteration += 1;
    }
}
