//! Resource budget accounting for the depth controller.
//!
//! The controller only ever reads `remaining / initial`; what a unit means
//! (typically LLM tokens) is the embedder's business.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

/// Exposes the remaining and initial resource units of a consumable budget.
#[async_trait]
pub trait BudgetTracker: Send + Sync {
    async fn initial(&self) -> u64;
    async fn remaining(&self) -> u64;

    /// remaining / initial, clamped to [0, 1]. An empty initial budget reads
    /// as fully spent.
    async fn ratio(&self) -> f64 {
        let initial = self.initial().await;
        if initial == 0 {
            return 0.0;
        }
        (self.remaining().await as f64 / initial as f64).clamp(0.0, 1.0)
    }
}

/// Atomic token budget: a fixed initial allowance consumed over time.
///
/// Cheap to clone and share across handlers; consumption saturates at zero.
#[derive(Clone)]
pub struct TokenBudget {
    initial: u64,
    spent: Arc<AtomicU64>,
}

impl TokenBudget {
    pub fn new(initial: u64) -> Self {
        Self {
            initial,
            spent: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Record consumption of `units`. Over-consumption pins remaining at 0.
    pub fn consume(&self, units: u64) {
        self.spent.fetch_add(units, Ordering::Relaxed);
    }
}

#[async_trait]
impl BudgetTracker for TokenBudget {
    async fn initial(&self) -> u64 {
        self.initial
    }

    async fn remaining(&self) -> u64 {
        self.initial
            .saturating_sub(self.spent.load(Ordering::Relaxed))
    }
}
