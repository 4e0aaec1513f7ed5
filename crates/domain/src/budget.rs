use serde::{Deserialize, Serialize};

/// Fraction of the budget at which the one-shot warning fires.
const WARNING_THRESHOLD: f64 = 0.8;

/// Per-task budget accounting.
///
/// Owned by the workflow so replay stays deterministic: cost is only ever
/// read from activity return values, never recomputed from wall-clock
/// provider state. A final overage of at most one in-flight LLM call is
/// permitted; the workflow terminates on the first check that observes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetState {
    pub limit_usd: f64,
    pub accrued_usd: f64,
    pub warning_sent: bool,
}

impl BudgetState {
    pub fn new(limit_usd: f64) -> Self {
        Self {
            limit_usd,
            accrued_usd: 0.0,
            warning_sent: false,
        }
    }

    /// Record the cost of one completed LLM call.
    pub fn accrue(&mut self, cost: f64) {
        if cost > 0.0 {
            self.accrued_usd += cost;
        }
    }

    /// True exactly once: when accrual has crossed 80% of the limit and the
    /// warning has not yet been sent. Not raised when the budget is already
    /// exceeded (the exceeded signal supersedes it).
    pub fn should_warn(&self) -> bool {
        !self.warning_sent
            && self.limit_usd > 0.0
            && self.accrued_usd >= self.limit_usd * WARNING_THRESHOLD
            && !self.is_exceeded()
    }

    pub fn mark_warning_sent(&mut self) {
        self.warning_sent = true;
    }

    pub fn is_exceeded(&self) -> bool {
        self.accrued_usd >= self.limit_usd
    }

    pub fn remaining(&self) -> f64 {
        (self.limit_usd - self.accrued_usd).max(0.0)
    }
}
