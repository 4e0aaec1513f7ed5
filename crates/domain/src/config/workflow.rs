use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Workflow execution limits
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Iterations granted when the submission does not ask for a count.
    #[serde(default = "d_25")]
    pub default_max_iterations: u32,
    /// Absolute ceiling a submission can never exceed.
    #[serde(default = "d_50")]
    pub hard_iteration_cap: u32,
    /// Start-to-close timeout for one LLM call.
    #[serde(default = "d_300")]
    pub llm_timeout_secs: u64,
    /// Start-to-close timeout for one tool invocation.
    #[serde(default = "d_60")]
    pub tool_timeout_secs: u64,
    /// Timeout for agent-config build and tool discovery.
    #[serde(default = "d_30")]
    pub discovery_timeout_secs: u64,
    /// Whole-execution deadline; elapsing it fails the workflow.
    #[serde(default = "d_3600")]
    pub execution_timeout_secs: u64,
    #[serde(default)]
    pub retry: RetryConfig,
    /// Model used by the goal evaluator ("provider/model"); falls back to
    /// the agent's own model when unset.
    #[serde(default)]
    pub goal_model: Option<String>,
    /// Minimum evaluator confidence required to accept `achieved=true`.
    #[serde(default = "d_confidence")]
    pub goal_confidence_threshold: f64,
    /// How long `message/send` waits for a terminal state before returning
    /// the in-flight snapshot.
    #[serde(default = "d_120")]
    pub send_wait_secs: u64,
    /// Concurrent workflow executions per workspace (clamped to 1..=50).
    #[serde(default = "d_10")]
    pub max_concurrent_per_workspace: usize,
    /// Terminal tasks older than this are evicted from memory (the JSONL
    /// log retains them).
    #[serde(default = "d_3600")]
    pub terminal_task_ttl_secs: u64,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            default_max_iterations: d_25(),
            hard_iteration_cap: d_50(),
            llm_timeout_secs: d_300(),
            tool_timeout_secs: d_60(),
            discovery_timeout_secs: d_30(),
            execution_timeout_secs: d_3600(),
            retry: RetryConfig::default(),
            goal_model: None,
            goal_confidence_threshold: d_confidence(),
            send_wait_secs: d_120(),
            max_concurrent_per_workspace: d_10(),
            terminal_task_ttl_secs: d_3600(),
        }
    }
}

impl WorkflowConfig {
    /// Resolve the iteration budget for a submission: requested value if
    /// present, else the default — never above the hard cap.
    pub fn resolve_max_iterations(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.default_max_iterations)
            .clamp(1, self.hard_iteration_cap)
    }
}

/// Exponential-backoff retry policy applied to transient activity failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "d_3")]
    pub max_attempts: u32,
    #[serde(default = "d_500")]
    pub initial_interval_ms: u64,
    #[serde(default = "d_30000")]
    pub max_interval_ms: u64,
    #[serde(default = "d_mult")]
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: d_3(),
            initial_interval_ms: d_500(),
            max_interval_ms: d_30000(),
            multiplier: d_mult(),
        }
    }
}

impl RetryConfig {
    /// Backoff delay before the given retry (1-based attempt that failed).
    pub fn backoff_ms(&self, attempt: u32) -> u64 {
        let factor = self.multiplier.powi(attempt.saturating_sub(1) as i32);
        ((self.initial_interval_ms as f64 * factor) as u64).min(self.max_interval_ms)
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_25() -> u32 {
    25
}
fn d_50() -> u32 {
    50
}
fn d_300() -> u64 {
    300
}
fn d_60() -> u64 {
    60
}
fn d_30() -> u64 {
    30
}
fn d_3600() -> u64 {
    3600
}
fn d_120() -> u64 {
    120
}
fn d_10() -> usize {
    10
}
fn d_3() -> u32 {
    3
}
fn d_500() -> u64 {
    500
}
fn d_30000() -> u64 {
    30_000
}
fn d_mult() -> f64 {
    2.0
}
fn d_confidence() -> f64 {
    0.7
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_max_iterations_default_and_cap() {
        let cfg = WorkflowConfig::default();
        assert_eq!(cfg.resolve_max_iterations(None), 25);
        assert_eq!(cfg.resolve_max_iterations(Some(3)), 3);
        assert_eq!(cfg.resolve_max_iterations(Some(500)), 50);
        assert_eq!(cfg.resolve_max_iterations(Some(0)), 1);
    }

    #[test]
    fn backoff_grows_and_caps() {
        let retry = RetryConfig::default();
        assert_eq!(retry.backoff_ms(1), 500);
        assert_eq!(retry.backoff_ms(2), 1000);
        assert_eq!(retry.backoff_ms(3), 2000);
        assert_eq!(retry.backoff_ms(20), 30_000);
    }
}
