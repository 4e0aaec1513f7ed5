use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Event kinds
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The full catalog of domain event types a workflow execution can emit.
///
/// Serialized names are the wire-format strings consumed by SSE clients;
/// they never change without a protocol version bump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    TaskCreated,
    WorkflowStarted,
    IterationStarted,
    LLMCallStarted,
    LLMCallChunk,
    LLMCallCompleted,
    ToolCallStarted,
    ToolCallCompleted,
    BudgetWarning,
    BudgetExceeded,
    GoalEvaluated,
    WorkflowPaused,
    WorkflowResumed,
    WorkflowCancelled,
    WorkflowCompleted,
    WorkflowFailed,
    #[serde(rename = "heartbeat")]
    Heartbeat,
}

impl EventKind {
    /// Whether this event ends the per-task stream.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::WorkflowCompleted | Self::WorkflowFailed | Self::WorkflowCancelled
        )
    }

    /// Chunk events are fanned out live but never durably logged.
    pub fn is_transient(self) -> bool {
        matches!(self, Self::LLMCallChunk | Self::Heartbeat)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::TaskCreated => "TaskCreated",
            Self::WorkflowStarted => "WorkflowStarted",
            Self::IterationStarted => "IterationStarted",
            Self::LLMCallStarted => "LLMCallStarted",
            Self::LLMCallChunk => "LLMCallChunk",
            Self::LLMCallCompleted => "LLMCallCompleted",
            Self::ToolCallStarted => "ToolCallStarted",
            Self::ToolCallCompleted => "ToolCallCompleted",
            Self::BudgetWarning => "BudgetWarning",
            Self::BudgetExceeded => "BudgetExceeded",
            Self::GoalEvaluated => "GoalEvaluated",
            Self::WorkflowPaused => "WorkflowPaused",
            Self::WorkflowResumed => "WorkflowResumed",
            Self::WorkflowCancelled => "WorkflowCancelled",
            Self::WorkflowCompleted => "WorkflowCompleted",
            Self::WorkflowFailed => "WorkflowFailed",
            Self::Heartbeat => "heartbeat",
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Event envelope
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A single persisted-and-broadcast domain event.
///
/// `sequence` is strictly increasing per `task_id`; `event_id` is globally
/// unique and is the dedup key for at-least-once broker delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEvent {
    pub event_id: Uuid,
    pub task_id: Uuid,
    pub event_type: EventKind,
    pub timestamp: DateTime<Utc>,
    pub sequence: u64,
    pub data: Value,
    /// Source-format payload preserved verbatim when a translation occurred.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_data: Option<Value>,
}

impl TaskEvent {
    pub fn new(task_id: Uuid, event_type: EventKind, sequence: u64, data: Value) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            task_id,
            event_type,
            timestamp: Utc::now(),
            sequence,
            data,
            original_data: None,
        }
    }
}
