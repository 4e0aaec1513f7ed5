//! Event pipeline: the per-task ordered log and the publisher that feeds
//! it.
//!
//! Every workflow-observable step emits exactly one typed event. The
//! publisher appends to the log *first*, then fans out on the broker topic
//! — a consumer that backfills from the log before tailing the broker
//! never observes a sequence gap. Chunk events are broker-only; the final
//! `LLMCallCompleted` carries the assembled content and is logged.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};
use uuid::Uuid;

use ah_domain::event::{EventKind, TaskEvent};
use ah_domain::message::ToolCall;
use ah_domain::stream::Usage;
use ah_domain::task::Task;

use super::broker::{task_topic, EventBroker};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Event log
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct TaskLog {
    events: Vec<TaskEvent>,
    next_sequence: u64,
}

impl Default for TaskLog {
    fn default() -> Self {
        Self {
            events: Vec::new(),
            next_sequence: 1,
        }
    }
}

/// Append-only per-task event history with a JSONL mirror on disk.
///
/// The per-task sequence counter lives here; it is the only coordination
/// point between writers. Chunk events draw sequence numbers but are never
/// appended (gaps in the log are always chunk-shaped).
pub struct EventLog {
    inner: Mutex<HashMap<Uuid, TaskLog>>,
    log_path: Option<PathBuf>,
}

impl EventLog {
    /// Create a log persisting to `<state_path>/events/events.jsonl`,
    /// reloading whatever a previous run left there.
    pub fn new(state_path: &Path) -> Self {
        let dir = state_path.join("events");
        if let Err(e) = std::fs::create_dir_all(&dir) {
            tracing::warn!(path = %dir.display(), error = %e, "failed to create event log dir");
        }
        let log_path = dir.join("events.jsonl");

        let mut inner: HashMap<Uuid, TaskLog> = HashMap::new();
        if let Ok(content) = std::fs::read_to_string(&log_path) {
            for line in content.lines() {
                match serde_json::from_str::<TaskEvent>(line) {
                    Ok(event) => {
                        let log = inner.entry(event.task_id).or_default();
                        log.next_sequence = log.next_sequence.max(event.sequence + 1);
                        log.events.push(event);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "skipping unparseable event log line");
                    }
                }
            }
        }

        Self {
            inner: Mutex::new(inner),
            log_path: Some(log_path),
        }
    }

    /// In-memory only (tests, ephemeral deployments).
    pub fn ephemeral() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            log_path: None,
        }
    }

    /// Allocate the next sequence number for a task.
    pub fn next_sequence(&self, task_id: &Uuid) -> u64 {
        let mut inner = self.inner.lock();
        let log = inner.entry(*task_id).or_default();
        let seq = log.next_sequence;
        log.next_sequence += 1;
        seq
    }

    /// Append a durably-logged event. Caller must have allocated its
    /// sequence from this log.
    pub fn append(&self, event: &TaskEvent) {
        {
            let mut inner = self.inner.lock();
            inner
                .entry(event.task_id)
                .or_default()
                .events
                .push(event.clone());
        }
        if let Some(path) = &self.log_path {
            if let Ok(line) = serde_json::to_string(event) {
                match std::fs::OpenOptions::new().create(true).append(true).open(path) {
                    Ok(mut file) => {
                        if let Err(e) = writeln!(file, "{line}") {
                            tracing::warn!(error = %e, "failed to append event to JSONL");
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to open event JSONL for append");
                    }
                }
            }
        }
    }

    /// All logged events for a task, in sequence order.
    pub fn read(&self, task_id: &Uuid) -> Vec<TaskEvent> {
        self.inner
            .lock()
            .get(task_id)
            .map(|log| log.events.clone())
            .unwrap_or_default()
    }

    /// Drop in-memory history for evicted tasks (the JSONL retains it).
    pub fn evict(&self, task_ids: &[Uuid]) {
        let mut inner = self.inner.lock();
        for id in task_ids {
            inner.remove(id);
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Event publisher
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Emits typed domain events: log append first, then broker fan-out.
pub struct EventPublisher {
    log: Arc<EventLog>,
    broker: Arc<EventBroker>,
}

impl EventPublisher {
    pub fn new(log: Arc<EventLog>, broker: Arc<EventBroker>) -> Self {
        Self { log, broker }
    }

    pub fn log(&self) -> &Arc<EventLog> {
        &self.log
    }

    pub fn broker(&self) -> &Arc<EventBroker> {
        &self.broker
    }

    /// Publish one event: sequence allocation, durable append (unless the
    /// kind is transient), broker fan-out.
    pub fn publish(&self, task_id: Uuid, kind: EventKind, data: Value) -> TaskEvent {
        let sequence = self.log.next_sequence(&task_id);
        let event = TaskEvent::new(task_id, kind, sequence, data);
        if !kind.is_transient() {
            self.log.append(&event);
        }
        self.broker.publish(&task_topic(&task_id), event.clone());
        event
    }

    // ── Typed emitters ─────────────────────────────────────────────

    pub fn task_created(&self, task: &Task) {
        self.publish(
            task.id,
            EventKind::TaskCreated,
            json!({
                "agent_id": task.agent_id,
                "workspace_id": task.workspace_id,
                "query": task.query,
                "budget_usd": task.budget_usd,
            }),
        );
    }

    pub fn workflow_started(
        &self,
        task_id: Uuid,
        execution_id: Uuid,
        agent_name: &str,
        max_iterations: u32,
        budget_usd: f64,
    ) {
        self.publish(
            task_id,
            EventKind::WorkflowStarted,
            json!({
                "execution_id": execution_id,
                "agent": agent_name,
                "max_iterations": max_iterations,
                "budget_usd": budget_usd,
            }),
        );
    }

    pub fn iteration_started(&self, task_id: Uuid, iteration: u32) {
        self.publish(
            task_id,
            EventKind::IterationStarted,
            json!({ "iteration": iteration }),
        );
    }

    pub fn llm_call_started(&self, task_id: Uuid, iteration: u32) {
        self.publish(
            task_id,
            EventKind::LLMCallStarted,
            json!({ "iteration": iteration }),
        );
    }

    /// Broker-only token chunk emitted while the provider streams.
    pub fn llm_call_chunk(&self, task_id: Uuid, chunk: &str, index: u32, is_final: bool) {
        self.publish(
            task_id,
            EventKind::LLMCallChunk,
            json!({ "chunk": chunk, "index": index, "is_final": is_final }),
        );
    }

    #[allow(clippy::too_many_arguments)]
    pub fn llm_call_completed(
        &self,
        task_id: Uuid,
        iteration: u32,
        content: &str,
        tool_calls: &[ToolCall],
        usage: &Usage,
        cost: f64,
    ) {
        self.publish(
            task_id,
            EventKind::LLMCallCompleted,
            json!({
                "iteration": iteration,
                "content": content,
                "tool_calls": tool_calls,
                "usage": usage,
                "cost": cost,
            }),
        );
    }

    pub fn tool_call_started(&self, task_id: Uuid, tool_name: &str, args: &Value) {
        self.publish(
            task_id,
            EventKind::ToolCallStarted,
            json!({ "tool_name": tool_name, "args": args }),
        );
    }

    pub fn tool_call_completed(
        &self,
        task_id: Uuid,
        tool_name: &str,
        success: bool,
        result: &Value,
    ) {
        self.publish(
            task_id,
            EventKind::ToolCallCompleted,
            json!({ "tool_name": tool_name, "success": success, "result": result }),
        );
    }

    pub fn budget_warning(&self, task_id: Uuid, accrued_usd: f64, limit_usd: f64) {
        self.publish(
            task_id,
            EventKind::BudgetWarning,
            json!({ "accrued_usd": accrued_usd, "limit_usd": limit_usd }),
        );
    }

    pub fn budget_exceeded(&self, task_id: Uuid, accrued_usd: f64, limit_usd: f64) {
        self.publish(
            task_id,
            EventKind::BudgetExceeded,
            json!({ "accrued_usd": accrued_usd, "limit_usd": limit_usd }),
        );
    }

    pub fn goal_evaluated(&self, task_id: Uuid, achieved: bool, confidence: f64, cost: f64) {
        self.publish(
            task_id,
            EventKind::GoalEvaluated,
            json!({ "achieved": achieved, "confidence": confidence, "cost": cost }),
        );
    }

    pub fn workflow_paused(&self, task_id: Uuid, iteration: u32) {
        self.publish(
            task_id,
            EventKind::WorkflowPaused,
            json!({ "iteration": iteration }),
        );
    }

    pub fn workflow_resumed(&self, task_id: Uuid, iteration: u32) {
        self.publish(
            task_id,
            EventKind::WorkflowResumed,
            json!({ "iteration": iteration }),
        );
    }

    pub fn workflow_cancelled(
        &self,
        task_id: Uuid,
        iterations: u32,
        total_cost: f64,
        partial_response: Option<&str>,
    ) {
        self.publish(
            task_id,
            EventKind::WorkflowCancelled,
            json!({
                "iterations_used": iterations,
                "total_cost": total_cost,
                "partial_response": partial_response,
            }),
        );
    }

    #[allow(clippy::too_many_arguments)]
    pub fn workflow_completed(
        &self,
        task_id: Uuid,
        success: bool,
        final_response: Option<&str>,
        total_cost: f64,
        iterations_used: u32,
        termination_reason: &str,
    ) {
        self.publish(
            task_id,
            EventKind::WorkflowCompleted,
            json!({
                "success": success,
                "final_response": final_response,
                "total_cost": total_cost,
                "iterations_used": iterations_used,
                "termination_reason": termination_reason,
            }),
        );
    }

    pub fn workflow_failed(&self, task_id: Uuid, error_kind: &str, message: &str) {
        self.publish(
            task_id,
            EventKind::WorkflowFailed,
            json!({ "error_kind": error_kind, "message": message }),
        );
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    fn publisher() -> (EventPublisher, Arc<EventLog>, Arc<EventBroker>) {
        let log = Arc::new(EventLog::ephemeral());
        let broker = Arc::new(EventBroker::new());
        (EventPublisher::new(log.clone(), broker.clone()), log, broker)
    }

    #[test]
    fn sequences_are_monotonic_per_task() {
        let (publisher, log, _) = publisher();
        let task_a = Uuid::new_v4();
        let task_b = Uuid::new_v4();

        publisher.iteration_started(task_a, 1);
        publisher.llm_call_started(task_a, 1);
        publisher.iteration_started(task_b, 1);
        publisher.llm_call_started(task_a, 2);

        let events_a = log.read(&task_a);
        let seqs: Vec<u64> = events_a.iter().map(|e| e.sequence).collect();
        assert_eq!(seqs, vec![1, 2, 3]);

        let events_b = log.read(&task_b);
        assert_eq!(events_b[0].sequence, 1);
    }

    #[test]
    fn chunks_take_sequences_but_are_not_logged() {
        let (publisher, log, _) = publisher();
        let task_id = Uuid::new_v4();

        publisher.llm_call_started(task_id, 1);
        publisher.llm_call_chunk(task_id, "hel", 0, false);
        publisher.llm_call_chunk(task_id, "lo", 1, true);
        publisher.llm_call_completed(task_id, 1, "hello", &[], &Usage::default(), 0.01);

        let events = log.read(&task_id);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, EventKind::LLMCallStarted);
        assert_eq!(events[1].event_type, EventKind::LLMCallCompleted);
        // Gap where the chunks were: sequences 1 then 4.
        assert_eq!(events[0].sequence, 1);
        assert_eq!(events[1].sequence, 4);
    }

    #[tokio::test]
    async fn log_append_precedes_broker_fanout() {
        let (publisher, log, broker) = publisher();
        let task_id = Uuid::new_v4();

        let mut rx = broker.subscribe(&task_topic(&task_id));
        publisher.iteration_started(task_id, 1);

        let live = rx.recv().await.unwrap();
        // By the time the broker delivered it, the log already has it.
        let logged = log.read(&task_id);
        assert_eq!(logged.len(), 1);
        assert_eq!(logged[0].event_id, live.event_id);
    }

    #[test]
    fn chunk_payload_shape() {
        let (publisher, _, broker) = publisher();
        let task_id = Uuid::new_v4();
        let mut rx = broker.subscribe(&task_topic(&task_id));

        publisher.llm_call_chunk(task_id, "tok", 3, false);
        let event = rx.try_recv().unwrap();
        assert_eq!(event.event_type, EventKind::LLMCallChunk);
        assert_eq!(event.data["chunk"], "tok");
        assert_eq!(event.data["index"], 3);
        assert_eq!(event.data["is_final"], false);
    }

    #[test]
    fn persistence_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let task_id = Uuid::new_v4();

        {
            let log = Arc::new(EventLog::new(dir.path()));
            let broker = Arc::new(EventBroker::new());
            let publisher = EventPublisher::new(log, broker);
            publisher.iteration_started(task_id, 1);
            publisher.workflow_completed(task_id, true, Some("done"), 0.05, 1, "completed");
        }

        let reloaded = EventLog::new(dir.path());
        let events = reloaded.read(&task_id);
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].event_type, EventKind::WorkflowCompleted);
        // Sequence counter resumes past the reloaded events.
        assert_eq!(reloaded.next_sequence(&task_id), 3);
    }

    #[test]
    fn evict_clears_memory_only() {
        let dir = tempfile::tempdir().unwrap();
        let log = EventLog::new(dir.path());
        let task_id = Uuid::new_v4();

        let seq = log.next_sequence(&task_id);
        log.append(&TaskEvent::new(
            task_id,
            EventKind::TaskCreated,
            seq,
            json!({}),
        ));
        assert_eq!(log.read(&task_id).len(), 1);

        log.evict(&[task_id]);
        assert!(log.read(&task_id).is_empty());

        // A fresh load still sees the persisted event.
        let reloaded = EventLog::new(dir.path());
        assert_eq!(reloaded.read(&task_id).len(), 1);
    }

    #[test]
    fn terminal_event_payloads() {
        let (publisher, log, _) = publisher();
        let task_id = Uuid::new_v4();

        publisher.workflow_completed(task_id, false, None, 0.2, 25, "max_iterations");
        publisher.workflow_failed(task_id, "provider_auth", "invalid key");

        let events = log.read(&task_id);
        assert_eq!(events[0].data["termination_reason"], "max_iterations");
        assert_eq!(events[0].data["success"], false);
        assert_eq!(events[1].data["error_kind"], "provider_auth");
    }
}
