//! End-to-end workflow tests against scripted mock activities.
//!
//! Each test submits a task through the real task service, lets the real
//! reasoning loop run against a `MockActivities` script, and asserts on
//! the resulting event log and task row.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use ah_domain::agent::{AgentConfig, ModelDescriptor};
use ah_domain::config::{AgentDefinition, WorkflowConfig};
use ah_domain::error::{Error, Result};
use ah_domain::event::{EventKind, TaskEvent};
use ah_domain::message::{Message, ToolCall};
use ah_domain::stream::Usage;
use ah_domain::task::{TaskStatus, UserContext};
use ah_domain::tool::{ToolDescriptor, ToolOutcome};
use ah_gateway::runtime::activities::{Activities, AssistantTurn, LlmCallRequest};
use ah_gateway::runtime::broker::EventBroker;
use ah_gateway::runtime::events::{EventLog, EventPublisher};
use ah_gateway::runtime::goal::GoalEvaluation;
use ah_gateway::runtime::signals::SignalHub;
use ah_gateway::runtime::tasks::{TaskService, TaskStore};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Mock activities
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct MockActivities {
    agent: AgentConfig,
    tools: Vec<ToolDescriptor>,
    /// Scripted LLM turns, consumed in order. When empty, a non-completing
    /// filler turn is returned.
    turns: Mutex<VecDeque<Result<AssistantTurn>>>,
    /// Tool outcomes keyed by tool name.
    tool_results: Mutex<HashMap<String, ToolOutcome>>,
    /// Scripted goal evaluations, consumed in order.
    evaluations: Mutex<VecDeque<GoalEvaluation>>,
    /// Conversation snapshots observed by each LLM call.
    seen_messages: Mutex<Vec<Vec<Message>>>,
    llm_calls: AtomicU32,
    tool_executions: AtomicU32,
    llm_delay: Duration,
}

impl MockActivities {
    fn new(agent_id: Uuid) -> Self {
        Self {
            agent: AgentConfig {
                agent_id,
                name: "mock-agent".into(),
                instruction: "You are a test agent.".into(),
                model: ModelDescriptor::parse("mock/mock-model").unwrap(),
                tool_servers: vec![],
                planning: false,
                streaming: false,
            },
            tools: vec![ToolDescriptor::Remote {
                name: "calculator".into(),
                description: "Evaluate arithmetic".into(),
                schema: json!({
                    "type": "object",
                    "properties": { "expression": { "type": "string" } },
                    "required": ["expression"]
                }),
                server_id: "mock".into(),
            }],
            turns: Mutex::new(VecDeque::new()),
            tool_results: Mutex::new(HashMap::new()),
            evaluations: Mutex::new(VecDeque::new()),
            seen_messages: Mutex::new(Vec::new()),
            llm_calls: AtomicU32::new(0),
            tool_executions: AtomicU32::new(0),
            llm_delay: Duration::ZERO,
        }
    }

    fn push_turn(&self, turn: AssistantTurn) {
        self.turns.lock().push_back(Ok(turn));
    }

    fn push_error(&self, error: Error) {
        self.turns.lock().push_back(Err(error));
    }

    fn set_tool_result(&self, name: &str, outcome: ToolOutcome) {
        self.tool_results.lock().insert(name.into(), outcome);
    }

    fn push_evaluation(&self, eval: GoalEvaluation) {
        self.evaluations.lock().push_back(eval);
    }
}

fn text_turn(content: &str, cost: f64) -> AssistantTurn {
    AssistantTurn {
        content: content.into(),
        tool_calls: vec![],
        usage: Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        },
        cost,
    }
}

fn call_turn(content: &str, calls: Vec<ToolCall>, cost: f64) -> AssistantTurn {
    AssistantTurn {
        tool_calls: calls,
        ..text_turn(content, cost)
    }
}

fn complete_turn(result: &str, success: bool, cost: f64) -> AssistantTurn {
    call_turn(
        "",
        vec![ToolCall::new(
            "call_tc",
            "task_complete",
            json!({ "result": result, "success": success }).to_string(),
        )],
        cost,
    )
}

/// A turn carrying only free-text content, run through the production
/// content-embedded extraction exactly as the real LLM activity does.
fn content_turn(content: &str, cost: f64) -> AssistantTurn {
    AssistantTurn {
        content: content.into(),
        tool_calls: ah_providers::parser::extract_tool_calls(&[], content),
        usage: Usage::default(),
        cost,
    }
}

#[async_trait::async_trait]
impl Activities for MockActivities {
    async fn build_agent_config(&self, _agent_id: Uuid) -> Result<AgentConfig> {
        Ok(self.agent.clone())
    }

    async fn discover_tools(&self, _agent: &AgentConfig) -> Result<Vec<ToolDescriptor>> {
        Ok(self.tools.clone())
    }

    async fn call_llm(&self, req: LlmCallRequest<'_>) -> Result<AssistantTurn> {
        self.llm_calls.fetch_add(1, Ordering::SeqCst);
        self.seen_messages.lock().push(req.messages.to_vec());
        if !self.llm_delay.is_zero() {
            tokio::time::sleep(self.llm_delay).await;
        }
        match self.turns.lock().pop_front() {
            Some(turn) => turn,
            None => Ok(text_turn("still working on it", 0.0)),
        }
    }

    async fn execute_tool(
        &self,
        descriptor: &ToolDescriptor,
        _args: &Value,
        _cancel: &CancellationToken,
    ) -> ToolOutcome {
        self.tool_executions.fetch_add(1, Ordering::SeqCst);
        self.tool_results
            .lock()
            .get(descriptor.name())
            .cloned()
            .unwrap_or_else(|| ToolOutcome::err(descriptor.name(), "no scripted result"))
    }

    async fn evaluate_goal(
        &self,
        _agent: &AgentConfig,
        _messages: &[Message],
        _criteria: &[String],
    ) -> Result<GoalEvaluation> {
        Ok(self
            .evaluations
            .lock()
            .pop_front()
            .unwrap_or_else(GoalEvaluation::not_achieved))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Harness
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct Harness {
    service: Arc<TaskService>,
    log: Arc<EventLog>,
    mock: Arc<MockActivities>,
    agent: AgentDefinition,
    user: UserContext,
}

fn harness(mock: MockActivities) -> Harness {
    let agent = AgentDefinition {
        id: mock.agent.agent_id,
        name: "mock-agent".into(),
        description: "test agent".into(),
        instruction: "You are a test agent.".into(),
        model: "mock/mock-model".into(),
        endpoint: None,
        tool_servers: vec![],
        streaming: false,
        planning: false,
        default_budget_usd: 1.0,
    };

    let log = Arc::new(EventLog::ephemeral());
    let broker = Arc::new(EventBroker::new());
    let publisher = Arc::new(EventPublisher::new(log.clone(), broker));
    let signals = Arc::new(SignalHub::new());
    let store = Arc::new(TaskStore::ephemeral());
    let mock = Arc::new(mock);

    let service = Arc::new(TaskService::new(
        store,
        publisher,
        signals,
        mock.clone(),
        WorkflowConfig::default(),
    ));

    Harness {
        service,
        log,
        mock,
        agent,
        user: UserContext {
            user_id: "u1".into(),
            workspace_id: "ws1".into(),
        },
    }
}

impl Harness {
    fn submit(&self, query: &str, parameters: Value, budget: f64) -> Uuid {
        self.service
            .clone()
            .submit(
                &self.agent,
                &self.user,
                query.into(),
                parameters,
                Some(budget),
            )
            .expect("submit")
            .id
    }

    async fn wait_terminal(&self, task_id: Uuid) -> ah_domain::task::Task {
        for _ in 0..500 {
            let task = self.service.get(&task_id, &self.user).expect("task exists");
            if task.status.is_terminal() {
                return task;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("task did not reach a terminal state in time");
    }

    async fn wait_status(&self, task_id: Uuid, status: TaskStatus) {
        for _ in 0..500 {
            let task = self.service.get(&task_id, &self.user).expect("task exists");
            if task.status == status {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("task never reached {status:?}");
    }

    async fn wait_for_event<F>(&self, task_id: Uuid, pred: F)
    where
        F: Fn(&TaskEvent) -> bool,
    {
        for _ in 0..500 {
            if self.log.read(&task_id).iter().any(&pred) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected event never appeared");
    }

    fn kinds(&self, task_id: Uuid) -> Vec<EventKind> {
        self.log
            .read(&task_id)
            .iter()
            .map(|e| e.event_type)
            .collect()
    }
}

fn assert_invariants(events: &[TaskEvent], task: &ah_domain::task::Task) {
    // Sequences strictly increase (gaps allowed only where chunks were).
    let mut last = 0;
    for event in events {
        assert!(event.sequence > last, "sequence not strictly increasing");
        last = event.sequence;
    }

    // Exactly one terminal event, and it is last.
    let terminal: Vec<_> = events.iter().filter(|e| e.event_type.is_terminal()).collect();
    assert_eq!(terminal.len(), 1, "expected exactly one terminal event");
    assert!(events.last().unwrap().event_type.is_terminal());

    // Accrued cost equals the sum of all LLM-call and goal-eval costs.
    let cost_sum: f64 = events
        .iter()
        .filter(|e| {
            matches!(
                e.event_type,
                EventKind::LLMCallCompleted | EventKind::GoalEvaluated
            )
        })
        .filter_map(|e| e.data.get("cost").and_then(|c| c.as_f64()))
        .sum();
    assert!(
        (task.cost_accrued - cost_sum).abs() < 1e-9,
        "cost_accrued {} != event cost sum {}",
        task.cost_accrued,
        cost_sum
    );
}

/// Replay the event log and derive the terminal status it implies.
fn replay_status(events: &[TaskEvent]) -> Option<TaskStatus> {
    events.iter().rev().find_map(|e| match e.event_type {
        EventKind::WorkflowCancelled => Some(TaskStatus::Cancelled),
        EventKind::WorkflowFailed => Some(TaskStatus::Failed),
        EventKind::WorkflowCompleted => {
            let success = e.data.get("success").and_then(|v| v.as_bool()).unwrap_or(false);
            Some(if success {
                TaskStatus::Completed
            } else {
                TaskStatus::Failed
            })
        }
        _ => None,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenarios
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn immediate_completion() {
    let agent_id = Uuid::new_v4();
    let mock = MockActivities::new(agent_id);
    mock.push_turn(complete_turn("DONE", true, 0.01));

    let h = harness(mock);
    let task_id = h.submit("Reply DONE", json!({ "max_iterations": 3 }), 1.0);
    let task = h.wait_terminal(task_id).await;

    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.result.as_ref().unwrap().content, "DONE");
    assert!(task.execution_id.is_some());
    assert!((task.cost_accrued - 0.01).abs() < 1e-9);

    let events = h.log.read(&task_id);
    let kinds = h.kinds(task_id);
    assert_eq!(
        kinds,
        vec![
            EventKind::TaskCreated,
            EventKind::WorkflowStarted,
            EventKind::IterationStarted,
            EventKind::LLMCallStarted,
            EventKind::LLMCallCompleted,
            EventKind::ToolCallStarted,
            EventKind::ToolCallCompleted,
            EventKind::WorkflowCompleted,
        ]
    );

    let done = events.last().unwrap();
    assert_eq!(done.data["success"], true);
    assert_eq!(done.data["final_response"], "DONE");
    assert_eq!(done.data["iterations_used"], 1);
    assert_eq!(done.data["termination_reason"], "completed");

    assert_invariants(&events, &task);
    assert_eq!(replay_status(&events), Some(task.status));
}

#[tokio::test]
async fn tool_then_complete() {
    let agent_id = Uuid::new_v4();
    let mock = MockActivities::new(agent_id);
    mock.push_turn(call_turn(
        "",
        vec![ToolCall::new(
            "call_1",
            "calculator",
            json!({ "expression": "15+27" }).to_string(),
        )],
        0.01,
    ));
    mock.push_turn(complete_turn("42", true, 0.01));
    mock.set_tool_result("calculator", ToolOutcome::ok("calculator", json!("42")));

    let h = harness(mock);
    let task_id = h.submit("Compute 15+27 then finish", json!({}), 1.0);
    let task = h.wait_terminal(task_id).await;

    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.result.as_ref().unwrap().content, "42");
    assert_eq!(h.mock.tool_executions.load(Ordering::SeqCst), 1);
    assert_eq!(h.mock.llm_calls.load(Ordering::SeqCst), 2);

    let events = h.log.read(&task_id);
    let done = events.last().unwrap();
    assert_eq!(done.data["iterations_used"], 2);

    // The calculator call completes before the second LLM call starts.
    let calc_done = events
        .iter()
        .position(|e| {
            e.event_type == EventKind::ToolCallCompleted
                && e.data["tool_name"] == "calculator"
        })
        .unwrap();
    let second_llm = events
        .iter()
        .position(|e| {
            e.event_type == EventKind::LLMCallStarted && e.data["iteration"] == 2
        })
        .unwrap();
    assert!(calc_done < second_llm);

    // The tool result reached the conversation for the second call.
    let second_call_messages = &h.mock.seen_messages.lock()[1];
    assert!(second_call_messages.iter().any(|m| matches!(
        m,
        Message::Tool { tool_name, success: true, content, .. }
            if tool_name == "calculator" && content == "42"
    )));

    assert_invariants(&events, &task);
}

#[tokio::test]
async fn max_iterations_exhaustion() {
    let agent_id = Uuid::new_v4();
    let mock = MockActivities::new(agent_id);
    mock.push_turn(text_turn("working...", 0.01));
    mock.push_turn(text_turn("still working...", 0.01));

    let h = harness(mock);
    let task_id = h.submit("Loop forever", json!({ "max_iterations": 2 }), 1.0);
    let task = h.wait_terminal(task_id).await;

    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.error.as_ref().unwrap().error_kind, "max_iterations");
    assert_eq!(h.mock.llm_calls.load(Ordering::SeqCst), 2);

    let events = h.log.read(&task_id);
    let done = events.last().unwrap();
    assert_eq!(done.event_type, EventKind::WorkflowCompleted);
    assert_eq!(done.data["success"], false);
    assert_eq!(done.data["termination_reason"], "max_iterations");
    assert_eq!(done.data["iterations_used"], 2);

    assert_invariants(&events, &task);
    assert_eq!(replay_status(&events), Some(TaskStatus::Failed));
}

#[tokio::test]
async fn cancel_mid_flight() {
    let agent_id = Uuid::new_v4();
    let mut mock = MockActivities::new(agent_id);
    mock.llm_delay = Duration::from_millis(30);
    // No scripted turns: the mock keeps producing non-completing filler.

    let h = harness(mock);
    let task_id = h.submit("Run until told otherwise", json!({}), 1.0);

    // Wait until iteration 2 is underway, then cancel.
    h.wait_for_event(task_id, |e| {
        e.event_type == EventKind::IterationStarted && e.data["iteration"] == 2
    })
    .await;
    h.service.cancel(&task_id, &h.user).unwrap();

    let task = h.wait_terminal(task_id).await;
    assert_eq!(task.status, TaskStatus::Cancelled);

    let events = h.log.read(&task_id);
    let last = events.last().unwrap();
    assert_eq!(last.event_type, EventKind::WorkflowCancelled);
    // Partial conversation preserved in the log.
    assert!(events
        .iter()
        .any(|e| e.event_type == EventKind::LLMCallCompleted));

    assert_invariants(&events, &task);
    assert_eq!(replay_status(&events), Some(TaskStatus::Cancelled));
}

#[tokio::test]
async fn budget_exceeded_on_first_call() {
    let agent_id = Uuid::new_v4();
    let mock = MockActivities::new(agent_id);
    mock.push_turn(text_turn("expensive thinking", 0.01));

    let h = harness(mock);
    let task_id = h.submit("Do something", json!({}), 0.001);
    let task = h.wait_terminal(task_id).await;

    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.error.as_ref().unwrap().error_kind, "budget_exceeded");
    // Overage of one in-flight call is permitted.
    assert!(task.cost_accrued > task.budget_usd);

    let kinds = h.kinds(task_id);
    assert!(kinds.contains(&EventKind::BudgetExceeded));
    // Already exceeded: no warning required.
    assert!(!kinds.contains(&EventKind::BudgetWarning));

    let events = h.log.read(&task_id);
    let done = events.last().unwrap();
    assert_eq!(done.data["termination_reason"], "budget_exceeded");
    assert_eq!(done.data["success"], false);

    assert_invariants(&events, &task);
}

#[tokio::test]
async fn content_embedded_completion() {
    let agent_id = Uuid::new_v4();
    let mock = MockActivities::new(agent_id);
    mock.push_turn(content_turn(
        r#"{"name":"task_complete","arguments":{"result":"ok","success":true}}"#,
        0.01,
    ));

    let h = harness(mock);
    let task_id = h.submit("Finish via content", json!({}), 1.0);
    let task = h.wait_terminal(task_id).await;

    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.result.as_ref().unwrap().content, "ok");

    let events = h.log.read(&task_id);
    let done = events.last().unwrap();
    assert_eq!(done.data["success"], true);
    assert_eq!(done.data["final_response"], "ok");
    assert_invariants(&events, &task);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Boundary and edge behaviors
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn single_iteration_means_single_llm_call() {
    let agent_id = Uuid::new_v4();
    let mock = MockActivities::new(agent_id);
    mock.push_turn(text_turn("not completing", 0.01));

    let h = harness(mock);
    let task_id = h.submit("One shot", json!({ "max_iterations": 1 }), 1.0);
    let task = h.wait_terminal(task_id).await;

    assert_eq!(h.mock.llm_calls.load(Ordering::SeqCst), 1);
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.error.as_ref().unwrap().error_kind, "max_iterations");

    let starts = h
        .kinds(task_id)
        .iter()
        .filter(|k| **k == EventKind::LLMCallStarted)
        .count();
    assert_eq!(starts, 1);
}

#[tokio::test]
async fn empty_turn_gets_a_nudge_and_continues() {
    let agent_id = Uuid::new_v4();
    let mock = MockActivities::new(agent_id);
    mock.push_turn(text_turn("", 0.0));
    mock.push_turn(complete_turn("done", true, 0.0));

    let h = harness(mock);
    let task_id = h.submit("Quietly finish", json!({}), 1.0);
    let task = h.wait_terminal(task_id).await;

    assert_eq!(task.status, TaskStatus::Completed);

    let events = h.log.read(&task_id);
    assert_eq!(events.last().unwrap().data["iterations_used"], 2);

    // The second LLM call saw the nudge user message.
    let second_call = &h.mock.seen_messages.lock()[1];
    assert!(second_call.iter().any(|m| matches!(
        m,
        Message::User { content } if content.contains("task_complete")
    )));
}

#[tokio::test]
async fn unknown_tool_is_recorded_and_loop_continues() {
    let agent_id = Uuid::new_v4();
    let mock = MockActivities::new(agent_id);
    mock.push_turn(call_turn(
        "",
        vec![ToolCall::new("call_1", "ghost_tool", "{}".to_string())],
        0.0,
    ));
    mock.push_turn(complete_turn("recovered", true, 0.0));

    let h = harness(mock);
    let task_id = h.submit("Use a missing tool", json!({}), 1.0);
    let task = h.wait_terminal(task_id).await;

    assert_eq!(task.status, TaskStatus::Completed);
    // Nothing was dispatched to the executor.
    assert_eq!(h.mock.tool_executions.load(Ordering::SeqCst), 0);

    let events = h.log.read(&task_id);
    assert!(events.iter().any(|e| {
        e.event_type == EventKind::ToolCallCompleted
            && e.data["tool_name"] == "ghost_tool"
            && e.data["success"] == false
            && e.data["result"]["error"] == "unknown_tool"
    }));
}

#[tokio::test]
async fn duplicate_tool_call_ids_execute_once() {
    let agent_id = Uuid::new_v4();
    let mock = MockActivities::new(agent_id);
    let args = json!({ "expression": "1+1" }).to_string();
    mock.push_turn(call_turn(
        "",
        vec![
            ToolCall::new("dup", "calculator", args.clone()),
            ToolCall::new("dup", "calculator", args),
        ],
        0.0,
    ));
    mock.push_turn(complete_turn("2", true, 0.0));
    mock.set_tool_result("calculator", ToolOutcome::ok("calculator", json!("2")));

    let h = harness(mock);
    let task_id = h.submit("Double dispatch", json!({}), 1.0);
    let task = h.wait_terminal(task_id).await;

    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(h.mock.tool_executions.load(Ordering::SeqCst), 1);

    // The duplicate is recorded as a failed tool message in the next call.
    let second_call = &h.mock.seen_messages.lock()[1];
    assert!(second_call.iter().any(|m| matches!(
        m,
        Message::Tool { success: false, content, .. } if content == "duplicate_id"
    )));
}

#[tokio::test]
async fn completion_with_remaining_calls_drops_them() {
    let agent_id = Uuid::new_v4();
    let mock = MockActivities::new(agent_id);
    mock.push_turn(call_turn(
        "",
        vec![
            ToolCall::new(
                "call_1",
                "task_complete",
                json!({ "result": "first", "success": true }).to_string(),
            ),
            ToolCall::new("call_2", "calculator", json!({ "expression": "1" }).to_string()),
        ],
        0.0,
    ));

    let h = harness(mock);
    let task_id = h.submit("Complete then call", json!({}), 1.0);
    let task = h.wait_terminal(task_id).await;

    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.result.as_ref().unwrap().content, "first");
    // The trailing calculator call was never executed.
    assert_eq!(h.mock.tool_executions.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn fatal_llm_error_fails_the_workflow() {
    let agent_id = Uuid::new_v4();
    let mock = MockActivities::new(agent_id);
    mock.push_error(Error::Auth("invalid api key".into()));

    let h = harness(mock);
    let task_id = h.submit("Trigger auth failure", json!({}), 1.0);
    let task = h.wait_terminal(task_id).await;

    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.error.as_ref().unwrap().error_kind, "provider_auth");

    let events = h.log.read(&task_id);
    let last = events.last().unwrap();
    assert_eq!(last.event_type, EventKind::WorkflowFailed);
    assert_eq!(last.data["error_kind"], "provider_auth");
    assert_eq!(replay_status(&events), Some(TaskStatus::Failed));
}

#[tokio::test]
async fn goal_evaluator_completes_without_task_complete() {
    let agent_id = Uuid::new_v4();
    let mock = MockActivities::new(agent_id);
    mock.push_turn(text_turn("The answer is 42.", 0.01));
    mock.push_evaluation(GoalEvaluation {
        achieved: true,
        confidence: 0.9,
        final_response: Some("42".into()),
        cost: 0.001,
    });

    let h = harness(mock);
    let task_id = h.submit(
        "What is 6*7?",
        json!({ "success_criteria": ["states the numeric answer"] }),
        1.0,
    );
    let task = h.wait_terminal(task_id).await;

    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.result.as_ref().unwrap().content, "42");

    let events = h.log.read(&task_id);
    assert!(events
        .iter()
        .any(|e| e.event_type == EventKind::GoalEvaluated && e.data["achieved"] == true));
    assert_invariants(&events, &task);
}

#[tokio::test]
async fn low_confidence_goal_verdict_is_ignored() {
    let agent_id = Uuid::new_v4();
    let mock = MockActivities::new(agent_id);
    mock.push_turn(text_turn("Maybe 42?", 0.0));
    mock.push_evaluation(GoalEvaluation {
        achieved: true,
        confidence: 0.5,
        final_response: Some("42".into()),
        cost: 0.0,
    });
    mock.push_turn(complete_turn("definitely 42", true, 0.0));

    let h = harness(mock);
    let task_id = h.submit(
        "What is 6*7?",
        json!({ "success_criteria": ["states the numeric answer"] }),
        1.0,
    );
    let task = h.wait_terminal(task_id).await;

    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.result.as_ref().unwrap().content, "definitely 42");
    assert_eq!(h.mock.llm_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn pause_and_resume_round_trip() {
    let agent_id = Uuid::new_v4();
    let mut mock = MockActivities::new(agent_id);
    mock.llm_delay = Duration::from_millis(20);

    let h = harness(mock);
    let task_id = h.submit("Long running", json!({}), 1.0);
    h.wait_status(task_id, TaskStatus::Running).await;

    h.service.pause(&task_id, &h.user).unwrap();
    h.wait_status(task_id, TaskStatus::Paused).await;
    h.wait_for_event(task_id, |e| e.event_type == EventKind::WorkflowPaused)
        .await;

    h.service.resume(&task_id, &h.user).unwrap();
    h.wait_status(task_id, TaskStatus::Running).await;
    h.wait_for_event(task_id, |e| e.event_type == EventKind::WorkflowResumed)
        .await;

    h.service.cancel(&task_id, &h.user).unwrap();
    let task = h.wait_terminal(task_id).await;
    assert_eq!(task.status, TaskStatus::Cancelled);

    let events = h.log.read(&task_id);
    assert_invariants(&events, &task);
}

#[tokio::test]
async fn workspace_scoping_hides_foreign_tasks() {
    let agent_id = Uuid::new_v4();
    let mock = MockActivities::new(agent_id);
    mock.push_turn(complete_turn("done", true, 0.0));

    let h = harness(mock);
    let task_id = h.submit("Scoped task", json!({}), 1.0);
    h.wait_terminal(task_id).await;

    let outsider = UserContext {
        user_id: "intruder".into(),
        workspace_id: "other-ws".into(),
    };
    assert!(h.service.get(&task_id, &outsider).is_err());
    assert!(h.service.cancel(&task_id, &outsider).is_err());
}

#[tokio::test]
async fn unsuccessful_completion_fails_the_task() {
    let agent_id = Uuid::new_v4();
    let mock = MockActivities::new(agent_id);
    mock.push_turn(complete_turn("could not do it", false, 0.0));

    let h = harness(mock);
    let task_id = h.submit("Impossible task", json!({}), 1.0);
    let task = h.wait_terminal(task_id).await;

    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.error.as_ref().unwrap().error_kind, "task_unsuccessful");

    let events = h.log.read(&task_id);
    let done = events.last().unwrap();
    assert_eq!(done.event_type, EventKind::WorkflowCompleted);
    assert_eq!(done.data["success"], false);
    assert_eq!(done.data["termination_reason"], "completed");
}
