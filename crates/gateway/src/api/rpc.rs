//! Agent-scoped A2A/JSON-RPC surface.
//!
//! `POST /v1/agents/{agent_id}/rpc` accepts a JSON-RPC 2.0 envelope with
//! methods `message/send`, `message/stream`, `tasks/get`, `tasks/cancel`.
//! `message/stream` answers with SSE frames on the same channel; the
//! other methods answer with a JSON-RPC response object.

use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::sse::Sse;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use ah_domain::config::AgentDefinition;
use ah_domain::error::Error;
use ah_domain::task::{Task, UserContext};

use crate::runtime::broker::task_topic;
use crate::state::AppState;

use super::events::task_event_stream;

// JSON-RPC 2.0 error codes, plus the application task-not-found code.
const INVALID_REQUEST: i64 = -32600;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;
const INTERNAL_ERROR: i64 = -32603;
const TASK_NOT_FOUND: i64 = -32001;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Envelope dispatch
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn handle_rpc(
    State(state): State<AppState>,
    Path(agent_id): Path<Uuid>,
    Extension(user): Extension<UserContext>,
    Json(envelope): Json<Value>,
) -> Response {
    let id = envelope.get("id").cloned().unwrap_or(Value::Null);

    if envelope.get("jsonrpc").and_then(|v| v.as_str()) != Some("2.0") {
        return rpc_error(id, INVALID_REQUEST, "jsonrpc must be \"2.0\"");
    }
    let Some(method) = envelope.get("method").and_then(|m| m.as_str()) else {
        return rpc_error(id, INVALID_REQUEST, "missing method");
    };
    let params = envelope.get("params").cloned().unwrap_or_else(|| json!({}));

    let Some(agent) = state.agents.get(&agent_id).cloned() else {
        return rpc_error(id, INVALID_PARAMS, format!("unknown agent '{agent_id}'"));
    };

    match method {
        "message/send" => message_send(state, agent, user, id, params).await,
        "message/stream" => message_stream(state, agent, user, id, params),
        "tasks/get" => tasks_get(state, agent, user, id, params),
        "tasks/cancel" => tasks_cancel(state, agent, user, id, params),
        other => rpc_error(id, METHOD_NOT_FOUND, format!("unknown method '{other}'")),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Params
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
struct MessageSendParams {
    message: IncomingMessage,
    #[serde(default, rename = "contextId")]
    context_id: Option<String>,
    #[serde(default)]
    metadata: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct IncomingMessage {
    role: String,
    #[serde(default)]
    parts: Vec<MessagePart>,
}

#[derive(Debug, Deserialize)]
struct MessagePart {
    #[serde(default)]
    text: Option<String>,
}

impl MessageSendParams {
    fn query(&self) -> String {
        self.message
            .parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Task parameters carried in `metadata`, plus the optional budget.
    fn parameters_and_budget(&self) -> (Value, Option<f64>) {
        let mut parameters = self.metadata.clone().unwrap_or_else(|| json!({}));
        if !parameters.is_object() {
            parameters = json!({});
        }
        if let Some(ctx) = &self.context_id {
            parameters["context_id"] = json!(ctx);
        }
        let budget = parameters.get("budget_usd").and_then(|v| v.as_f64());
        (parameters, budget)
    }
}

#[derive(Debug, Deserialize)]
struct TaskIdParams {
    id: Uuid,
}

fn parse_submission(
    params: Value,
) -> Result<(String, Value, Option<f64>), String> {
    let parsed: MessageSendParams =
        serde_json::from_value(params).map_err(|e| format!("invalid params: {e}"))?;
    if parsed.message.role != "user" {
        return Err("message role must be \"user\"".into());
    }
    let query = parsed.query();
    if query.trim().is_empty() {
        return Err("message must contain at least one non-empty text part".into());
    }
    let (parameters, budget) = parsed.parameters_and_budget();
    Ok((query, parameters, budget))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// message/send
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Create a task and wait (bounded) for its terminal state.
async fn message_send(
    state: AppState,
    agent: AgentDefinition,
    user: UserContext,
    id: Value,
    params: Value,
) -> Response {
    let (query, parameters, budget) = match parse_submission(params) {
        Ok(parts) => parts,
        Err(message) => return rpc_error(id, INVALID_PARAMS, message),
    };

    let task = match state.tasks.clone().submit(&agent, &user, query, parameters, budget) {
        Ok(task) => task,
        Err(e) => return rpc_error(id, INTERNAL_ERROR, e.to_string()),
    };

    let wait = Duration::from_secs(state.tasks.config().send_wait_secs);
    let snapshot = wait_for_terminal(&state, task, &user, wait).await;
    rpc_result(id, json!(snapshot))
}

/// Wait for a task to reach a terminal state, bounded by `wait`. Returns
/// the freshest snapshot either way.
async fn wait_for_terminal(
    state: &AppState,
    mut task: Task,
    user: &UserContext,
    wait: Duration,
) -> Task {
    let mut rx = state.broker.subscribe(&task_topic(&task.id));
    let deadline = tokio::time::Instant::now() + wait;

    loop {
        if let Ok(current) = state.tasks.get(&task.id, user) {
            task = current;
        }
        if task.status.is_terminal() {
            return task;
        }

        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => return task,
            received = rx.recv() => {
                if received.is_err() {
                    // Topic closed right after the terminal event; give
                    // the store update a moment to land.
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// message/stream
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Create a task and stream its events as SSE until terminal.
fn message_stream(
    state: AppState,
    agent: AgentDefinition,
    user: UserContext,
    id: Value,
    params: Value,
) -> Response {
    let (query, parameters, budget) = match parse_submission(params) {
        Ok(parts) => parts,
        Err(message) => return rpc_error(id, INVALID_PARAMS, message),
    };

    let task = match state.tasks.clone().submit(&agent, &user, query, parameters, budget) {
        Ok(task) => task,
        Err(e) => return rpc_error(id, INTERNAL_ERROR, e.to_string()),
    };

    Sse::new(task_event_stream(state, task.id)).into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// tasks/get + tasks/cancel
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn tasks_get(
    state: AppState,
    agent: AgentDefinition,
    user: UserContext,
    id: Value,
    params: Value,
) -> Response {
    let parsed: TaskIdParams = match serde_json::from_value(params) {
        Ok(p) => p,
        Err(e) => return rpc_error(id, INVALID_PARAMS, format!("invalid params: {e}")),
    };

    match scoped_task(&state, &agent, &user, &parsed.id) {
        Ok(task) => rpc_result(id, json!(task)),
        Err(response_code) => rpc_error(id, response_code, "task not found"),
    }
}

fn tasks_cancel(
    state: AppState,
    agent: AgentDefinition,
    user: UserContext,
    id: Value,
    params: Value,
) -> Response {
    let parsed: TaskIdParams = match serde_json::from_value(params) {
        Ok(p) => p,
        Err(e) => return rpc_error(id, INVALID_PARAMS, format!("invalid params: {e}")),
    };

    if let Err(code) = scoped_task(&state, &agent, &user, &parsed.id) {
        return rpc_error(id, code, "task not found");
    }

    match state.tasks.cancel(&parsed.id, &user) {
        Ok(task) => rpc_result(id, json!(task)),
        Err(Error::TaskNotFound(_)) => rpc_error(id, TASK_NOT_FOUND, "task not found"),
        Err(e) => rpc_error(id, INTERNAL_ERROR, e.to_string()),
    }
}

/// Look up a task, scoped to both the caller's workspace and this agent.
fn scoped_task(
    state: &AppState,
    agent: &AgentDefinition,
    user: &UserContext,
    task_id: &Uuid,
) -> Result<Task, i64> {
    match state.tasks.get(task_id, user) {
        Ok(task) if task.agent_id == agent.id => Ok(task),
        _ => Err(TASK_NOT_FOUND),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Response helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn rpc_result(id: Value, result: Value) -> Response {
    Json(json!({ "jsonrpc": "2.0", "id": id, "result": result })).into_response()
}

fn rpc_error(id: Value, code: i64, message: impl Into<String>) -> Response {
    Json(json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message.into() },
    }))
    .into_response()
}
