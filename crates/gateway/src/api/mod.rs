//! HTTP API surface.
//!
//! Protected routes (JWT bearer):
//! - `GET  /v1/agents`                    — list agents
//! - `GET  /v1/agents/:agent_id/card`     — agent discovery card
//! - `POST /v1/agents/:agent_id/rpc`      — A2A JSON-RPC
//! - `GET  /v1/tasks`                     — list tasks (workspace-scoped)
//! - `GET  /v1/tasks/:task_id`            — task snapshot
//! - `POST /v1/tasks/:task_id/cancel`     — request cancellation
//! - `POST /v1/tasks/:task_id/pause`      — pause signal
//! - `POST /v1/tasks/:task_id/resume`     — resume signal
//! - `GET  /v1/tasks/:task_id/events`     — per-task SSE stream
//!
//! Public:
//! - `GET  /healthz`                      — readiness

pub mod agents;
pub mod auth;
pub mod events;
pub mod rpc;
pub mod tasks;

use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::{extract::State, middleware, Router};
use serde_json::json;

use crate::state::AppState;

/// Build the application router.
pub fn router(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/v1/agents", get(agents::list_agents))
        .route("/v1/agents/:agent_id/card", get(agents::agent_card))
        .route("/v1/agents/:agent_id/rpc", post(rpc::handle_rpc))
        .route("/v1/tasks", get(tasks::list_tasks))
        .route("/v1/tasks/:task_id", get(tasks::get_task))
        .route("/v1/tasks/:task_id/cancel", post(tasks::cancel_task))
        .route("/v1/tasks/:task_id/pause", post(tasks::pause_task))
        .route("/v1/tasks/:task_id/resume", post(tasks::resume_task))
        .route("/v1/tasks/:task_id/events", get(events::task_events))
        .layer(middleware::from_fn_with_state(state, auth::require_auth));

    Router::new()
        .route("/healthz", get(health))
        .merge(protected)
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let provider_errors: Vec<_> = state
        .llm
        .init_errors()
        .iter()
        .map(|(id, error)| json!({ "provider_id": id, "error": error }))
        .collect();

    Json(json!({
        "status": "ok",
        "agents": state.agents.len(),
        "providers": state.llm.len(),
        "provider_errors": provider_errors,
        "mcp_servers": state.mcp.server_count(),
        "mcp_tools": state.mcp.tool_count(),
    }))
}
