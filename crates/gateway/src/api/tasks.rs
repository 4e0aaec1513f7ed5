//! Task inspection and control endpoints.
//!
//! - `GET  /v1/tasks`            — workspace-scoped list with filters + pagination
//! - `GET  /v1/tasks/:id`        — single-task snapshot
//! - `POST /v1/tasks/:id/cancel` — request cancellation
//! - `POST /v1/tasks/:id/pause`  — pause the workflow at its next gate
//! - `POST /v1/tasks/:id/resume` — resume a paused workflow

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Json, Response};
use axum::Extension;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use ah_domain::task::{TaskStatus, UserContext};

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListTasksQuery {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub agent_id: Option<Uuid>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    50
}

pub async fn list_tasks(
    State(state): State<AppState>,
    Extension(user): Extension<UserContext>,
    Query(q): Query<ListTasksQuery>,
) -> Response {
    let status = q.status.as_deref().and_then(parse_status);
    let limit = q.limit.min(200);

    let (tasks, total) = state.tasks.list(&user, status, q.agent_id, limit, q.offset);

    Json(json!({
        "tasks": tasks,
        "total": total,
        "limit": limit,
        "offset": q.offset,
    }))
    .into_response()
}

pub async fn get_task(
    State(state): State<AppState>,
    Extension(user): Extension<UserContext>,
    Path(task_id): Path<Uuid>,
) -> Response {
    match state.tasks.get(&task_id, &user) {
        Ok(task) => Json(json!(task)).into_response(),
        Err(_) => (
            axum::http::StatusCode::NOT_FOUND,
            Json(json!({ "error": "task not found" })),
        )
            .into_response(),
    }
}

pub async fn cancel_task(
    State(state): State<AppState>,
    Extension(user): Extension<UserContext>,
    Path(task_id): Path<Uuid>,
) -> Response {
    signal_response(state.tasks.cancel(&task_id, &user))
}

pub async fn pause_task(
    State(state): State<AppState>,
    Extension(user): Extension<UserContext>,
    Path(task_id): Path<Uuid>,
) -> Response {
    signal_response(state.tasks.pause(&task_id, &user))
}

pub async fn resume_task(
    State(state): State<AppState>,
    Extension(user): Extension<UserContext>,
    Path(task_id): Path<Uuid>,
) -> Response {
    signal_response(state.tasks.resume(&task_id, &user))
}

fn signal_response(result: ah_domain::error::Result<ah_domain::task::Task>) -> Response {
    use ah_domain::error::Error;

    match result {
        Ok(task) => Json(json!(task)).into_response(),
        Err(Error::TaskNotFound(_)) => (
            axum::http::StatusCode::NOT_FOUND,
            Json(json!({ "error": "task not found" })),
        )
            .into_response(),
        Err(Error::InvalidTransition { from, to }) => (
            axum::http::StatusCode::CONFLICT,
            Json(json!({ "error": format!("cannot go from {from} to {to}") })),
        )
            .into_response(),
        Err(e) => (
            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

fn parse_status(s: &str) -> Option<TaskStatus> {
    match s {
        "submitted" => Some(TaskStatus::Submitted),
        "running" => Some(TaskStatus::Running),
        "paused" => Some(TaskStatus::Paused),
        "completed" => Some(TaskStatus::Completed),
        "failed" => Some(TaskStatus::Failed),
        "cancelled" => Some(TaskStatus::Cancelled),
        _ => None,
    }
}
