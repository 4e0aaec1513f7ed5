//! Per-task SSE event stream.
//!
//! `GET /v1/tasks/{task_id}/events` — replays the task's event history in
//! sequence order, then tails the live broker subscription. The broker
//! subscription is opened *before* the history read so no event falls in
//! the gap; duplicates are dropped by `event_id`. A `heartbeat` frame goes
//! out after 15 seconds of inactivity, and the stream closes once the
//! terminal event has been flushed.

use std::collections::HashSet;
use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::Extension;
use futures_core::Stream;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use ah_domain::event::TaskEvent;
use ah_domain::task::UserContext;

use crate::runtime::broker::task_topic;
use crate::state::AppState;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /v1/tasks/:task_id/events
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn task_events(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
    Extension(user): Extension<UserContext>,
) -> Response {
    if state.tasks.get(&task_id, &user).is_err() {
        return (
            axum::http::StatusCode::NOT_FOUND,
            axum::Json(serde_json::json!({ "error": "task not found" })),
        )
            .into_response();
    }

    Sse::new(task_event_stream(state, task_id)).into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Stream construction (shared with message/stream)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Build the backfill-then-tail SSE stream for one task.
pub(crate) fn task_event_stream(
    state: AppState,
    task_id: Uuid,
) -> impl Stream<Item = Result<Event, Infallible>> {
    // Subscribe before reading history so nothing falls in the gap.
    let mut rx = state.broker.subscribe(&task_topic(&task_id));
    let backfill = state.event_log.read(&task_id);

    async_stream::stream! {
        let mut seen: HashSet<Uuid> = HashSet::new();
        let mut terminal_flushed = false;

        for event in &backfill {
            seen.insert(event.event_id);
            terminal_flushed |= event.event_type.is_terminal();
            yield Ok(frame(event));
        }

        while !terminal_flushed {
            tokio::select! {
                received = rx.recv() => match received {
                    Ok(event) => {
                        if !seen.insert(event.event_id) {
                            continue;
                        }
                        terminal_flushed = event.event_type.is_terminal();
                        yield Ok(frame(&event));
                    }
                    Err(RecvError::Lagged(n)) => {
                        tracing::debug!(%task_id, missed = n, "SSE subscriber lagged");
                        yield Ok(Event::default()
                            .event("warning")
                            .data(format!("{{\"missed\":{n}}}")));
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = tokio::time::sleep(HEARTBEAT_INTERVAL) => {
                    yield Ok(heartbeat());
                }
            }
        }
    }
}

/// Frame a domain event as `event: <type>\ndata: <json>\n\n`.
fn frame(event: &TaskEvent) -> Event {
    Event::default()
        .event(event.event_type.as_str())
        .data(serde_json::to_string(event).unwrap_or_else(|_| "{}".into()))
}

fn heartbeat() -> Event {
    Event::default().event("heartbeat").data(format!(
        "{{\"ts\":{}}}",
        chrono::Utc::now().timestamp_millis()
    ))
}
