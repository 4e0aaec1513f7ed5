//! Agent discovery endpoints.
//!
//! - `GET /v1/agents`                — list registered agents
//! - `GET /v1/agents/:agent_id/card` — A2A agent card

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use uuid::Uuid;

use crate::state::AppState;

pub async fn list_agents(State(state): State<AppState>) -> Response {
    let agents: Vec<_> = state
        .agents
        .list()
        .into_iter()
        .map(|def| {
            json!({
                "id": def.id,
                "name": def.name,
                "description": def.description,
                "model": def.model,
                "streaming": def.streaming,
            })
        })
        .collect();

    Json(json!({ "agents": agents, "count": agents.len() })).into_response()
}

pub async fn agent_card(
    State(state): State<AppState>,
    Path(agent_id): Path<Uuid>,
) -> Response {
    let Some(def) = state.agents.get(&agent_id) else {
        return (
            axum::http::StatusCode::NOT_FOUND,
            Json(json!({ "error": "agent not found" })),
        )
            .into_response();
    };

    let card = json!({
        "name": def.name,
        "description": def.description,
        "url": format!("{}/v1/agents/{}/rpc", state.config.server.public_url, def.id),
        "version": env!("CARGO_PKG_VERSION"),
        "capabilities": {
            "streaming": def.streaming,
            "pushNotifications": false,
            "stateTransitionHistory": true,
        },
        "skills": [{
            "id": "text-processing",
            "name": "Text Processing",
            "description": format!("Process and respond to text tasks using {}", def.name),
            "inputModes": ["text"],
            "outputModes": ["text"],
        }],
    });

    Json(card).into_response()
}
