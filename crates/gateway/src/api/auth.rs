//! API authentication middleware.
//!
//! Every protected request carries `Authorization: Bearer <jwt>`. The JWT
//! is validated against the HS256 secret read once at startup from the env
//! var named by `config.auth.jwt_secret_env`; its claims provide the
//! [`UserContext`] (`sub` + `workspace_id`) that scopes every read and
//! write. When the secret is unset, the server logs a warning at startup
//! and runs in dev mode with a fixed default context.

use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use jsonwebtoken::{Algorithm, Validation};
use serde::Deserialize;

use ah_domain::task::UserContext;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    workspace_id: String,
}

/// Axum middleware enforcing bearer-JWT authentication on protected
/// routes. Attach via `axum::middleware::from_fn_with_state`.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let key = match &state.jwt_key {
        Some(key) => key.clone(),
        None => {
            // Dev mode: no secret configured.
            req.extensions_mut().insert(UserContext {
                user_id: "dev".into(),
                workspace_id: "default".into(),
            });
            return next.run(req).await;
        }
    };

    let token = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("");

    if token.is_empty() {
        return unauthorized("missing bearer token");
    }

    let validation = Validation::new(Algorithm::HS256);
    match jsonwebtoken::decode::<Claims>(token, &key, &validation) {
        Ok(data) => {
            req.extensions_mut().insert(UserContext {
                user_id: data.claims.sub,
                workspace_id: data.claims.workspace_id,
            });
            next.run(req).await
        }
        Err(e) => {
            tracing::debug!(error = %e, "JWT validation failed");
            unauthorized("invalid or expired token")
        }
    }
}

fn unauthorized(message: &str) -> Response {
    (
        axum::http::StatusCode::UNAUTHORIZED,
        axum::Json(serde_json::json!({ "error": message })),
    )
        .into_response()
}
