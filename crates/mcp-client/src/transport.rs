//! HTTP transport for remote MCP servers.
//!
//! Each request is a JSON-RPC 2.0 POST to the server's endpoint. Request
//! ids come from a per-transport atomic counter.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde_json::Value;

use ah_domain::config::McpServerConfig;

use crate::protocol::{RpcNotification, RpcRequest, RpcResponse};

/// Errors raised by the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid response body: {0}")]
    Decode(String),
}

/// One HTTP connection to an MCP server.
pub struct HttpTransport {
    url: String,
    bearer: Option<String>,
    client: reqwest::Client,
    next_id: AtomicU64,
}

impl HttpTransport {
    /// Build a transport for the given server config. `bearer` is the
    /// already-resolved auth token, if the server requires one.
    pub fn connect(config: &McpServerConfig, bearer: Option<String>) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TransportError::Request(e.to_string()))?;

        Ok(Self {
            url: config.url.clone(),
            bearer,
            client,
            next_id: AtomicU64::new(1),
        })
    }

    fn post(&self, body: &impl serde::Serialize) -> reqwest::RequestBuilder {
        let builder = self.client.post(&self.url).json(body);
        match &self.bearer {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Send a request and wait for its response.
    pub async fn request(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<RpcResponse, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let req = RpcRequest::new(id, method, params);

        let resp = self.post(&req).send().await.map_err(classify)?;

        let status = resp.status();
        let text = resp.text().await.map_err(classify)?;
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        serde_json::from_str(&text).map_err(|e| TransportError::Decode(e.to_string()))
    }

    /// Send a fire-and-forget notification. Delivery failures are reported
    /// but carry no response payload.
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), TransportError> {
        let notif = RpcNotification::new(method, params);
        let resp = self.post(&notif).send().await.map_err(classify)?;
        let status = resp.status();
        if !status.is_success() && status.as_u16() != 202 {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: resp.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }
}

fn classify(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout(e.to_string())
    } else {
        TransportError::Request(e.to_string())
    }
}
