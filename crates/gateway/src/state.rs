use std::sync::Arc;

use ah_domain::config::Config;
use ah_mcp_client::McpManager;
use ah_providers::ProviderRegistry;

use crate::runtime::agent::AgentRegistry;
use crate::runtime::broker::EventBroker;
use crate::runtime::events::EventLog;
use crate::runtime::signals::SignalHub;
use crate::runtime::tasks::TaskService;

/// Shared application state passed to all API handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub llm: Arc<ProviderRegistry>,
    pub mcp: Arc<McpManager>,
    pub agents: Arc<AgentRegistry>,
    pub tasks: Arc<TaskService>,
    pub event_log: Arc<EventLog>,
    pub broker: Arc<EventBroker>,
    pub signals: Arc<SignalHub>,
    /// HS256 key for JWT validation. `None` = dev mode (no auth enforced).
    pub jwt_key: Option<Arc<jsonwebtoken::DecodingKey>>,
}
