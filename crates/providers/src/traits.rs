use serde::{Deserialize, Serialize};
use serde_json::Value;

use ah_domain::error::Result;
use ah_domain::message::Message;
use ah_domain::stream::{BoxStream, StreamEvent, Usage};
use ah_domain::tool::ToolDescriptor;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request / Response types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A provider-agnostic chat completion request.
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    /// The conversation messages to send.
    pub messages: Vec<Message>,
    /// Tool catalog the model may invoke.
    pub tools: Vec<ToolDescriptor>,
    /// Model identifier override. When `None`, the provider uses its default.
    pub model: Option<String>,
    /// Sampling temperature. `None` lets the provider choose.
    pub temperature: Option<f32>,
    /// Maximum tokens in the response. `None` lets the provider choose.
    pub max_tokens: Option<u32>,
    /// When `true`, request the model to respond with valid JSON only.
    pub json_mode: bool,
}

/// A tool call exactly as the provider returned it, before normalization.
///
/// `arguments` may be a JSON object, an already-encoded JSON string, or any
/// bare value — the response parser turns it into the canonical
/// string-encoded form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawToolCall {
    pub id: Option<String>,
    pub name: String,
    pub arguments: Value,
}

/// A provider-agnostic chat completion response.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    /// Textual content of the response.
    pub content: String,
    /// Structured tool calls emitted by the model, un-normalized.
    pub tool_calls: Vec<RawToolCall>,
    /// Token usage information.
    pub usage: Option<Usage>,
    /// The model that actually produced the response.
    pub model: String,
    /// Why the model stopped (e.g. "stop", "tool_calls").
    pub finish_reason: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Core provider trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Trait every LLM adapter implements.
///
/// Implementations translate between the internal types and the wire
/// format of a provider's HTTP API. Adapters never accrue cost or publish
/// events — that is the LLM activity's job.
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send a chat completion request and wait for the full response.
    async fn complete(&self, req: &CompletionRequest) -> Result<CompletionResponse>;

    /// Send a chat completion request and return a stream of events.
    async fn complete_stream(
        &self,
        req: &CompletionRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>>;

    /// A unique identifier for this provider instance.
    fn provider_id(&self) -> &str;
}
