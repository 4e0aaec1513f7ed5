use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// A boxed async stream, used for LLM streaming responses.
pub type BoxStream<'a, T> = Pin<Box<dyn futures_core::Stream<Item = T> + Send + 'a>>;

/// Events emitted while a provider streams a completion.
///
/// Provider-agnostic: every adapter converts its wire format into these
/// before the LLM activity sees them.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// A text token chunk.
    Token { text: String },

    /// A tool call has started (id and name known).
    ToolCallStarted { index: u32, id: String, name: String },

    /// Incremental tool-call argument data for the call at `index`.
    ToolCallDelta { index: u32, arguments: String },

    /// Stream finished.
    Done {
        usage: Option<Usage>,
        finish_reason: Option<String>,
    },

    /// The provider reported an error mid-stream.
    Error { message: String },
}

/// Token usage for a completion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn add(&mut self, other: &Usage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}
