//! `ah-providers` — LLM provider adapters for AgentHub.
//!
//! This crate provides:
//! - The [`LlmProvider`] trait and provider-agnostic request/response types.
//! - An OpenAI-compatible adapter (works with OpenAI, Azure-style gateways,
//!   vLLM, Ollama, Together, and anything else speaking that wire format).
//! - The response parser that extracts structured tool calls from assistant
//!   output, including recovery of JSON embedded in free-text content.
//! - A provider registry constructed from config at startup.
//! - Secret resolution for provider credentials.

pub mod openai_compat;
pub mod parser;
pub mod registry;
pub mod secrets;
pub mod sse;
pub mod traits;

pub use registry::ProviderRegistry;
pub use secrets::{EnvSecretStore, SecretStore};
pub use traits::{CompletionRequest, CompletionResponse, LlmProvider, RawToolCall};
