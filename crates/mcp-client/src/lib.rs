//! `ah-mcp-client` — MCP (Model Context Protocol) client for AgentHub.
//!
//! This crate provides:
//! - JSON-RPC 2.0 protocol types for communicating with MCP servers.
//! - An HTTP transport for remote tool servers.
//! - An [`McpManager`] that manages connections to multiple servers and
//!   orchestrates tool discovery and dispatch.

pub mod manager;
pub mod protocol;
pub mod transport;

pub use manager::{McpError, McpManager};
pub use protocol::McpToolDef;
