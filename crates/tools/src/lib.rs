//! `ah-tools` — tool resolution and execution for AgentHub.
//!
//! The registry resolves an agent's tool catalog once per workflow
//! execution; the executor validates arguments against each descriptor's
//! schema and dispatches builtins in-process or remote tools through the
//! MCP manager.

pub mod executor;
pub mod registry;
pub mod schema;

pub use executor::ToolExecutor;
pub use registry::ToolCatalog;
