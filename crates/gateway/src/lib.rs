//! `ah-gateway` — the AgentHub service.
//!
//! Hosts the HTTP surface (A2A/JSON-RPC, agent cards, per-task SSE), the
//! task service and lifecycle FSM, the event pipeline (ordered log +
//! broker fan-out), and the reasoning workflow that drives an LLM through
//! iterative tool-calling until the task goal is met.

pub mod api;
pub mod runtime;
pub mod state;
