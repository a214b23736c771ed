//! # WorkPlanner Gateway
//!
//! REST API and WebSocket push channel over the planner engines.
//! Identity comes from the `X-User-*` headers set by the upstream auth proxy.

pub mod api;
pub mod routes;
pub mod server;
pub mod ws;

pub use server::{AppState, build_router, build_router_from_arc, start};
