//! HTTP API handlers for apm-session
//!
//! REST actions on the running session plus an SSE stream of session events.

pub mod health;
pub mod session;
pub mod sse;

pub use health::health_routes;
pub use session::session_routes;
pub use sse::event_stream;
