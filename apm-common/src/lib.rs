//! # APM Common Library
//!
//! Shared code for the APM assessment services including:
//! - Error types
//! - Configuration loading (TOML bootstrap + compiled defaults)
//! - Event types (SessionEvent enum) and the EventBus
//! - SSE helpers for streaming events to presentation clients

pub mod config;
pub mod error;
pub mod events;
pub mod sse;

pub use error::{Error, Result};
