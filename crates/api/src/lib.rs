//! HTTP API layer for souk-rs.
//!
//! This crate provides the REST API and real-time streaming:
//!
//! - **Endpoints**: conversation/order and notification APIs
//! - **Extractors**: Authentication
//! - **Middleware**: Token resolution, application state
//! - **Streaming**: WebSocket rooms and personal channels
//!
//! Built on Axum 0.8 with Tower middleware stack.

pub mod endpoints;
pub mod extractors;
pub mod middleware;
pub mod response;
pub mod streaming;

pub use endpoints::router;
pub use streaming::{ChannelEventPublisher, StreamingState, streaming_handler};
