//! Common utilities and shared types for souk-rs.
//!
//! This crate provides foundational components used across all souk-rs crates:
//!
//! - **Configuration**: Application settings via [`Config`]
//! - **Error handling**: Unified error types via [`AppError`] and [`AppResult`]
//! - **Events**: Wire-level payloads for the real-time channel
//! - **ID Generation**: ULID-based unique identifiers via [`IdGenerator`]

pub mod config;
pub mod error;
pub mod events;
pub mod id;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use events::{
    ConversationPayload, LiveEvent, MessagePayload, NotificationPayload, OrderStatePayload,
};
pub use id::IdGenerator;
