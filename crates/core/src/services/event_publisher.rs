//! Event publisher abstraction.
//!
//! Core services publish live events through this trait without depending on
//! the transport. The api crate provides the broadcast-channel
//! implementation; tests use [`NoOpEventPublisher`]. Delivery is
//! at-most-once: a publish failure is logged by the caller and never rolls
//! back the committed mutation.

use async_trait::async_trait;
use souk_common::{AppResult, LiveEvent};
use std::sync::Arc;

/// Trait for publishing real-time events.
///
/// Two addressing scopes: a conversation room reaches every connected
/// participant of one chat; a personal channel reaches one user across all
/// of their connections.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish an event to a conversation room.
    async fn publish_to_chat(&self, chat_id: &str, event: LiveEvent) -> AppResult<()>;

    /// Publish an event to a user's personal channel.
    async fn publish_to_user(&self, user_id: &str, event: LiveEvent) -> AppResult<()>;
}

/// A no-op implementation for tests or when real-time delivery is disabled.
#[derive(Clone, Default)]
pub struct NoOpEventPublisher;

#[async_trait]
impl EventPublisher for NoOpEventPublisher {
    async fn publish_to_chat(&self, _chat_id: &str, _event: LiveEvent) -> AppResult<()> {
        Ok(())
    }

    async fn publish_to_user(&self, _user_id: &str, _event: LiveEvent) -> AppResult<()> {
        Ok(())
    }
}

/// Wrapper for boxed `EventPublisher` trait object.
pub type EventPublisherService = Arc<dyn EventPublisher>;
