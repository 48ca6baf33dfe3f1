//! Client-side synchronization for souk-rs.
//!
//! The server's live channel is at-most-once and non-durable, so every
//! client keeps a local cache and reconciles it against authoritative REST
//! fetches. This crate is that reconciler: optimistic sends matched back by
//! correlation ID, wholesale order-snapshot replacement, stale-marking on
//! reconnect, and optimistic notification mutations with rollback.
//!
//! All state hangs off an explicit [`Session`]; there are no ambient
//! globals, so two accounts in one process cannot bleed into each other.

pub mod client;
pub mod subscription;
pub mod views;

pub use client::{Session, SyncClient};
pub use subscription::Subscription;
pub use views::{ChatView, LocalMessage, NotificationCache, RollbackToken};
