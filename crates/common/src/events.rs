//! Wire-level payloads for the real-time channel.
//!
//! These types define the contract between the server's event fan-out and
//! every connected client, so they live here rather than in the API crate.
//! Delivery over the live channel is at-most-once and non-durable; durability
//! comes from the stored rows, which clients re-fetch on reconnect.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A chat message as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    pub id: String,
    pub chat_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    pub message_type: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// A full conversation snapshot as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationPayload {
    pub id: String,
    pub buyer_id: String,
    pub seller_id: String,
    pub product_id: String,
    pub order_id: Option<String>,
    pub order_confirmed: bool,
    pub order_confirmed_at: Option<DateTime<Utc>>,
    pub order_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub deleted_by_buyer: bool,
    pub deleted_by_seller: bool,
    pub is_active: bool,
    pub updated_at: DateTime<Utc>,
}

/// The order-state portion of a conversation.
///
/// Clients replace their local order state with this payload wholesale;
/// field-by-field merging can resurrect stale flags after a race.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatePayload {
    pub chat_id: String,
    pub order_id: Option<String>,
    pub order_confirmed: bool,
    pub order_confirmed_at: Option<DateTime<Utc>>,
    pub order_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

/// A notification record as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    pub id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub notification_type: String,
    pub title: String,
    pub body: String,
    pub action_url: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// Events delivered over the live channel.
///
/// Room-scoped events go to every connected participant of one conversation;
/// personal events go to a single user across all their connections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "body", rename_all = "kebab-case")]
pub enum LiveEvent {
    /// A message was appended to a conversation. Room-scoped.
    MessageCreated {
        #[serde(rename = "chatId")]
        chat_id: String,
        message: MessagePayload,
    },
    /// A participant started typing. Room-scoped, best-effort, unpersisted.
    TypingStart {
        #[serde(rename = "chatId")]
        chat_id: String,
        #[serde(rename = "userId")]
        user_id: String,
    },
    /// A participant stopped typing. Room-scoped, best-effort, unpersisted.
    TypingStop {
        #[serde(rename = "chatId")]
        chat_id: String,
        #[serde(rename = "userId")]
        user_id: String,
    },
    /// The order state of a conversation changed. Room-scoped.
    OrderStateChanged(OrderStatePayload),
    /// A conversation was refreshed as a whole (delete, purge). Room-scoped.
    ChatUpdated {
        #[serde(rename = "chatId")]
        chat_id: String,
        conversation: ConversationPayload,
    },
    /// A notification was created for the recipient. Personal.
    NotificationCreated { notification: NotificationPayload },
    /// A single notification changed (read / deleted). Personal.
    NotificationUpdated {
        #[serde(rename = "notificationId")]
        notification_id: String,
        read: Option<bool>,
        deleted: bool,
        #[serde(rename = "unreadCount")]
        unread_count: u64,
    },
    /// All notifications were cleared. Personal.
    NotificationsCleared {
        #[serde(rename = "unreadCount")]
        unread_count: u64,
    },
}

impl LiveEvent {
    /// The conversation room this event addresses, if room-scoped.
    #[must_use]
    pub fn room(&self) -> Option<&str> {
        match self {
            Self::MessageCreated { chat_id, .. }
            | Self::TypingStart { chat_id, .. }
            | Self::TypingStop { chat_id, .. }
            | Self::ChatUpdated { chat_id, .. } => Some(chat_id),
            Self::OrderStateChanged(payload) => Some(&payload.chat_id),
            _ => None,
        }
    }
}
