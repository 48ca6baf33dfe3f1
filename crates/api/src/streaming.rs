//! WebSocket streaming API.
//!
//! Fan-out happens over two in-process broadcast channels: one for
//! conversation rooms (addressed by `chat_id`) and one for personal events
//! (addressed by `user_id`). Delivery is at-most-once; a client that is
//! disconnected at emission time reconciles over REST after reconnecting.

use async_trait::async_trait;
use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use souk_common::{AppResult, LiveEvent};
use souk_core::EventPublisher;
use souk_db::entities::user;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::middleware::AppState;

/// Streaming query parameters.
#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    /// Access token for authentication.
    #[serde(rename = "i")]
    pub token: Option<String>,
}

/// An event addressed to one conversation room.
#[derive(Debug, Clone)]
pub struct RoomEvent {
    pub chat_id: String,
    pub event: LiveEvent,
}

/// An event addressed to one user's personal channel.
#[derive(Debug, Clone)]
pub struct UserEvent {
    pub user_id: String,
    pub event: LiveEvent,
}

/// Stream channel types a client can connect to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StreamChannel {
    /// One conversation's room.
    Chat { chat_id: String },
    /// The personal stream (notifications, cross-chat updates).
    Main,
}

/// Client-to-server message.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", content = "body", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Connect to a channel.
    Connect {
        channel: String,
        id: String,
        #[serde(default)]
        params: serde_json::Value,
    },
    /// Disconnect from a channel.
    Disconnect { id: String },
    /// The client started typing in a chat.
    TypingStart {
        #[serde(rename = "chatId")]
        chat_id: String,
    },
    /// The client stopped typing in a chat.
    TypingStop {
        #[serde(rename = "chatId")]
        chat_id: String,
    },
}

/// Server-to-client message.
#[derive(Debug, Serialize)]
#[serde(tag = "type", content = "body", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Channel connected.
    Connected { id: String },
    /// An event on a connected channel.
    Channel { id: String, event: LiveEvent },
}

/// Shared state for streaming.
#[derive(Clone)]
pub struct StreamingState {
    /// Broadcast sender for conversation-room events.
    pub room_tx: Arc<broadcast::Sender<RoomEvent>>,
    /// Broadcast sender for personal events.
    pub user_tx: Arc<broadcast::Sender<UserEvent>>,
}

impl StreamingState {
    /// Create a new streaming state with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (room_tx, _) = broadcast::channel(capacity);
        let (user_tx, _) = broadcast::channel(capacity);

        Self {
            room_tx: Arc::new(room_tx),
            user_tx: Arc::new(user_tx),
        }
    }

    /// Publish an event to a conversation room.
    ///
    /// A send error only means no receiver is currently connected; the event
    /// is intentionally dropped in that case.
    pub fn publish_to_chat(&self, chat_id: &str, event: LiveEvent) {
        let _ = self.room_tx.send(RoomEvent {
            chat_id: chat_id.to_string(),
            event,
        });
    }

    /// Publish an event to a user's personal channel.
    pub fn publish_to_user(&self, user_id: &str, event: LiveEvent) {
        let _ = self.user_tx.send(UserEvent {
            user_id: user_id.to_string(),
            event,
        });
    }
}

impl Default for StreamingState {
    fn default() -> Self {
        Self::new(1000)
    }
}

/// [`EventPublisher`] implementation over the broadcast channels.
///
/// This is what gets injected into the core services at startup.
#[derive(Clone)]
pub struct ChannelEventPublisher {
    streaming: StreamingState,
}

impl ChannelEventPublisher {
    /// Create a publisher over the given streaming state.
    #[must_use]
    pub const fn new(streaming: StreamingState) -> Self {
        Self { streaming }
    }
}

#[async_trait]
impl EventPublisher for ChannelEventPublisher {
    async fn publish_to_chat(&self, chat_id: &str, event: LiveEvent) -> AppResult<()> {
        self.streaming.publish_to_chat(chat_id, event);
        Ok(())
    }

    async fn publish_to_user(&self, user_id: &str, event: LiveEvent) -> AppResult<()> {
        self.streaming.publish_to_user(user_id, event);
        Ok(())
    }
}

/// WebSocket handler for streaming.
pub async fn streaming_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<StreamQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    info!("New streaming connection");

    ws.on_upgrade(move |socket| handle_socket(socket, query, state))
}

/// Handle a WebSocket connection.
async fn handle_socket(socket: WebSocket, query: StreamQuery, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    // The stream is personal; an anonymous socket has nothing to receive.
    let user = match &query.token {
        Some(token) => match state.user_repo.find_by_token(token).await {
            Ok(Some(u)) => u,
            Ok(None) | Err(_) => {
                warn!("Streaming auth failed");
                let _ = sender.close().await;
                return;
            }
        },
        None => {
            warn!("Streaming connection without token");
            let _ = sender.close().await;
            return;
        }
    };

    info!(user_id = %user.id, "Streaming connection established");

    let mut room_rx = state.streaming.room_tx.subscribe();
    let mut user_rx = state.streaming.user_tx.subscribe();

    // Channels this socket has connected to, by client-chosen connection ID.
    let mut connected: HashMap<String, StreamChannel> = HashMap::new();

    loop {
        tokio::select! {
            Some(msg) = receiver.next() => {
                match msg {
                    Ok(Message::Text(text)) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(client_msg) => {
                                if let Some(response) = handle_client_message(
                                    client_msg,
                                    &mut connected,
                                    &user,
                                    &state,
                                ).await {
                                    let json = serde_json::to_string(&response).unwrap_or_default();
                                    if sender.send(Message::Text(json.into())).await.is_err() {
                                        break;
                                    }
                                }
                            }
                            Err(e) => {
                                warn!("Failed to parse client message: {}", e);
                            }
                        }
                    }
                    Ok(Message::Close(_)) => {
                        info!("Client closed connection");
                        break;
                    }
                    Ok(Message::Ping(data)) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!("WebSocket error: {}", e);
                        break;
                    }
                }
            }

            Ok(room_event) = room_rx.recv() => {
                for (conn_id, channel) in &connected {
                    if let StreamChannel::Chat { chat_id } = channel
                        && *chat_id == room_event.chat_id {
                            let msg = ServerMessage::Channel {
                                id: conn_id.clone(),
                                event: room_event.event.clone(),
                            };
                            let json = serde_json::to_string(&msg).unwrap_or_default();
                            if sender.send(Message::Text(json.into())).await.is_err() {
                                return;
                            }
                        }
                }
            }

            Ok(user_event) = user_rx.recv() => {
                if user_event.user_id == user.id
                    && let Some(conn_id) = find_channel_id(&connected, &StreamChannel::Main) {
                        let msg = ServerMessage::Channel {
                            id: conn_id,
                            event: user_event.event,
                        };
                        let json = serde_json::to_string(&msg).unwrap_or_default();
                        if sender.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
            }
        }
    }

    info!(user_id = %user.id, "Streaming connection closed");
}

/// Handle a client message.
async fn handle_client_message(
    msg: ClientMessage,
    connected: &mut HashMap<String, StreamChannel>,
    user: &user::Model,
    state: &AppState,
) -> Option<ServerMessage> {
    match msg {
        ClientMessage::Connect {
            channel,
            id,
            params,
        } => {
            let stream_channel = match channel.as_str() {
                "main" => StreamChannel::Main,
                "chat" => {
                    let chat_id = params
                        .get("chatId")
                        .and_then(|v| v.as_str())
                        .map(String::from)?;

                    // Participants and admins only; strangers are silently
                    // refused, which leaks no existence information.
                    match state.conversation_service.can_observe(&chat_id, user).await {
                        Ok(true) => StreamChannel::Chat { chat_id },
                        Ok(false) => {
                            warn!(user_id = %user.id, "Room connect refused");
                            return None;
                        }
                        Err(e) => {
                            warn!(error = %e, "Room membership check failed");
                            return None;
                        }
                    }
                }
                _ => {
                    warn!("Unknown channel: {}", channel);
                    return None;
                }
            };

            connected.insert(id.clone(), stream_channel);
            info!(id = %id, "Channel connected");

            Some(ServerMessage::Connected { id })
        }
        ClientMessage::Disconnect { id } => {
            connected.remove(&id);
            info!(id = %id, "Channel disconnected");
            None
        }
        ClientMessage::TypingStart { chat_id } => {
            relay_typing(connected, user, state, chat_id, true);
            None
        }
        ClientMessage::TypingStop { chat_id } => {
            relay_typing(connected, user, state, chat_id, false);
            None
        }
    }
}

/// Relay a typing indicator to the room, never persisting it.
///
/// Requires the sender to have joined the room first, which carries the
/// membership check done at connect time.
fn relay_typing(
    connected: &HashMap<String, StreamChannel>,
    user: &user::Model,
    state: &AppState,
    chat_id: String,
    start: bool,
) {
    let joined = connected
        .values()
        .any(|c| matches!(c, StreamChannel::Chat { chat_id: id } if *id == chat_id));
    if !joined {
        warn!(user_id = %user.id, "Typing relay for unjoined room dropped");
        return;
    }

    let event = if start {
        LiveEvent::TypingStart {
            chat_id: chat_id.clone(),
            user_id: user.id.clone(),
        }
    } else {
        LiveEvent::TypingStop {
            chat_id: chat_id.clone(),
            user_id: user.id.clone(),
        }
    };

    state.streaming.publish_to_chat(&chat_id, event);
}

/// Find the connection ID for a given stream channel.
fn find_channel_id(
    channels: &HashMap<String, StreamChannel>,
    target: &StreamChannel,
) -> Option<String> {
    channels
        .iter()
        .find(|(_, v)| *v == target)
        .map(|(k, _)| k.clone())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn message_event(chat_id: &str) -> LiveEvent {
        LiveEvent::MessageCreated {
            chat_id: chat_id.to_string(),
            message: souk_common::MessagePayload {
                id: "m1".to_string(),
                chat_id: chat_id.to_string(),
                sender_id: "buyer".to_string(),
                receiver_id: "seller".to_string(),
                content: "hello".to_string(),
                message_type: "text".to_string(),
                is_read: false,
                created_at: chrono::Utc::now(),
            },
        }
    }

    #[tokio::test]
    async fn room_events_reach_every_subscriber() {
        let streaming = StreamingState::new(16);
        let mut rx_a = streaming.room_tx.subscribe();
        let mut rx_b = streaming.room_tx.subscribe();

        streaming.publish_to_chat("c1", message_event("c1"));

        let got_a = rx_a.recv().await.unwrap();
        let got_b = rx_b.recv().await.unwrap();
        assert_eq!(got_a.chat_id, "c1");
        assert_eq!(got_b.chat_id, "c1");
        assert_eq!(got_a.event.room(), Some("c1"));
    }

    #[tokio::test]
    async fn personal_events_carry_the_recipient() {
        let streaming = StreamingState::new(16);
        let mut rx = streaming.user_tx.subscribe();

        streaming.publish_to_user(
            "buyer",
            LiveEvent::NotificationsCleared { unread_count: 0 },
        );

        let got = rx.recv().await.unwrap();
        assert_eq!(got.user_id, "buyer");
        assert_eq!(got.event.room(), None);
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_not_an_error() {
        let streaming = StreamingState::new(16);
        let publisher = ChannelEventPublisher::new(streaming);

        publisher
            .publish_to_chat("c1", message_event("c1"))
            .await
            .unwrap();
        publisher
            .publish_to_user("buyer", LiveEvent::NotificationsCleared { unread_count: 0 })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn exactly_one_room_event_per_publish() {
        let streaming = StreamingState::new(16);
        let mut rx = streaming.room_tx.subscribe();

        streaming.publish_to_chat("c1", message_event("c1"));

        rx.recv().await.unwrap();
        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[test]
    fn server_message_wire_shape() {
        let msg = ServerMessage::Channel {
            id: "conn-1".to_string(),
            event: LiveEvent::TypingStart {
                chat_id: "c1".to_string(),
                user_id: "buyer".to_string(),
            },
        };

        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"channel\""));
        assert!(json.contains("\"type\":\"typing-start\""));
        assert!(json.contains("\"chatId\":\"c1\""));
    }

    #[test]
    fn client_message_parses_chat_connect() {
        let json = r#"{"type":"connect","body":{"channel":"chat","id":"conn-1","params":{"chatId":"c1"}}}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        assert!(matches!(msg, ClientMessage::Connect { channel, .. } if channel == "chat"));
    }
}
