//! The synchronization client.

use crate::subscription::ListenerRegistry;
use crate::views::{ChatView, LocalMessage, NotificationCache, RollbackToken};
use chrono::Utc;
use souk_common::{
    ConversationPayload, IdGenerator, LiveEvent, MessagePayload, NotificationPayload,
    OrderStatePayload,
};
use crate::Subscription;
use std::collections::HashMap;
use std::time::Duration;

/// The identity all cached state belongs to.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: String,
}

impl Session {
    /// Create a session for a user.
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

const DEFAULT_TYPING_TTL: Duration = Duration::from_millis(1200);

/// Client-side cache and reconciler for one session.
///
/// REST fetches are authoritative and replace cached state wholesale; live
/// events patch the cache in between. Anything that might have been missed
/// while disconnected is handled by marking chats stale and refetching,
/// never by replaying events.
pub struct SyncClient {
    session: Session,
    chats: HashMap<String, ChatView>,
    notifications: NotificationCache,
    connected: bool,
    listeners: ListenerRegistry,
    id_gen: IdGenerator,
    typing_ttl: Duration,
}

impl SyncClient {
    /// Create a client for the given session.
    #[must_use]
    pub fn new(session: Session) -> Self {
        Self {
            session,
            chats: HashMap::new(),
            notifications: NotificationCache::default(),
            connected: false,
            listeners: ListenerRegistry::default(),
            id_gen: IdGenerator::new(),
            typing_ttl: DEFAULT_TYPING_TTL,
        }
    }

    /// Override the typing-indicator expiry.
    #[must_use]
    pub const fn with_typing_ttl(mut self, ttl: Duration) -> Self {
        self.typing_ttl = ttl;
        self
    }

    /// The session this cache belongs to.
    #[must_use]
    pub const fn session(&self) -> &Session {
        &self.session
    }

    /// Cached view of a conversation, if any.
    #[must_use]
    pub fn chat(&self, chat_id: &str) -> Option<&ChatView> {
        self.chats.get(chat_id)
    }

    /// Mutable cached view of a conversation (for typing queries).
    pub fn chat_mut(&mut self, chat_id: &str) -> Option<&mut ChatView> {
        self.chats.get_mut(chat_id)
    }

    /// The cached notification list.
    #[must_use]
    pub const fn notifications(&self) -> &NotificationCache {
        &self.notifications
    }

    /// Whether the live channel is currently believed connected.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.connected
    }

    /// Register a callback for every applied live event.
    ///
    /// The returned guard deregisters on drop; keep it alive as long as the
    /// callback should fire.
    #[must_use = "dropping the subscription deregisters the callback"]
    pub fn subscribe(&self, callback: impl Fn(&LiveEvent) + Send + 'static) -> Subscription {
        self.listeners.register(Box::new(callback))
    }

    // --- REST reconciliation -------------------------------------------

    /// Replace a conversation's cache from an authoritative fetch.
    ///
    /// Fetched rows win wholesale; only still-pending optimistic sends are
    /// carried over, since the server does not know them yet.
    pub fn replace_history(
        &mut self,
        chat_id: &str,
        messages: Vec<MessagePayload>,
        order: Option<OrderStatePayload>,
    ) {
        let view = self.chats.entry(chat_id.to_string()).or_default();

        let pending: Vec<LocalMessage> = view
            .messages
            .drain(..)
            .filter(LocalMessage::is_pending)
            .collect();

        view.messages = messages
            .into_iter()
            .map(|message| LocalMessage {
                message,
                correlation_id: None,
            })
            .collect();
        view.messages.extend(pending);
        view.order = order;
        view.stale = false;
    }

    /// Replace the notification cache from an authoritative fetch.
    pub fn replace_notifications(
        &mut self,
        entries: Vec<NotificationPayload>,
        unread_count: u64,
    ) {
        self.notifications.replace(entries, unread_count);
    }

    // --- Optimistic sends ----------------------------------------------

    /// Append a message locally before the server round-trip.
    ///
    /// Returns the correlation ID to pass to [`Self::ack_send`] once the
    /// server responds. The acknowledgement is matched by this ID, never by
    /// content, so identical texts sent twice stay distinct.
    pub fn send_optimistic(
        &mut self,
        chat_id: &str,
        content: impl Into<String>,
        message_type: impl Into<String>,
    ) -> String {
        let correlation_id = self.id_gen.generate_correlation();
        let view = self.chats.entry(chat_id.to_string()).or_default();

        let receiver_id = view
            .messages
            .first()
            .map(|m| {
                if m.message.sender_id == self.session.user_id {
                    m.message.receiver_id.clone()
                } else {
                    m.message.sender_id.clone()
                }
            })
            .unwrap_or_default();

        view.messages.push(LocalMessage {
            message: MessagePayload {
                id: correlation_id.clone(),
                chat_id: chat_id.to_string(),
                sender_id: self.session.user_id.clone(),
                receiver_id,
                content: content.into(),
                message_type: message_type.into(),
                is_read: false,
                created_at: Utc::now(),
            },
            correlation_id: Some(correlation_id.clone()),
        });

        correlation_id
    }

    /// Swap an optimistic message for the server's row.
    ///
    /// Returns `false` when no pending message matches the correlation ID
    /// (already acknowledged, or rolled back by a refetch).
    pub fn ack_send(&mut self, correlation_id: &str, server_message: MessagePayload) -> bool {
        let Some(view) = self.chats.get_mut(&server_message.chat_id) else {
            return false;
        };

        let Some(index) = view
            .messages
            .iter()
            .position(|m| m.correlation_id.as_deref() == Some(correlation_id))
        else {
            return false;
        };

        if view.contains_server_id(&server_message.id) {
            // The room event beat the acknowledgement; drop the duplicate.
            view.messages.remove(index);
            return true;
        }

        view.messages[index] = LocalMessage {
            message: server_message,
            correlation_id: None,
        };
        true
    }

    /// Drop an optimistic message whose send failed.
    pub fn rollback_send(&mut self, chat_id: &str, correlation_id: &str) {
        if let Some(view) = self.chats.get_mut(chat_id) {
            view.messages
                .retain(|m| m.correlation_id.as_deref() != Some(correlation_id));
        }
    }

    // --- Live events ---------------------------------------------------

    /// Apply one live event to the cache, then fan it out to subscribers.
    pub fn apply_event(&mut self, event: &LiveEvent) {
        match event {
            LiveEvent::MessageCreated { chat_id, message } => {
                // Own sends arrive through ack_send; applying them here too
                // would double every sent message.
                if message.sender_id != self.session.user_id {
                    let view = self.chats.entry(chat_id.clone()).or_default();
                    if !view.contains_server_id(&message.id) {
                        view.messages.push(LocalMessage {
                            message: message.clone(),
                            correlation_id: None,
                        });
                    }
                }
            }
            LiveEvent::TypingStart { chat_id, user_id } => {
                if *user_id != self.session.user_id {
                    let ttl = self.typing_ttl;
                    self.chats
                        .entry(chat_id.clone())
                        .or_default()
                        .typing_started(user_id, ttl);
                }
            }
            LiveEvent::TypingStop { chat_id, user_id } => {
                if let Some(view) = self.chats.get_mut(chat_id) {
                    view.typing_stopped(user_id);
                }
            }
            LiveEvent::OrderStateChanged(snapshot) => {
                // Wholesale replacement; merging fields could resurrect a
                // stale flag when events arrive out of order.
                self.chats
                    .entry(snapshot.chat_id.clone())
                    .or_default()
                    .order = Some(snapshot.clone());
            }
            LiveEvent::ChatUpdated {
                chat_id,
                conversation,
            } => {
                let view = self.chats.entry(chat_id.clone()).or_default();
                view.order = Some(order_snapshot_of(conversation));
                // Deletes may have purged history; refetch before trusting it.
                view.stale = true;
            }
            LiveEvent::NotificationCreated { notification } => {
                self.notifications.insert(notification.clone());
            }
            LiveEvent::NotificationUpdated {
                notification_id,
                read,
                deleted,
                unread_count,
            } => {
                self.notifications
                    .apply_update(notification_id, *read, *deleted, *unread_count);
            }
            LiveEvent::NotificationsCleared { unread_count } => {
                self.notifications.apply_cleared(*unread_count);
            }
        }

        self.listeners.emit(event);
    }

    // --- Connectivity --------------------------------------------------

    /// Note that the live channel dropped.
    pub fn on_disconnect(&mut self) {
        self.connected = false;
    }

    /// Note that the live channel is back.
    ///
    /// Every open conversation is marked stale: events emitted while away
    /// are gone for good, so the caller must refetch via
    /// [`Self::stale_chats`] rather than wait for a replay.
    pub fn on_reconnect(&mut self) {
        self.connected = true;
        for view in self.chats.values_mut() {
            view.stale = true;
        }
    }

    /// Conversations whose cache needs an authoritative refetch.
    #[must_use]
    pub fn stale_chats(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .chats
            .iter()
            .filter(|(_, view)| view.stale)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    // --- Optimistic notification mutations -----------------------------

    /// Optimistically mark a notification read.
    pub fn mark_read_optimistic(&mut self, notification_id: &str) -> Option<RollbackToken> {
        self.notifications.mark_read_optimistic(notification_id)
    }

    /// Optimistically delete a notification.
    pub fn delete_optimistic(&mut self, notification_id: &str) -> Option<RollbackToken> {
        self.notifications.delete_optimistic(notification_id)
    }

    /// Undo an optimistic notification mutation after a server error.
    pub fn rollback(&mut self, token: RollbackToken) {
        self.notifications.rollback(token);
    }

    /// Drop all cached state (logout).
    pub fn reset(&mut self) {
        self.chats.clear();
        self.notifications = NotificationCache::default();
        self.connected = false;
    }
}

fn order_snapshot_of(conversation: &ConversationPayload) -> OrderStatePayload {
    OrderStatePayload {
        chat_id: conversation.id.clone(),
        order_id: conversation.order_id.clone(),
        order_confirmed: conversation.order_confirmed,
        order_confirmed_at: conversation.order_confirmed_at,
        order_completed: conversation.order_completed,
        completed_at: conversation.completed_at,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn server_message(id: &str, chat_id: &str, sender: &str, content: &str) -> MessagePayload {
        MessagePayload {
            id: id.to_string(),
            chat_id: chat_id.to_string(),
            sender_id: sender.to_string(),
            receiver_id: if sender == "me" { "seller" } else { "me" }.to_string(),
            content: content.to_string(),
            message_type: "text".to_string(),
            is_read: false,
            created_at: Utc::now(),
        }
    }

    fn snapshot(chat_id: &str, confirmed: bool, completed: bool) -> OrderStatePayload {
        OrderStatePayload {
            chat_id: chat_id.to_string(),
            order_id: Some("o1".to_string()),
            order_confirmed: confirmed,
            order_confirmed_at: None,
            order_completed: completed,
            completed_at: None,
        }
    }

    #[test]
    fn ack_matches_by_correlation_not_content() {
        let mut client = SyncClient::new(Session::new("me"));

        // Two identical texts in flight at once.
        let c1 = client.send_optimistic("chat", "hello", "text");
        let c2 = client.send_optimistic("chat", "hello", "text");

        client.ack_send(&c2, server_message("m2", "chat", "me", "hello"));

        let view = client.chat("chat").unwrap();
        assert_eq!(view.messages.len(), 2);
        assert_eq!(view.messages[0].correlation_id.as_deref(), Some(c1.as_str()));
        assert!(!view.messages[1].is_pending());
        assert_eq!(view.messages[1].message.id, "m2");
    }

    #[test]
    fn own_message_event_is_not_double_applied() {
        let mut client = SyncClient::new(Session::new("me"));

        let correlation = client.send_optimistic("chat", "hi", "text");
        let server = server_message("m1", "chat", "me", "hi");

        // Ack first, then the room event echoes the same message.
        assert!(client.ack_send(&correlation, server.clone()));
        client.apply_event(&LiveEvent::MessageCreated {
            chat_id: "chat".to_string(),
            message: server,
        });

        assert_eq!(client.chat("chat").unwrap().messages.len(), 1);
    }

    #[test]
    fn room_event_before_ack_leaves_single_copy() {
        let mut client = SyncClient::new(Session::new("me"));

        let correlation = client.send_optimistic("chat", "hi", "text");
        let server = server_message("m1", "chat", "seller", "reply");
        client.apply_event(&LiveEvent::MessageCreated {
            chat_id: "chat".to_string(),
            message: server.clone(),
        });

        // A duplicate of the same server row is ignored.
        client.apply_event(&LiveEvent::MessageCreated {
            chat_id: "chat".to_string(),
            message: server,
        });

        let own = server_message("m2", "chat", "me", "hi");
        assert!(client.ack_send(&correlation, own));

        let view = client.chat("chat").unwrap();
        assert_eq!(view.messages.len(), 2);
        assert!(view.messages.iter().all(|m| !m.is_pending()));
    }

    #[test]
    fn order_snapshot_replaces_wholesale() {
        let mut client = SyncClient::new(Session::new("me"));

        client.apply_event(&LiveEvent::OrderStateChanged(snapshot("chat", true, true)));
        // A late-arriving older snapshot still replaces; nothing is merged.
        client.apply_event(&LiveEvent::OrderStateChanged(snapshot("chat", true, false)));

        let order = client.chat("chat").unwrap().order.as_ref().unwrap();
        assert!(order.order_confirmed);
        assert!(!order.order_completed);
    }

    #[test]
    fn reconnect_marks_chats_stale_and_refetch_clears() {
        let mut client = SyncClient::new(Session::new("me"));
        client.replace_history("a", vec![server_message("m1", "a", "seller", "x")], None);
        client.replace_history("b", vec![], None);

        client.on_disconnect();
        client.on_reconnect();
        assert_eq!(client.stale_chats(), vec!["a".to_string(), "b".to_string()]);

        // Refetch returns overlapping history; the cache ends up with
        // exactly the fetched rows, no duplicates.
        client.replace_history(
            "a",
            vec![
                server_message("m1", "a", "seller", "x"),
                server_message("m2", "a", "seller", "y"),
            ],
            Some(snapshot("a", true, false)),
        );
        assert_eq!(client.stale_chats(), vec!["b".to_string()]);
        assert_eq!(client.chat("a").unwrap().messages.len(), 2);
    }

    #[test]
    fn refetch_keeps_pending_sends() {
        let mut client = SyncClient::new(Session::new("me"));
        let correlation = client.send_optimistic("chat", "hi", "text");

        client.replace_history("chat", vec![server_message("m1", "chat", "seller", "x")], None);

        let view = client.chat("chat").unwrap();
        assert_eq!(view.messages.len(), 2);
        assert_eq!(
            view.messages[1].correlation_id.as_deref(),
            Some(correlation.as_str())
        );
    }

    #[test]
    fn failed_send_rolls_back() {
        let mut client = SyncClient::new(Session::new("me"));
        let correlation = client.send_optimistic("chat", "hi", "text");

        client.rollback_send("chat", &correlation);
        assert!(client.chat("chat").unwrap().messages.is_empty());
    }

    #[test]
    fn notification_events_update_cache() {
        let mut client = SyncClient::new(Session::new("me"));

        client.apply_event(&LiveEvent::NotificationCreated {
            notification: NotificationPayload {
                id: "n1".to_string(),
                user_id: "me".to_string(),
                notification_type: "order_confirmed".to_string(),
                title: "Order confirmed".to_string(),
                body: "The seller confirmed your order".to_string(),
                action_url: None,
                is_read: false,
                created_at: Utc::now(),
            },
        });
        assert_eq!(client.notifications().unread_count, 1);

        client.apply_event(&LiveEvent::NotificationsCleared { unread_count: 0 });
        assert!(client.notifications().entries.is_empty());
        assert_eq!(client.notifications().unread_count, 0);
    }

    #[test]
    fn subscribers_fire_once_per_event_and_drop_cleanly() {
        let mut client = SyncClient::new(Session::new("me"));
        let hits = Arc::new(AtomicUsize::new(0));

        let hits_clone = Arc::clone(&hits);
        let sub = client.subscribe(move |_| {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        });

        client.apply_event(&LiveEvent::NotificationsCleared { unread_count: 0 });
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        drop(sub);
        client.apply_event(&LiveEvent::NotificationsCleared { unread_count: 0 });
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reset_clears_everything() {
        let mut client = SyncClient::new(Session::new("me"));
        client.replace_history("chat", vec![server_message("m1", "chat", "seller", "x")], None);
        client.replace_notifications(vec![], 3);
        client.on_reconnect();

        client.reset();
        assert!(client.chat("chat").is_none());
        assert_eq!(client.notifications().unread_count, 0);
        assert!(!client.is_connected());
    }

    #[test]
    fn typing_from_self_is_ignored() {
        let mut client = SyncClient::new(Session::new("me"));
        client.apply_event(&LiveEvent::TypingStart {
            chat_id: "chat".to_string(),
            user_id: "me".to_string(),
        });
        assert!(client.chat("chat").is_none());
    }
}
