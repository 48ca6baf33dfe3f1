//! Local cache structures for one session.

use souk_common::{MessagePayload, NotificationPayload, OrderStatePayload};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// A message in the local cache.
///
/// Optimistic sends carry a correlation ID until the server acknowledges
/// them; acknowledged and received messages carry the server row.
#[derive(Debug, Clone)]
pub struct LocalMessage {
    pub message: MessagePayload,
    /// Set while the send is unacknowledged.
    pub correlation_id: Option<String>,
}

impl LocalMessage {
    /// Whether this message is still awaiting server acknowledgement.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.correlation_id.is_some()
    }
}

/// Cached view of one conversation.
#[derive(Debug, Default)]
pub struct ChatView {
    pub messages: Vec<LocalMessage>,
    /// Order snapshot; replaced wholesale, never field-merged.
    pub order: Option<OrderStatePayload>,
    /// Set when the cache may have missed events and needs a refetch.
    pub stale: bool,
    typing_deadlines: HashMap<String, Instant>,
}

impl ChatView {
    /// Whether a server message with this ID is already cached.
    #[must_use]
    pub fn contains_server_id(&self, id: &str) -> bool {
        self.messages
            .iter()
            .any(|m| !m.is_pending() && m.message.id == id)
    }

    /// Record a typing indicator, expiring after `ttl`.
    pub fn typing_started(&mut self, user_id: &str, ttl: Duration) {
        self.typing_deadlines
            .insert(user_id.to_string(), Instant::now() + ttl);
    }

    /// Clear a typing indicator.
    pub fn typing_stopped(&mut self, user_id: &str) {
        self.typing_deadlines.remove(user_id);
    }

    /// Users currently typing, pruning expired indicators.
    ///
    /// A `typing-stop` lost on the wire must not leave a stuck indicator,
    /// hence the deadline.
    pub fn typing_users(&mut self) -> Vec<String> {
        let now = Instant::now();
        self.typing_deadlines.retain(|_, deadline| now < *deadline);
        let mut users: Vec<String> = self.typing_deadlines.keys().cloned().collect();
        users.sort();
        users
    }
}

/// Token that can restore a notification mutated optimistically.
#[derive(Debug)]
pub struct RollbackToken {
    pub(crate) prior: NotificationPayload,
    pub(crate) prior_unread: u64,
    pub(crate) index: usize,
    pub(crate) deleted: bool,
}

/// Cached notification list with its derived unread count.
#[derive(Debug, Default)]
pub struct NotificationCache {
    pub entries: Vec<NotificationPayload>,
    pub unread_count: u64,
}

impl NotificationCache {
    /// Replace the cache from an authoritative fetch.
    pub fn replace(&mut self, entries: Vec<NotificationPayload>, unread_count: u64) {
        self.entries = entries;
        self.unread_count = unread_count;
    }

    /// Prepend a freshly announced notification, ignoring duplicates.
    pub fn insert(&mut self, notification: NotificationPayload) {
        if self.entries.iter().any(|n| n.id == notification.id) {
            return;
        }
        if !notification.is_read {
            self.unread_count += 1;
        }
        self.entries.insert(0, notification);
    }

    /// Optimistically mark an entry read. Returns a rollback token, or
    /// `None` when the entry is unknown or already read.
    pub fn mark_read_optimistic(&mut self, id: &str) -> Option<RollbackToken> {
        let index = self.entries.iter().position(|n| n.id == id)?;
        if self.entries[index].is_read {
            return None;
        }

        let token = RollbackToken {
            prior: self.entries[index].clone(),
            prior_unread: self.unread_count,
            index,
            deleted: false,
        };

        self.entries[index].is_read = true;
        self.unread_count = self.unread_count.saturating_sub(1);
        Some(token)
    }

    /// Optimistically delete an entry. Returns a rollback token, or `None`
    /// when the entry is unknown.
    pub fn delete_optimistic(&mut self, id: &str) -> Option<RollbackToken> {
        let index = self.entries.iter().position(|n| n.id == id)?;
        let prior = self.entries.remove(index);

        let token = RollbackToken {
            prior_unread: self.unread_count,
            index,
            deleted: true,
            prior,
        };

        if !token.prior.is_read {
            self.unread_count = self.unread_count.saturating_sub(1);
        }
        Some(token)
    }

    /// Restore the state captured in a rollback token after a server error.
    pub fn rollback(&mut self, token: RollbackToken) {
        if token.deleted {
            let index = token.index.min(self.entries.len());
            self.entries.insert(index, token.prior);
        } else if let Some(entry) = self.entries.iter_mut().find(|n| n.id == token.prior.id) {
            *entry = token.prior;
        }
        self.unread_count = token.prior_unread;
    }

    /// Apply a server-side `notification-updated` event.
    pub fn apply_update(&mut self, id: &str, read: Option<bool>, deleted: bool, unread_count: u64) {
        if deleted {
            self.entries.retain(|n| n.id != id);
        } else if let Some(read) = read
            && let Some(entry) = self.entries.iter_mut().find(|n| n.id == id)
        {
            entry.is_read = read;
        }
        // The server recomputes the count from rows; always trust it.
        self.unread_count = unread_count;
    }

    /// Apply a server-side `notifications-cleared` event.
    pub fn apply_cleared(&mut self, unread_count: u64) {
        self.entries.clear();
        self.unread_count = unread_count;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn notification(id: &str, read: bool) -> NotificationPayload {
        NotificationPayload {
            id: id.to_string(),
            user_id: "me".to_string(),
            notification_type: "message_received".to_string(),
            title: "New message".to_string(),
            body: "You have a new message".to_string(),
            action_url: None,
            is_read: read,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn mark_read_rolls_back_exactly() {
        let mut cache = NotificationCache::default();
        cache.replace(vec![notification("n1", false)], 1);

        let token = cache.mark_read_optimistic("n1").unwrap();
        assert!(cache.entries[0].is_read);
        assert_eq!(cache.unread_count, 0);

        cache.rollback(token);
        assert!(!cache.entries[0].is_read);
        assert_eq!(cache.unread_count, 1);
    }

    #[test]
    fn mark_read_noop_when_already_read() {
        let mut cache = NotificationCache::default();
        cache.replace(vec![notification("n1", true)], 0);
        assert!(cache.mark_read_optimistic("n1").is_none());
    }

    #[test]
    fn delete_rolls_back_at_original_position() {
        let mut cache = NotificationCache::default();
        cache.replace(vec![notification("n1", false), notification("n2", false)], 2);

        let token = cache.delete_optimistic("n1").unwrap();
        assert_eq!(cache.entries.len(), 1);
        assert_eq!(cache.unread_count, 1);

        cache.rollback(token);
        assert_eq!(cache.entries[0].id, "n1");
        assert_eq!(cache.unread_count, 2);
    }

    #[test]
    fn server_update_overrides_local_count() {
        let mut cache = NotificationCache::default();
        cache.replace(vec![notification("n1", false)], 1);

        cache.apply_update("n1", Some(true), false, 5);
        assert!(cache.entries[0].is_read);
        assert_eq!(cache.unread_count, 5);
    }

    #[test]
    fn duplicate_insert_is_ignored() {
        let mut cache = NotificationCache::default();
        cache.insert(notification("n1", false));
        cache.insert(notification("n1", false));
        assert_eq!(cache.entries.len(), 1);
        assert_eq!(cache.unread_count, 1);
    }

    #[test]
    fn typing_indicator_expires() {
        let mut view = ChatView::default();
        view.typing_started("seller", Duration::from_secs(60));
        assert_eq!(view.typing_users(), vec!["seller".to_string()]);

        view.typing_started("seller", Duration::ZERO);
        assert!(view.typing_users().is_empty());
    }

    #[test]
    fn typing_stop_clears_immediately() {
        let mut view = ChatView::default();
        view.typing_started("seller", Duration::from_secs(60));
        view.typing_stopped("seller");
        assert!(view.typing_users().is_empty());
    }
}
