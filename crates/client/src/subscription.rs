//! Event subscription handles.

use souk_common::LiveEvent;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

type Callback = Box<dyn Fn(&LiveEvent) + Send>;
type Registry = Arc<Mutex<HashMap<u64, Callback>>>;

/// Listener registry shared between the client and its subscriptions.
#[derive(Clone, Default)]
pub(crate) struct ListenerRegistry {
    listeners: Registry,
    next_id: Arc<Mutex<u64>>,
}

impl ListenerRegistry {
    pub(crate) fn register(&self, callback: Callback) -> Subscription {
        let id = {
            let mut next = self
                .next_id
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            *next += 1;
            *next
        };

        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, callback);

        Subscription {
            id,
            listeners: Arc::clone(&self.listeners),
        }
    }

    pub(crate) fn emit(&self, event: &LiveEvent) {
        let listeners = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for callback in listeners.values() {
            callback(event);
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Handle for a registered event callback.
///
/// Dropping the handle deregisters the callback, so a view that subscribes
/// on mount and is remounted never accumulates duplicate handlers.
pub struct Subscription {
    id: u64,
    listeners: Registry,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}
