//! Per-event handler registry.
//!
//! Handlers are keyed by event name and identified by a [`ListenerId`], so
//! removing one handler never disturbs another registered for the same event.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

/// Callback invoked with the event's data argument.
pub type Handler = Arc<dyn Fn(&Value) + Send + Sync>;

/// Identity of one registered handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
pub struct ListenerRegistry {
    next_id: u64,
    by_event: HashMap<String, Vec<(ListenerId, Handler)>>,
}

impl ListenerRegistry {
    pub fn add(&mut self, event: &str, handler: Handler) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.by_event.entry(event.to_owned()).or_default().push((id, handler));
        id
    }

    /// Remove exactly the handler registered as `id`. Returns whether it was
    /// present.
    pub fn remove(&mut self, event: &str, id: ListenerId) -> bool {
        let Some(handlers) = self.by_event.get_mut(event) else {
            return false;
        };
        let before = handlers.len();
        handlers.retain(|(existing, _)| *existing != id);
        let removed = handlers.len() != before;
        if handlers.is_empty() {
            self.by_event.remove(event);
        }
        removed
    }

    /// Handlers for `event` in registration order.
    #[must_use]
    pub fn handlers(&self, event: &str) -> Vec<Handler> {
        self.by_event
            .get(event)
            .map(|handlers| handlers.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn count(&self, event: &str) -> usize {
        self.by_event.get(event).map_or(0, Vec::len)
    }
}

#[cfg(test)]
#[path = "listeners_test.rs"]
mod tests;
