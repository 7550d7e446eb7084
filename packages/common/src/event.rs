//! # Event sources
//!
//! A list of subscribed handlers. Broadcasting works on a snapshot of the
//! list, so handlers may subscribe or unsubscribe (or trigger further
//! broadcasts) while an event is being delivered.
//!
//! The handler type is left to the owner: single-threaded document code uses
//! `Rc<dyn Fn(..)>`, the file-system model uses `Arc<dyn Fn(..) + Send + Sync>`.

use std::fmt;

/// Handle returned by [`EventSource::subscribe`].
pub type SubscriptionId = u64;

pub struct EventSource<H: Clone> {
    handlers: Vec<(SubscriptionId, H)>,
    next_id: SubscriptionId,
}

impl<H: Clone> EventSource<H> {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
            next_id: 1,
        }
    }

    /// Register a handler. Handlers run in subscription order.
    pub fn subscribe(&mut self, handler: H) -> SubscriptionId {
        let id = self.next_id;
        self.next_id += 1;
        self.handlers.push((id, handler));
        id
    }

    /// Remove a handler. Returns false if the id was not subscribed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|(handler_id, _)| *handler_id != id);
        self.handlers.len() != before
    }

    /// Copy of the current handler list, to iterate while broadcasting.
    pub fn snapshot(&self) -> Vec<H> {
        self.handlers.iter().map(|(_, handler)| handler.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl<H: Clone> Default for EventSource<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: Clone> fmt::Debug for EventSource<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSource")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}
