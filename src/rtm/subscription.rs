//! Subscriber bookkeeping.
//!
//! [`EventFilter`] selects event types for an [`crate::domain::EventStream`];
//! [`HandlerRegistry`] holds synchronous callbacks invoked on the
//! frame-processing path, in frame order.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use super::frame::EventFrame;

/// Wildcard accepted by [`EventFilter::from_types`].
pub const WILDCARD: &str = "*";

/// Set of event types a subscriber is interested in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    event_types: HashSet<String>,
    all: bool,
}

impl EventFilter {
    /// A filter matching every event.
    #[must_use]
    pub fn all() -> Self {
        Self {
            event_types: HashSet::new(),
            all: true,
        }
    }

    /// A filter matching the listed types. `"*"` matches everything.
    #[must_use]
    pub fn from_types<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut filter = Self::default();
        for event_type in types {
            filter.add(event_type);
        }
        filter
    }

    /// Adds an event type. `"*"` enables the wildcard.
    pub fn add(&mut self, event_type: impl Into<String>) {
        let event_type = event_type.into();
        if event_type == WILDCARD {
            self.all = true;
        } else {
            self.event_types.insert(event_type);
        }
    }

    /// Removes an event type.
    pub fn remove(&mut self, event_type: &str) {
        self.event_types.remove(event_type);
    }

    /// Returns `true` if events of this type pass the filter.
    #[must_use]
    pub fn matches(&self, event_type: &str) -> bool {
        self.all || self.event_types.contains(event_type)
    }

    /// Number of explicitly listed types.
    #[must_use]
    pub fn count(&self) -> usize {
        self.event_types.len()
    }

    /// Returns `true` if the wildcard is active.
    #[must_use]
    pub fn is_all(&self) -> bool {
        self.all
    }
}

/// Shared synchronous event callback.
pub type EventHandler = Arc<dyn Fn(&EventFrame) + Send + Sync>;

/// Token returned by registration, used to remove a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// Synchronous handlers keyed by event type, plus catch-all handlers.
#[derive(Default)]
pub struct HandlerRegistry {
    next_id: u64,
    by_type: HashMap<String, Vec<(HandlerId, EventHandler)>>,
    any: Vec<(HandlerId, EventHandler)>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for one event type.
    pub fn on(&mut self, event_type: impl Into<String>, handler: EventHandler) -> HandlerId {
        let id = self.issue_id();
        self.by_type
            .entry(event_type.into())
            .or_default()
            .push((id, handler));
        id
    }

    /// Registers a handler for every event.
    pub fn on_any(&mut self, handler: EventHandler) -> HandlerId {
        let id = self.issue_id();
        self.any.push((id, handler));
        id
    }

    /// Removes a handler. Returns `false` if it was not registered.
    pub fn off(&mut self, id: HandlerId) -> bool {
        let before = self.len();
        self.any.retain(|(h, _)| *h != id);
        for handlers in self.by_type.values_mut() {
            handlers.retain(|(h, _)| *h != id);
        }
        self.by_type.retain(|_, handlers| !handlers.is_empty());
        self.len() != before
    }

    /// Handlers to invoke for `event_type`: type-specific ones first, then
    /// catch-all ones, each group in registration order.
    #[must_use]
    pub fn handlers_for(&self, event_type: &str) -> Vec<EventHandler> {
        self.by_type
            .get(event_type)
            .into_iter()
            .flatten()
            .chain(self.any.iter())
            .map(|(_, handler)| Arc::clone(handler))
            .collect()
    }

    /// Total number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.any.len() + self.by_type.values().map(Vec::len).sum::<usize>()
    }

    /// Returns `true` if no handler is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn issue_id(&mut self) -> HandlerId {
        self.next_id += 1;
        HandlerId(self.next_id)
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("event_types", &self.by_type.keys().collect::<Vec<_>>())
            .field("catch_all", &self.any.len())
            .field("total", &self.len())
            .finish()
    }
}
