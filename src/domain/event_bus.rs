//! Broadcast channel for server events.
//!
//! [`EventBus`] wraps a [`tokio::sync::broadcast`] channel. Every inbound
//! event is published through the bus after the mirror has been updated,
//! and each [`EventStream`] receives the events its [`EventFilter`] admits.

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use crate::rtm::{EventFilter, EventFrame};

/// Broadcast bus for [`EventFrame`]s.
///
/// When the ring buffer is full, the oldest events are dropped for lagging
/// receivers.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EventFrame>,
}

impl EventBus {
    /// Creates a new `EventBus` with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of receivers that received the event.
    /// If there are no active receivers, the event is silently dropped.
    pub fn publish(&self, event: EventFrame) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Creates a stream of future events admitted by `filter`.
    #[must_use]
    pub fn subscribe(&self, filter: EventFilter) -> EventStream {
        EventStream {
            rx: self.sender.subscribe(),
            filter,
        }
    }

    /// Returns the current number of active receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Filtered receiver created by [`EventBus::subscribe`].
#[derive(Debug)]
pub struct EventStream {
    rx: broadcast::Receiver<EventFrame>,
    filter: EventFilter,
}

impl EventStream {
    /// Waits for the next event that passes the filter.
    ///
    /// Returns `None` once the bus is gone. Events lost to lag are skipped
    /// with a warning.
    pub async fn recv(&mut self) -> Option<EventFrame> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.filter.matches(event.event_type()) => return Some(event),
                Ok(_) => {}
                Err(RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "event stream lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// The active filter.
    #[must_use]
    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }

    /// Replaces the filter. Applies to events received from now on.
    pub fn set_filter(&mut self, filter: EventFilter) {
        self.filter = filter;
    }
}
