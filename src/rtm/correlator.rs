//! Outbound command correlation.
//!
//! Every command gets the next ID from a per-connection counter and a
//! pending entry holding the sending half of a [`oneshot`] channel. The
//! matching acknowledgment resolves the entry; an unknown `reply_to` is
//! discarded.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use super::frame::Ack;
use crate::error::RtmError;

type ReplySender = oneshot::Sender<Result<(), RtmError>>;

/// Tracks unacknowledged commands for one connection.
#[derive(Debug, Default)]
pub struct SendCorrelator {
    last_id: u64,
    pending: HashMap<u64, ReplySender>,
}

impl SendCorrelator {
    /// Creates a correlator whose first issued ID is `1`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues the next command ID. IDs are never reused by one correlator.
    pub fn next_id(&mut self) -> u64 {
        self.last_id += 1;
        self.last_id
    }

    /// The most recently issued ID, `0` if none.
    #[must_use]
    pub fn last_id(&self) -> u64 {
        self.last_id
    }

    /// Records a pending entry for `id` and returns the caller's handle.
    pub fn track(&mut self, id: u64) -> PendingReply {
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);
        PendingReply { id, rx }
    }

    /// Resolves the pending entry matching the acknowledgment.
    ///
    /// Returns `false` if no entry matched (duplicate or stale ack).
    pub fn resolve(&mut self, ack: &Ack) -> bool {
        let Some(tx) = self.pending.remove(&ack.reply_to) else {
            tracing::debug!(reply_to = ack.reply_to, "discarding unmatched acknowledgment");
            return false;
        };
        let outcome = match (&ack.error, ack.ok) {
            (_, true) => Ok(()),
            (Some(error), false) => Err(RtmError::Protocol {
                code: error.code.clone(),
                message: error.message.clone(),
            }),
            (None, false) => Err(RtmError::Protocol {
                code: "unknown_error".to_string(),
                message: None,
            }),
        };
        // The caller may have dropped its handle; nothing to do then.
        let _ = tx.send(outcome);
        true
    }

    /// Fails every pending entry with `err`, returning how many there were.
    pub fn fail_all(&mut self, err: &RtmError) -> usize {
        let count = self.pending.len();
        for (_, tx) in self.pending.drain() {
            let _ = tx.send(Err(err.clone()));
        }
        count
    }

    /// Number of commands awaiting acknowledgment.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

/// Outstanding result of a sent command.
///
/// Resolves to `Ok(())` on a positive acknowledgment, to
/// [`RtmError::Protocol`] on a negative one, and to a connection error if
/// the connection goes away first.
#[derive(Debug)]
#[must_use = "a pending reply does nothing unless awaited"]
pub struct PendingReply {
    id: u64,
    rx: oneshot::Receiver<Result<(), RtmError>>,
}

impl PendingReply {
    /// The ID the command was sent with.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Future for PendingReply {
    type Output = Result<(), RtmError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or_else(|_| Err(RtmError::connection_dropped())))
    }
}
