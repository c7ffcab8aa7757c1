//! Protocol layer: wire frames, command correlation, event dispatch, and
//! subscriber bookkeeping.

pub mod correlator;
pub mod dispatcher;
pub mod frame;
pub mod subscription;

pub use correlator::{PendingReply, SendCorrelator};
pub use dispatcher::{FrameDispatcher, Mutation, MutationFn};
pub use frame::{Ack, AckError, Command, EventFrame, Frame, OutboundFrame};
pub use subscription::{EventFilter, EventHandler, HandlerId, HandlerRegistry, WILDCARD};
