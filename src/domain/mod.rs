//! Domain layer: workspace entities, the entity mirror, and the event bus.
//!
//! This module contains the client-side model of the workspace: entity
//! identity, the entity records themselves, the bootstrap snapshot, the
//! per-connection mirror, and the broadcast bus that fans events out to
//! stream subscribers.

pub mod bot;
pub mod channel;
pub mod direct_message;
pub mod entity;
pub mod event_bus;
pub mod ids;
pub mod mirror;
pub mod snapshot;
pub mod team;
pub mod user;

pub use bot::{Bot, BotIcons};
pub use channel::{Channel, ChannelText, Group};
pub use direct_message::DirectMessage;
pub use entity::Entity;
pub use event_bus::{EventBus, EventStream};
pub use ids::{BotId, ChannelId, DmId, TeamId, UserId};
pub use mirror::{Category, ChannelRef, EntityMirror};
pub use snapshot::{SelfInfo, Snapshot};
pub use team::Team;
pub use user::{User, UserProfile};
