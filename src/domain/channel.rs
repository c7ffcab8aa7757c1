//! Channels and groups.
//!
//! Groups (private channels) have exactly the same field set as public
//! channels; they differ only in the mirror namespace they are stored in.

use chrono::{DateTime, Utc};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use super::entity::Entity;
use super::{ChannelId, UserId};
use crate::error::EntityKind;

/// A public channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    /// Channel identifier.
    pub id: ChannelId,
    /// Channel name, without the leading `#`.
    #[serde(default)]
    pub name: String,
    /// Purpose text and its metadata.
    #[serde(default)]
    pub purpose: ChannelText,
    /// Topic text and its metadata.
    #[serde(default)]
    pub topic: ChannelText,
    /// Creation time.
    #[serde(default, with = "chrono::serde::ts_seconds")]
    pub created: DateTime<Utc>,
    /// User who created the channel.
    #[serde(default)]
    pub creator: Option<UserId>,
    /// Member IDs, in the order the server listed them.
    #[serde(default)]
    pub members: IndexSet<UserId>,
    /// Archived channels accept no new messages.
    #[serde(default)]
    pub is_archived: bool,
    /// Messages unread by the authenticated user.
    #[serde(default)]
    pub unread_count: u64,
}

/// A private channel. Same shape as [`Channel`], separate namespace.
pub type Group = Channel;

/// Purpose or topic of a channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelText {
    /// The text itself.
    pub value: String,
    /// Who last set it.
    pub creator: Option<UserId>,
    /// Unix timestamp of the last change, 0 when never set.
    pub last_set: i64,
}

impl Channel {
    /// Returns the purpose text.
    #[must_use]
    pub fn purpose(&self) -> &str {
        &self.purpose.value
    }

    /// Returns the topic text.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic.value
    }

    /// Returns `true` if the given user is listed as a member.
    #[must_use]
    pub fn has_member(&self, user_id: &str) -> bool {
        self.members.contains(user_id)
    }
}

impl Entity for Channel {
    type Id = ChannelId;
    const KIND: EntityKind = EntityKind::Channel;

    fn id(&self) -> &ChannelId {
        &self.id
    }
}
