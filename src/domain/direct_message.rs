//! Direct-message sessions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::entity::Entity;
use super::{DmId, UserId};
use crate::error::EntityKind;

/// A one-to-one conversation between the authenticated user and a peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectMessage {
    /// Session identifier.
    pub id: DmId,
    /// The peer user.
    pub user: UserId,
    /// Creation time.
    #[serde(default, with = "chrono::serde::ts_seconds")]
    pub created: DateTime<Utc>,
}

impl Entity for DirectMessage {
    type Id = DmId;
    const KIND: EntityKind = EntityKind::DirectMessage;

    fn id(&self) -> &DmId {
        &self.id
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::error::FrameError;
    use serde_json::json;

    #[test]
    fn decodes_peer_and_creation_time() {
        let payload = json!({"id": "D1", "user": "U2", "created": 60});
        let Ok(dm) = DirectMessage::from_payload(&payload) else {
            panic!("valid DM");
        };
        assert_eq!(dm.user.as_str(), "U2");
        assert_eq!(dm.created.timestamp(), 60);
    }

    #[test]
    fn peer_is_required() {
        let Err(FrameError::InvalidEntity { kind, .. }) =
            DirectMessage::from_payload(&json!({"id": "D1"}))
        else {
            panic!("DM without a peer must be rejected");
        };
        assert_eq!(kind, EntityKind::DirectMessage);
    }
}
