//! The workspace team.

use serde::{Deserialize, Serialize};

use super::TeamId;
use super::entity::Entity;
use crate::error::EntityKind;

/// The team the client is logged in to. Exactly one per connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    /// Team identifier.
    pub id: TeamId,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Subdomain the team is reachable at.
    #[serde(default)]
    pub domain: String,
    /// Email domain for automatic sign-up, empty when unset.
    #[serde(default)]
    pub email_domain: String,
}

impl Entity for Team {
    type Id = TeamId;
    const KIND: EntityKind = EntityKind::Team;

    fn id(&self) -> &TeamId {
        &self.id
    }
}
