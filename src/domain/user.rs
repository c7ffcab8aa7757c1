//! Workspace members.

use serde::{Deserialize, Serialize};

use super::UserId;
use super::entity::Entity;
use crate::error::EntityKind;

/// A workspace member, including the authenticated user itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// User identifier.
    pub id: UserId,
    /// Username, without the leading `@`.
    #[serde(default, rename = "name")]
    pub username: String,
    /// Deactivated account.
    #[serde(default)]
    pub deleted: bool,
    /// Team administrator.
    #[serde(default)]
    pub is_admin: bool,
    /// Team owner.
    #[serde(default)]
    pub is_owner: bool,
    /// The team's primary owner.
    #[serde(default)]
    pub is_primary_owner: bool,
    /// The account belongs to an integration.
    #[serde(default)]
    pub is_bot: bool,
    /// Profile fields.
    #[serde(default)]
    pub profile: UserProfile,
}

/// Optional profile fields of a [`User`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserProfile {
    /// Given name.
    pub first_name: Option<String>,
    /// Family name.
    pub last_name: Option<String>,
    /// Full display name.
    pub real_name: Option<String>,
    /// Email address.
    pub email: Option<String>,
    /// Phone number.
    pub phone: Option<String>,
    /// Skype handle.
    pub skype: Option<String>,
    /// 24x24 avatar URL.
    pub image_24: Option<String>,
    /// 32x32 avatar URL.
    pub image_32: Option<String>,
    /// 48x48 avatar URL.
    pub image_48: Option<String>,
    /// 72x72 avatar URL.
    pub image_72: Option<String>,
    /// 192x192 avatar URL.
    pub image_192: Option<String>,
}

impl User {
    /// Minimal user record with only an ID and username.
    #[must_use]
    pub fn new(id: UserId, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            deleted: false,
            is_admin: false,
            is_owner: false,
            is_primary_owner: false,
            is_bot: false,
            profile: UserProfile::default(),
        }
    }
}

impl Entity for User {
    type Id = UserId;
    const KIND: EntityKind = EntityKind::User;

    fn id(&self) -> &UserId {
        &self.id
    }
}
