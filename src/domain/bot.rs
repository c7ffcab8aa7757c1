//! Integration bots.

use serde::{Deserialize, Serialize};

use super::BotId;
use super::entity::Entity;
use crate::error::EntityKind;

/// A bot integration installed in the workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bot {
    /// Bot identifier.
    pub id: BotId,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// The integration was removed.
    #[serde(default)]
    pub deleted: bool,
    /// Icon URLs.
    #[serde(default)]
    pub icons: BotIcons,
}

/// Icon URLs of a [`Bot`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotIcons {
    /// 36x36 icon URL.
    pub image_36: Option<String>,
    /// 48x48 icon URL.
    pub image_48: Option<String>,
    /// 72x72 icon URL.
    pub image_72: Option<String>,
}

impl Entity for Bot {
    type Id = BotId;
    const KIND: EntityKind = EntityKind::Bot;

    fn id(&self) -> &BotId {
        &self.id
    }
}
