//! In-memory mirror of every workspace entity.
//!
//! [`EntityMirror`] holds one [`Category`] per entity type, each an
//! insertion-ordered map keyed by ID. The mirror itself does no locking;
//! the client keeps it behind its session lock and only the frame
//! dispatcher mutates it.

use indexmap::IndexMap;

use super::entity::Entity;
use super::{Bot, Channel, DirectMessage, Group, Snapshot, Team, User, UserId};
use crate::error::{EntityKind, RtmError};

/// One entity namespace.
///
/// Iteration and [`Category::list`] follow insertion order: snapshot order
/// first, then the order later insert events arrived in. Replacing an
/// existing ID keeps its position; removing an ID preserves the relative
/// order of the rest.
#[derive(Debug, Clone)]
pub struct Category<T: Entity> {
    kind: EntityKind,
    items: IndexMap<T::Id, T>,
}

impl<T: Entity> Category<T> {
    /// Creates an empty namespace reporting not-found errors as `kind`.
    #[must_use]
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            items: IndexMap::new(),
        }
    }

    /// Looks up an entity by ID.
    ///
    /// # Errors
    ///
    /// Returns [`RtmError::NotFound`] if the ID is not present.
    pub fn get(&self, id: &str) -> Result<&T, RtmError> {
        self.items
            .get(id)
            .ok_or_else(|| RtmError::not_found(self.kind, id))
    }

    /// Returns `true` if the ID is present.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.items.contains_key(id)
    }

    /// Returns a point-in-time copy of all entities in insertion order.
    #[must_use]
    pub fn list(&self) -> Vec<T> {
        self.items.values().cloned().collect()
    }

    /// Iterates over the entities in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.values()
    }

    /// Number of entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if the namespace holds no entities.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Inserts an entity, replacing (in place) any entity with the same ID.
    ///
    /// Returns `true` if an existing entity was replaced.
    pub(crate) fn upsert(&mut self, entity: T) -> bool {
        let id = entity.id().clone();
        self.items.insert(id, entity).is_some()
    }

    /// Mutable access for partial field updates.
    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut T> {
        self.items.get_mut(id)
    }

    /// Removes an entity outright.
    pub(crate) fn remove(&mut self, id: &str) -> Option<T> {
        self.items.shift_remove(id)
    }

    fn replace_all(&mut self, entities: Vec<T>) {
        self.items.clear();
        for entity in entities {
            self.upsert(entity);
        }
    }
}

/// Any conversation a message can be posted to, resolved by ID prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelRef {
    /// A public channel (`C…`).
    Channel(Channel),
    /// A private channel (`G…`).
    Group(Group),
    /// A direct-message session (`D…`).
    DirectMessage(DirectMessage),
}

impl ChannelRef {
    /// Returns the conversation ID.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Channel(c) | Self::Group(c) => c.id.as_str(),
            Self::DirectMessage(d) => d.id.as_str(),
        }
    }
}

/// Authoritative local copy of the workspace for one connection.
#[derive(Debug, Clone)]
pub struct EntityMirror {
    team: Option<Team>,
    self_id: Option<UserId>,
    users: Category<User>,
    channels: Category<Channel>,
    groups: Category<Group>,
    dms: Category<DirectMessage>,
    bots: Category<Bot>,
}

impl EntityMirror {
    /// Creates an empty mirror.
    #[must_use]
    pub fn new() -> Self {
        Self {
            team: None,
            self_id: None,
            users: Category::new(EntityKind::User),
            channels: Category::new(EntityKind::Channel),
            groups: Category::new(EntityKind::Group),
            dms: Category::new(EntityKind::DirectMessage),
            bots: Category::new(EntityKind::Bot),
        }
    }

    /// Builds a fully populated mirror from a snapshot.
    ///
    /// If the snapshot's user list does not contain the authenticated user,
    /// a minimal entry is appended so the self entry is always present.
    #[must_use]
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        let mut mirror = Self::new();
        let Snapshot {
            team,
            self_info,
            users,
            channels,
            groups,
            ims,
            bots,
            ..
        } = snapshot;

        mirror.team = Some(team);
        mirror.users.replace_all(users);
        if !mirror.users.contains(self_info.id.as_str()) {
            mirror
                .users
                .upsert(User::new(self_info.id.clone(), self_info.name));
        }
        mirror.self_id = Some(self_info.id);
        mirror.channels.replace_all(channels);
        mirror.groups.replace_all(groups);
        mirror.dms.replace_all(ims);
        mirror.bots.replace_all(bots);
        mirror
    }

    /// Returns `true` once the mirror has been populated from a snapshot.
    #[must_use]
    pub fn is_populated(&self) -> bool {
        self.team.is_some()
    }

    /// Returns the team.
    ///
    /// # Errors
    ///
    /// Returns [`RtmError::NotFound`] if the mirror was never populated.
    pub fn team(&self) -> Result<&Team, RtmError> {
        self.team
            .as_ref()
            .ok_or_else(|| RtmError::not_found(EntityKind::Team, ""))
    }

    /// Returns the authenticated user.
    ///
    /// # Errors
    ///
    /// Returns [`RtmError::NotFound`] if the mirror was never populated.
    pub fn self_user(&self) -> Result<&User, RtmError> {
        let id = self
            .self_id
            .as_ref()
            .ok_or_else(|| RtmError::not_found(EntityKind::User, "self"))?;
        self.users.get(id.as_str())
    }

    /// Users namespace.
    #[must_use]
    pub fn users(&self) -> &Category<User> {
        &self.users
    }

    /// Public channels namespace.
    #[must_use]
    pub fn channels(&self) -> &Category<Channel> {
        &self.channels
    }

    /// Private channels namespace.
    #[must_use]
    pub fn groups(&self) -> &Category<Group> {
        &self.groups
    }

    /// Direct-message sessions namespace.
    #[must_use]
    pub fn dms(&self) -> &Category<DirectMessage> {
        &self.dms
    }

    /// Bots namespace.
    #[must_use]
    pub fn bots(&self) -> &Category<Bot> {
        &self.bots
    }

    /// Resolves any conversation ID by prefix: `G…` is looked up among
    /// groups, `D…` among DM sessions, anything else among channels.
    ///
    /// # Errors
    ///
    /// Returns [`RtmError::NotFound`] scoped to the namespace the prefix
    /// selected.
    pub fn any_channel(&self, id: &str) -> Result<ChannelRef, RtmError> {
        match id.as_bytes().first() {
            Some(b'G') => self.groups.get(id).cloned().map(ChannelRef::Group),
            Some(b'D') => self.dms.get(id).cloned().map(ChannelRef::DirectMessage),
            _ => self.channels.get(id).cloned().map(ChannelRef::Channel),
        }
    }

    /// Resolves the members of a channel or group to users. Member IDs with
    /// no user in the mirror are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`RtmError::NotFound`] if no channel or group has the ID.
    pub fn channel_members(&self, id: &str) -> Result<Vec<User>, RtmError> {
        let channel = match self.channels.get(id) {
            Ok(channel) => channel,
            Err(err) => self.groups.get(id).map_err(|_| err)?,
        };
        Ok(channel
            .members
            .iter()
            .filter_map(|member| self.users.get(member.as_str()).ok())
            .cloned()
            .collect())
    }

    /// Finds the DM session whose peer is the given user.
    ///
    /// # Errors
    ///
    /// Returns [`RtmError::NotFound`] (DM namespace, keyed by the user ID)
    /// if there is no such session.
    pub fn dm_with_user(&self, user_id: &str) -> Result<&DirectMessage, RtmError> {
        self.dms
            .iter()
            .find(|dm| dm.user.as_str() == user_id)
            .ok_or_else(|| RtmError::not_found(EntityKind::DirectMessage, user_id))
    }

    pub(crate) fn team_mut(&mut self) -> Option<&mut Team> {
        self.team.as_mut()
    }

    pub(crate) fn users_mut(&mut self) -> &mut Category<User> {
        &mut self.users
    }

    pub(crate) fn channels_mut(&mut self) -> &mut Category<Channel> {
        &mut self.channels
    }

    pub(crate) fn groups_mut(&mut self) -> &mut Category<Group> {
        &mut self.groups
    }

    pub(crate) fn dms_mut(&mut self) -> &mut Category<DirectMessage> {
        &mut self.dms
    }

    pub(crate) fn bots_mut(&mut self) -> &mut Category<Bot> {
        &mut self.bots
    }
}

impl Default for EntityMirror {
    fn default() -> Self {
        Self::new()
    }
}
