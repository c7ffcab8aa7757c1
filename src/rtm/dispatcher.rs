//! Event application table.
//!
//! [`FrameDispatcher`] maps an event-type string to a mutation function
//! over the [`EntityMirror`]. Unknown event types fall through to a no-op;
//! they are still delivered to subscribers by the client.
//!
//! Events reference their target either as a bare ID string
//! (`"channel": "C1"`) or as an embedded object (`"channel": {"id": "C1", …}`);
//! both shapes are accepted everywhere an ID is expected.

use std::collections::HashMap;

use serde_json::Value;

use super::frame::EventFrame;
use crate::domain::entity::Entity;
use crate::domain::mirror::Category;
use crate::domain::{Bot, Channel, DirectMessage, EntityMirror, Group, User};
use crate::error::FrameError;

/// What applying an event did to the mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    /// The mirror changed.
    Applied,
    /// Nothing changed (unknown type, or the target ID is not mirrored).
    Unchanged,
    /// The frame is the connection handshake.
    HandshakeComplete,
}

/// Signature of one table entry.
pub type MutationFn = fn(&mut EntityMirror, &EventFrame) -> Result<Mutation, FrameError>;

/// Table from event type to mirror mutation.
#[derive(Debug, Clone)]
pub struct FrameDispatcher {
    table: HashMap<&'static str, MutationFn>,
}

impl FrameDispatcher {
    /// Creates a dispatcher with the standard workspace event table.
    #[must_use]
    pub fn new() -> Self {
        let mut dispatcher = Self {
            table: HashMap::new(),
        };
        dispatcher.register("hello", hello);
        dispatcher.register("team_rename", team_rename);
        dispatcher.register("team_domain_change", team_domain_change);
        dispatcher.register("team_join", user_upsert);
        dispatcher.register("user_change", user_upsert);
        dispatcher.register("channel_created", channel_upsert);
        dispatcher.register("channel_joined", channel_upsert);
        dispatcher.register("channel_deleted", channel_deleted);
        dispatcher.register("channel_rename", channel_rename);
        dispatcher.register("channel_archive", channel_archive);
        dispatcher.register("channel_unarchive", channel_unarchive);
        dispatcher.register("group_joined", group_upsert);
        dispatcher.register("group_rename", group_rename);
        dispatcher.register("group_archive", group_archive);
        dispatcher.register("group_unarchive", group_unarchive);
        dispatcher.register("im_created", im_created);
        dispatcher.register("bot_added", bot_upsert);
        dispatcher.register("bot_changed", bot_upsert);
        dispatcher
    }

    /// Adds or replaces the mutation for an event type.
    pub fn register(&mut self, event_type: &'static str, mutation: MutationFn) {
        self.table.insert(event_type, mutation);
    }

    /// Returns `true` if the event type mutates the mirror.
    #[must_use]
    pub fn handles(&self, event_type: &str) -> bool {
        self.table.contains_key(event_type)
    }

    /// Event types with a registered mutation, sorted.
    #[must_use]
    pub fn handled_events(&self) -> Vec<&'static str> {
        let mut events: Vec<_> = self.table.keys().copied().collect();
        events.sort_unstable();
        events
    }

    /// Applies one event to the mirror.
    ///
    /// # Errors
    ///
    /// Returns a [`FrameError`] if a recognized event is missing the fields
    /// its mutation needs. The mirror is left untouched in that case.
    pub fn apply(
        &self,
        mirror: &mut EntityMirror,
        event: &EventFrame,
    ) -> Result<Mutation, FrameError> {
        match self.table.get(event.event_type()) {
            Some(mutation) => mutation(mirror, event),
            None => Ok(Mutation::Unchanged),
        }
    }
}

impl Default for FrameDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

fn hello(_: &mut EntityMirror, _: &EventFrame) -> Result<Mutation, FrameError> {
    Ok(Mutation::HandshakeComplete)
}

fn team_rename(mirror: &mut EntityMirror, event: &EventFrame) -> Result<Mutation, FrameError> {
    let name = event
        .str_field("name")
        .ok_or(FrameError::MissingField("name"))?;
    Ok(match mirror.team_mut() {
        Some(team) => {
            team.name = name.to_string();
            Mutation::Applied
        }
        None => Mutation::Unchanged,
    })
}

fn team_domain_change(
    mirror: &mut EntityMirror,
    event: &EventFrame,
) -> Result<Mutation, FrameError> {
    let domain = event
        .str_field("domain")
        .ok_or(FrameError::MissingField("domain"))?;
    Ok(match mirror.team_mut() {
        Some(team) => {
            team.domain = domain.to_string();
            Mutation::Applied
        }
        None => Mutation::Unchanged,
    })
}

fn user_upsert(mirror: &mut EntityMirror, event: &EventFrame) -> Result<Mutation, FrameError> {
    let user = User::from_payload(embedded(event, "user")?)?;
    mirror.users_mut().upsert(user);
    Ok(Mutation::Applied)
}

fn channel_upsert(mirror: &mut EntityMirror, event: &EventFrame) -> Result<Mutation, FrameError> {
    let channel = Channel::from_payload(embedded(event, "channel")?)?;
    mirror.channels_mut().upsert(channel);
    Ok(Mutation::Applied)
}

fn channel_deleted(mirror: &mut EntityMirror, event: &EventFrame) -> Result<Mutation, FrameError> {
    let id = target_id(event, &["channel"])?;
    Ok(match mirror.channels_mut().remove(id) {
        Some(_) => Mutation::Applied,
        None => absent("channel_deleted", id),
    })
}

fn channel_rename(mirror: &mut EntityMirror, event: &EventFrame) -> Result<Mutation, FrameError> {
    rename(mirror.channels_mut(), event, &["channel"])
}

fn channel_archive(mirror: &mut EntityMirror, event: &EventFrame) -> Result<Mutation, FrameError> {
    set_archived(mirror.channels_mut(), event, &["channel"], true)
}

fn channel_unarchive(
    mirror: &mut EntityMirror,
    event: &EventFrame,
) -> Result<Mutation, FrameError> {
    set_archived(mirror.channels_mut(), event, &["channel"], false)
}

fn group_upsert(mirror: &mut EntityMirror, event: &EventFrame) -> Result<Mutation, FrameError> {
    let group: Group = Channel::from_payload(embedded(event, "channel")?)?;
    mirror.groups_mut().upsert(group);
    Ok(Mutation::Applied)
}

fn group_rename(mirror: &mut EntityMirror, event: &EventFrame) -> Result<Mutation, FrameError> {
    rename(mirror.groups_mut(), event, &["channel", "group"])
}

fn group_archive(mirror: &mut EntityMirror, event: &EventFrame) -> Result<Mutation, FrameError> {
    set_archived(mirror.groups_mut(), event, &["channel", "group"], true)
}

fn group_unarchive(mirror: &mut EntityMirror, event: &EventFrame) -> Result<Mutation, FrameError> {
    set_archived(mirror.groups_mut(), event, &["channel", "group"], false)
}

fn im_created(mirror: &mut EntityMirror, event: &EventFrame) -> Result<Mutation, FrameError> {
    let mut payload = embedded(event, "channel")?.clone();
    // The peer is carried at the top level of the event.
    if let (Some(obj), Some(user)) = (payload.as_object_mut(), event.get("user"))
        && !obj.contains_key("user")
    {
        obj.insert("user".to_string(), user.clone());
    }
    let dm = DirectMessage::from_payload(&payload)?;
    mirror.dms_mut().upsert(dm);
    Ok(Mutation::Applied)
}

fn bot_upsert(mirror: &mut EntityMirror, event: &EventFrame) -> Result<Mutation, FrameError> {
    let bot = Bot::from_payload(embedded(event, "bot")?)?;
    mirror.bots_mut().upsert(bot);
    Ok(Mutation::Applied)
}

fn rename(
    category: &mut Category<Channel>,
    event: &EventFrame,
    keys: &[&'static str],
) -> Result<Mutation, FrameError> {
    let id = target_id(event, keys)?;
    let name = keys
        .iter()
        .find_map(|key| event.get(key)?.get("name")?.as_str())
        .ok_or(FrameError::MissingField("name"))?;
    Ok(match category.get_mut(id) {
        Some(channel) => {
            channel.name = name.to_string();
            Mutation::Applied
        }
        None => absent(event.event_type(), id),
    })
}

fn set_archived(
    category: &mut Category<Channel>,
    event: &EventFrame,
    keys: &[&'static str],
    archived: bool,
) -> Result<Mutation, FrameError> {
    let id = target_id(event, keys)?;
    Ok(match category.get_mut(id) {
        Some(channel) => {
            channel.is_archived = archived;
            Mutation::Applied
        }
        None => absent(event.event_type(), id),
    })
}

/// Returns the embedded object stored under `key`.
fn embedded<'a>(event: &'a EventFrame, key: &'static str) -> Result<&'a Value, FrameError> {
    event
        .get(key)
        .filter(|v| v.is_object())
        .ok_or(FrameError::MissingField(key))
}

/// Returns the first target ID found under `keys`, accepting a bare string
/// or an object with an `id` field.
fn target_id<'a>(event: &'a EventFrame, keys: &[&'static str]) -> Result<&'a str, FrameError> {
    keys.iter()
        .find_map(|key| match event.get(key)? {
            Value::String(id) => Some(id.as_str()),
            Value::Object(obj) => obj.get("id")?.as_str(),
            _ => None,
        })
        .filter(|id| !id.is_empty())
        .ok_or(FrameError::MissingField(keys.first().copied().unwrap_or("id")))
}

fn absent(event_type: &str, id: &str) -> Mutation {
    tracing::debug!(event_type, id, "event targets an entity that is not mirrored");
    Mutation::Unchanged
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::Snapshot;
    use serde_json::json;

    fn mirror() -> EntityMirror {
        let body = json!({
            "url": "ws://example.invalid",
            "team": {"id": "T1", "name": "Acme", "domain": "acme"},
            "self": {"id": "U1", "name": "me"},
            "users": [{"id": "U1", "name": "me"}],
            "channels": [{"id": "C1", "name": "general"}, {"id": "C2", "name": "random"}],
            "groups": [{"id": "G1", "name": "secret"}],
            "ims": [],
            "bots": [{"id": "B1", "name": "helper"}]
        });
        let Ok(snapshot) = Snapshot::from_payload(&body) else {
            panic!("valid snapshot");
        };
        EntityMirror::from_snapshot(snapshot)
    }

    fn event(value: Value) -> EventFrame {
        let Value::Object(fields) = value else {
            panic!("object literal");
        };
        let Some(frame) = EventFrame::from_object(fields) else {
            panic!("event has a type");
        };
        frame
    }

    fn apply(mirror: &mut EntityMirror, value: Value) -> Mutation {
        let Ok(mutation) = FrameDispatcher::new().apply(mirror, &event(value)) else {
            panic!("event applies cleanly");
        };
        mutation
    }

    fn channel_archived(mirror: &EntityMirror, id: &str) -> bool {
        let Ok(channel) = mirror.channels().get(id) else {
            panic!("{id} exists");
        };
        channel.is_archived
    }

    #[test]
    fn table_covers_workspace_events() {
        let dispatcher = FrameDispatcher::new();
        for event_type in [
            "hello",
            "team_rename",
            "team_domain_change",
            "channel_created",
            "channel_joined",
            "channel_deleted",
            "channel_rename",
            "channel_archive",
            "channel_unarchive",
            "group_joined",
            "group_rename",
            "group_archive",
            "group_unarchive",
            "im_created",
            "bot_added",
            "bot_changed",
        ] {
            assert!(dispatcher.handles(event_type), "{event_type} not handled");
        }
        assert!(!dispatcher.handles("presence_change"));
    }

    #[test]
    fn hello_completes_handshake() {
        let mut m = mirror();
        assert_eq!(
            apply(&mut m, json!({"type": "hello"})),
            Mutation::HandshakeComplete
        );
    }

    #[test]
    fn unknown_type_is_a_no_op() {
        let mut m = mirror();
        assert_eq!(
            apply(&mut m, json!({"type": "reaction_added", "reaction": "+1"})),
            Mutation::Unchanged
        );
    }

    #[test]
    fn team_rename_and_domain_change() {
        let mut m = mirror();
        apply(&mut m, json!({"type": "team_rename", "name": "Acme Corp"}));
        apply(
            &mut m,
            json!({"type": "team_domain_change", "url": "https://acmecorp.example", "domain": "acmecorp"}),
        );
        let Ok(team) = m.team() else {
            panic!("team present");
        };
        assert_eq!(team.name, "Acme Corp");
        assert_eq!(team.domain, "acmecorp");
    }

    #[test]
    fn channel_archive_is_idempotent() {
        let mut m = mirror();
        let archive = json!({"type": "channel_archive", "channel": "C1", "user": "U1"});
        assert_eq!(apply(&mut m, archive.clone()), Mutation::Applied);
        assert!(channel_archived(&m, "C1"));
        assert_eq!(apply(&mut m, archive), Mutation::Applied);
        assert!(channel_archived(&m, "C1"));
        assert!(!channel_archived(&m, "C2"));

        apply(&mut m, json!({"type": "channel_unarchive", "channel": "C1"}));
        assert!(!channel_archived(&m, "C1"));
    }

    #[test]
    fn channel_lifecycle() {
        let mut m = mirror();
        apply(
            &mut m,
            json!({"type": "channel_created", "channel": {"id": "C9", "name": "new", "created": 1_360_782_804, "creator": "U1"}}),
        );
        apply(
            &mut m,
            json!({"type": "channel_rename", "channel": {"id": "C9", "name": "renamed", "created": 1_360_782_804}}),
        );
        let Ok(channel) = m.channels().get("C9") else {
            panic!("C9 inserted");
        };
        assert_eq!(channel.name, "renamed");
        let ids: Vec<String> = m.channels().iter().map(|c| c.id.to_string()).collect();
        assert_eq!(ids, vec!["C1", "C2", "C9"]);

        assert_eq!(
            apply(&mut m, json!({"type": "channel_deleted", "channel": "C9"})),
            Mutation::Applied
        );
        assert!(m.channels().get("C9").is_err());
    }

    #[test]
    fn channel_joined_replaces_existing_entry() {
        let mut m = mirror();
        apply(
            &mut m,
            json!({"type": "channel_joined", "channel": {"id": "C1", "name": "general", "members": ["U1"]}}),
        );
        let Ok(channel) = m.channels().get("C1") else {
            panic!("C1 exists");
        };
        assert!(channel.has_member("U1"));
        assert_eq!(m.channels().len(), 2);
    }

    #[test]
    fn update_for_unmirrored_id_changes_nothing() {
        let mut m = mirror();
        assert_eq!(
            apply(&mut m, json!({"type": "channel_archive", "channel": "C404"})),
            Mutation::Unchanged
        );
        assert_eq!(
            apply(&mut m, json!({"type": "channel_deleted", "channel": "C404"})),
            Mutation::Unchanged
        );
        assert_eq!(m.channels().len(), 2);
    }

    #[test]
    fn group_events_use_group_namespace() {
        let mut m = mirror();
        apply(
            &mut m,
            json!({"type": "group_joined", "channel": {"id": "G2", "name": "hidden"}}),
        );
        apply(
            &mut m,
            json!({"type": "group_rename", "channel": {"id": "G1", "name": "classified"}}),
        );
        apply(&mut m, json!({"type": "group_archive", "channel": "G1"}));

        assert_eq!(m.groups().len(), 2);
        assert!(m.channels().get("G2").is_err());
        let Ok(group) = m.groups().get("G1") else {
            panic!("G1 exists");
        };
        assert_eq!(group.name, "classified");
        assert!(group.is_archived);

        apply(&mut m, json!({"type": "group_unarchive", "group": {"id": "G1"}}));
        let Ok(group) = m.groups().get("G1") else {
            panic!("G1 exists");
        };
        assert!(!group.is_archived);
    }

    #[test]
    fn im_created_takes_peer_from_event() {
        let mut m = mirror();
        apply(
            &mut m,
            json!({"type": "im_created", "user": "U2", "channel": {"id": "D5", "created": 5}}),
        );
        let Ok(dm) = m.dms().get("D5") else {
            panic!("D5 inserted");
        };
        assert_eq!(dm.user.as_str(), "U2");
    }

    #[test]
    fn im_created_without_peer_is_rejected() {
        let mut m = mirror();
        let frame = event(json!({"type": "im_created", "channel": {"id": "D6"}}));
        assert!(FrameDispatcher::new().apply(&mut m, &frame).is_err());
        assert!(m.dms().get("D6").is_err());
        assert!(m.dm_with_user("").is_err());
    }

    #[test]
    fn bot_added_then_changed() {
        let mut m = mirror();
        apply(
            &mut m,
            json!({"type": "bot_added", "bot": {"id": "B2", "name": "deploy", "icons": {"image_48": "https://x/48.png"}}}),
        );
        apply(
            &mut m,
            json!({"type": "bot_changed", "bot": {"id": "B2", "name": "deployer"}}),
        );
        let Ok(bot) = m.bots().get("B2") else {
            panic!("B2 inserted");
        };
        assert_eq!(bot.name, "deployer");
        assert_eq!(bot.icons.image_48, None);
        assert_eq!(m.bots().len(), 2);
    }

    #[test]
    fn user_events_upsert() {
        let mut m = mirror();
        apply(&mut m, json!({"type": "team_join", "user": {"id": "U3", "name": "newbie"}}));
        apply(
            &mut m,
            json!({"type": "user_change", "user": {"id": "U3", "name": "regular", "is_admin": true}}),
        );
        let Ok(user) = m.users().get("U3") else {
            panic!("U3 inserted");
        };
        assert_eq!(user.username, "regular");
        assert!(user.is_admin);
    }

    #[test]
    fn malformed_recognized_event_is_an_error() {
        let mut m = mirror();
        let dispatcher = FrameDispatcher::new();
        let result = dispatcher.apply(&mut m, &event(json!({"type": "channel_archive"})));
        assert!(matches!(result, Err(FrameError::MissingField("channel"))));
        let result = dispatcher.apply(
            &mut m,
            &event(json!({"type": "channel_created", "channel": {"name": "no-id"}})),
        );
        assert!(result.is_err());
        assert_eq!(m.channels().len(), 2);
    }

    #[test]
    fn custom_entries_can_be_registered() {
        fn mark_all_read(
            mirror: &mut EntityMirror,
            _: &EventFrame,
        ) -> Result<Mutation, FrameError> {
            let mut changed = false;
            for id in ["C1", "C2"] {
                if let Some(channel) = mirror.channels_mut().get_mut(id) {
                    channel.unread_count = 0;
                    changed = true;
                }
            }
            Ok(if changed {
                Mutation::Applied
            } else {
                Mutation::Unchanged
            })
        }

        let mut dispatcher = FrameDispatcher::new();
        dispatcher.register("all_read", mark_all_read);
        assert!(dispatcher.handled_events().contains(&"all_read"));
        let mut m = mirror();
        let Ok(mutation) = dispatcher.apply(&mut m, &event(json!({"type": "all_read"}))) else {
            panic!("custom entry applies");
        };
        assert_eq!(mutation, Mutation::Applied);
    }
}
