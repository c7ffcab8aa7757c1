//! The bootstrap snapshot returned by the `rtm.start` call.

use serde_json::{Map, Value};

use super::entity::Entity;
use super::{Bot, Channel, DirectMessage, Group, Team, User, UserId};
use crate::error::FrameError;

/// Identity of the authenticated user as reported by the snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelfInfo {
    /// The authenticated user's ID.
    pub id: UserId,
    /// The authenticated user's username.
    pub name: String,
}

/// Everything needed to populate the mirror and open the transport.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Transport URL to connect to.
    pub url: String,
    /// The team.
    pub team: Team,
    /// The authenticated user.
    pub self_info: SelfInfo,
    /// All members, in server order.
    pub users: Vec<User>,
    /// Public channels, in server order.
    pub channels: Vec<Channel>,
    /// Private channels, in server order.
    pub groups: Vec<Group>,
    /// Direct-message sessions, in server order.
    pub ims: Vec<DirectMessage>,
    /// Bots, in server order.
    pub bots: Vec<Bot>,
}

impl Snapshot {
    /// Decodes a snapshot from the response body of the bootstrap call.
    ///
    /// `url` and `team` are required. `self` is required unless the user
    /// list is non-empty, in which case its first entry is assumed; every
    /// entity list defaults to empty when absent.
    ///
    /// # Errors
    ///
    /// Returns a [`FrameError`] if a required field is missing or any
    /// embedded entity fails to decode.
    pub fn from_payload(body: &Value) -> Result<Self, FrameError> {
        let body = body.as_object().ok_or(FrameError::NotAnObject)?;

        let url = body
            .get("url")
            .and_then(Value::as_str)
            .ok_or(FrameError::MissingField("url"))?
            .to_string();
        let team = Team::from_payload(body.get("team").ok_or(FrameError::MissingField("team"))?)?;

        let users = decode_list::<User>(body, "users")?;
        let channels = decode_list::<Channel>(body, "channels")?;
        let groups = decode_list::<Group>(body, "groups")?;
        let ims = decode_list::<DirectMessage>(body, "ims")?;
        let bots = decode_list::<Bot>(body, "bots")?;

        let self_info = match body.get("self") {
            Some(value) => decode_self(value)?,
            None => users
                .first()
                .map(|u| SelfInfo {
                    id: u.id.clone(),
                    name: u.username.clone(),
                })
                .ok_or(FrameError::MissingField("self"))?,
        };

        Ok(Self {
            url,
            team,
            self_info,
            users,
            channels,
            groups,
            ims,
            bots,
        })
    }
}

fn decode_self(value: &Value) -> Result<SelfInfo, FrameError> {
    let id = value
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .ok_or(FrameError::MissingField("self.id"))?;
    let name = value.get("name").and_then(Value::as_str).unwrap_or_default();
    Ok(SelfInfo {
        id: UserId::new(id),
        name: name.to_string(),
    })
}

fn decode_list<T: Entity>(body: &Map<String, Value>, key: &'static str) -> Result<Vec<T>, FrameError> {
    match body.get(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items.iter().map(T::from_payload).collect(),
        Some(_) => Err(FrameError::MissingField(key)),
    }
}
