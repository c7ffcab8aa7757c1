//! Construct-from-fields factory shared by every mirrored entity.
//!
//! Entities are decoded from the raw JSON objects found in the snapshot
//! and in event frames. Required fields are enforced by the serde derive on
//! each type; optional fields default. [`Entity::from_payload`] adds the one
//! check serde cannot express: the ID must not be empty.

use std::borrow::Borrow;
use std::fmt::Debug;
use std::hash::Hash;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{EntityKind, FrameError};

/// A workspace entity stored in the mirror.
pub trait Entity: DeserializeOwned + Clone + Debug {
    /// Identifier type of the category.
    type Id: Clone + Debug + Eq + Hash + Borrow<str>;

    /// Category this type is decoded as.
    const KIND: EntityKind;

    /// Returns the entity's ID.
    fn id(&self) -> &Self::Id;

    /// Builds the entity from a raw JSON object.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::InvalidEntity`] when a required field is missing
    /// or mistyped, and [`FrameError::EmptyId`] when the ID is empty.
    fn from_payload(value: &Value) -> Result<Self, FrameError> {
        let entity = <Self as serde::Deserialize>::deserialize(value).map_err(|source| {
            FrameError::InvalidEntity {
                kind: Self::KIND,
                source,
            }
        })?;
        let id: &str = Borrow::<str>::borrow(entity.id());
        if id.is_empty() {
            return Err(FrameError::EmptyId(Self::KIND));
        }
        Ok(entity)
    }
}
