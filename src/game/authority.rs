//! Participant identity and per-entity authority roles

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A connected participant (transport-verified identity)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(pub Uuid);

impl ParticipantId {
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Replicated object id, unique per session and never reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub u32);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Roles a participant may hold relative to one entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Supplies input for the entity
    InputAuthority,
    /// Owns canonical mutation of the entity
    StateAuthority,
    /// Any participant
    All,
}

/// Who owns what for a single entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authority {
    pub input: ParticipantId,
    pub state: ParticipantId,
}

impl Authority {
    pub fn new(input: ParticipantId, state: ParticipantId) -> Self {
        Self { input, state }
    }

    /// Whether `participant` holds `role` for this entity
    pub fn holds(&self, participant: ParticipantId, role: Role) -> bool {
        match role {
            Role::InputAuthority => self.input == participant,
            Role::StateAuthority => self.state == participant,
            Role::All => true,
        }
    }

    /// The owning participant is also the host
    pub fn is_host_owned(&self) -> bool {
        self.input == self.state
    }
}

/// Looks up the authority pair of a live entity
pub trait AuthorityResolver {
    fn authority(&self, entity: EntityId) -> Option<Authority>;
}
