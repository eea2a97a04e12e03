//! WebSocket protocol message definitions
//! These are the wire types for participant-host communication

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::game::authority::{EntityId, ParticipantId};
use crate::game::input::InputRecord;
use crate::game::physics::AnimHints;
use crate::game::rpc::RpcEnvelope;

/// Messages sent from a participant to the host
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Ask the host to spawn an avatar
    Join,

    /// Input record for one local tick
    Input {
        /// Local tick number, used for prediction reconciliation
        tick: u64,
        input: InputRecord,
    },

    /// Remote procedure call on an entity
    Rpc(RpcEnvelope),

    /// Ping for latency measurement
    Ping {
        /// Client timestamp
        t: u64,
    },

    /// Leave the session
    Leave,
}

/// Messages sent from the host to participants
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Sent once after connecting
    Welcome {
        participant_id: ParticipantId,
        tick_rate: u32,
        server_time: u64,
    },

    /// An avatar was spawned
    PlayerJoined {
        entity_id: EntityId,
        input_authority: ParticipantId,
        team: u8,
    },

    /// An avatar was despawned; its id is retired
    PlayerLeft {
        entity_id: EntityId,
        reason: String,
    },

    /// Replicated state of every avatar
    Snapshot {
        tick: u64,
        players: Vec<PlayerSnapshot>,
    },

    /// Call delivered from the state authority to replicas
    Rpc(RpcEnvelope),

    /// Error message
    Error {
        code: String,
        message: String,
    },

    /// Pong response
    Pong {
        /// Echo back client timestamp
        t: u64,
    },
}

/// Replicated fields of one avatar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub entity_id: EntityId,
    pub input_authority: ParticipantId,
    /// Feet position
    pub position: Vec3,
    /// Facing in radians
    pub yaw: f32,
    pub vertical_velocity: f32,
    pub health: u32,
    pub max_health: u32,
    pub is_poisoned: bool,
    pub team: u8,
    pub color_index: u8,
    pub display_name: String,
    pub anim: AnimHints,
    /// Newest input tick folded into this state
    pub last_input_tick: u64,
}

impl PlayerSnapshot {
    pub fn is_alive(&self) -> bool {
        self.health > 0
    }
}
