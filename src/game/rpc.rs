//! Role-filtered remote procedure calls
//!
//! Every call carries a declared `(source, target)` route. The channel
//! checks the transport-verified sender against the source role for the
//! envelope's entity before any handler runs; a mismatch is dropped and
//! never reaches canonical state.

use serde::{Deserialize, Serialize};

use super::authority::{AuthorityResolver, EntityId, ParticipantId, Role};

/// Calls exchanged between input authorities, the state authority and replicas
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum RpcCall {
    /// Damage the caller's own avatar
    RequestDamage { amount: u32 },
    /// Flip the caller's poison status
    TogglePoison,
    /// Bring a dead avatar back; caller must be near it
    RequestResurrect { target: EntityId },
    /// Set the caller's display identity
    SetDetails { name: String, color_index: u8 },
    /// Chat line to be stamped and re-broadcast by the state authority
    SendChat { text: String },
    /// Authority-stamped chat line for every replica
    ReceiveChat { text: String },
}

/// Declared source/target pair of a call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RpcRoute {
    pub source: Role,
    pub target: Role,
}

impl RpcRoute {
    pub const INPUT_TO_STATE: RpcRoute = RpcRoute {
        source: Role::InputAuthority,
        target: Role::StateAuthority,
    };

    pub const STATE_TO_ALL: RpcRoute = RpcRoute {
        source: Role::StateAuthority,
        target: Role::All,
    };
}

impl RpcCall {
    pub fn route(&self) -> RpcRoute {
        match self {
            RpcCall::RequestDamage { .. }
            | RpcCall::TogglePoison
            | RpcCall::RequestResurrect { .. }
            | RpcCall::SetDetails { .. }
            | RpcCall::SendChat { .. } => RpcRoute::INPUT_TO_STATE,
            RpcCall::ReceiveChat { .. } => RpcRoute::STATE_TO_ALL,
        }
    }

    /// Short tag for logs
    pub fn name(&self) -> &'static str {
        match self {
            RpcCall::RequestDamage { .. } => "request_damage",
            RpcCall::TogglePoison => "toggle_poison",
            RpcCall::RequestResurrect { .. } => "request_resurrect",
            RpcCall::SetDetails { .. } => "set_details",
            RpcCall::SendChat { .. } => "send_chat",
            RpcCall::ReceiveChat { .. } => "receive_chat",
        }
    }
}

/// A call addressed to one entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcEnvelope {
    pub entity_id: EntityId,
    #[serde(flatten)]
    pub call: RpcCall,
}

impl RpcEnvelope {
    pub fn new(entity_id: EntityId, call: RpcCall) -> Self {
        Self { entity_id, call }
    }
}

/// Why a call was not delivered
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RpcError {
    #[error("{call} on {entity} from {sender}: sender is not {required:?}")]
    AuthorityViolation {
        call: &'static str,
        entity: EntityId,
        sender: ParticipantId,
        required: Role,
    },

    #[error("{call} names unknown entity {entity}")]
    UnknownEntity { call: &'static str, entity: EntityId },
}

/// Dispatch-boundary permission check
pub struct RpcChannel;

impl RpcChannel {
    /// Validate `envelope` as sent by `sender`. On success returns the
    /// declared target role the call should be delivered to.
    pub fn authorize(
        envelope: &RpcEnvelope,
        sender: ParticipantId,
        resolver: &impl AuthorityResolver,
    ) -> Result<Role, RpcError> {
        let route = envelope.call.route();
        let authority = resolver
            .authority(envelope.entity_id)
            .ok_or(RpcError::UnknownEntity {
                call: envelope.call.name(),
                entity: envelope.entity_id,
            })?;

        if !authority.holds(sender, route.source) {
            return Err(RpcError::AuthorityViolation {
                call: envelope.call.name(),
                entity: envelope.entity_id,
                sender,
                required: route.source,
            });
        }

        Ok(route.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::authority::Authority;
    use std::collections::HashMap;

    struct Table(HashMap<EntityId, Authority>);

    impl AuthorityResolver for Table {
        fn authority(&self, entity: EntityId) -> Option<Authority> {
            self.0.get(&entity).copied()
        }
    }

    fn setup() -> (Table, ParticipantId, ParticipantId) {
        let host = ParticipantId::new_random();
        let client = ParticipantId::new_random();
        let mut table = HashMap::new();
        table.insert(EntityId(1), Authority::new(client, host));
        table.insert(EntityId(2), Authority::new(host, host));
        (Table(table), host, client)
    }

    #[test]
    fn test_input_authority_reaches_state_authority() {
        let (table, _, client) = setup();
        let envelope = RpcEnvelope::new(EntityId(1), RpcCall::RequestDamage { amount: 10 });
        assert_eq!(RpcChannel::authorize(&envelope, client, &table), Ok(Role::StateAuthority));
    }

    #[test]
    fn test_non_input_authority_is_rejected() {
        let (table, host, client) = setup();

        // Client poking the host's avatar
        let envelope = RpcEnvelope::new(EntityId(2), RpcCall::TogglePoison);
        assert!(matches!(
            RpcChannel::authorize(&envelope, client, &table),
            Err(RpcError::AuthorityViolation { required: Role::InputAuthority, .. })
        ));

        // The host is state authority of #1 but not its input authority
        let envelope = RpcEnvelope::new(EntityId(1), RpcCall::SetDetails {
            name: "hijack".to_string(),
            color_index: 0,
        });
        assert!(RpcChannel::authorize(&envelope, host, &table).is_err());
    }

    #[test]
    fn test_client_cannot_forge_state_broadcast() {
        let (table, host, client) = setup();
        let envelope = RpcEnvelope::new(EntityId(1), RpcCall::ReceiveChat {
            text: "server: you win".to_string(),
        });
        assert!(RpcChannel::authorize(&envelope, client, &table).is_err());
        assert_eq!(RpcChannel::authorize(&envelope, host, &table), Ok(Role::All));
    }

    #[test]
    fn test_unknown_entity() {
        let (table, _, client) = setup();
        let envelope = RpcEnvelope::new(EntityId(99), RpcCall::TogglePoison);
        assert_eq!(
            RpcChannel::authorize(&envelope, client, &table),
            Err(RpcError::UnknownEntity { call: "toggle_poison", entity: EntityId(99) })
        );
    }

    #[test]
    fn test_envelope_wire_shape() {
        let envelope = RpcEnvelope::new(EntityId(4), RpcCall::RequestResurrect { target: EntityId(7) });
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "entity_id": 4, "call": "request_resurrect", "target": 7 })
        );
    }
}
