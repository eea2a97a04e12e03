//! Replication surface: which fields are published and how often

use std::collections::BTreeMap;

use crate::ws::protocol::{PlayerSnapshot, ServerMsg};

use super::authority::EntityId;
use super::combat::MAX_HEALTH;
use super::player::PlayerEntity;

impl From<&PlayerEntity> for PlayerSnapshot {
    fn from(p: &PlayerEntity) -> Self {
        // poison timer, buttons_previous and current input stay on the host
        PlayerSnapshot {
            entity_id: p.id,
            input_authority: p.authority.input,
            position: p.motion.position,
            yaw: p.motion.yaw,
            vertical_velocity: p.motion.vertical_velocity,
            health: p.health,
            max_health: MAX_HEALTH,
            is_poisoned: p.poison.active,
            team: p.team,
            color_index: p.color_index,
            display_name: p.display_name.clone(),
            anim: p.motion.anim,
            last_input_tick: p.last_input_tick,
        }
    }
}

/// Builds snapshots for network transmission
pub struct SnapshotBuilder {
    /// Tick counter since last snapshot
    ticks_since_snapshot: u32,
    /// Snapshot interval in ticks
    snapshot_interval: u32,
}

impl SnapshotBuilder {
    pub fn new(snapshot_interval: u32) -> Self {
        Self {
            ticks_since_snapshot: 0,
            snapshot_interval: snapshot_interval.max(1),
        }
    }

    /// Check if it's time to send a snapshot
    pub fn should_send(&mut self) -> bool {
        self.ticks_since_snapshot += 1;
        if self.ticks_since_snapshot >= self.snapshot_interval {
            self.ticks_since_snapshot = 0;
            true
        } else {
            false
        }
    }

    /// Force snapshot on next check (used for health changes and spawns)
    pub fn force_next(&mut self) {
        self.ticks_since_snapshot = self.snapshot_interval;
    }

    /// Build a snapshot message, players in ascending id order
    pub fn build(&self, tick: u64, players: &BTreeMap<EntityId, PlayerEntity>) -> ServerMsg {
        ServerMsg::Snapshot {
            tick,
            players: players.values().map(PlayerSnapshot::from).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::authority::{Authority, ParticipantId};
    use glam::Vec3;

    #[test]
    fn test_should_send_every_interval() {
        let mut builder = SnapshotBuilder::new(3);
        let sent: Vec<bool> = (0..6).map(|_| builder.should_send()).collect();
        assert_eq!(sent, vec![false, false, true, false, false, true]);
    }

    #[test]
    fn test_force_next() {
        let mut builder = SnapshotBuilder::new(10);
        builder.should_send();
        builder.force_next();
        assert!(builder.should_send());
        assert!(!builder.should_send());
    }

    #[test]
    fn test_snapshot_omits_host_only_state() {
        let host = ParticipantId::new_random();
        let mut player = PlayerEntity::spawn(
            EntityId(2),
            Authority::new(host, host),
            Vec3::new(1.0, 0.0, 2.0),
            1,
            "Player 2".to_string(),
        );
        player.toggle_poison();

        let mut players = BTreeMap::new();
        players.insert(player.id, player);

        let json = match SnapshotBuilder::new(1).build(7, &players) {
            msg @ ServerMsg::Snapshot { .. } => serde_json::to_value(&msg).unwrap(),
            other => panic!("unexpected {other:?}"),
        };
        let entry = &json["players"][0];
        assert_eq!(entry["health"], 100);
        assert_eq!(entry["is_poisoned"], true);
        assert!(entry.get("poison_timer").is_none());
        assert!(entry.get("buttons_previous").is_none());
    }
}
