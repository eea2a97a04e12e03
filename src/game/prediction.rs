//! Client-side prediction for the locally controlled avatar
//!
//! The input authority runs the same tick step as the host on every input it
//! sends, keeping the record until a snapshot acknowledges it. When a
//! snapshot arrives the predicted state is reset to the authoritative one and
//! every unacknowledged input is replayed on top.

use std::collections::VecDeque;

use tracing::debug;

use crate::ws::protocol::PlayerSnapshot;

use super::input::InputRecord;
use super::physics::{CollisionWorld, MotionState, MovementConfig, PhysicsSystem};

/// Inputs kept for replay before the oldest are discarded
const MAX_PENDING_INPUTS: usize = 128;

pub struct Predictor {
    config: MovementConfig,
    dt: f32,
    motion: MotionState,
    alive: bool,
    pending: VecDeque<(u64, InputRecord)>,
}

impl Predictor {
    pub fn new(config: MovementConfig, dt: f32, motion: MotionState) -> Self {
        Self {
            config,
            dt,
            motion,
            alive: true,
            pending: VecDeque::new(),
        }
    }

    /// Predicted motion of the local avatar
    pub fn motion(&self) -> &MotionState {
        &self.motion
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Step the prediction with an input that is also being sent to the host
    pub fn push(&mut self, tick: u64, input: InputRecord, world: &dyn CollisionWorld) {
        if !self.alive {
            return;
        }
        let input = input.sanitized();
        if self.pending.len() == MAX_PENDING_INPUTS {
            self.pending.pop_front();
        }
        self.pending.push_back((tick, input));
        self.motion = PhysicsSystem::step(&self.motion, &input, self.dt, &self.config, world);
    }

    /// Reset to the authoritative state and replay inputs newer than the
    /// last one the host applied. Returns the position error corrected.
    pub fn reconcile(&mut self, authoritative: &PlayerSnapshot, world: &dyn CollisionWorld) -> f32 {
        let acked = authoritative.last_input_tick;
        let predicted = self.motion.position;

        // Edge detection resumes from the buttons of the acknowledged input
        let mut buttons_previous = self.motion.buttons_previous;
        while let Some((tick, input)) = self.pending.front() {
            if *tick > acked {
                break;
            }
            buttons_previous = input.buttons;
            self.pending.pop_front();
        }

        self.motion = MotionState {
            position: authoritative.position,
            yaw: authoritative.yaw,
            vertical_velocity: authoritative.vertical_velocity,
            buttons_previous,
            anim: authoritative.anim,
        };

        self.alive = authoritative.is_alive();
        if !self.alive {
            self.pending.clear();
            return 0.0;
        }

        for (_, input) in &self.pending {
            self.motion = PhysicsSystem::step(&self.motion, input, self.dt, &self.config, world);
        }

        let error = predicted.distance(self.motion.position);
        if error > 0.01 {
            debug!(
                acked,
                replayed = self.pending.len(),
                error,
                "Prediction corrected"
            );
        }
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::authority::{EntityId, ParticipantId};
    use crate::game::physics::{AnimHints, ArenaWorld};
    use glam::{Vec2, Vec3};

    const DT: f32 = 1.0 / 30.0;

    fn forward() -> InputRecord {
        InputRecord {
            direction: Vec2::new(0.0, 1.0),
            ..InputRecord::default()
        }
    }

    fn snapshot(position: Vec3, health: u32, last_input_tick: u64) -> PlayerSnapshot {
        PlayerSnapshot {
            entity_id: EntityId(1),
            input_authority: ParticipantId::new_random(),
            position,
            yaw: 0.0,
            vertical_velocity: 0.0,
            health,
            max_health: 100,
            is_poisoned: false,
            team: 0,
            color_index: 0,
            display_name: "Player 1".to_string(),
            anim: AnimHints::default(),
            last_input_tick,
        }
    }

    #[test]
    fn test_reconcile_replays_unacked_inputs() {
        let world = ArenaWorld::flat(0.0);
        let config = MovementConfig::default();

        // Host-side run of the same three inputs
        let mut host = MotionState::default();
        for _ in 0..3 {
            host = PhysicsSystem::step(&host, &forward(), DT, &config, &world);
        }

        let mut predictor = Predictor::new(config.clone(), DT, MotionState::default());
        for tick in 1..=3 {
            predictor.push(tick, forward(), &world);
        }
        assert_eq!(predictor.pending_len(), 3);

        // Host has applied the first input only
        let after_one = PhysicsSystem::step(&MotionState::default(), &forward(), DT, &config, &world);
        predictor.reconcile(&snapshot(after_one.position, 100, 1), &world);

        assert_eq!(predictor.pending_len(), 2);
        assert!(predictor.motion().position.distance(host.position) < 1e-4);
    }

    #[test]
    fn test_reconcile_snaps_to_authority() {
        let world = ArenaWorld::flat(0.0);
        let mut predictor = Predictor::new(MovementConfig::default(), DT, MotionState::default());
        predictor.push(1, forward(), &world);

        let corrected = Vec3::new(4.0, 0.0, 0.0);
        let error = predictor.reconcile(&snapshot(corrected, 100, 1), &world);

        assert_eq!(predictor.motion().position, corrected);
        assert_eq!(predictor.pending_len(), 0);
        assert!(error > 0.0);
    }

    #[test]
    fn test_dead_avatar_is_not_predicted() {
        let world = ArenaWorld::flat(0.0);
        let mut predictor = Predictor::new(MovementConfig::default(), DT, MotionState::default());
        predictor.push(1, forward(), &world);
        predictor.reconcile(&snapshot(Vec3::ZERO, 0, 0), &world);

        assert_eq!(predictor.pending_len(), 0);
        predictor.push(2, forward(), &world);
        assert_eq!(predictor.motion().position, Vec3::ZERO);
        assert_eq!(predictor.pending_len(), 0);
    }
}
