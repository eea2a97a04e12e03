//! Canonical avatar state held by the state authority

use glam::Vec3;

use super::authority::{Authority, EntityId};
use super::combat::{CombatSystem, PoisonState, MAX_HEALTH};
use super::input::InputRecord;
use super::physics::{CollisionWorld, MotionState, MovementConfig, PhysicsSystem};

/// Longest display name, in characters
pub const NAME_MAX_CHARS: usize = 16;

/// Number of selectable avatar colours
pub const PALETTE_LEN: u8 = 8;

/// Outcome of one poison tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoisonTick {
    pub damage: u32,
    pub health: u32,
    pub killed: bool,
}

/// Player state in a session (authoritative)
#[derive(Debug, Clone)]
pub struct PlayerEntity {
    pub id: EntityId,
    pub authority: Authority,

    // Simulation
    pub motion: MotionState,

    // Health
    pub health: u32,
    pub poison: PoisonState,

    // Identity
    pub team: u8,
    pub color_index: u8,
    pub display_name: String,

    // Input tracking
    pub last_input_tick: u64,
    pub current_input: InputRecord,
}

impl PlayerEntity {
    pub fn spawn(
        id: EntityId,
        authority: Authority,
        position: Vec3,
        team: u8,
        display_name: String,
    ) -> Self {
        Self {
            id,
            authority,
            motion: MotionState::at(position, 0.0),
            health: MAX_HEALTH,
            poison: PoisonState::default(),
            team,
            color_index: 0,
            display_name,
            last_input_tick: 0,
            current_input: InputRecord::default(),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.health > 0
    }

    pub fn position(&self) -> Vec3 {
        self.motion.position
    }

    /// Store the newest input; stale or duplicate ticks are ignored
    pub fn accept_input(&mut self, tick: u64, input: InputRecord) -> bool {
        if tick <= self.last_input_tick {
            return false;
        }
        self.last_input_tick = tick;
        self.current_input = input.sanitized();
        true
    }

    /// Run the movement step with the current input. Dead avatars do not move.
    pub fn simulate(&mut self, dt: f32, config: &MovementConfig, world: &dyn CollisionWorld) -> bool {
        if !self.is_alive() {
            return false;
        }
        self.motion = PhysicsSystem::step(&self.motion, &self.current_input, dt, config, world);
        true
    }

    /// Advance poison; damage is applied here and poison clears on death
    pub fn poison_tick(&mut self, dt: f32) -> Option<PoisonTick> {
        if !self.poison.active || !self.is_alive() {
            return None;
        }
        let damage = self.poison.advance(dt);
        if damage == 0 {
            return None;
        }
        let (health, killed) = self.apply_damage(damage);
        Some(PoisonTick {
            damage,
            health,
            killed,
        })
    }

    /// Returns (new_health, is_dead)
    pub fn apply_damage(&mut self, amount: u32) -> (u32, bool) {
        let (health, dead) = CombatSystem::apply_damage(self.health, amount);
        self.health = health;
        if dead {
            self.poison.clear();
        }
        (health, dead)
    }

    pub fn toggle_poison(&mut self) -> bool {
        self.poison.toggle()
    }

    /// Restore full health; no-op (returns false) if already alive
    pub fn resurrect(&mut self) -> bool {
        if self.is_alive() {
            return false;
        }
        self.health = MAX_HEALTH;
        self.motion.vertical_velocity = 0.0;
        true
    }

    /// Apply identity fields. Names are trimmed and capped; out-of-palette
    /// colours keep the previous colour.
    pub fn set_details(&mut self, name: &str, color_index: u8) {
        let name: String = name.trim().chars().take(NAME_MAX_CHARS).collect();
        if !name.is_empty() {
            self.display_name = name;
        }
        if color_index < PALETTE_LEN {
            self.color_index = color_index;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::authority::ParticipantId;
    use crate::game::physics::ArenaWorld;
    use glam::Vec2;

    const POISON_STEP: f32 = 1.0;

    fn player() -> PlayerEntity {
        let host = ParticipantId::new_random();
        let owner = ParticipantId::new_random();
        PlayerEntity::spawn(
            EntityId(1),
            Authority::new(owner, host),
            Vec3::ZERO,
            0,
            "Player 1".to_string(),
        )
    }

    #[test]
    fn test_dead_player_never_moves() {
        let world = ArenaWorld::flat(0.0);
        let config = MovementConfig::default();
        let mut p = player();
        p.accept_input(
            1,
            InputRecord {
                direction: Vec2::new(1.0, 0.0),
                ..InputRecord::default()
            },
        );
        p.apply_damage(MAX_HEALTH);

        for _ in 0..30 {
            assert!(!p.simulate(1.0 / 30.0, &config, &world));
        }
        assert_eq!(p.position(), Vec3::ZERO);
    }

    #[test]
    fn test_stale_input_is_ignored() {
        let mut p = player();
        assert!(p.accept_input(5, InputRecord::default()));
        assert!(!p.accept_input(5, InputRecord::default()));
        assert!(!p.accept_input(3, InputRecord::default()));
        assert_eq!(p.last_input_tick, 5);
    }

    #[test]
    fn test_poison_clears_on_death() {
        let mut p = player();
        p.health = 5;
        p.toggle_poison();

        let tick = p.poison_tick(POISON_STEP).expect("interval elapsed");
        assert_eq!(tick, PoisonTick { damage: 5, health: 0, killed: true });
        assert!(!p.poison.active);
        assert!(p.poison_tick(POISON_STEP).is_none());
    }

    #[test]
    fn test_resurrect_only_when_dead() {
        let mut p = player();
        assert!(!p.resurrect());
        p.apply_damage(200);
        assert_eq!(p.health, 0);
        assert!(p.resurrect());
        assert_eq!(p.health, MAX_HEALTH);
        assert!(!p.resurrect());
    }

    #[test]
    fn test_set_details_sanitizes() {
        let mut p = player();
        p.set_details("  A-very-long-player-name  ", 3);
        assert_eq!(p.display_name, "A-very-long-play");
        assert_eq!(p.color_index, 3);

        p.set_details("   ", 200);
        assert_eq!(p.display_name, "A-very-long-play");
        assert_eq!(p.color_index, 3);
    }
}
