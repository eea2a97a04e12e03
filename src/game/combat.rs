//! Health, poison and resurrection rules

use glam::Vec3;

/// Health every avatar spawns and resurrects with
pub const MAX_HEALTH: u32 = 100;

/// Damage dealt per elapsed poison interval
pub const POISON_DAMAGE: u32 = 5;

/// Seconds between poison ticks
pub const POISON_INTERVAL: f32 = 1.0;

/// Max distance between a resurrecting avatar and its target. Used both by
/// the local gesture pre-check and the authoritative re-check.
pub const RESURRECT_RADIUS: f32 = 3.0;

/// Poison status; the timer is only meaningful on the state authority
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PoisonState {
    pub active: bool,
    /// Seconds until the next damage tick, armed only while active
    pub timer: f32,
}

impl PoisonState {
    /// Flip poison on/off, arming the timer when switched on. Returns the new state.
    pub fn toggle(&mut self) -> bool {
        self.active = !self.active;
        self.timer = if self.active { POISON_INTERVAL } else { 0.0 };
        self.active
    }

    pub fn clear(&mut self) {
        self.active = false;
        self.timer = 0.0;
    }

    /// Advance the timer by `dt`. Returns the damage due this tick (0 if none)
    /// and rearms the timer when an interval elapsed.
    pub fn advance(&mut self, dt: f32) -> u32 {
        if !self.active {
            return 0;
        }
        self.timer -= dt;
        if self.timer <= 0.0 {
            self.timer = POISON_INTERVAL;
            POISON_DAMAGE
        } else {
            0
        }
    }
}

/// Combat rules applied by the state authority
pub struct CombatSystem;

impl CombatSystem {
    /// Apply damage to health, returns (new_health, is_dead)
    pub fn apply_damage(current_health: u32, damage: u32) -> (u32, bool) {
        let new_health = current_health.saturating_sub(damage);
        (new_health, new_health == 0)
    }

    /// Authoritative resurrection check against current positions
    pub fn can_resurrect(requester: Vec3, target: Vec3, target_health: u32) -> bool {
        target_health == 0 && requester.distance_squared(target) <= RESURRECT_RADIUS * RESURRECT_RADIUS
    }
}
