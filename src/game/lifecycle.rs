//! Alive / Dead / Spectating state machine
//!
//! Life state is never stored: it is derived from replicated health. Each
//! replica keeps a private health shadow and fires transition effects once
//! when health crosses zero in either direction. Spectating is local camera
//! routing for a dead input authority and never touches canonical state.

use glam::Vec3;

use super::authority::EntityId;
use super::combat::MAX_HEALTH;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifeState {
    Alive,
    Dead,
}

impl LifeState {
    pub fn from_health(health: u32) -> Self {
        if health > 0 {
            LifeState::Alive
        } else {
            LifeState::Dead
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifeTransition {
    Died,
    Revived,
}

/// Local-only health shadow for edge detection
#[derive(Debug, Clone)]
pub struct LifecycleWatcher {
    last_observed_health: u32,
}

impl Default for LifecycleWatcher {
    fn default() -> Self {
        // Start from full health so a late joiner still sees a dead avatar die
        Self {
            last_observed_health: MAX_HEALTH,
        }
    }
}

impl LifecycleWatcher {
    pub fn observe(&mut self, health: u32) -> Option<LifeTransition> {
        let before = LifeState::from_health(self.last_observed_health);
        let after = LifeState::from_health(health);
        self.last_observed_health = health;

        match (before, after) {
            (LifeState::Alive, LifeState::Dead) => Some(LifeTransition::Died),
            (LifeState::Dead, LifeState::Alive) => Some(LifeTransition::Revived),
            _ => None,
        }
    }

    pub fn state(&self) -> LifeState {
        LifeState::from_health(self.last_observed_health)
    }
}

/// Previous value of one watched attribute, compared once per render pass
#[derive(Debug, Clone)]
pub struct Watched<T> {
    previous: Option<T>,
}

impl<T> Default for Watched<T> {
    fn default() -> Self {
        Self { previous: None }
    }
}

impl<T: PartialEq + Clone> Watched<T> {
    /// True on first sight and whenever the value differs from last time
    pub fn changed(&mut self, current: &T) -> bool {
        if self.previous.as_ref() == Some(current) {
            return false;
        }
        self.previous = Some(current.clone());
        true
    }
}

/// Where the local view is attached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraMode {
    /// Normal third-person follow of the local avatar
    Follow(EntityId),
    /// Detached free-look after death
    FreeLook,
    /// Attached to another avatar while dead
    Spectate(EntityId),
}

/// Output side of the state machine: model visibility, death marker,
/// death screen, camera routing, HP bar and nameplates
pub trait PresentationSink {
    fn set_model_visible(&mut self, entity: EntityId, visible: bool);
    fn spawn_death_marker(&mut self, entity: EntityId, position: Vec3);
    fn remove_death_marker(&mut self, entity: EntityId);
    fn show_death_screen(&mut self, visible: bool);
    fn set_camera(&mut self, mode: CameraMode);

    fn update_health_bar(&mut self, _current: u32, _max: u32) {}
    fn update_nameplate(&mut self, _entity: EntityId, _name: &str, _color_index: u8, _team: u8) {}
}

/// Round-robin spectate target selection
#[derive(Debug, Clone, Default)]
pub struct SpectateCursor {
    current: Option<EntityId>,
}

impl SpectateCursor {
    pub fn current(&self) -> Option<EntityId> {
        self.current
    }

    /// Advance to the next candidate after the current one, wrapping.
    /// `candidates` must be in ascending id order.
    pub fn advance<I>(&mut self, candidates: I) -> Option<EntityId>
    where
        I: IntoIterator<Item = EntityId>,
    {
        let candidates: Vec<EntityId> = candidates.into_iter().collect();
        let next = match self.current {
            Some(current) => candidates
                .iter()
                .copied()
                .find(|id| *id > current)
                .or_else(|| candidates.first().copied()),
            None => candidates.first().copied(),
        };
        self.current = next;
        next
    }

    /// Drop `entity` if it is the current target. Returns true if it was.
    pub fn forget(&mut self, entity: EntityId) -> bool {
        if self.current == Some(entity) {
            self.current = None;
            true
        } else {
            false
        }
    }

    pub fn reset(&mut self) {
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_death_fires_once() {
        let mut watcher = LifecycleWatcher::default();
        assert_eq!(watcher.observe(70), None);
        assert_eq!(watcher.observe(0), Some(LifeTransition::Died));
        assert_eq!(watcher.observe(0), None);
        assert_eq!(watcher.state(), LifeState::Dead);
    }

    #[test]
    fn test_revive_fires_once() {
        let mut watcher = LifecycleWatcher::default();
        watcher.observe(0);
        assert_eq!(watcher.observe(100), Some(LifeTransition::Revived));
        assert_eq!(watcher.observe(100), None);
        assert_eq!(watcher.state(), LifeState::Alive);
    }

    #[test]
    fn test_late_join_sees_death() {
        let mut watcher = LifecycleWatcher::default();
        assert_eq!(watcher.observe(0), Some(LifeTransition::Died));
    }

    #[test]
    fn test_watched_reports_changes_only() {
        let mut name = Watched::default();
        assert!(name.changed(&"Player 1".to_string()));
        assert!(!name.changed(&"Player 1".to_string()));
        assert!(name.changed(&"Ada".to_string()));
    }

    #[test]
    fn test_spectate_cycles_and_wraps() {
        let ids = [EntityId(2), EntityId(5), EntityId(9)];
        let mut cursor = SpectateCursor::default();

        assert_eq!(cursor.advance(ids), Some(EntityId(2)));
        assert_eq!(cursor.advance(ids), Some(EntityId(5)));
        assert_eq!(cursor.advance(ids), Some(EntityId(9)));
        assert_eq!(cursor.advance(ids), Some(EntityId(2)));
    }

    #[test]
    fn test_spectate_skips_departed_target() {
        let mut cursor = SpectateCursor::default();
        cursor.advance([EntityId(2), EntityId(5)]);
        cursor.advance([EntityId(2), EntityId(5)]);
        assert!(cursor.forget(EntityId(5)));
        assert_eq!(cursor.current(), None);
        assert_eq!(cursor.advance([EntityId(2)]), Some(EntityId(2)));
        assert_eq!(cursor.advance(Vec::<EntityId>::new()), None);
    }
}
