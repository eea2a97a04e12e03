//! Avatar movement: ground check, jump, walk/sprint/crouch, facing
//!
//! [`PhysicsSystem::step`] is a pure function of the previous motion state,
//! one input record and the fixed tick delta. The state authority runs it
//! once per tick; the input authority's client runs the same function to
//! predict ahead of the next snapshot.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use super::input::{Buttons, InputRecord};

/// Movement tuning shared by the host and predicting clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovementConfig {
    /// Base walking speed (units/second)
    pub move_speed: f32,
    /// Speed factor while crouching
    pub crouch_multiplier: f32,
    /// Speed factor while sprinting on the ground
    pub sprint_multiplier: f32,
    /// Peak jump height (units)
    pub jump_height: f32,
    /// Gravity acceleration (negative = down)
    pub gravity: f32,
    /// Vertical velocity held while grounded so the body stays snapped down
    pub grounded_bias: f32,
    /// Radius of the ground probe sphere
    pub ground_check_radius: f32,
    /// How far below the feet the probe sphere sits
    pub ground_check_offset: f32,
    /// Facing turn rate (radians/second)
    pub turn_rate: f32,
    /// Input magnitude below which facing is left alone
    pub move_deadzone: f32,
    /// Horizontal half-extent of the body box
    pub body_radius: f32,
    /// Height of the body box
    pub body_height: f32,
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            move_speed: 5.0,
            crouch_multiplier: 0.5,
            sprint_multiplier: 1.5,
            jump_height: 1.2,
            gravity: -9.81,
            grounded_bias: -2.0,
            ground_check_radius: 0.05,
            ground_check_offset: 0.05,
            turn_rate: 4.0 * std::f32::consts::PI,
            move_deadzone: 0.1,
            body_radius: 0.4,
            body_height: 1.8,
        }
    }
}

impl MovementConfig {
    pub fn body(&self) -> Body {
        Body {
            radius: self.body_radius,
            height: self.body_height,
        }
    }

    /// Launch speed that peaks at exactly `jump_height` under `gravity`
    pub fn jump_velocity(&self) -> f32 {
        (self.jump_height * -2.0 * self.gravity).max(0.0).sqrt()
    }
}

/// Upright box collider; `position` is the feet
#[derive(Debug, Clone, Copy)]
pub struct Body {
    pub radius: f32,
    pub height: f32,
}

impl Body {
    fn bounds_at(&self, feet: Vec3) -> Aabb {
        Aabb {
            min: Vec3::new(feet.x - self.radius, feet.y, feet.z - self.radius),
            max: Vec3::new(feet.x + self.radius, feet.y + self.height, feet.z + self.radius),
        }
    }
}

/// Axis-aligned box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self {
            min: min.min(max),
            max: min.max(max),
        }
    }

    /// Strict overlap; touching faces do not count
    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.x < other.max.x
            && self.max.x > other.min.x
            && self.min.y < other.max.y
            && self.max.y > other.min.y
            && self.min.z < other.max.z
            && self.max.z > other.min.z
    }

    pub fn overlaps_sphere(&self, center: Vec3, radius: f32) -> bool {
        let closest = center.clamp(self.min, self.max);
        closest.distance_squared(center) <= radius * radius
    }
}

/// Static geometry queried by the tick step
pub trait CollisionWorld {
    /// Does a sphere at `center` touch solid geometry
    fn overlaps_sphere(&self, center: Vec3, radius: f32) -> bool;

    /// Move `body` from `feet` by `displacement`, stopping at geometry.
    /// Returns the resolved feet position.
    fn move_and_collide(&self, feet: Vec3, displacement: Vec3, body: Body) -> Vec3;
}

/// A solid floor plane with static box obstacles
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArenaWorld {
    pub floor_y: f32,
    pub obstacles: Vec<Aabb>,
}

/// Upper bound on collision substeps per move
const MAX_SUBSTEPS: u32 = 64;

impl ArenaWorld {
    pub fn flat(floor_y: f32) -> Self {
        Self {
            floor_y,
            obstacles: Vec::new(),
        }
    }

    pub fn with_obstacle(mut self, obstacle: Aabb) -> Self {
        self.obstacles.push(obstacle);
        self
    }

    fn blocking(&self, bounds: &Aabb) -> Option<&Aabb> {
        self.obstacles.iter().find(|o| o.intersects(bounds))
    }
}

impl CollisionWorld for ArenaWorld {
    fn overlaps_sphere(&self, center: Vec3, radius: f32) -> bool {
        center.y - radius <= self.floor_y
            || self.obstacles.iter().any(|o| o.overlaps_sphere(center, radius))
    }

    fn move_and_collide(&self, feet: Vec3, displacement: Vec3, body: Body) -> Vec3 {
        if !displacement.is_finite() {
            return feet;
        }

        // Substep so a single step never exceeds half the body width
        let max_step = (body.radius * 0.5).max(0.01);
        let steps = ((displacement.length() / max_step).ceil() as u32).clamp(1, MAX_SUBSTEPS);
        let delta = displacement / steps as f32;

        let mut pos = feet;
        for _ in 0..steps {
            // Horizontal axes first, then vertical, so walls slide and floors land
            for axis in [0usize, 2, 1] {
                if delta[axis] == 0.0 {
                    continue;
                }
                let mut candidate = pos;
                candidate[axis] += delta[axis];
                if axis == 1 && candidate.y < self.floor_y {
                    candidate.y = self.floor_y;
                }

                match self.blocking(&body.bounds_at(candidate)) {
                    None => pos = candidate,
                    Some(hit) if axis == 1 && delta.y < 0.0 => {
                        // Land on top of the obstacle
                        candidate.y = hit.max.y;
                        if self.blocking(&body.bounds_at(candidate)).is_none() {
                            pos = candidate;
                        }
                    }
                    Some(_) => {}
                }
            }
        }
        pos
    }
}

/// Animation hints published with the replicated state
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AnimHints {
    /// Horizontal speed (units/second)
    pub speed: f32,
    pub is_grounded: bool,
    pub is_crouching: bool,
    pub is_jumping: bool,
}

/// Simulation-owned motion fields of one avatar
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MotionState {
    /// Feet position
    pub position: Vec3,
    /// Facing, radians about +Y
    pub yaw: f32,
    pub vertical_velocity: f32,
    /// Last tick's buttons for edge detection (never replicated)
    pub buttons_previous: Buttons,
    pub anim: AnimHints,
}

impl MotionState {
    pub fn at(position: Vec3, yaw: f32) -> Self {
        Self {
            position,
            yaw,
            ..Self::default()
        }
    }
}

/// Wrap an angle into [-PI, PI]
pub fn wrap_angle(angle: f32) -> f32 {
    let wrapped = (angle + std::f32::consts::PI).rem_euclid(std::f32::consts::TAU);
    wrapped - std::f32::consts::PI
}

/// Rotate `current` toward `target` by at most `max_delta`, along the short arc
pub fn turn_towards(current: f32, target: f32, max_delta: f32) -> f32 {
    let diff = wrap_angle(target - current);
    if diff.abs() <= max_delta {
        wrap_angle(target)
    } else {
        wrap_angle(current + diff.signum() * max_delta)
    }
}

/// Movement integration for avatars
pub struct PhysicsSystem;

impl PhysicsSystem {
    /// Advance one tick. The caller is responsible for skipping dead avatars.
    pub fn step(
        prev: &MotionState,
        input: &InputRecord,
        dt: f32,
        config: &MovementConfig,
        world: &dyn CollisionWorld,
    ) -> MotionState {
        let mut next = *prev;

        // Probe slightly below the feet so exact contact still reads as grounded
        let probe = prev.position - Vec3::Y * config.ground_check_offset;
        let grounded = world.overlaps_sphere(probe, config.ground_check_radius);

        if grounded && next.vertical_velocity < 0.0 {
            next.vertical_velocity = config.grounded_bias;
        }

        if grounded && input.buttons.pressed_since(prev.buttons_previous, Buttons::JUMP) {
            next.vertical_velocity = config.jump_velocity();
        }

        let crouching = input.buttons.contains(Buttons::CROUCH);
        let sprinting = !crouching && grounded && input.buttons.contains(Buttons::SPRINT);
        let speed = if crouching {
            config.move_speed * config.crouch_multiplier
        } else if sprinting {
            config.move_speed * config.sprint_multiplier
        } else {
            config.move_speed
        };

        let local = Vec3::new(input.direction.x, 0.0, input.direction.y);
        let horizontal = Quat::from_rotation_y(input.look_yaw) * local * speed;

        next.vertical_velocity += config.gravity * dt;
        let displacement = horizontal * dt + Vec3::Y * (next.vertical_velocity * dt);
        next.position = world.move_and_collide(prev.position, displacement, config.body());

        if input.direction.length() > config.move_deadzone {
            let heading = horizontal.x.atan2(horizontal.z);
            next.yaw = turn_towards(prev.yaw, heading, config.turn_rate * dt);
        }

        next.anim = AnimHints {
            speed: horizontal.length(),
            is_grounded: grounded,
            is_crouching: crouching,
            is_jumping: !grounded && next.vertical_velocity > 0.0,
        };
        next.buttons_previous = input.buttons;

        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;
    use std::f32::consts::{FRAC_PI_2, PI};

    const DT: f32 = 1.0 / 30.0;

    fn forward() -> InputRecord {
        InputRecord {
            direction: Vec2::new(0.0, 1.0),
            ..InputRecord::default()
        }
    }

    fn jump() -> InputRecord {
        InputRecord {
            buttons: Buttons::JUMP,
            ..InputRecord::default()
        }
    }

    fn run(state: &mut MotionState, input: InputRecord, ticks: usize, world: &ArenaWorld) {
        let config = MovementConfig::default();
        for _ in 0..ticks {
            *state = PhysicsSystem::step(state, &input, DT, &config, world);
        }
    }

    #[test]
    fn test_idle_body_stays_on_floor() {
        let world = ArenaWorld::flat(0.0);
        let mut state = MotionState::at(Vec3::ZERO, 0.0);
        run(&mut state, InputRecord::default(), 60, &world);

        assert_eq!(state.position, Vec3::ZERO);
        assert!(state.anim.is_grounded);
        assert_eq!(state.vertical_velocity, -2.0 + -9.81 * DT);
    }

    #[test]
    fn test_falling_body_lands_on_floor() {
        let world = ArenaWorld::flat(0.0);
        let mut state = MotionState::at(Vec3::new(0.0, 3.0, 0.0), 0.0);
        run(&mut state, InputRecord::default(), 90, &world);

        assert_eq!(state.position.y, 0.0);
        assert!(state.anim.is_grounded);
    }

    #[test]
    fn test_jump_reaches_configured_height() {
        let world = ArenaWorld::flat(0.0);
        let config = MovementConfig::default();
        let mut state = MotionState::at(Vec3::ZERO, 0.0);
        let mut peak: f32 = 0.0;

        state = PhysicsSystem::step(&state, &jump(), DT, &config, &world);
        for _ in 0..60 {
            state = PhysicsSystem::step(&state, &InputRecord::default(), DT, &config, &world);
            peak = peak.max(state.position.y);
        }

        assert!(peak > 1.0 && peak < 1.3, "peak was {peak}");
        assert_eq!(state.position.y, 0.0);
    }

    #[test]
    fn test_holding_jump_triggers_once() {
        let world = ArenaWorld::flat(0.0);
        let config = MovementConfig::default();
        let mut state = MotionState::at(Vec3::ZERO, 0.0);
        let mut launches = 0;

        for _ in 0..120 {
            let next = PhysicsSystem::step(&state, &jump(), DT, &config, &world);
            if state.vertical_velocity <= 0.0 && next.vertical_velocity > 0.0 {
                launches += 1;
            }
            state = next;
        }

        assert_eq!(launches, 1);
    }

    #[test]
    fn test_repress_after_landing_jumps_again() {
        let world = ArenaWorld::flat(0.0);
        let mut state = MotionState::at(Vec3::ZERO, 0.0);

        run(&mut state, jump(), 1, &world);
        run(&mut state, InputRecord::default(), 60, &world);
        assert_eq!(state.position.y, 0.0);

        run(&mut state, jump(), 1, &world);
        assert!(state.position.y > 0.0);
        assert!(state.vertical_velocity > 0.0);
    }

    #[test]
    fn test_no_jump_while_airborne() {
        let world = ArenaWorld::flat(0.0);
        let mut state = MotionState::at(Vec3::new(0.0, 5.0, 0.0), 0.0);

        run(&mut state, jump(), 1, &world);
        assert!(state.vertical_velocity < 0.0);
        assert!(!state.anim.is_grounded);
        assert!(!state.anim.is_jumping);
    }

    #[test]
    fn test_movement_is_relative_to_look_yaw() {
        let world = ArenaWorld::flat(0.0);
        let mut state = MotionState::at(Vec3::ZERO, 0.0);
        let input = InputRecord {
            look_yaw: FRAC_PI_2,
            ..forward()
        };
        run(&mut state, input, 30, &world);

        assert!((state.position.x - 5.0).abs() < 1e-3, "x = {}", state.position.x);
        assert!(state.position.z.abs() < 1e-3);
    }

    #[test]
    fn test_sprint_and_crouch_speeds() {
        let world = ArenaWorld::flat(0.0);
        let config = MovementConfig::default();
        let base = MotionState::at(Vec3::ZERO, 0.0);

        let walk = PhysicsSystem::step(&base, &forward(), DT, &config, &world);
        let sprint = PhysicsSystem::step(
            &base,
            &InputRecord { buttons: Buttons::SPRINT, ..forward() },
            DT,
            &config,
            &world,
        );
        let both = PhysicsSystem::step(
            &base,
            &InputRecord { buttons: Buttons::SPRINT.with(Buttons::CROUCH), ..forward() },
            DT,
            &config,
            &world,
        );

        assert!((walk.anim.speed - 5.0).abs() < 1e-4);
        assert!((sprint.anim.speed - 7.5).abs() < 1e-4);
        assert!((both.anim.speed - 2.5).abs() < 1e-4);
        assert!(both.anim.is_crouching);
    }

    #[test]
    fn test_no_sprint_bonus_in_air() {
        let world = ArenaWorld::flat(0.0);
        let config = MovementConfig::default();
        let airborne = MotionState::at(Vec3::new(0.0, 4.0, 0.0), 0.0);
        let next = PhysicsSystem::step(
            &airborne,
            &InputRecord { buttons: Buttons::SPRINT, ..forward() },
            DT,
            &config,
            &world,
        );
        assert!((next.anim.speed - 5.0).abs() < 1e-4);
    }

    #[test]
    fn test_wall_blocks_movement() {
        let wall = Aabb::new(Vec3::new(-5.0, 0.0, 2.0), Vec3::new(5.0, 3.0, 2.5));
        let world = ArenaWorld::flat(0.0).with_obstacle(wall);
        let mut state = MotionState::at(Vec3::ZERO, 0.0);
        run(&mut state, forward(), 60, &world);

        assert!(state.position.z + 0.4 <= 2.0 + 1e-4, "z = {}", state.position.z);
        assert!(state.position.z > 1.0);
    }

    #[test]
    fn test_large_displacement_does_not_tunnel() {
        let thin = Aabb::new(Vec3::new(-5.0, 0.0, 3.0), Vec3::new(5.0, 3.0, 3.05));
        let world = ArenaWorld::flat(0.0).with_obstacle(thin);
        let body = MovementConfig::default().body();

        let end = world.move_and_collide(Vec3::ZERO, Vec3::new(0.0, 0.0, 10.0), body);
        assert!(end.z < 3.0);
    }

    #[test]
    fn test_lands_on_obstacle_top() {
        let crate_box = Aabb::new(Vec3::new(-1.0, 0.0, -1.0), Vec3::new(1.0, 1.0, 1.0));
        let world = ArenaWorld::flat(0.0).with_obstacle(crate_box);
        let mut state = MotionState::at(Vec3::new(0.0, 2.0, 0.0), 0.0);
        run(&mut state, InputRecord::default(), 60, &world);

        assert!((state.position.y - 1.0).abs() < 1e-5);
        assert!(state.anim.is_grounded);
    }

    #[test]
    fn test_facing_turns_at_constant_rate() {
        let world = ArenaWorld::flat(0.0);
        let config = MovementConfig::default();
        let state = MotionState::at(Vec3::ZERO, 0.0);
        let input = InputRecord {
            direction: Vec2::new(0.0, -1.0),
            ..InputRecord::default()
        };

        let next = PhysicsSystem::step(&state, &input, DT, &config, &world);
        assert!((next.yaw.abs() - config.turn_rate * DT).abs() < 1e-4);

        let mut settled = next;
        for _ in 0..30 {
            settled = PhysicsSystem::step(&settled, &input, DT, &config, &world);
        }
        assert!((settled.yaw.abs() - PI).abs() < 1e-4);
    }

    #[test]
    fn test_deadzone_keeps_facing() {
        let world = ArenaWorld::flat(0.0);
        let config = MovementConfig::default();
        let state = MotionState::at(Vec3::ZERO, 1.0);
        let input = InputRecord {
            direction: Vec2::new(0.05, 0.0),
            ..InputRecord::default()
        };
        let next = PhysicsSystem::step(&state, &input, DT, &config, &world);
        assert_eq!(next.yaw, 1.0);
    }

    #[test]
    fn test_turn_towards_takes_short_arc() {
        let turned = turn_towards(3.0, -3.0, 0.1);
        assert!(turned > 3.0 || turned < -3.0);
        assert!((turn_towards(0.0, 0.05, 0.1) - 0.05).abs() < 1e-6);
    }
}
