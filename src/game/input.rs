//! Per-tick input capture
//!
//! The sampler turns raw local control state into the fixed-shape
//! [`InputRecord`] shipped to the state authority every tick. While a UI
//! overlay owns keyboard focus (the chat box) the record is silenced so
//! typing never moves the avatar.

use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Button bitmask carried by every input record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Buttons(u8);

impl Buttons {
    pub const NONE: Buttons = Buttons(0);
    pub const JUMP: Buttons = Buttons(1 << 0);
    pub const CROUCH: Buttons = Buttons(1 << 1);
    pub const SPRINT: Buttons = Buttons(1 << 2);

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, other: Buttons) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    pub fn set(&mut self, button: Buttons, pressed: bool) {
        if pressed {
            self.0 |= button.0;
        } else {
            self.0 &= !button.0;
        }
    }

    pub fn with(mut self, button: Buttons) -> Self {
        self.set(button, true);
        self
    }

    /// `button` went from released (in `previous`) to held (in `self`)
    pub fn pressed_since(self, previous: Buttons, button: Buttons) -> bool {
        self.contains(button) && !previous.contains(button)
    }
}

/// One tick of input for one entity
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct InputRecord {
    /// Move intent (x = strafe, y = forward), length <= 1
    pub direction: Vec2,
    /// Interact held this tick
    pub interact: bool,
    /// Camera yaw in radians; movement is relative to it
    pub look_yaw: f32,
    pub buttons: Buttons,
}

impl InputRecord {
    /// Re-apply the shape constraints to a record received off the wire
    pub fn sanitized(mut self) -> Self {
        if !self.direction.is_finite() {
            self.direction = Vec2::ZERO;
        }
        self.direction = self.direction.clamp_length_max(1.0);
        if !self.look_yaw.is_finite() {
            self.look_yaw = 0.0;
        }
        self
    }
}

/// Raw local control state, read once per tick
#[derive(Debug, Clone, Copy, Default)]
pub struct RawControls {
    /// Analog move axis (gamepad stick or bound action)
    pub move_axis: Vec2,
    pub key_forward: bool,
    pub key_back: bool,
    pub key_left: bool,
    pub key_right: bool,
    pub jump: bool,
    pub crouch: bool,
    pub sprint: bool,
    pub interact: bool,
    /// Current camera yaw in radians
    pub look_yaw: f32,
}

impl RawControls {
    fn key_axis(&self) -> Vec2 {
        let mut axis = Vec2::ZERO;
        if self.key_forward {
            axis.y += 1.0;
        }
        if self.key_back {
            axis.y -= 1.0;
        }
        if self.key_left {
            axis.x -= 1.0;
        }
        if self.key_right {
            axis.x += 1.0;
        }
        axis
    }
}

/// A UI surface that can capture keyboard focus
pub trait FocusGate {
    fn is_input_focused(&self) -> bool;
}

/// Used when no overlay is wired up
pub struct NoOverlay;

impl FocusGate for NoOverlay {
    fn is_input_focused(&self) -> bool {
        false
    }
}

/// Produces one sequenced [`InputRecord`] per local tick
#[derive(Debug, Default)]
pub struct InputSampler {
    next_tick: u64,
}

impl InputSampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sample the controls for the next tick, returning `(tick, record)`
    pub fn sample(&mut self, raw: &RawControls, focus: &dyn FocusGate) -> (u64, InputRecord) {
        self.next_tick += 1;
        (self.next_tick, Self::build_record(raw, focus))
    }

    fn build_record(raw: &RawControls, focus: &dyn FocusGate) -> InputRecord {
        if focus.is_input_focused() {
            return InputRecord {
                look_yaw: raw.look_yaw,
                ..InputRecord::default()
            };
        }

        let direction = if raw.move_axis != Vec2::ZERO {
            raw.move_axis
        } else {
            raw.key_axis()
        };

        let mut buttons = Buttons::NONE;
        buttons.set(Buttons::JUMP, raw.jump);
        buttons.set(Buttons::CROUCH, raw.crouch);
        buttons.set(Buttons::SPRINT, raw.sprint);

        InputRecord {
            direction,
            interact: raw.interact,
            look_yaw: raw.look_yaw,
            buttons,
        }
        .sanitized()
    }
}
