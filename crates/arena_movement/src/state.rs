//! # Character State and Input
//!
//! [`KinematicState`] is everything the simulator needs to know about a
//! character between ticks. [`InputFrame`] is what the controlling player
//! asked for during one tick.

use arena_shared::{BaseId, CompressedFlags, DodgeDirection, MovementMode, Vec3, ViewRotation};
use serde::{Deserialize, Serialize};

/// Kinematic state of one character.
///
/// Owned by the character's simulation and only ever replaced by the
/// output of [`crate::LocalSimulator::simulate`] or an authoritative
/// correction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct KinematicState {
    /// Feet position.
    pub position: Vec3,
    /// Velocity.
    pub velocity: Vec3,
    /// View orientation.
    pub rotation: ViewRotation,
    /// Discrete movement mode.
    pub mode: MovementMode,
    /// Countdown of the time-bounded modes (dodging, floor sliding).
    pub mode_time_remaining: f32,
    /// Jumps performed since last standing on a floor.
    pub jump_count: u8,
    /// Wall dodges performed since last standing on a floor.
    pub wall_dodge_count: u8,
    /// Time until a dodge is allowed again.
    pub dodge_cooldown: f32,
    /// Whether the character is sprinting.
    pub is_sprinting: bool,
    /// Object the character stands on, if any.
    pub base: Option<BaseId>,
}

impl KinematicState {
    /// A character standing still at `position`.
    #[must_use]
    pub fn at(position: Vec3) -> Self {
        Self { position, ..Self::default() }
    }

    /// Same state with position, velocity, base and mode taken from the
    /// authority. Local-only bookkeeping (counters, timers, view) is kept.
    #[must_use]
    pub fn with_authority(
        self,
        position: Vec3,
        velocity: Vec3,
        base: Option<BaseId>,
        mode: MovementMode,
    ) -> Self {
        let mode_time_remaining = if mode == self.mode { self.mode_time_remaining } else { 0.0 };
        Self {
            position,
            velocity,
            base,
            mode,
            mode_time_remaining,
            ..self
        }
    }
}

/// Inputs of one simulation tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InputFrame {
    /// Requested acceleration direction in world space.
    ///
    /// Length is clamped to 1; the simulator scales it by the configured
    /// maximum acceleration.
    pub acceleration: Vec3,
    /// View orientation.
    pub view: ViewRotation,
    /// Jump pressed this tick.
    pub jump: bool,
    /// Dodge pressed this tick, with direction.
    pub dodge: Option<DodgeDirection>,
    /// Slide held.
    pub slide: bool,
    /// Sprint held.
    pub sprint: bool,
    /// Fire pressed (carried for the weapon code, ignored by movement).
    pub fire: bool,
}

impl InputFrame {
    /// Input that only moves along `acceleration`.
    #[must_use]
    pub fn moving(acceleration: Vec3) -> Self {
        Self { acceleration, ..Self::default() }
    }

    /// Packs the discrete inputs into the wire flag byte.
    #[must_use]
    pub fn compressed_flags(&self) -> CompressedFlags {
        CompressedFlags::pack(self.jump, self.dodge, self.slide, self.sprint, self.fire)
    }

    /// Rebuilds an input frame from what travels over the network.
    #[must_use]
    pub fn from_wire(acceleration: Vec3, view: ViewRotation, flags: CompressedFlags) -> Self {
        Self {
            acceleration,
            view,
            jump: flags.jump(),
            dodge: flags.dodge(),
            slide: flags.slide(),
            sprint: flags.sprint(),
            fire: flags.fire(),
        }
    }
}

/// Something noteworthy that happened during a tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MovementEvent {
    /// Left the ground or performed an air jump.
    Jumped = 1 << 0,
    /// Performed a ground or wall dodge.
    Dodged = 1 << 1,
    /// Touched down after being airborne.
    Landed = 1 << 2,
    /// Started a floor or wall slide.
    StartedSliding = 1 << 3,
}

impl MovementEvent {
    const ALL: [Self; 4] = [Self::Jumped, Self::Dodged, Self::Landed, Self::StartedSliding];
}

/// Set of events emitted by one tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct MovementEvents(u8);

impl MovementEvents {
    /// No events.
    pub const NONE: Self = Self(0);

    /// Adds an event.
    pub fn insert(&mut self, event: MovementEvent) {
        self.0 |= event as u8;
    }

    /// Returns true if `event` is present.
    #[must_use]
    pub const fn contains(self, event: MovementEvent) -> bool {
        self.0 & event as u8 != 0
    }

    /// Returns true if no event is present.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Iterates the events present, in declaration order.
    pub fn iter(self) -> impl Iterator<Item = MovementEvent> {
        MovementEvent::ALL.into_iter().filter(move |event| self.contains(*event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_set() {
        let mut events = MovementEvents::NONE;
        assert!(events.is_empty());
        events.insert(MovementEvent::Landed);
        events.insert(MovementEvent::Jumped);
        assert!(events.contains(MovementEvent::Landed));
        assert!(!events.contains(MovementEvent::Dodged));
        let listed: Vec<_> = events.iter().collect();
        assert_eq!(listed, vec![MovementEvent::Jumped, MovementEvent::Landed]);
    }

    #[test]
    fn test_input_wire_conversion() {
        let input = InputFrame {
            acceleration: Vec3::new(1.0, 0.0, 0.0),
            view: ViewRotation::new(45.0, -10.0),
            jump: false,
            dodge: Some(DodgeDirection::Right),
            slide: true,
            sprint: false,
            fire: true,
        };
        let rebuilt = InputFrame::from_wire(input.acceleration, input.view, input.compressed_flags());
        assert_eq!(rebuilt, input);
    }

    #[test]
    fn test_authority_keeps_local_counters() {
        let local = KinematicState {
            jump_count: 2,
            dodge_cooldown: 0.2,
            mode: MovementMode::Falling,
            ..KinematicState::at(Vec3::new(1.0, 2.0, 3.0))
        };
        let merged = local.with_authority(Vec3::ZERO, Vec3::UP, None, MovementMode::Walking);
        assert_eq!(merged.position, Vec3::ZERO);
        assert_eq!(merged.mode, MovementMode::Walking);
        assert_eq!(merged.jump_count, 2);
        assert!((merged.dodge_cooldown - 0.2).abs() < f32::EPSILON);
    }
}
