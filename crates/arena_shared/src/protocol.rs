//! Movement protocol types shared between client and authority.
//!
//! ```text
//! CLIENT                                   AUTHORITY
//!   |--- ClientMovePacket (every send) ------>|  re-simulates each move
//!   |<-- Correction (only on divergence) -----|
//!   |<-- AckGoodMove (rate limited) ----------|
//!   |                                         |
//! OBSERVERS <-- RemoteSnapshot (replication cadence)
//! ```
//!
//! Silence is part of the protocol: a move that predicted correctly gets
//! no reply at all.

use crate::math::{Vec3, ViewRotation};
use serde::{Deserialize, Serialize};

/// Surface a slide is happening on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SlideSurface {
    /// Sliding along the floor after a slide press.
    Floor,
    /// Sliding down a wall while airborne.
    Wall,
}

/// Discrete movement mode of a character.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MovementMode {
    /// On the ground.
    #[default]
    Walking,
    /// Airborne.
    Falling,
    /// Inside a liquid volume.
    Swimming,
    /// Time-bounded slide on the floor, or wall slide while falling.
    Sliding(SlideSurface),
    /// Time-bounded dodge.
    Dodging,
}

impl MovementMode {
    /// True for modes where the character stands on a floor.
    #[inline]
    #[must_use]
    pub const fn is_grounded(self) -> bool {
        matches!(self, Self::Walking | Self::Sliding(SlideSurface::Floor))
    }
}

/// Reference to the object a character stands on (a lift, a platform).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BaseId(pub u32);

/// Direction of a dodge relative to the view yaw.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum DodgeDirection {
    /// Along the view direction.
    Forward = 1,
    /// Against the view direction.
    Back = 2,
    /// To the left of the view direction.
    Left = 3,
    /// To the right of the view direction.
    Right = 4,
}

impl DodgeDirection {
    /// Decodes the 3-bit dodge field of the flag byte.
    #[must_use]
    pub const fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            1 => Some(Self::Forward),
            2 => Some(Self::Back),
            3 => Some(Self::Left),
            4 => Some(Self::Right),
            _ => None,
        }
    }

    /// World-space horizontal direction for a given view.
    #[must_use]
    pub fn world_direction(self, view: ViewRotation) -> Vec3 {
        match self {
            Self::Forward => view.forward(),
            Self::Back => -view.forward(),
            Self::Left => -view.right(),
            Self::Right => view.right(),
        }
    }
}

/// One byte carrying every discrete input of a move.
///
/// Layout: bit 0 jump, bits 1-3 dodge direction, bit 4 slide,
/// bit 5 sprint, bit 6 fire.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompressedFlags(pub u8);

impl CompressedFlags {
    /// Flag: Jump pressed.
    pub const JUMP: u8 = 1 << 0;
    /// Mask of the dodge direction field.
    pub const DODGE_MASK: u8 = 0b0000_1110;
    /// Shift of the dodge direction field.
    pub const DODGE_SHIFT: u8 = 1;
    /// Flag: Slide held.
    pub const SLIDE: u8 = 1 << 4;
    /// Flag: Sprint held.
    pub const SPRINT: u8 = 1 << 5;
    /// Flag: Fire pressed.
    pub const FIRE: u8 = 1 << 6;

    /// Flags that make a move important (never delayed, never combined).
    pub const PRESS_MASK: u8 = Self::JUMP | Self::DODGE_MASK | Self::SLIDE;

    /// Builds the flag byte from individual inputs.
    #[must_use]
    pub fn pack(jump: bool, dodge: Option<DodgeDirection>, slide: bool, sprint: bool, fire: bool) -> Self {
        let mut bits = 0u8;
        if jump {
            bits |= Self::JUMP;
        }
        if let Some(direction) = dodge {
            bits |= (direction as u8) << Self::DODGE_SHIFT;
        }
        if slide {
            bits |= Self::SLIDE;
        }
        if sprint {
            bits |= Self::SPRINT;
        }
        if fire {
            bits |= Self::FIRE;
        }
        Self(bits)
    }

    /// Returns true if the jump flag is set.
    #[inline]
    #[must_use]
    pub const fn jump(self) -> bool {
        self.0 & Self::JUMP != 0
    }

    /// Returns the encoded dodge direction, if any.
    #[inline]
    #[must_use]
    pub const fn dodge(self) -> Option<DodgeDirection> {
        DodgeDirection::from_bits((self.0 & Self::DODGE_MASK) >> Self::DODGE_SHIFT)
    }

    /// Returns true if the slide flag is set.
    #[inline]
    #[must_use]
    pub const fn slide(self) -> bool {
        self.0 & Self::SLIDE != 0
    }

    /// Returns true if the sprint flag is set.
    #[inline]
    #[must_use]
    pub const fn sprint(self) -> bool {
        self.0 & Self::SPRINT != 0
    }

    /// Returns true if the fire flag is set.
    #[inline]
    #[must_use]
    pub const fn fire(self) -> bool {
        self.0 & Self::FIRE != 0
    }

    /// Returns true if any press flag (jump, dodge, slide) is set.
    #[inline]
    #[must_use]
    pub const fn has_press(self) -> bool {
        self.0 & Self::PRESS_MASK != 0
    }
}

/// One move as described to the authority - Client -> Server.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClientMove {
    /// Client move-clock time at the end of this move (seconds).
    pub timestamp: f64,
    /// Time covered by this move (seconds).
    pub delta_time: f32,
    /// Discrete inputs.
    pub flags: CompressedFlags,
    /// Acceleration intent (world space, length <= 1).
    pub acceleration: Vec3,
    /// View orientation.
    pub view: ViewRotation,
    /// Where the client ended up after predicting this move.
    pub client_position: Vec3,
    /// Mode the client ended up in.
    pub client_mode: MovementMode,
    /// Movement base the client ended up on.
    pub base: Option<BaseId>,
}

impl ClientMove {
    /// Client move-clock time at the start of this move.
    #[inline]
    #[must_use]
    pub fn start_time(&self) -> f64 {
        self.timestamp - f64::from(self.delta_time)
    }
}

/// Everything a client sends in one datagram.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientMovePacket {
    /// Resend of the oldest unacknowledged important move, in case the
    /// datagram that carried it was lost.
    pub old_move: Option<ClientMove>,
    /// Moves not sent before, oldest first.
    pub moves: Vec<ClientMove>,
}

/// Authoritative outcome for a move the client predicted wrong - Server -> Client.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Correction {
    /// Timestamp of the move this outcome belongs to.
    pub timestamp: f64,
    /// Authoritative position.
    pub position: Vec3,
    /// Authoritative velocity.
    pub velocity: Vec3,
    /// Movement base the character stands on, if any.
    pub base: Option<BaseId>,
    /// Authoritative movement mode.
    pub mode: MovementMode,
}

/// Messages the authority sends to the owning client.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum ServerMessage {
    /// Client prediction diverged; rewind to this state.
    Correction(Correction),
    /// Every move up to `timestamp` was predicted correctly.
    AckGoodMove {
        /// Timestamp of the newest good move.
        timestamp: f64,
    },
}

/// Periodic authoritative state of a character - Server -> Observers.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RemoteSnapshot {
    /// Authority time the sample was taken (seconds).
    pub timestamp: f64,
    /// Position.
    pub position: Vec3,
    /// Velocity (for extrapolation).
    pub velocity: Vec3,
    /// Movement mode.
    pub mode: MovementMode,
}
