//! # Arena Shared
//!
//! Types used by both the predicting client and the movement authority.
//!
//! ## Rule
//!
//! This crate holds vocabulary, not behavior: vectors, movement modes,
//! the compressed flag byte, and the messages that cross the network
//! boundary. The simulation itself lives in `arena_movement`.

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod constants;
pub mod math;
pub mod protocol;

pub use constants::{CLIENT_TICK_RATE, MAX_MOVE_DELTA_TIME, MAX_SAVED_MOVES, SNAPSHOT_RATE};
pub use math::{Vec3, ViewRotation};
pub use protocol::{
    BaseId, ClientMove, ClientMovePacket, CompressedFlags, Correction, DodgeDirection,
    MovementMode, RemoteSnapshot, ServerMessage, SlideSurface,
};
