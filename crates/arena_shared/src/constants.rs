//! # Protocol Constants
//!
//! Defaults both sides start from. Every tuning value here can be
//! overridden through the movement configuration; these are only the
//! values a fresh install ships with.

// =============================================================================
// CADENCE
// =============================================================================

/// Client prediction tick rate (moves simulated per second).
pub const CLIENT_TICK_RATE: u32 = 60;

/// Rate at which remote snapshots are replicated (per second).
pub const SNAPSHOT_RATE: u32 = 20;

/// Minimum interval between move packets when nothing important happened.
pub const NET_SEND_INTERVAL: f64 = 1.0 / 30.0;

// =============================================================================
// MOVE LIMITS
// =============================================================================

/// Largest delta time a single move may cover (seconds).
///
/// Longer frames are clamped before simulation so a hitch can not launch a
/// character through geometry.
pub const MAX_MOVE_DELTA_TIME: f32 = 0.125;

/// Largest delta time two combined moves may cover together (seconds).
pub const MAX_COMBINE_TIME: f32 = 0.05;

/// Upper bound on unacknowledged moves kept by a client.
pub const MAX_SAVED_MOVES: usize = 96;

// =============================================================================
// CORRECTION THRESHOLDS
// =============================================================================

/// Squared distance between client and authority positions tolerated
/// before the authority sends a correction.
pub const MAX_POSITION_ERROR_SQUARED: f32 = 3.0;

/// Error distance above which a correction is considered large.
pub const LARGE_CORRECTION_THRESHOLD: f32 = 15.0;

/// Minimum spacing between corrections sent to one client (seconds).
pub const MIN_TIME_BETWEEN_CLIENT_ADJUSTMENTS: f64 = 0.1;

/// Minimum spacing between good-move acknowledgements (seconds).
pub const GOOD_MOVE_ACK_INTERVAL: f64 = 0.1;
