//! # Movement Error Types
//!
//! Errors that can occur while configuring or running the movement protocol.
//!
//! Divergence, desync and stale snapshots are not errors: they are normal
//! conditions of a lossy network and surface as outcome values instead.

use thiserror::Error;

/// Errors that can occur in the movement system.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MovementError {
    /// Configuration values are out of range or inconsistent.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration file could not be read or parsed.
    #[error("failed to load configuration: {0}")]
    ConfigIo(String),

    /// A move was recorded with a timestamp not after the previous one.
    #[error("non-monotonic move timestamp {timestamp} (last {last})")]
    NonMonotonicTimestamp {
        /// Offending timestamp.
        timestamp: f64,
        /// Newest timestamp already recorded.
        last: f64,
    },

    /// A client move failed validation and was not applied.
    #[error("malformed move at {timestamp}: {reason}")]
    MalformedMove {
        /// Timestamp carried by the move.
        timestamp: f64,
        /// What was wrong with it.
        reason: &'static str,
    },

    /// A client's move clock is running ahead of authority time.
    #[error("move timestamp {timestamp} runs {ahead_by:.3}s ahead of the authority")]
    TimestampAhead {
        /// Timestamp carried by the move.
        timestamp: f64,
        /// How far ahead of authority time the client clock is.
        ahead_by: f64,
    },

    /// The other end of a transport went away.
    #[error("transport closed")]
    TransportClosed,
}

/// Result type for movement operations.
pub type MovementResult<T> = Result<T, MovementError>;
