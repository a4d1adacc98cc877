//! # Remote Smoothing
//!
//! Characters controlled by someone else are only known from periodic
//! authoritative snapshots. The smoother turns them into a position for
//! every render frame.
//!
//! ```text
//! Snapshots:   [a]───────[b]
//! Render:           ▲ interpolate a→b
//!
//! Snapshots:   [a]───────[b]
//! Render:                    ▲ extrapolate from b with b.velocity
//!
//! Snapshots:   [a]───────[b]
//! Render:      |<── stale_timeout ──>|   ▲ frozen at a + stale_timeout
//! ```
//!
//! Extrapolation never runs further than `stale_timeout` past the start of
//! the newest segment (the older snapshot of the newest pair, or the newest
//! snapshot alone when the pair is further apart than the timeout). Past
//! that point the view freezes and reports [`RemoteStatus::Stale`], a
//! normal state that ends with the next snapshot.

use std::collections::VecDeque;

use arena_shared::{MovementMode, RemoteSnapshot, Vec3};

use crate::config::RemoteConfig;

/// Snapshots kept for interpolation.
const SNAPSHOT_HISTORY: usize = 32;

/// How a remote view was produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RemoteStatus {
    /// No snapshot received yet.
    Empty,
    /// Between two snapshots (or clamped to the oldest one).
    Interpolating,
    /// Past the newest snapshot, projected along its velocity.
    Extrapolating,
    /// Past the staleness limit, frozen.
    Stale,
}

/// Render-time view of a remote character.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RemoteView {
    /// Position to draw.
    pub position: Vec3,
    /// Velocity at that position.
    pub velocity: Vec3,
    /// Movement mode to animate.
    pub mode: MovementMode,
    /// How the view was produced.
    pub status: RemoteStatus,
}

impl RemoteView {
    const EMPTY: Self = Self {
        position: Vec3::ZERO,
        velocity: Vec3::ZERO,
        mode: MovementMode::Walking,
        status: RemoteStatus::Empty,
    };
}

/// Interpolating/extrapolating view of one remote character.
#[derive(Clone, Debug)]
pub struct RemoteSmoother {
    snapshots: VecDeque<RemoteSnapshot>,
    config: RemoteConfig,
    /// Snapshots ignored as duplicate or out of order.
    pub ignored: u64,
}

impl RemoteSmoother {
    /// Creates an empty smoother.
    #[must_use]
    pub fn new(config: RemoteConfig) -> Self {
        Self {
            snapshots: VecDeque::with_capacity(SNAPSHOT_HISTORY),
            config,
            ignored: 0,
        }
    }

    /// Accepts a snapshot. Returns false if it was not newer than the
    /// newest one held.
    pub fn push(&mut self, snapshot: RemoteSnapshot) -> bool {
        if let Some(newest) = self.snapshots.back() {
            if snapshot.timestamp <= newest.timestamp {
                self.ignored += 1;
                tracing::debug!(
                    "Ignoring remote snapshot {:.4} (newest {:.4})",
                    snapshot.timestamp,
                    newest.timestamp
                );
                return false;
            }
        }
        if self.snapshots.len() == SNAPSHOT_HISTORY {
            self.snapshots.pop_front();
        }
        self.snapshots.push_back(snapshot);
        true
    }

    /// View of the character at `render_time`.
    #[must_use]
    pub fn sample(&self, render_time: f64) -> RemoteView {
        let time = render_time - self.config.interpolation_delay;
        let (Some(oldest), Some(newest)) = (self.snapshots.front(), self.snapshots.back()) else {
            return RemoteView::EMPTY;
        };

        if time <= oldest.timestamp {
            return Self::view_of(oldest, oldest.position, RemoteStatus::Interpolating);
        }
        if time < newest.timestamp {
            return self.interpolate(time);
        }

        // Extrapolation from the newest snapshot. A pair further apart than
        // the timeout is not a segment; the newest snapshot starts a new one.
        let segment_start = self
            .snapshots
            .len()
            .checked_sub(2)
            .and_then(|i| self.snapshots.get(i))
            .filter(|previous| newest.timestamp - previous.timestamp <= self.config.stale_timeout)
            .map_or(newest.timestamp, |previous| previous.timestamp);
        let freeze_at = segment_start + self.config.stale_timeout;
        let effective = time.min(freeze_at);
        let ahead = (effective - newest.timestamp).max(0.0) as f32;
        let position = newest.position + newest.velocity * ahead;

        let status = if time > freeze_at {
            RemoteStatus::Stale
        } else if time > newest.timestamp {
            RemoteStatus::Extrapolating
        } else {
            RemoteStatus::Interpolating
        };
        Self::view_of(newest, position, status)
    }

    /// Newest snapshot held.
    #[must_use]
    pub fn latest(&self) -> Option<&RemoteSnapshot> {
        self.snapshots.back()
    }

    /// Number of snapshots held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Returns true if no snapshot is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Forgets every snapshot (character respawned or left).
    pub fn clear(&mut self) {
        self.snapshots.clear();
    }

    fn interpolate(&self, time: f64) -> RemoteView {
        let after = self.snapshots.partition_point(|s| s.timestamp <= time);
        let (Some(a), Some(b)) = (self.snapshots.get(after.saturating_sub(1)), self.snapshots.get(after)) else {
            return RemoteView::EMPTY;
        };
        let span = b.timestamp - a.timestamp;
        let alpha = if span > 0.0 { ((time - a.timestamp) / span) as f32 } else { 1.0 };

        RemoteView {
            position: a.position.lerp(b.position, alpha),
            velocity: a.velocity.lerp(b.velocity, alpha),
            mode: a.mode,
            status: RemoteStatus::Interpolating,
        }
    }

    fn view_of(snapshot: &RemoteSnapshot, position: Vec3, status: RemoteStatus) -> RemoteView {
        RemoteView {
            position,
            velocity: snapshot.velocity,
            mode: snapshot.mode,
            status,
        }
    }
}
