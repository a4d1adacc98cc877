//! # Replication Schedule
//!
//! Fixed cadence for remote snapshots, driven by an injected clock rather
//! than the wall clock. When the caller falls behind, missed slots are
//! skipped instead of bursting.

/// Shortest interval a schedule runs at. Zero, negative and NaN intervals
/// are raised to this so slot arithmetic stays finite.
pub const MIN_INTERVAL: f64 = 1.0e-3;

/// Decides when the next round of snapshots is due.
#[derive(Clone, Copy, Debug)]
pub struct ReplicationSchedule {
    /// Seconds between rounds.
    interval: f64,
    /// Time the next round is due.
    next_due: Option<f64>,
    /// Rounds started.
    rounds: u64,
    /// Slots skipped because the caller was late.
    skipped: u64,
}

impl ReplicationSchedule {
    /// Creates a schedule with `interval` seconds between rounds, at least
    /// [`MIN_INTERVAL`].
    #[must_use]
    pub fn new(interval: f64) -> Self {
        let interval = if interval >= MIN_INTERVAL { interval } else { MIN_INTERVAL };
        Self {
            interval,
            next_due: None,
            rounds: 0,
            skipped: 0,
        }
    }

    /// Returns true if a round is due at `now`, and books the next one.
    pub fn due(&mut self, now: f64) -> bool {
        let due_at = self.next_due.unwrap_or(now);
        if now < due_at {
            return false;
        }

        let mut next = due_at + self.interval;
        if next <= now {
            let missed = ((now - due_at) / self.interval).floor();
            self.skipped += missed as u64;
            next = due_at + (missed + 1.0) * self.interval;
        }
        self.next_due = Some(next);
        self.rounds += 1;
        true
    }

    /// Seconds between rounds.
    #[must_use]
    pub const fn interval(&self) -> f64 {
        self.interval
    }

    /// Rounds started so far.
    #[must_use]
    pub const fn rounds(&self) -> u64 {
        self.rounds
    }

    /// Slots skipped so far.
    #[must_use]
    pub const fn skipped(&self) -> u64 {
        self.skipped
    }
}
