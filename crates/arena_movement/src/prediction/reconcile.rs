//! # Reconciliation
//!
//! Applies authoritative corrections to the locally predicted timeline.
//!
//! ```text
//! buffer:      [1][2][3][4][5]
//! correction:        ▲ t=3, authoritative P
//! acknowledge: drop [1][2][3]
//! replay:      P ─► sim(4) ─► sim(5) ─► new predicted state
//! render:      only the final state, blended visually
//! ```
//!
//! Corrections the buffer can not place (older than its oldest move or
//! newer than its newest) mean the timelines drifted apart: the buffer is
//! discarded and the character snaps to the authoritative state.

use std::sync::Arc;

use arena_shared::{Correction, Vec3};

use crate::clock::Clock;
use crate::config::CorrectionConfig;
use crate::interpolation::CorrectionSmoother;
use crate::simulator::LocalSimulator;
use crate::state::KinematicState;

use super::history::{MoveHistoryBuffer, ReplayJob};

/// How far off the prediction was.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CorrectionKind {
    /// Within the large-correction threshold; blended quickly.
    Small,
    /// Beyond the threshold; blended slowly or snapped.
    Large,
}

/// What a correction did to the local timeline.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ReconciliationOutcome {
    /// Prediction rewound and replayed to completion.
    Corrected {
        /// Size class of the error.
        kind: CorrectionKind,
        /// Predicted vs authoritative position at the corrected move.
        position_error: f32,
        /// Predicted vs authoritative velocity at the corrected move.
        velocity_error: f32,
        /// Moves replayed on top of the authoritative state.
        replayed: usize,
        /// New predicted state after the newest move.
        final_state: KinematicState,
    },
    /// Replay started but exceeds this frame's budget; finished by
    /// [`ReconciliationEngine::advance`].
    ReplayPending {
        /// Size class of the error.
        kind: CorrectionKind,
        /// Predicted vs authoritative position at the corrected move.
        position_error: f32,
        /// Predicted vs authoritative velocity at the corrected move.
        velocity_error: f32,
    },
    /// Buffer discarded, character snapped to the authoritative state.
    Resynchronized {
        /// State after the snap.
        state: KinematicState,
    },
    /// Not newer than a correction or confirmation already applied;
    /// nothing changed.
    Stale {
        /// Timestamp the correction referenced.
        timestamp: f64,
    },
}

/// Reconciliation counters.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ReconciliationStats {
    /// Corrections within the large-correction threshold.
    pub small_corrections: u64,
    /// Corrections beyond the large-correction threshold.
    pub large_corrections: u64,
    /// Full resynchronizations.
    pub resyncs: u64,
    /// Corrections ignored as stale.
    pub stale: u64,
    /// Replays cancelled by a newer correction.
    pub preempted_replays: u64,
    /// Largest position error seen.
    pub max_position_error: f32,
}

struct PendingReplay {
    job: ReplayJob,
    kind: CorrectionKind,
    position_error: f32,
    velocity_error: f32,
}

/// Compares authoritative outcomes with buffered predictions and rewinds
/// the prediction when they disagree.
pub struct ReconciliationEngine {
    simulator: LocalSimulator,
    config: CorrectionConfig,
    clock: Arc<dyn Clock>,
    smoother: CorrectionSmoother,
    /// Moves replayed per [`Self::advance`] call (0 = all at once).
    replay_budget: usize,
    last_applied: Option<f64>,
    pending: Option<PendingReplay>,
    stats: ReconciliationStats,
}

impl ReconciliationEngine {
    /// Creates an engine.
    #[must_use]
    pub fn new(
        simulator: LocalSimulator,
        config: CorrectionConfig,
        replay_budget: usize,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let smoother = CorrectionSmoother::new(config.clone());
        Self {
            simulator,
            config,
            clock,
            smoother,
            replay_budget,
            last_applied: None,
            pending: None,
            stats: ReconciliationStats::default(),
        }
    }

    /// Applies `correction` to `buffer`.
    ///
    /// `current` is the character's present predicted state; it provides the
    /// starting point of the visual blend and the local bookkeeping kept
    /// across a resync.
    pub fn reconcile(
        &mut self,
        correction: &Correction,
        buffer: &mut MoveHistoryBuffer,
        current: &KinematicState,
    ) -> ReconciliationOutcome {
        if self.last_applied.map_or(false, |last| correction.timestamp <= last) {
            self.stats.stale += 1;
            tracing::debug!(
                "Ignoring stale correction {:.4} (already applied {:.4})",
                correction.timestamp,
                self.last_applied.unwrap_or_default()
            );
            return ReconciliationOutcome::Stale { timestamp: correction.timestamp };
        }

        if let Some(preempted) = self.pending.take() {
            self.stats.preempted_replays += 1;
            tracing::debug!(
                "Correction {:.4} preempts replay from {:.4} after {} moves",
                correction.timestamp,
                preempted.job.from_timestamp(),
                preempted.job.replayed()
            );
        }
        self.last_applied = Some(correction.timestamp);

        let in_range = match (buffer.oldest_timestamp(), buffer.newest()) {
            (Some(oldest), Some(newest)) => {
                correction.timestamp >= oldest && correction.timestamp <= newest.timestamp
            }
            _ => false,
        };
        let predicted = if in_range { buffer.find_at_or_before(correction.timestamp) } else { None };
        let Some(predicted) = predicted.map(|record| record.result) else {
            return self.resynchronize(correction, buffer, current);
        };

        let position_error = predicted.position.distance(correction.position);
        let velocity_error = predicted.velocity.distance(correction.velocity);
        let kind = if position_error > self.config.large_correction_threshold {
            self.stats.large_corrections += 1;
            CorrectionKind::Large
        } else {
            self.stats.small_corrections += 1;
            CorrectionKind::Small
        };
        self.stats.max_position_error = self.stats.max_position_error.max(position_error);
        tracing::debug!(
            "Correction at {:.4}: position error {:.2}, velocity error {:.2} ({:?})",
            correction.timestamp,
            position_error,
            velocity_error,
            kind
        );

        let base = predicted.with_authority(
            correction.position,
            correction.velocity,
            correction.base,
            correction.mode,
        );
        buffer.acknowledge_up_to(correction.timestamp);

        let mut job = ReplayJob::new(correction.timestamp, base);
        let finished = job.step(buffer, &self.simulator, self.replay_budget);
        let pending = PendingReplay { job, kind, position_error, velocity_error };
        if finished {
            return self.finish(pending, buffer, current);
        }

        self.pending = Some(pending);
        ReconciliationOutcome::ReplayPending { kind, position_error, velocity_error }
    }

    /// Continues a replay left pending by [`Self::reconcile`].
    ///
    /// Returns the final outcome once the replay completes, `None` while it
    /// is still running or when nothing is pending.
    pub fn advance(
        &mut self,
        buffer: &mut MoveHistoryBuffer,
        current: &KinematicState,
    ) -> Option<ReconciliationOutcome> {
        let mut pending = self.pending.take()?;
        if pending.job.step(buffer, &self.simulator, self.replay_budget) {
            Some(self.finish(pending, buffer, current))
        } else {
            self.pending = Some(pending);
            None
        }
    }

    /// Returns true while a replay is pending.
    #[must_use]
    pub fn is_replaying(&self) -> bool {
        self.pending.is_some()
    }

    /// Where to draw the controlled character whose logical position is `logical`.
    #[must_use]
    pub fn visual_position(&self, logical: Vec3) -> Vec3 {
        self.smoother.visual_position(logical, self.clock.now())
    }

    /// Correction smoother state.
    #[must_use]
    pub fn smoother(&self) -> &CorrectionSmoother {
        &self.smoother
    }

    /// Records that the authority confirmed every move up to `timestamp`.
    ///
    /// A correction at or before it was sent before the confirmation and
    /// is stale once it arrives.
    pub fn confirm_up_to(&mut self, timestamp: f64) {
        if self.last_applied.map_or(true, |last| timestamp > last) {
            self.last_applied = Some(timestamp);
        }
    }

    /// Timestamp of the newest correction or confirmation applied.
    #[must_use]
    pub const fn last_applied(&self) -> Option<f64> {
        self.last_applied
    }

    /// Counters.
    #[must_use]
    pub const fn stats(&self) -> &ReconciliationStats {
        &self.stats
    }

    /// Drops any pending replay and visual blend (respawn).
    ///
    /// The newest applied timestamp is kept: move timestamps keep running.
    pub fn reset(&mut self) {
        self.pending = None;
        self.smoother.cancel();
    }

    fn finish(
        &mut self,
        pending: PendingReplay,
        buffer: &mut MoveHistoryBuffer,
        current: &KinematicState,
    ) -> ReconciliationOutcome {
        let now = self.clock.now();
        let visual_before = self.smoother.visual_position(current.position, now);
        let replayed = pending.job.replayed();
        let final_state = pending.job.commit(buffer);
        self.smoother.start(visual_before, final_state.position, pending.kind, now);

        ReconciliationOutcome::Corrected {
            kind: pending.kind,
            position_error: pending.position_error,
            velocity_error: pending.velocity_error,
            replayed,
            final_state,
        }
    }

    fn resynchronize(
        &mut self,
        correction: &Correction,
        buffer: &mut MoveHistoryBuffer,
        current: &KinematicState,
    ) -> ReconciliationOutcome {
        self.stats.resyncs += 1;
        tracing::warn!(
            "Correction {:.4} outside buffered moves ({:?}..{:?}), resynchronizing {} moves",
            correction.timestamp,
            buffer.oldest_timestamp(),
            buffer.newest().map(|r| r.timestamp),
            buffer.len()
        );
        buffer.clear();
        self.smoother.snap();

        let state = current.with_authority(
            correction.position,
            correction.velocity,
            correction.base,
            correction.mode,
        );
        ReconciliationOutcome::Resynchronized { state }
    }
}
