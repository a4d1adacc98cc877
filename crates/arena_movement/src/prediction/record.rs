//! # Move Records
//!
//! One simulated tick: what was asked for and what came out of it.

use arena_shared::{ClientMove, CompressedFlags, MovementMode};

use crate::config::CombineConfig;
use crate::simulator::SimulationOutcome;
use crate::state::{InputFrame, KinematicState, MovementEvents};

/// Acceleration intents shorter than this count as zero when combining.
const ZERO_INTENT: f32 = 1.0e-3;

/// Input and outcome of one simulated tick.
///
/// Never mutated once created. Replays and combining produce new records
/// that replace old ones.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MoveRecord {
    /// Move-clock time at the end of the move.
    pub timestamp: f64,
    /// Time the move covers.
    pub delta_time: f32,
    /// Input that was simulated.
    pub input: InputFrame,
    /// State the move started from.
    pub start: KinematicState,
    /// State after the move.
    pub result: KinematicState,
    /// Events the move emitted.
    pub events: MovementEvents,
    /// Discrete inputs in wire form.
    pub flags: CompressedFlags,
}

impl MoveRecord {
    /// Records a simulated tick.
    #[must_use]
    pub fn new(
        timestamp: f64,
        delta_time: f32,
        input: InputFrame,
        start: KinematicState,
        outcome: SimulationOutcome,
    ) -> Self {
        Self {
            timestamp,
            delta_time,
            input,
            start,
            result: outcome.state,
            events: outcome.events,
            flags: input.compressed_flags(),
        }
    }

    /// Same move re-simulated from a different starting state.
    #[must_use]
    pub fn resimulated(&self, start: KinematicState, outcome: SimulationOutcome) -> Self {
        Self {
            start,
            result: outcome.state,
            events: outcome.events,
            ..*self
        }
    }

    /// Move-clock time at the start of the move.
    #[must_use]
    pub fn start_time(&self) -> f64 {
        self.timestamp - f64::from(self.delta_time)
    }

    /// Movement mode the move started in.
    #[must_use]
    pub const fn start_mode(&self) -> MovementMode {
        self.start.mode
    }

    /// Returns true if losing this move would change the outcome noticeably:
    /// it carries a press or changed the movement mode.
    #[must_use]
    pub fn is_important(&self) -> bool {
        self.flags.has_press() || self.start.mode != self.result.mode || !self.events.is_empty()
    }

    /// Wire description of the move for the authority.
    #[must_use]
    pub fn to_client_move(&self) -> ClientMove {
        ClientMove {
            timestamp: self.timestamp,
            delta_time: self.delta_time,
            flags: self.flags,
            acceleration: self.input.acceleration,
            view: self.input.view,
            client_position: self.result.position,
            client_mode: self.result.mode,
            base: self.result.base,
        }
    }

    /// Returns true if `next` may be merged into this record.
    #[must_use]
    pub fn can_combine_with(&self, next: &Self, config: &CombineConfig) -> bool {
        if self.is_important() || next.is_important() {
            return false;
        }
        if self.flags != next.flags
            || next.start.mode != self.result.mode
            || next.result.mode != self.result.mode
        {
            return false;
        }
        if next.timestamp <= self.timestamp
            || self.combined_delta_time(next) > config.max_combine_time
        {
            return false;
        }
        if self.input.view.max_difference(next.input.view) > config.view_threshold_degrees {
            return false;
        }

        let a = self.input.acceleration;
        let b = next.input.acceleration;
        let a_zero = a.is_nearly_zero(ZERO_INTENT);
        let b_zero = b.is_nearly_zero(ZERO_INTENT);
        if a_zero || b_zero {
            return a_zero && b_zero;
        }
        (a.length() - b.length()).abs() <= config.accel_mag_threshold
            && a.normalize_or_zero().dot(b.normalize_or_zero()) >= config.accel_dot_threshold
    }

    /// Merges `next` into this record.
    ///
    /// The merged move starts where this record started, covers both delta
    /// times and carries `next`'s input. `outcome` must be that input
    /// simulated from [`Self::start`] over [`Self::combined_delta_time`],
    /// which is what the authority will run for the merged move.
    #[must_use]
    pub fn combined_with(&self, next: &Self, outcome: SimulationOutcome) -> Self {
        Self {
            timestamp: next.timestamp,
            delta_time: self.combined_delta_time(next),
            input: next.input,
            start: self.start,
            result: outcome.state,
            events: outcome.events,
            flags: next.flags,
        }
    }

    /// Time a merge of this record with `next` would cover.
    #[must_use]
    pub fn combined_delta_time(&self, next: &Self) -> f32 {
        self.delta_time + next.delta_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_shared::{DodgeDirection, Vec3, ViewRotation};

    fn record(timestamp: f64, accel: Vec3) -> MoveRecord {
        let input = InputFrame::moving(accel);
        let start = KinematicState::at(Vec3::new(timestamp as f32 - 0.016, 0.0, 0.0));
        let state = KinematicState::at(Vec3::new(timestamp as f32, 0.0, 0.0));
        MoveRecord::new(
            timestamp,
            0.016,
            input,
            start,
            SimulationOutcome { state, events: MovementEvents::NONE },
        )
    }

    #[test]
    fn test_similar_moves_combine() {
        let config = CombineConfig::default();
        let a = record(1.0, Vec3::new(1.0, 0.0, 0.0));
        let b = record(1.016, Vec3::new(0.98, 0.05, 0.0));
        assert!(a.can_combine_with(&b, &config));

        // The merged move ends wherever the longer step ended, not at `b`.
        let longer = KinematicState::at(Vec3::new(1.5, 0.0, 0.0));
        let merged = a.combined_with(&b, SimulationOutcome { state: longer, events: MovementEvents::NONE });
        assert!((merged.delta_time - 0.032).abs() < 1.0e-6);
        assert_eq!(merged.start, a.start);
        assert_eq!(merged.result, longer);
        assert_eq!(merged.input, b.input);
        assert!((merged.timestamp - 1.016).abs() < f64::EPSILON);
    }

    #[test]
    fn test_dissimilar_moves_do_not_combine() {
        let config = CombineConfig::default();
        let a = record(1.0, Vec3::new(1.0, 0.0, 0.0));

        let turned = record(1.016, Vec3::new(0.0, 1.0, 0.0));
        assert!(!a.can_combine_with(&turned, &config));

        let stopped = record(1.016, Vec3::ZERO);
        assert!(!a.can_combine_with(&stopped, &config));

        let mut looked = record(1.016, Vec3::new(1.0, 0.0, 0.0));
        looked.input.view = ViewRotation::new(10.0, 0.0);
        assert!(!a.can_combine_with(&looked, &config));

        let late = record(1.1, Vec3::new(1.0, 0.0, 0.0));
        let mut long = late;
        long.delta_time = 0.045;
        assert!(!a.can_combine_with(&long, &config));
    }

    #[test]
    fn test_presses_are_important() {
        let mut dodge = record(1.0, Vec3::ZERO);
        dodge.input.dodge = Some(DodgeDirection::Left);
        dodge.flags = dodge.input.compressed_flags();
        assert!(dodge.is_important());
        assert!(!dodge.can_combine_with(&record(1.016, Vec3::ZERO), &CombineConfig::default()));

        let mut landed = record(1.0, Vec3::ZERO);
        landed.start.mode = MovementMode::Falling;
        assert_eq!(landed.start_mode(), MovementMode::Falling);
        assert!(landed.is_important());

        assert!(!record(1.0, Vec3::ZERO).is_important());
    }

    #[test]
    fn test_client_move_carries_outcome() {
        let rec = record(2.5, Vec3::new(0.0, 1.0, 0.0));
        let wire = rec.to_client_move();
        assert!((wire.timestamp - 2.5).abs() < f64::EPSILON);
        assert_eq!(wire.client_position, rec.result.position);
        assert_eq!(wire.client_mode, MovementMode::Walking);
        assert_eq!(wire.flags, rec.flags);
    }
}
