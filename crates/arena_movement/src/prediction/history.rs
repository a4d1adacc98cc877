//! # Move History
//!
//! Moves the client predicted but the authority has not acknowledged yet,
//! oldest first.
//!
//! ```text
//!  acknowledged │ sent, unacknowledged     │ unsent tail
//!  (discarded)  │ [t1][t2][t3][t4]         │ [t5][t6]  ◄── append / combine
//!               ▲                          ▲
//!        acknowledge_up_to          mark_sent
//! ```
//!
//! Only the unsent tail may be combined: once a move has gone out, the
//! authority simulates exactly that move and the record must stay as sent.

use std::collections::VecDeque;

use crate::config::CombineConfig;
use crate::error::{MovementError, MovementResult};
use crate::simulator::LocalSimulator;
use crate::state::KinematicState;

use super::record::MoveRecord;

/// Ordered buffer of unacknowledged moves.
#[derive(Clone, Debug)]
pub struct MoveHistoryBuffer {
    records: VecDeque<MoveRecord>,
    capacity: usize,
    combine: CombineConfig,
    /// Newest timestamp handed to the transport.
    sent_up_to: Option<f64>,
    /// Records dropped because the buffer was full.
    overflowed: u64,
}

impl MoveHistoryBuffer {
    /// Creates an empty buffer holding at most `capacity` moves.
    #[must_use]
    pub fn new(capacity: usize, combine: CombineConfig) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
            combine,
            sent_up_to: None,
            overflowed: 0,
        }
    }

    /// Appends a record at the back.
    ///
    /// When full, the oldest record is dropped to make room.
    ///
    /// # Errors
    ///
    /// Returns `NonMonotonicTimestamp` if `record` is not newer than the
    /// newest buffered move.
    pub fn append(&mut self, record: MoveRecord) -> MovementResult<()> {
        self.check_newer(&record)?;
        if self.records.len() == self.capacity {
            if let Some(dropped) = self.records.pop_front() {
                self.overflowed += 1;
                tracing::warn!(
                    "Saved move buffer full ({}), dropping unacknowledged move {:.4}",
                    self.capacity,
                    dropped.timestamp
                );
            }
        }
        self.records.push_back(record);
        Ok(())
    }

    /// Merges `record` into the newest move if they are similar enough,
    /// otherwise appends it.
    ///
    /// A merged move is re-simulated from the newest move's start state over
    /// the summed delta time, the same single step the authority runs when it
    /// receives it. Callers must continue from [`Self::newest`]'s result.
    ///
    /// Returns `true` if the record was merged.
    ///
    /// # Errors
    ///
    /// Returns `NonMonotonicTimestamp` if `record` is not newer than the
    /// newest buffered move.
    pub fn try_combine_with_last(&mut self, record: MoveRecord, simulator: &LocalSimulator) -> MovementResult<bool> {
        self.check_newer(&record)?;
        let sent_up_to = self.sent_up_to;
        if let Some(last) = self.records.back_mut() {
            let unsent = sent_up_to.map_or(true, |sent| last.timestamp > sent);
            if unsent && last.can_combine_with(&record, &self.combine) {
                let outcome = simulator.simulate(&last.start, &record.input, last.combined_delta_time(&record));
                let merged = last.combined_with(&record, outcome);
                // The longer step may cross a mode change the short ones did not
                if !merged.is_important() {
                    *last = merged;
                    return Ok(true);
                }
            }
        }
        self.append(record)?;
        Ok(false)
    }

    /// Discards every record with a timestamp at or before `timestamp`.
    ///
    /// Returns how many were discarded. Repeating with the same or an older
    /// timestamp discards nothing.
    pub fn acknowledge_up_to(&mut self, timestamp: f64) -> usize {
        let mut removed = 0;
        while self.records.front().map_or(false, |r| r.timestamp <= timestamp) {
            self.records.pop_front();
            removed += 1;
        }
        removed
    }

    /// Re-simulates every record after `timestamp` from `corrected`,
    /// replacing their stored results.
    ///
    /// Returns the state after the newest record, or `corrected` when there
    /// is nothing to replay.
    pub fn replay_from(
        &mut self,
        timestamp: f64,
        corrected: KinematicState,
        simulator: &LocalSimulator,
    ) -> KinematicState {
        let mut job = ReplayJob::new(timestamp, corrected);
        job.step(self, simulator, 0);
        job.commit(self)
    }

    /// Records that every move up to `timestamp` was handed to the transport.
    pub fn mark_sent(&mut self, timestamp: f64) {
        if self.sent_up_to.map_or(true, |sent| timestamp > sent) {
            self.sent_up_to = Some(timestamp);
        }
    }

    /// Moves not yet handed to the transport, oldest first.
    pub fn unsent(&self) -> impl Iterator<Item = &MoveRecord> {
        let sent_up_to = self.sent_up_to;
        self.records
            .iter()
            .filter(move |r| sent_up_to.map_or(true, |sent| r.timestamp > sent))
    }

    /// Returns true if any move waits to be sent.
    #[must_use]
    pub fn has_unsent(&self) -> bool {
        self.unsent().next().is_some()
    }

    /// Timestamp of the oldest buffered move.
    #[must_use]
    pub fn oldest_timestamp(&self) -> Option<f64> {
        self.records.front().map(|r| r.timestamp)
    }

    /// Newest buffered move.
    #[must_use]
    pub fn newest(&self) -> Option<&MoveRecord> {
        self.records.back()
    }

    /// Newest move ending at or before `timestamp`.
    #[must_use]
    pub fn find_at_or_before(&self, timestamp: f64) -> Option<&MoveRecord> {
        self.records.iter().rev().find(|r| r.timestamp <= timestamp)
    }

    /// Moves ending after `timestamp`, oldest first.
    pub fn records_after(&self, timestamp: f64) -> impl Iterator<Item = &MoveRecord> {
        self.records.iter().skip_while(move |r| r.timestamp <= timestamp)
    }

    /// Oldest move that carries a press or changed mode.
    #[must_use]
    pub fn first_important(&self) -> Option<&MoveRecord> {
        self.records.iter().find(|r| r.is_important())
    }

    /// All buffered moves, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &MoveRecord> {
        self.records.iter()
    }

    /// Number of buffered moves.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if no move is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records dropped because the buffer was full.
    #[must_use]
    pub const fn overflowed(&self) -> u64 {
        self.overflowed
    }

    /// Drops every record. The send watermark is kept so timestamps stay
    /// monotonic across a resync.
    pub fn clear(&mut self) {
        self.records.clear();
    }

    fn check_newer(&self, record: &MoveRecord) -> MovementResult<()> {
        match self.records.back() {
            Some(last) if record.timestamp <= last.timestamp => Err(MovementError::NonMonotonicTimestamp {
                timestamp: record.timestamp,
                last: last.timestamp,
            }),
            _ => Ok(()),
        }
    }

    /// Swaps in re-simulated records matched by timestamp.
    ///
    /// Records acknowledged or dropped in the meantime are skipped.
    fn replace_results(&mut self, replayed: Vec<MoveRecord>) {
        for record in replayed {
            let found = self
                .records
                .binary_search_by(|r| r.timestamp.total_cmp(&record.timestamp));
            if let Ok(index) = found {
                self.records[index] = record;
            }
        }
    }
}

/// Incremental replay of buffered moves from a corrected state.
///
/// Results are written to a scratch list and only reach the buffer on
/// [`ReplayJob::commit`]. Dropping the job discards them, which is how a
/// newer correction cancels an older replay.
///
/// The job follows the live buffer: moves appended while it is running are
/// replayed too.
#[derive(Clone, Debug)]
pub struct ReplayJob {
    from_timestamp: f64,
    cursor: f64,
    state: KinematicState,
    replayed: Vec<MoveRecord>,
}

impl ReplayJob {
    /// Starts a replay of every move after `from_timestamp`, beginning at `base`.
    #[must_use]
    pub fn new(from_timestamp: f64, base: KinematicState) -> Self {
        Self {
            from_timestamp,
            cursor: from_timestamp,
            state: base,
            replayed: Vec::new(),
        }
    }

    /// Replays up to `budget` moves (0 = all remaining).
    ///
    /// Returns true once every buffered move has been replayed.
    pub fn step(&mut self, buffer: &MoveHistoryBuffer, simulator: &LocalSimulator, budget: usize) -> bool {
        let limit = if budget == 0 { usize::MAX } else { budget };
        for record in buffer.records_after(self.cursor).take(limit) {
            let start = self.state;
            let outcome = simulator.simulate(&start, &record.input, record.delta_time);
            self.replayed.push(record.resimulated(start, outcome));
            self.state = outcome.state;
            self.cursor = record.timestamp;
        }
        self.is_finished(buffer)
    }

    /// Returns true if nothing in `buffer` remains to be replayed.
    #[must_use]
    pub fn is_finished(&self, buffer: &MoveHistoryBuffer) -> bool {
        buffer.newest().map_or(true, |newest| newest.timestamp <= self.cursor)
    }

    /// Timestamp of the correction the replay starts from.
    #[must_use]
    pub const fn from_timestamp(&self) -> f64 {
        self.from_timestamp
    }

    /// State after the last replayed move.
    #[must_use]
    pub const fn state(&self) -> &KinematicState {
        &self.state
    }

    /// Number of moves replayed so far.
    #[must_use]
    pub fn replayed(&self) -> usize {
        self.replayed.len()
    }

    /// Writes the replayed results into `buffer` and returns the final state.
    pub fn commit(self, buffer: &mut MoveHistoryBuffer) -> KinematicState {
        buffer.replace_results(self.replayed);
        self.state
    }
}
