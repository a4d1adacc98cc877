//! # Move Authority
//!
//! Server-side processing of one character's moves.
//!
//! ```text
//! ClientMovePacket
//!   │ old_move ──► applied if lost, no error check
//!   │ moves    ──► validate ─► order ─► simulate ─► compare with client
//!   ▼                          │
//!             duplicate: drop  │  gap: queue (reorder window)
//!                              ▼
//!                 divergent: Correction (rate limited)
//!                 good:      AckGoodMove (rate limited) or silence
//! ```

use std::sync::Arc;

use arena_shared::{ClientMove, ClientMovePacket, Correction, RemoteSnapshot, ServerMessage};

use crate::clock::Clock;
use crate::config::AuthorityConfig;
use crate::error::{MovementError, MovementResult};
use crate::simulator::LocalSimulator;
use crate::state::{InputFrame, KinematicState};

/// Slack on the acceleration intent length.
const INTENT_LENGTH_TOLERANCE: f32 = 1.0e-3;

/// Per-character authority counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AuthorityStats {
    /// Moves simulated.
    pub moves_applied: u64,
    /// Resent important moves applied because the first copy was lost.
    pub old_moves_applied: u64,
    /// Moves ignored as duplicates or stale.
    pub duplicates: u64,
    /// Moves held back until an earlier one arrived.
    pub queued: u64,
    /// Gaps skipped because the reorder window overflowed.
    pub forced_gaps: u64,
    /// Moves rejected by validation or the clock check.
    pub rejected: u64,
    /// Corrections sent.
    pub corrections_sent: u64,
    /// Good-move acknowledgements sent.
    pub acks_sent: u64,
}

/// Result of receiving one packet.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MoveReceipt {
    /// Message owed to the client right now, if any.
    pub reply: Option<ServerMessage>,
    /// Moves that were not applied, and why.
    pub rejected: Vec<MovementError>,
}

/// Anchor relating the client's move clock to authority time.
#[derive(Clone, Copy, Debug)]
struct ClockAnchor {
    client: f64,
    authority: f64,
}

/// Authoritative simulation of one client-controlled character.
pub struct MoveAuthority {
    simulator: LocalSimulator,
    config: AuthorityConfig,
    clock: Arc<dyn Clock>,
    state: KinematicState,
    last_processed: Option<f64>,
    /// Out-of-order moves, sorted by timestamp.
    queue: Vec<ClientMove>,
    anchor: Option<ClockAnchor>,
    correction_owed: bool,
    last_correction_at: Option<f64>,
    unacked_good: Option<f64>,
    last_ack_at: Option<f64>,
    suspect: bool,
    stats: AuthorityStats,
}

impl MoveAuthority {
    /// Creates an authority for a character spawned in `state`.
    #[must_use]
    pub fn new(
        simulator: LocalSimulator,
        config: AuthorityConfig,
        clock: Arc<dyn Clock>,
        state: KinematicState,
    ) -> Self {
        Self {
            simulator,
            config,
            clock,
            state,
            last_processed: None,
            queue: Vec::new(),
            anchor: None,
            correction_owed: false,
            last_correction_at: None,
            unacked_good: None,
            last_ack_at: None,
            suspect: false,
            stats: AuthorityStats::default(),
        }
    }

    /// Processes everything a client sent in one packet.
    pub fn receive(&mut self, packet: &ClientMovePacket) -> MoveReceipt {
        if let Some(old) = &packet.old_move {
            self.apply_old_move(old);
        }

        let rejected = packet
            .moves
            .iter()
            .filter_map(|mv| self.submit(mv).err())
            .collect();

        MoveReceipt { reply: self.poll(), rejected }
    }

    /// Submits a single move.
    ///
    /// Duplicates are dropped and moves after a gap are queued; both
    /// succeed.
    ///
    /// # Errors
    ///
    /// Returns `MalformedMove` for implausible values and `TimestampAhead`
    /// when the client's move clock runs ahead of authority time. Either
    /// marks the client suspect and owes it a correction.
    pub fn submit(&mut self, mv: &ClientMove) -> MovementResult<()> {
        if let Err(err) = self.validate(mv).and_then(|()| self.check_clock(mv)) {
            self.reject(&err);
            return Err(err);
        }

        if self.last_processed.map_or(false, |last| mv.timestamp <= last)
            || self.queue.iter().any(|queued| queued.timestamp == mv.timestamp)
        {
            self.stats.duplicates += 1;
            tracing::debug!("Dropping duplicate move {:.4}", mv.timestamp);
            return Ok(());
        }

        if self.follows_last(mv) {
            self.apply(mv);
        } else {
            let at = self.queue.partition_point(|queued| queued.timestamp < mv.timestamp);
            self.queue.insert(at, *mv);
            self.stats.queued += 1;
            tracing::debug!(
                "Queued move {:.4}, waiting for {:?} ({} held)",
                mv.timestamp,
                self.last_processed,
                self.queue.len()
            );
        }
        self.drain_queue();
        Ok(())
    }

    /// Message owed to the client at this moment, if any.
    ///
    /// Corrections deferred by rate limiting are returned here once they
    /// may be sent.
    pub fn poll(&mut self) -> Option<ServerMessage> {
        let now = self.clock.now();
        let timestamp = self.last_processed?;

        if self.correction_owed {
            let allowed = self
                .last_correction_at
                .map_or(true, |at| now - at >= self.config.min_time_between_client_adjustments);
            if !allowed {
                return None;
            }
            self.correction_owed = false;
            self.unacked_good = None;
            self.last_correction_at = Some(now);
            self.stats.corrections_sent += 1;
            return Some(ServerMessage::Correction(Correction {
                timestamp,
                position: self.state.position,
                velocity: self.state.velocity,
                base: self.state.base,
                mode: self.state.mode,
            }));
        }

        let good = self.unacked_good?;
        if self.last_ack_at.map_or(false, |at| now - at < self.config.good_move_ack_interval) {
            return None;
        }
        self.unacked_good = None;
        self.last_ack_at = Some(now);
        self.stats.acks_sent += 1;
        Some(ServerMessage::AckGoodMove { timestamp: good })
    }

    /// Replication sample of the character at the current authority time.
    #[must_use]
    pub fn snapshot(&self) -> RemoteSnapshot {
        RemoteSnapshot {
            timestamp: self.clock.now(),
            position: self.state.position,
            velocity: self.state.velocity,
            mode: self.state.mode,
        }
    }

    /// Places the character at `state`, dropping queued moves and owed replies.
    pub fn respawn(&mut self, state: KinematicState) {
        tracing::info!("Respawning character at {:?}", state.position);
        self.state = state;
        self.queue.clear();
        self.correction_owed = false;
        self.unacked_good = None;
    }

    /// Authoritative state.
    #[must_use]
    pub const fn state(&self) -> &KinematicState {
        &self.state
    }

    /// Timestamp of the newest move simulated.
    #[must_use]
    pub const fn last_processed(&self) -> Option<f64> {
        self.last_processed
    }

    /// Moves waiting for a gap to fill.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Returns true once the client sent a move that had to be rejected.
    #[must_use]
    pub const fn is_suspect(&self) -> bool {
        self.suspect
    }

    /// Counters.
    #[must_use]
    pub const fn stats(&self) -> &AuthorityStats {
        &self.stats
    }

    fn validate(&self, mv: &ClientMove) -> MovementResult<()> {
        let malformed = |reason| MovementError::MalformedMove { timestamp: mv.timestamp, reason };
        if !mv.timestamp.is_finite() {
            return Err(malformed("timestamp is not finite"));
        }
        if !mv.delta_time.is_finite() || mv.delta_time <= 0.0 {
            return Err(malformed("delta time is not positive"));
        }
        if mv.delta_time > self.simulator.config().max_delta_time {
            return Err(malformed("delta time exceeds the maximum move duration"));
        }
        if !mv.acceleration.is_finite() || mv.acceleration.length() > 1.0 + INTENT_LENGTH_TOLERANCE {
            return Err(malformed("acceleration intent out of range"));
        }
        if !mv.view.yaw.is_finite() || !mv.view.pitch.is_finite() || !mv.client_position.is_finite() {
            return Err(malformed("non-finite view or position"));
        }
        Ok(())
    }

    /// Rejects move clocks that run faster than authority time.
    fn check_clock(&mut self, mv: &ClientMove) -> MovementResult<()> {
        let now = self.clock.now();
        let Some(anchor) = self.anchor else {
            self.anchor = Some(ClockAnchor { client: mv.timestamp, authority: now });
            return Ok(());
        };
        let ahead_by = (mv.timestamp - anchor.client) - (now - anchor.authority);
        if ahead_by > self.config.max_client_time_ahead {
            return Err(MovementError::TimestampAhead { timestamp: mv.timestamp, ahead_by });
        }
        Ok(())
    }

    fn reject(&mut self, err: &MovementError) {
        self.stats.rejected += 1;
        self.suspect = true;
        if self.last_processed.is_some() {
            self.correction_owed = true;
        }
        tracing::warn!("Rejected client move: {}", err);
    }

    fn follows_last(&self, mv: &ClientMove) -> bool {
        self.last_processed
            .map_or(true, |last| mv.start_time() - last <= self.config.continuity_tolerance)
    }

    fn drain_queue(&mut self) {
        loop {
            match self.queue.first() {
                Some(next) if self.follows_last(next) => {
                    let next = self.queue.remove(0);
                    self.apply(&next);
                }
                Some(_) if self.queue.len() > self.config.reorder_window => {
                    let next = self.queue.remove(0);
                    self.stats.forced_gaps += 1;
                    tracing::warn!(
                        "Reorder window overflowed, skipping gap before move {:.4}",
                        next.timestamp
                    );
                    self.apply(&next);
                    self.correction_owed = true;
                }
                _ => break,
            }
        }
    }

    fn apply_old_move(&mut self, old: &ClientMove) {
        if self.last_processed.map_or(false, |last| old.timestamp <= last) {
            return;
        }
        if self.validate(old).is_err() {
            return;
        }
        tracing::debug!("Applying resent important move {:.4}", old.timestamp);
        self.queue.retain(|queued| queued.timestamp > old.timestamp);
        self.stats.old_moves_applied += 1;
        self.simulate(old);
        self.drain_queue();
    }

    fn apply(&mut self, mv: &ClientMove) {
        self.simulate(mv);

        let error_squared = self.state.position.distance_squared(mv.client_position);
        if error_squared > self.config.max_position_error_squared || mv.client_mode != self.state.mode {
            if !self.correction_owed {
                tracing::debug!(
                    "Client diverged at {:.4}: error {:.2}, mode {:?} vs {:?}",
                    mv.timestamp,
                    error_squared.sqrt(),
                    mv.client_mode,
                    self.state.mode
                );
            }
            self.correction_owed = true;
        } else if !self.correction_owed {
            self.unacked_good = Some(mv.timestamp);
        }
    }

    fn simulate(&mut self, mv: &ClientMove) {
        let input = InputFrame::from_wire(mv.acceleration, mv.view, mv.flags);
        self.state = self.simulator.simulate(&self.state, &input, mv.delta_time).state;
        self.last_processed = Some(mv.timestamp);
        self.stats.moves_applied += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::PhysicsConfig;
    use crate::prediction::MoveRecord;
    use crate::simulator::FlatArena;
    use arena_shared::{DodgeDirection, Vec3};

    const DT: f32 = 1.0 / 60.0;

    fn simulator() -> LocalSimulator {
        LocalSimulator::new(PhysicsConfig::default(), Arc::new(FlatArena::square(5000.0)))
    }

    fn authority(clock: &Arc<ManualClock>) -> MoveAuthority {
        MoveAuthority::new(
            simulator(),
            AuthorityConfig::default(),
            clock.clone(),
            KinematicState::at(Vec3::ZERO),
        )
    }

    /// Client-side predictions of `count` ticks, the `dodge_at`th one dodging.
    fn predicted(count: usize, dodge_at: Option<usize>) -> Vec<ClientMove> {
        let sim = simulator();
        let mut state = KinematicState::at(Vec3::ZERO);
        (1..=count)
            .map(|i| {
                let mut input = InputFrame::moving(Vec3::new(1.0, 0.0, 0.0));
                if dodge_at == Some(i) {
                    input.dodge = Some(DodgeDirection::Left);
                }
                let outcome = sim.simulate(&state, &input, DT);
                let record = MoveRecord::new(f64::from(DT) * i as f64, DT, input, state, outcome);
                state = outcome.state;
                record.to_client_move()
            })
            .collect()
    }

    fn packet(moves: &[ClientMove]) -> ClientMovePacket {
        ClientMovePacket { old_move: None, moves: moves.to_vec() }
    }

    #[test]
    fn test_good_moves_get_rate_limited_acks() {
        let clock = Arc::new(ManualClock::new(0.0));
        let mut auth = authority(&clock);
        let moves = predicted(6, None);

        let first = auth.receive(&packet(&moves[0..2]));
        assert_eq!(first.reply, Some(ServerMessage::AckGoodMove { timestamp: moves[1].timestamp }));
        assert!(first.rejected.is_empty());

        clock.advance(0.033);
        let second = auth.receive(&packet(&moves[2..4]));
        assert_eq!(second.reply, None);

        clock.advance(0.1);
        let third = auth.receive(&packet(&moves[4..6]));
        assert_eq!(third.reply, Some(ServerMessage::AckGoodMove { timestamp: moves[5].timestamp }));
        assert_eq!(auth.stats().moves_applied, 6);
        assert_eq!(auth.state().position, moves[5].client_position);
    }

    #[test]
    fn test_divergence_gets_correction() {
        let clock = Arc::new(ManualClock::new(0.0));
        let mut auth = authority(&clock);
        let mut moves = predicted(2, None);
        moves[1].client_position = moves[1].client_position + Vec3::new(0.0, 30.0, 0.0);

        let receipt = auth.receive(&packet(&moves));
        match receipt.reply {
            Some(ServerMessage::Correction(correction)) => {
                assert!((correction.timestamp - moves[1].timestamp).abs() < f64::EPSILON);
                assert_eq!(correction.position, auth.state().position);
            }
            other => panic!("expected correction, got {other:?}"),
        }
    }

    #[test]
    fn test_corrections_are_rate_limited() {
        let clock = Arc::new(ManualClock::new(0.0));
        let mut auth = authority(&clock);
        let mut moves = predicted(4, None);
        for mv in &mut moves {
            mv.client_position = mv.client_position + Vec3::new(0.0, 30.0, 0.0);
        }

        assert!(matches!(auth.receive(&packet(&moves[0..2])).reply, Some(ServerMessage::Correction(_))));
        clock.advance(0.033);
        assert_eq!(auth.receive(&packet(&moves[2..4])).reply, None);

        clock.advance(0.1);
        assert!(matches!(auth.poll(), Some(ServerMessage::Correction(_))));
        assert_eq!(auth.stats().corrections_sent, 2);
    }

    #[test]
    fn test_duplicates_are_dropped() {
        let clock = Arc::new(ManualClock::new(0.0));
        let mut auth = authority(&clock);
        let moves = predicted(2, None);

        let _ = auth.receive(&packet(&moves));
        let state = *auth.state();
        let again = auth.receive(&packet(&moves));

        assert!(again.rejected.is_empty());
        assert_eq!(auth.stats().duplicates, 2);
        assert_eq!(*auth.state(), state);
    }

    #[test]
    fn test_out_of_order_moves_are_queued() {
        let clock = Arc::new(ManualClock::new(0.0));
        let mut auth = authority(&clock);
        let moves = predicted(4, None);

        let _ = auth.receive(&packet(&moves[0..1]));
        let _ = auth.receive(&packet(&moves[2..4]));
        assert_eq!(auth.queued(), 2);
        assert_eq!(auth.last_processed(), Some(moves[0].timestamp));

        let _ = auth.receive(&packet(&moves[1..2]));
        assert_eq!(auth.queued(), 0);
        assert_eq!(auth.last_processed(), Some(moves[3].timestamp));
        assert_eq!(auth.state().position, moves[3].client_position);
    }

    #[test]
    fn test_reorder_window_overflow_forces_correction() {
        let clock = Arc::new(ManualClock::new(0.0));
        let mut auth = authority(&clock);
        let moves = predicted(8, None);

        let _ = auth.receive(&packet(&moves[0..1]));
        // moves[1] is lost
        let receipt = auth.receive(&packet(&moves[2..8]));

        assert_eq!(auth.stats().forced_gaps, 1);
        assert_eq!(auth.queued(), 0);
        assert!(matches!(receipt.reply, Some(ServerMessage::Correction(_))));
    }

    #[test]
    fn test_lost_important_move_is_recovered() {
        let clock = Arc::new(ManualClock::new(0.0));
        let mut auth = authority(&clock);
        let moves = predicted(3, Some(2));

        let _ = auth.receive(&packet(&moves[0..1]));
        // The packet carrying the dodge was lost; the next one resends it
        let receipt = auth.receive(&ClientMovePacket { old_move: Some(moves[1]), moves: moves[2..3].to_vec() });

        assert_eq!(auth.stats().old_moves_applied, 1);
        assert_eq!(auth.state().position, moves[2].client_position);
        assert!(!matches!(receipt.reply, Some(ServerMessage::Correction(_))));
    }

    #[test]
    fn test_malformed_move_is_rejected() {
        let clock = Arc::new(ManualClock::new(0.0));
        let mut auth = authority(&clock);
        let mut moves = predicted(2, None);
        moves[1].delta_time = 0.0;
        moves[1].acceleration = Vec3::new(5.0, 0.0, 0.0);

        let receipt = auth.receive(&packet(&moves));
        assert_eq!(receipt.rejected.len(), 1);
        assert!(matches!(receipt.rejected[0], MovementError::MalformedMove { .. }));
        assert!(auth.is_suspect());
        assert_eq!(auth.last_processed(), Some(moves[0].timestamp));
    }

    #[test]
    fn test_fast_client_clock_is_rejected() {
        let clock = Arc::new(ManualClock::new(10.0));
        let mut auth = authority(&clock);
        let mut moves = predicted(2, None);
        moves[1].timestamp += 1.0;

        let receipt = auth.receive(&packet(&moves));
        assert!(matches!(receipt.rejected.as_slice(), [MovementError::TimestampAhead { .. }]));
        assert!(auth.is_suspect());
    }
}
