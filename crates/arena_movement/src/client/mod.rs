//! # Prediction Client
//!
//! Drives the locally controlled character.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     PREDICTION CLIENT                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  InputFrame ──► LocalSimulator ──► MoveRecord               │
//! │                                       │                     │
//! │                      combine / append ▼                     │
//! │                              MoveHistoryBuffer ──► packet   │
//! │                                       ▲                     │
//! │  Correction ──► ReconciliationEngine ─┘ (acknowledge+replay)│
//! │                        │                                    │
//! │                        ▼                                    │
//! │                 CorrectionSmoother ──► RenderState          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Moves are sent immediately when they matter (a press or a mode change)
//! and batched otherwise. Every packet repeats the oldest unacknowledged
//! important move so a single lost packet can not swallow a jump or dodge.

use std::sync::Arc;

use arena_shared::{ClientMove, ClientMovePacket, MovementMode, ServerMessage, Vec3, ViewRotation};

use crate::clock::Clock;
use crate::config::{MovementConfig, PredictionConfig};
use crate::error::MovementResult;
use crate::prediction::{MoveHistoryBuffer, MoveRecord, ReconciliationEngine, ReconciliationOutcome};
use crate::simulator::LocalSimulator;
use crate::state::{InputFrame, KinematicState, MovementEvents};

/// Client counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ClientStats {
    /// Calls to [`PredictionClient::tick`].
    pub ticks: u64,
    /// Ticks with nothing to simulate.
    pub empty_ticks: u64,
    /// Moves merged into the previous unsent move.
    pub moves_combined: u64,
    /// Packets built.
    pub packets_sent: u64,
    /// Moves carried by those packets.
    pub moves_sent: u64,
    /// Important moves repeated as `old_move`.
    pub old_moves_resent: u64,
    /// Good-move acknowledgements received.
    pub acks_received: u64,
    /// Corrections received.
    pub corrections_received: u64,
}

/// What one client tick produced.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TickReport {
    /// Events the new move emitted.
    pub events: MovementEvents,
    /// Packet to hand to the transport, if one is due.
    pub packet: Option<ClientMovePacket>,
    /// Outcome of a bounded replay that finished this tick.
    pub replay: Option<ReconciliationOutcome>,
}

/// What a server message did.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ServerReply {
    /// Good moves acknowledged.
    Acknowledged {
        /// Moves discarded from the buffer.
        discarded: usize,
    },
    /// A correction was reconciled.
    Reconciled(ReconciliationOutcome),
}

/// What the renderer draws for the controlled character.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderState {
    /// Visual position, including any correction blend.
    pub position: Vec3,
    /// View orientation.
    pub rotation: ViewRotation,
    /// Predicted velocity.
    pub velocity: Vec3,
    /// Predicted movement mode.
    pub mode: MovementMode,
}

/// Predicting client for one locally controlled character.
pub struct PredictionClient {
    simulator: LocalSimulator,
    config: PredictionConfig,
    clock: Arc<dyn Clock>,
    buffer: MoveHistoryBuffer,
    engine: ReconciliationEngine,
    state: KinematicState,
    /// Move-clock time at the end of the newest move.
    move_clock: f64,
    last_send_at: Option<f64>,
    stats: ClientStats,
}

impl PredictionClient {
    /// Creates a client for a character spawned in `state`.
    #[must_use]
    pub fn new(
        simulator: LocalSimulator,
        config: &MovementConfig,
        clock: Arc<dyn Clock>,
        state: KinematicState,
    ) -> Self {
        let prediction = config.prediction.clone();
        let buffer = MoveHistoryBuffer::new(prediction.max_saved_moves, prediction.combine.clone());
        let engine = ReconciliationEngine::new(
            simulator.clone(),
            config.correction.clone(),
            prediction.max_replay_moves_per_frame,
            Arc::clone(&clock),
        );
        Self {
            simulator,
            config: prediction,
            clock,
            buffer,
            engine,
            state,
            move_clock: 0.0,
            last_send_at: None,
            stats: ClientStats::default(),
        }
    }

    /// Predicts one tick of `input` over `delta_time` seconds.
    ///
    /// A zero (or invalid) delta time records nothing. Longer frames are
    /// clamped to the maximum move duration.
    ///
    /// # Errors
    ///
    /// Returns `NonMonotonicTimestamp` if the move clock failed to advance,
    /// which only happens when it has run out of precision.
    pub fn tick(&mut self, input: &InputFrame, delta_time: f32) -> MovementResult<TickReport> {
        self.stats.ticks += 1;
        let replay = self.advance_replay();

        let delta_time = self.simulator.clamp_delta_time(delta_time);
        if delta_time <= 0.0 {
            self.stats.empty_ticks += 1;
            return Ok(TickReport { replay, ..TickReport::default() });
        }

        let timestamp = self.move_clock + f64::from(delta_time);
        let outcome = self.simulator.simulate(&self.state, input, delta_time);
        let record = MoveRecord::new(timestamp, delta_time, *input, self.state, outcome);

        // A running replay walks the buffer by timestamp; merging under it
        // would change a record it already replayed.
        if self.engine.is_replaying() {
            self.buffer.append(record)?;
        } else if self.buffer.try_combine_with_last(record, &self.simulator)? {
            self.stats.moves_combined += 1;
        }
        self.move_clock = timestamp;

        // A merge re-simulated the tail, so continue from what was stored.
        let stored = self.buffer.newest().copied().unwrap_or(record);
        self.state = stored.result;

        let packet = self.take_packet(stored.is_important());
        Ok(TickReport { events: outcome.events, packet, replay })
    }

    /// Applies a message from the authority.
    pub fn handle_server_message(&mut self, message: &ServerMessage) -> ServerReply {
        match message {
            ServerMessage::AckGoodMove { timestamp } => {
                self.stats.acks_received += 1;
                self.engine.confirm_up_to(*timestamp);
                let discarded = self.buffer.acknowledge_up_to(*timestamp);
                ServerReply::Acknowledged { discarded }
            }
            ServerMessage::Correction(correction) => {
                self.stats.corrections_received += 1;
                let outcome = self.engine.reconcile(correction, &mut self.buffer, &self.state);
                self.apply_outcome(&outcome);
                ServerReply::Reconciled(outcome)
            }
        }
    }

    /// Continues a bounded replay. Called by [`Self::tick`]; exposed for
    /// frames that render without simulating.
    pub fn advance_replay(&mut self) -> Option<ReconciliationOutcome> {
        let outcome = self.engine.advance(&mut self.buffer, &self.state)?;
        self.apply_outcome(&outcome);
        Some(outcome)
    }

    /// What to draw this frame.
    #[must_use]
    pub fn render_state(&self) -> RenderState {
        RenderState {
            position: self.engine.visual_position(self.state.position),
            rotation: self.state.rotation,
            velocity: self.state.velocity,
            mode: self.state.mode,
        }
    }

    /// Places the character at `state` and forgets every pending move.
    ///
    /// The move clock keeps running so the authority sees increasing
    /// timestamps.
    pub fn respawn(&mut self, state: KinematicState) {
        tracing::info!(
            "Respawning local character at {:?}, dropping {} saved moves",
            state.position,
            self.buffer.len()
        );
        self.state = state;
        self.buffer.clear();
        self.engine.reset();
    }

    /// Predicted state.
    #[must_use]
    pub const fn state(&self) -> &KinematicState {
        &self.state
    }

    /// Unacknowledged moves.
    #[must_use]
    pub const fn buffer(&self) -> &MoveHistoryBuffer {
        &self.buffer
    }

    /// Reconciliation state.
    #[must_use]
    pub const fn engine(&self) -> &ReconciliationEngine {
        &self.engine
    }

    /// Move-clock time at the end of the newest move.
    #[must_use]
    pub const fn move_clock(&self) -> f64 {
        self.move_clock
    }

    /// Counters.
    #[must_use]
    pub const fn stats(&self) -> &ClientStats {
        &self.stats
    }

    fn apply_outcome(&mut self, outcome: &ReconciliationOutcome) {
        match outcome {
            ReconciliationOutcome::Corrected { final_state, .. } => self.state = *final_state,
            ReconciliationOutcome::Resynchronized { state } => self.state = *state,
            ReconciliationOutcome::ReplayPending { .. } | ReconciliationOutcome::Stale { .. } => {}
        }
    }

    /// Builds a packet if one is due.
    fn take_packet(&mut self, important: bool) -> Option<ClientMovePacket> {
        let now = self.clock.now();
        let interval_passed = self
            .last_send_at
            .map_or(true, |at| now - at >= self.config.net_send_interval);
        if !(important || interval_passed) {
            return None;
        }

        let moves: Vec<ClientMove> = self.buffer.unsent().map(MoveRecord::to_client_move).collect();
        let (first, last) = (moves.first()?.timestamp, moves.last()?.timestamp);
        let old_move = self
            .buffer
            .first_important()
            .filter(|record| record.timestamp < first)
            .map(MoveRecord::to_client_move);

        if old_move.is_some() {
            self.stats.old_moves_resent += 1;
        }
        self.stats.packets_sent += 1;
        self.stats.moves_sent += moves.len() as u64;
        self.buffer.mark_sent(last);
        self.last_send_at = Some(now);
        Some(ClientMovePacket { old_move, moves })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::simulator::FlatArena;
    use arena_shared::Correction;

    const DT: f32 = 1.0 / 60.0;

    fn client(clock: &Arc<ManualClock>, config: &MovementConfig) -> PredictionClient {
        let simulator = LocalSimulator::new(config.physics.clone(), Arc::new(FlatArena::square(5000.0)));
        PredictionClient::new(simulator, config, clock.clone(), KinematicState::at(Vec3::ZERO))
    }

    /// Sends every move on its own, so nothing is combined.
    fn unbatched() -> MovementConfig {
        let mut config = MovementConfig::default();
        config.prediction.net_send_interval = 0.0;
        config
    }

    fn walk() -> InputFrame {
        InputFrame::moving(Vec3::new(1.0, 0.0, 0.0))
    }

    #[test]
    fn test_ordinary_moves_are_batched_and_combined() {
        let clock = Arc::new(ManualClock::new(0.0));
        let mut client = client(&clock, &MovementConfig::default());

        let first = client.tick(&walk(), DT).map(|r| r.packet);
        assert!(matches!(first, Ok(Some(ref p)) if p.moves.len() == 1));

        clock.advance(0.02);
        assert!(matches!(client.tick(&walk(), DT).map(|r| r.packet), Ok(None)));

        clock.advance(0.02);
        let third = client.tick(&walk(), DT).map(|r| r.packet);
        let Ok(Some(packet)) = third else {
            panic!("expected a packet, got {third:?}");
        };
        assert_eq!(packet.moves.len(), 1);
        assert!((packet.moves[0].delta_time - 2.0 * DT).abs() < 1.0e-6);
        assert_eq!(client.stats().moves_combined, 1);
        assert_eq!(client.buffer().len(), 2);

        // Prediction continues from the merged step the authority will run
        let Some(merged) = client.buffer().newest().copied() else {
            panic!("merged move missing");
        };
        let single = client.simulator.simulate(&merged.start, &walk(), merged.delta_time);
        assert_eq!(*client.state(), single.state);
        assert_eq!(packet.moves[0].client_position, single.state.position);
    }

    #[test]
    fn test_important_move_is_sent_immediately() {
        let clock = Arc::new(ManualClock::new(0.0));
        let mut client = client(&clock, &MovementConfig::default());

        assert!(matches!(client.tick(&walk(), DT), Ok(TickReport { packet: Some(_), .. })));
        clock.advance(0.005);

        let mut jump = walk();
        jump.jump = true;
        let report = client.tick(&jump, DT);
        let Ok(TickReport { packet: Some(packet), events, .. }) = report else {
            panic!("expected a packet, got {report:?}");
        };
        assert!(packet.moves[0].flags.jump());
        assert!(!events.is_empty());
    }

    #[test]
    fn test_unacknowledged_important_move_is_repeated() {
        let clock = Arc::new(ManualClock::new(0.0));
        let mut client = client(&clock, &MovementConfig::default());

        let mut jump = walk();
        jump.jump = true;
        let jump_move = client.tick(&jump, DT).ok().and_then(|r| r.packet).map(|p| p.moves[0]);
        assert!(jump_move.is_some());

        clock.advance(0.04);
        let second = client.tick(&walk(), DT).ok().and_then(|r| r.packet);
        assert_eq!(second.and_then(|p| p.old_move), jump_move);

        let timestamp = jump_move.map_or(0.0, |m| m.timestamp);
        let reply = client.handle_server_message(&ServerMessage::AckGoodMove { timestamp });
        assert_eq!(reply, ServerReply::Acknowledged { discarded: 1 });

        clock.advance(0.04);
        let third = client.tick(&walk(), DT).ok().and_then(|r| r.packet);
        assert!(matches!(third, Some(ClientMovePacket { old_move: None, .. })));
        assert_eq!(client.stats().old_moves_resent, 1);
    }

    #[test]
    fn test_zero_delta_time_records_nothing() {
        let clock = Arc::new(ManualClock::new(0.0));
        let mut client = client(&clock, &unbatched());

        let report = client.tick(&walk(), 0.0);
        assert_eq!(report, Ok(TickReport::default()));
        assert!(client.buffer().is_empty());
        assert_eq!(client.stats().empty_ticks, 1);
    }

    #[test]
    fn test_correction_replays_later_moves() {
        let clock = Arc::new(ManualClock::new(0.0));
        let mut client = client(&clock, &unbatched());
        let mut sent = Vec::new();
        for _ in 0..5 {
            if let Ok(TickReport { packet: Some(packet), .. }) = client.tick(&walk(), DT) {
                sent.extend(packet.moves);
            }
            clock.advance(f64::from(DT));
        }
        assert_eq!(sent.len(), 5);

        let third = sent[2];
        let correction = Correction {
            timestamp: third.timestamp,
            position: third.client_position + Vec3::new(0.0, 10.0, 0.0),
            velocity: Vec3::ZERO,
            base: None,
            mode: MovementMode::Walking,
        };
        let before = client.render_state().position;
        let reply = client.handle_server_message(&ServerMessage::Correction(correction));

        let ServerReply::Reconciled(ReconciliationOutcome::Corrected { replayed, final_state, .. }) = reply else {
            panic!("expected a correction, got {reply:?}");
        };
        assert_eq!(replayed, 2);
        assert_eq!(*client.state(), final_state);
        assert_eq!(client.buffer().len(), 2);
        // The visual position starts where it was and glides over
        assert!(client.render_state().position.distance(before) < 1.0e-3);
        assert!(client.state().position.y > 9.0);
    }

    #[test]
    fn test_correction_overtaken_by_ack_is_stale() {
        let clock = Arc::new(ManualClock::new(0.0));
        let mut client = client(&clock, &unbatched());
        let mut sent = Vec::new();
        for _ in 0..4 {
            if let Ok(TickReport { packet: Some(packet), .. }) = client.tick(&walk(), DT) {
                sent.extend(packet.moves);
            }
        }

        let ack = ServerMessage::AckGoodMove { timestamp: sent[2].timestamp };
        let _ = client.handle_server_message(&ack);
        let late = Correction {
            timestamp: sent[1].timestamp,
            position: Vec3::new(0.0, 40.0, 0.0),
            velocity: Vec3::ZERO,
            base: None,
            mode: MovementMode::Walking,
        };
        let reply = client.handle_server_message(&ServerMessage::Correction(late));

        assert!(matches!(reply, ServerReply::Reconciled(ReconciliationOutcome::Stale { .. })));
        assert_eq!(client.buffer().len(), 1);
        assert!(client.state().position.y.abs() < f32::EPSILON);
    }

    #[test]
    fn test_correction_outside_buffer_resynchronizes() {
        let clock = Arc::new(ManualClock::new(0.0));
        let mut client = client(&clock, &unbatched());
        for _ in 0..3 {
            let _ = client.tick(&walk(), DT);
        }

        let correction = Correction {
            timestamp: 100.0,
            position: Vec3::new(500.0, 0.0, 0.0),
            velocity: Vec3::ZERO,
            base: None,
            mode: MovementMode::Walking,
        };
        let reply = client.handle_server_message(&ServerMessage::Correction(correction));

        assert!(matches!(reply, ServerReply::Reconciled(ReconciliationOutcome::Resynchronized { .. })));
        assert!(client.buffer().is_empty());
        assert_eq!(client.render_state().position, Vec3::new(500.0, 0.0, 0.0));
    }

    #[test]
    fn test_respawn_drops_saved_moves() {
        let clock = Arc::new(ManualClock::new(0.0));
        let mut client = client(&clock, &unbatched());
        for _ in 0..3 {
            let _ = client.tick(&walk(), DT);
        }
        let move_clock = client.move_clock();

        client.respawn(KinematicState::at(Vec3::new(0.0, 0.0, 0.0)));
        assert!(client.buffer().is_empty());
        assert_eq!(client.state().velocity, Vec3::ZERO);

        let _ = client.tick(&walk(), DT);
        assert!(client.move_clock() > move_clock);
    }
}
