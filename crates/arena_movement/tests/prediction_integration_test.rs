//! # Prediction Integration Test
//!
//! Drives the public API end to end: buffer, replay, reconciliation,
//! remote smoothing and a full client/authority loop.

use std::sync::Arc;

use arena_movement::simulation::{LinkScenario, ScenarioConfig};
use arena_movement::{
    ArenaAuthority, CharacterId, ClientBound, ClientTransport, CombineConfig, CorrectionConfig, FlatArena,
    InputFrame, KinematicState, LocalSimulator, LoopbackServer, ManualClock, MoveHistoryBuffer, MoveRecord,
    MovementConfig, MovementError, NetworkConditions, PhysicsConfig, PredictionClient, ReconciliationEngine,
    ReconciliationOutcome, RemoteConfig, RemoteSmoother, RemoteStatus, ServerTransport, TickReport,
};
use arena_shared::{Correction, MovementMode, RemoteSnapshot, Vec3, ViewRotation};

const DT: f32 = 1.0 / 60.0;

fn simulator() -> LocalSimulator {
    LocalSimulator::new(PhysicsConfig::default(), Arc::new(FlatArena::square(5000.0)))
}

/// Runs along +X for a second, then stands still for a second.
fn run_then_stop(step: usize) -> InputFrame {
    if (step / 60) % 2 == 0 {
        InputFrame::moving(Vec3::new(1.0, 0.0, 0.0))
    } else {
        InputFrame::default()
    }
}

/// Input whose heading changes every call so no two records combine.
fn turning_input(step: usize) -> InputFrame {
    let view = ViewRotation::new(step as f32 * 45.0, 0.0);
    let mut input = InputFrame::moving(view.forward());
    input.view = view;
    input
}

/// Five recorded moves starting from the origin, one per 0.1 s.
fn five_moves(sim: &LocalSimulator) -> (MoveHistoryBuffer, Vec<MoveRecord>) {
    let mut buffer = MoveHistoryBuffer::new(16, CombineConfig::default());
    let mut records = Vec::new();
    let mut state = KinematicState::at(Vec3::ZERO);
    for step in 1..=5 {
        let input = turning_input(step);
        let outcome = sim.simulate(&state, &input, 0.1);
        let record = MoveRecord::new(0.1 * step as f64, 0.1, input, state, outcome);
        assert!(buffer.append(record).is_ok());
        records.push(record);
        state = outcome.state;
    }
    (buffer, records)
}

/// Test: a correction for move 3 leaves the prediction at move 5 exactly
/// where replaying moves 4 and 5 from the authoritative state ends.
#[test]
fn test_correction_replays_to_the_same_state_as_fresh_simulation() {
    let sim = simulator();
    let (mut buffer, records) = five_moves(&sim);
    let mut engine = ReconciliationEngine::new(
        sim.clone(),
        CorrectionConfig::default(),
        0,
        Arc::new(ManualClock::new(0.0)),
    );

    let correction = Correction {
        timestamp: records[2].timestamp,
        position: records[2].result.position + Vec3::new(5.0, -3.0, 0.0),
        velocity: Vec3::new(100.0, 0.0, 0.0),
        base: None,
        mode: MovementMode::Walking,
    };
    let current = records[4].result;
    let outcome = engine.reconcile(&correction, &mut buffer, &current);

    let base = records[2].result.with_authority(
        correction.position,
        correction.velocity,
        correction.base,
        correction.mode,
    );
    let after_four = sim.simulate(&base, &records[3].input, records[3].delta_time).state;
    let expected = sim.simulate(&after_four, &records[4].input, records[4].delta_time).state;

    let ReconciliationOutcome::Corrected { replayed, final_state, .. } = outcome else {
        panic!("expected a completed correction, got {outcome:?}");
    };
    assert_eq!(replayed, 2);
    assert_eq!(final_state, expected);
    assert_eq!(buffer.len(), 2);
    assert_eq!(buffer.newest().map(|r| r.result), Some(expected));
}

/// Test: replaying the same buffer from the same state twice is a no-op
/// the second time.
#[test]
fn test_replay_is_idempotent() {
    let sim = simulator();
    let (mut buffer, _) = five_moves(&sim);
    let base = KinematicState::at(Vec3::new(20.0, 20.0, 0.0));

    let first = buffer.replay_from(0.1, base, &sim);
    let after_first: Vec<_> = buffer.iter().copied().collect();
    let second = buffer.replay_from(0.1, base, &sim);
    let after_second: Vec<_> = buffer.iter().copied().collect();

    assert_eq!(first, second);
    assert_eq!(after_first, after_second);
}

/// Test: acknowledging never resurrects moves and older acks change nothing.
#[test]
fn test_acknowledgement_is_monotonic() {
    let sim = simulator();
    let (mut buffer, records) = five_moves(&sim);

    assert_eq!(buffer.acknowledge_up_to(records[2].timestamp), 3);
    assert_eq!(buffer.acknowledge_up_to(records[1].timestamp), 0);
    assert_eq!(buffer.acknowledge_up_to(records[2].timestamp), 0);
    assert_eq!(buffer.len(), 2);
    assert_eq!(buffer.oldest_timestamp(), Some(records[3].timestamp));
}

/// Test: combining two similar moves keeps the total time and ends where
/// a single step over that time ends, which is what the authority runs.
#[test]
fn test_combining_preserves_time_and_result() {
    let sim = simulator();
    let mut buffer = MoveHistoryBuffer::new(16, CombineConfig::default());
    let input = InputFrame::moving(Vec3::new(1.0, 0.0, 0.0));

    let start = KinematicState::at(Vec3::ZERO);
    let first_outcome = sim.simulate(&start, &input, DT);
    let first = MoveRecord::new(f64::from(DT), DT, input, start, first_outcome);
    let second_outcome = sim.simulate(&first_outcome.state, &input, DT);
    let second = MoveRecord::new(2.0 * f64::from(DT), DT, input, first_outcome.state, second_outcome);

    assert_eq!(buffer.try_combine_with_last(first, &sim), Ok(false));
    assert_eq!(buffer.try_combine_with_last(second, &sim), Ok(true));
    assert_eq!(buffer.len(), 1);

    let Some(combined) = buffer.newest() else {
        panic!("combined move missing");
    };
    let single_step = sim.simulate(&start, &input, DT + DT).state;
    assert!((combined.delta_time - 2.0 * DT).abs() < 1.0e-6);
    assert_eq!(combined.timestamp, second.timestamp);
    assert_eq!(combined.start, start);
    assert_eq!(combined.result, single_step);
    // Acceleration is not linear in time, so two short steps end elsewhere
    assert_ne!(second.result.position, single_step.position);
}

/// Test: the simulator is a pure function of its inputs.
#[test]
fn test_simulation_is_deterministic() {
    let run = || {
        let sim = simulator();
        let mut state = KinematicState::at(Vec3::ZERO);
        for step in 0..600 {
            let mut input = turning_input(step / 30);
            input.jump = step % 90 == 0;
            input.sprint = step % 200 > 100;
            state = sim.simulate(&state, &input, DT).state;
        }
        state
    };

    assert_eq!(run(), run());
}

/// Test: a remote character stops moving once extrapolation runs out.
#[test]
fn test_remote_freezes_after_stale_timeout() {
    let config = RemoteConfig { interpolation_delay: 0.0, stale_timeout: 0.3 };
    let mut remote = RemoteSmoother::new(config);
    let velocity = Vec3::new(100.0, 0.0, 0.0);
    for (timestamp, x) in [(0.0, 0.0), (0.1, 10.0)] {
        assert!(remote.push(RemoteSnapshot {
            timestamp,
            position: Vec3::new(x, 0.0, 0.0),
            velocity,
            mode: MovementMode::Walking,
        }));
    }

    let extrapolated = remote.sample(0.2);
    assert_eq!(extrapolated.status, RemoteStatus::Extrapolating);
    assert!((extrapolated.position.x - 20.0).abs() < 1.0e-3);

    let frozen = remote.sample(0.5);
    assert_eq!(frozen.status, RemoteStatus::Stale);
    assert!((frozen.position.x - 30.0).abs() < 1.0e-3);
    assert_eq!(remote.sample(5.0).position, frozen.position);
}

/// Test: a client and the authority agree over an in-process transport,
/// with moves batched and combined as in normal play.
#[test]
fn test_loopback_client_and_authority_agree() {
    let config = MovementConfig::default();
    let clock = Arc::new(ManualClock::new(0.0));
    let player = CharacterId(7);
    let spawn = KinematicState::at(Vec3::ZERO);

    let mut authority = ArenaAuthority::new(simulator(), config.authority.clone(), clock.clone());
    authority.spawn(player, spawn);
    let mut server = LoopbackServer::new();
    let mut transport = server.connect(player);
    let mut client = PredictionClient::new(simulator(), &config, clock.clone(), spawn);

    for step in 0..240 {
        clock.advance(f64::from(DT));
        let mut input = run_then_stop(step);
        input.jump = step == 100;

        let Ok(TickReport { packet, .. }) = client.tick(&input, DT) else {
            panic!("tick {step} failed");
        };
        if let Some(packet) = packet {
            assert!(transport.send(packet).is_ok());
        }

        while let Ok(Some((id, packet))) = server.try_recv() {
            let reply = authority.receive(id, &packet).and_then(|receipt| receipt.reply);
            if let Some(reply) = reply {
                assert!(server.send(id, ClientBound::Reply(reply)).is_ok());
            }
        }
        for (id, reply) in authority.poll_all() {
            assert!(server.send(id, ClientBound::Reply(reply)).is_ok());
        }

        while let Ok(Some(message)) = transport.try_recv() {
            if let ClientBound::Reply(reply) = message {
                let _ = client.handle_server_message(&reply);
            }
        }
    }

    let Some(character) = authority.character(player) else {
        panic!("player missing");
    };
    assert_eq!(character.stats().corrections_sent, 0);
    assert_eq!(client.stats().corrections_received, 0);
    assert!(client.stats().moves_combined > 0);
    assert!(character.stats().acks_sent > 0);
    assert!(client.stats().acks_received > 0);
    assert!(client.state().position.distance(character.state().position) < 1.0e-3);
}

/// Test: prediction settles onto the authority over good and poor links.
#[test]
fn test_prediction_settles_over_lossy_links() {
    for network in [NetworkConditions::GOOD, NetworkConditions::POOR] {
        let mut scenario = LinkScenario::new(ScenarioConfig {
            duration_secs: 8.0,
            network,
            ..ScenarioConfig::default()
        });
        while matches!(scenario.tick(), Ok(true)) {}

        let settled = scenario.settle(2.0);
        let Ok(error) = settled else {
            panic!("scenario failed: {settled:?}");
        };
        assert!(error < 2.0, "settled error {error} over {network:?}");
        assert!(scenario.stats().client.acks_received > 0);
    }
}

/// Test: a partial config file overrides only what it names.
#[test]
fn test_partial_config_keeps_defaults() {
    let config = MovementConfig::from_toml_str(
        r#"
        [prediction]
        net_send_interval = 0.05

        [authority]
        reorder_window = 8
        "#,
    );
    let Ok(config) = config else {
        panic!("config rejected: {config:?}");
    };

    let defaults = MovementConfig::default();
    assert!((config.prediction.net_send_interval - 0.05).abs() < 1.0e-9);
    assert_eq!(config.authority.reorder_window, 8);
    assert_eq!(config.physics, defaults.physics);
    assert_eq!(config.remote, defaults.remote);
    assert_eq!(config.prediction.max_saved_moves, defaults.prediction.max_saved_moves);
}

/// Test: out-of-range and unparsable configs are refused.
#[test]
fn test_invalid_config_is_refused() {
    let zero_tick = MovementConfig::from_toml_str("[physics]\nmax_delta_time = 0.0\n");
    assert!(matches!(zero_tick, Err(MovementError::InvalidConfig(_))));

    let garbage = MovementConfig::from_toml_str("[physics\nmax_delta_time = ");
    assert!(matches!(garbage, Err(MovementError::ConfigIo(_))));
}
