//! # Link Scenario
//!
//! One controlled character, the authority and a remote observer, wired
//! together by lossy links and stepped at a fixed client tick.
//!
//! ```text
//! PredictionClient ──uplink (ClientMovePacket)──► ArenaAuthority
//!        ▲                                              │
//!        └──────downlink (replies + snapshots)──────────┘
//!                              │
//!                              ▼
//!                       RemoteSmoother (observer)
//! ```
//!
//! Input is scripted from a seeded stream: headings change every few
//! hundred milliseconds, with periodic jumps, dodges and sprints, so
//! straight-line prediction keeps being wrong in the interesting places.

use std::sync::Arc;

use arena_shared::{ClientMovePacket, DodgeDirection, Vec3, ViewRotation, CLIENT_TICK_RATE};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::client::{ClientStats, PredictionClient};
use crate::clock::{Clock, ManualClock};
use crate::config::MovementConfig;
use crate::error::MovementResult;
use crate::prediction::ReconciliationStats;
use crate::server::{ArenaAuthority, AuthorityStats, CharacterId};
use crate::simulator::{FlatArena, LocalSimulator};
use crate::snapshot::{RemoteSmoother, RemoteStatus};
use crate::state::{InputFrame, KinematicState};
use crate::transport::ClientBound;

use super::{LinkStats, LossyLink, NetworkConditions};

/// Character driven by the scripted client.
const PLAYER: CharacterId = CharacterId(1);

/// Ticks between heading changes.
const SEGMENT_TICKS: u64 = 40;

/// Configuration of a scenario run.
#[derive(Clone, Debug)]
pub struct ScenarioConfig {
    /// Client ticks per second.
    pub tick_rate: u32,
    /// Scripted play time.
    pub duration_secs: f64,
    /// Conditions on both links.
    pub network: NetworkConditions,
    /// Seed for the links and the input script.
    pub seed: u64,
    /// Movement tuning shared by every participant.
    pub movement: MovementConfig,
    /// Half the side length of the square arena.
    pub arena_half_extent: f32,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        let mut movement = MovementConfig::default();
        movement.remote.interpolation_delay = 0.1;
        Self {
            tick_rate: CLIENT_TICK_RATE,
            duration_secs: 30.0,
            network: NetworkConditions::AVERAGE,
            seed: 0x5EED,
            movement,
            arena_half_extent: 4000.0,
        }
    }
}

/// Statistics of a scenario run.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ScenarioStats {
    /// Ticks stepped (settling included).
    pub ticks: u64,
    /// Client counters.
    pub client: ClientStats,
    /// Client reconciliation counters.
    pub reconciliation: ReconciliationStats,
    /// Authority counters for the player.
    pub authority: AuthorityStats,
    /// Client to authority link.
    pub uplink: LinkStats,
    /// Authority to client link.
    pub downlink: LinkStats,
    /// Observer frames drawn from extrapolation.
    pub observer_extrapolated: u64,
    /// Observer frames drawn frozen.
    pub observer_stale: u64,
}

/// A complete client/authority/observer setup over simulated links.
pub struct LinkScenario {
    config: ScenarioConfig,
    clock: Arc<ManualClock>,
    delta_time: f32,
    client: PredictionClient,
    authority: ArenaAuthority,
    observer: RemoteSmoother,
    uplink: LossyLink<ClientMovePacket>,
    downlink: LossyLink<ClientBound>,
    input_rng: ChaCha8Rng,
    heading: f32,
    sprinting: bool,
    tick: u64,
    total_ticks: u64,
    observer_extrapolated: u64,
    observer_stale: u64,
}

impl LinkScenario {
    /// Builds the scenario with the player spawned at the arena center.
    #[must_use]
    pub fn new(config: ScenarioConfig) -> Self {
        let clock = Arc::new(ManualClock::new(0.0));
        let environment = Arc::new(FlatArena::square(config.arena_half_extent));
        let simulator = LocalSimulator::new(config.movement.physics.clone(), environment);
        let spawn = KinematicState::at(Vec3::ZERO);

        let client = PredictionClient::new(simulator.clone(), &config.movement, clock.clone(), spawn);
        let mut authority = ArenaAuthority::new(simulator, config.movement.authority.clone(), clock.clone());
        authority.spawn(PLAYER, spawn);

        let tick_rate = config.tick_rate.max(1);
        let total_ticks = (config.duration_secs.max(0.0) * f64::from(tick_rate)).round() as u64;

        Self {
            observer: RemoteSmoother::new(config.movement.remote.clone()),
            uplink: LossyLink::new(config.network, config.seed),
            downlink: LossyLink::new(config.network, config.seed.wrapping_add(1)),
            input_rng: ChaCha8Rng::seed_from_u64(config.seed.wrapping_add(2)),
            delta_time: 1.0 / tick_rate as f32,
            config,
            clock,
            client,
            authority,
            heading: 0.0,
            sprinting: false,
            tick: 0,
            total_ticks,
            observer_extrapolated: 0,
            observer_stale: 0,
        }
    }

    /// Steps one scripted tick. Returns false once the scripted time is over.
    ///
    /// # Errors
    ///
    /// Propagates client recording errors.
    pub fn tick(&mut self) -> MovementResult<bool> {
        if self.tick >= self.total_ticks {
            return Ok(false);
        }
        let input = self.scripted_input();
        self.step(&input)?;
        Ok(self.tick < self.total_ticks)
    }

    /// Stands still for `seconds` so every message in flight lands, then
    /// returns the distance between predicted and authoritative positions.
    ///
    /// # Errors
    ///
    /// Propagates client recording errors.
    pub fn settle(&mut self, seconds: f64) -> MovementResult<f32> {
        let ticks = (seconds.max(0.0) * f64::from(self.config.tick_rate.max(1))).ceil() as u64;
        let idle = InputFrame { view: ViewRotation::new(self.heading, 0.0), ..InputFrame::default() };
        for _ in 0..ticks {
            self.step(&idle)?;
        }
        Ok(self.position_error())
    }

    /// Distance between the client's predicted and the authority's position.
    #[must_use]
    pub fn position_error(&self) -> f32 {
        self.authority
            .character(PLAYER)
            .map_or(0.0, |player| player.state().position.distance(self.client.state().position))
    }

    /// The predicting client.
    #[must_use]
    pub const fn client(&self) -> &PredictionClient {
        &self.client
    }

    /// The authority.
    #[must_use]
    pub const fn authority(&self) -> &ArenaAuthority {
        &self.authority
    }

    /// The remote observer's view of the player.
    #[must_use]
    pub const fn observer(&self) -> &RemoteSmoother {
        &self.observer
    }

    /// Ticks stepped so far.
    #[must_use]
    pub const fn current_tick(&self) -> u64 {
        self.tick
    }

    /// Ticks of scripted play.
    #[must_use]
    pub const fn total_ticks(&self) -> u64 {
        self.total_ticks
    }

    /// Statistics so far.
    #[must_use]
    pub fn stats(&self) -> ScenarioStats {
        ScenarioStats {
            ticks: self.tick,
            client: *self.client.stats(),
            reconciliation: *self.client.engine().stats(),
            authority: self.authority.character(PLAYER).map(|p| *p.stats()).unwrap_or_default(),
            uplink: *self.uplink.stats(),
            downlink: *self.downlink.stats(),
            observer_extrapolated: self.observer_extrapolated,
            observer_stale: self.observer_stale,
        }
    }

    fn step(&mut self, input: &InputFrame) -> MovementResult<()> {
        let now = self.clock.now();

        for message in self.downlink.deliver(now) {
            match message {
                ClientBound::Reply(reply) => {
                    self.client.handle_server_message(&reply);
                }
                ClientBound::Snapshot { snapshot, .. } => {
                    self.observer.push(snapshot);
                }
            }
        }

        let report = self.client.tick(input, self.delta_time)?;
        if let Some(packet) = report.packet {
            self.uplink.send(packet, now);
        }

        for packet in self.uplink.deliver(now) {
            if let Some(reply) = self.authority.receive(PLAYER, &packet).and_then(|receipt| receipt.reply) {
                self.downlink.send(ClientBound::Reply(reply), now);
            }
        }
        for (_, reply) in self.authority.poll_all() {
            self.downlink.send(ClientBound::Reply(reply), now);
        }
        for (character, snapshot) in self.authority.replicate() {
            self.downlink.send(ClientBound::Snapshot { character, snapshot }, now);
        }

        match self.observer.sample(now).status {
            RemoteStatus::Extrapolating => self.observer_extrapolated += 1,
            RemoteStatus::Stale => self.observer_stale += 1,
            RemoteStatus::Empty | RemoteStatus::Interpolating => {}
        }

        self.tick += 1;
        self.clock.advance(f64::from(self.delta_time));
        Ok(())
    }

    fn scripted_input(&mut self) -> InputFrame {
        if self.tick % SEGMENT_TICKS == 0 {
            self.heading = self.input_rng.gen_range(0.0..360.0);
            self.sprinting = self.input_rng.gen_bool(0.3);
        }
        let view = ViewRotation::new(self.heading, 0.0);
        let mut input = InputFrame::moving(view.forward());
        input.view = view;
        input.sprint = self.sprinting;

        match self.tick % 97 {
            0 => input.jump = true,
            48 => {
                input.dodge = Some(match self.input_rng.gen_range(0..4) {
                    0 => DodgeDirection::Forward,
                    1 => DodgeDirection::Back,
                    2 => DodgeDirection::Left,
                    _ => DodgeDirection::Right,
                });
            }
            _ => {}
        }
        input
    }
}
