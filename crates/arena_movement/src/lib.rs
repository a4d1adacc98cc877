//! # Arena Movement
//!
//! Client-side predicted character movement with authoritative
//! reconciliation, for real-time play over a lossy, latent link.
//!
//! ## Architecture
//!
//! ```text
//! CLIENT                                        AUTHORITY
//!   │ InputFrame                                   │
//!   ▼                                              │
//! LocalSimulator ──► MoveRecord                    │
//!   │                   │                          │
//!   │          MoveHistoryBuffer ──ClientMove────► LocalSimulator (same code)
//!   │                   ▲                          │
//!   │                   │      silence = "you were right"
//!   │                   └──────Correction──────────┤
//!   │          ReconciliationEngine (replay)       │
//!   ▼                                              │
//! render (blended)    RemoteSmoother ◄─RemoteSnapshot (replication cadence)
//! ```
//!
//! ## Rules
//!
//! - The simulator is a pure function of state, input, delta time and the
//!   injected environment. Prediction and replay depend on it.
//! - Time and geometry are injected ([`Clock`], [`Environment`]), never
//!   read from ambient state.
//! - Divergence, desync and staleness are outcomes, not errors. Only
//!   rejected moves, bad configuration and closed transports are `Err`.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use arena_movement::{
//!     FlatArena, InputFrame, KinematicState, LocalSimulator, MovementConfig, PredictionClient,
//!     SystemClock,
//! };
//!
//! let config = MovementConfig::from_file("movement.toml")?;
//! let simulator = LocalSimulator::new(config.physics.clone(), Arc::new(FlatArena::square(4000.0)));
//! let mut client = PredictionClient::new(
//!     simulator,
//!     &config,
//!     Arc::new(SystemClock::new()),
//!     KinematicState::default(),
//! );
//!
//! let report = client.tick(&InputFrame::default(), 1.0 / 60.0)?;
//! if let Some(packet) = report.packet {
//!     transport.send(packet)?;
//! }
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod interpolation;
pub mod prediction;
pub mod server;
pub mod simulation;
pub mod simulator;
pub mod snapshot;
pub mod state;
pub mod transport;

pub use client::{ClientStats, PredictionClient, RenderState, ServerReply, TickReport};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    AuthorityConfig, CombineConfig, CorrectionConfig, MovementConfig, PhysicsConfig, PredictionConfig,
    RemoteConfig,
};
pub use error::{MovementError, MovementResult};
pub use interpolation::{BlendMode, CorrectionSmoother};
pub use prediction::{
    CorrectionKind, MoveHistoryBuffer, MoveRecord, ReconciliationEngine, ReconciliationOutcome,
    ReconciliationStats, ReplayJob,
};
pub use server::{ArenaAuthority, AuthorityStats, CharacterId, MoveAuthority, MoveReceipt, ReplicationSchedule};
pub use simulation::{LinkStats, LossyLink, NetworkConditions};
pub use simulator::{Environment, FlatArena, LiquidVolume, LocalSimulator, MoveClip, Platform, SimulationOutcome};
pub use snapshot::{RemoteSmoother, RemoteStatus, RemoteView};
pub use state::{InputFrame, KinematicState, MovementEvent, MovementEvents};
pub use transport::{ClientBound, ClientTransport, LoopbackClient, LoopbackServer, ServerTransport};
