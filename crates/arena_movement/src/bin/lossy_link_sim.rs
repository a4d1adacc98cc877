//! # Lossy Link Simulation
//!
//! Runs one predicting client against the authority over simulated links
//! and prints how prediction held up.
//!
//! ```text
//! lossy_link_sim [--network perfect|good|average|poor] [--seconds N]
//!                [--seed N] [--config movement.toml]
//! ```
//!
//! Set `RUST_LOG=arena_movement=debug` to watch individual corrections.

use std::process::ExitCode;
use std::time::Instant;

use arena_movement::simulation::{LinkScenario, NetworkConditions, ScenarioConfig};
use arena_movement::MovementConfig;
use tracing_subscriber::EnvFilter;

/// Idle time after the script so every message in flight lands.
const SETTLE_SECONDS: f64 = 2.0;

fn main() -> ExitCode {
    init_tracing();

    let config = match parse_args(std::env::args().skip(1)) {
        Ok(config) => config,
        Err(message) => {
            eprintln!("{message}");
            eprintln!(
                "usage: lossy_link_sim [--network perfect|good|average|poor] [--seconds N] [--seed N] [--config PATH]"
            );
            return ExitCode::FAILURE;
        }
    };

    println!("┌─ CONFIGURATION ─────────────────────────────────────────────────┐");
    println!("│ Duration:           {:.1} s", config.duration_secs);
    println!("│ Tick Rate:          {} Hz", config.tick_rate);
    println!("│ Base Latency:       {} ms", config.network.base_latency_ms);
    println!("│ Jitter:             ±{} ms", config.network.jitter_ms);
    println!("│ Packet Loss:        {}%", config.network.packet_loss_percent);
    println!("│ Duplication:        {}%", config.network.duplicate_percent);
    println!("│ Seed:               {}", config.seed);
    println!("└──────────────────────────────────────────────────────────────────┘");

    let start = Instant::now();
    let mut scenario = LinkScenario::new(config);
    let settled = loop {
        match scenario.tick() {
            Ok(true) => {}
            Ok(false) => break scenario.settle(SETTLE_SECONDS),
            Err(err) => break Err(err),
        }
    };
    let settled_error = match settled {
        Ok(error) => error,
        Err(err) => {
            tracing::error!("Simulation aborted at tick {}: {}", scenario.current_tick(), err);
            return ExitCode::FAILURE;
        }
    };
    let elapsed = start.elapsed();
    let stats = scenario.stats();

    println!();
    println!("┌─ LINKS ──────────────────────────────────────────────────────────┐");
    println!(
        "│ Uplink:             {} sent, {} lost, {} duplicated",
        stats.uplink.sent, stats.uplink.dropped, stats.uplink.duplicated
    );
    println!(
        "│ Downlink:           {} sent, {} lost, {} duplicated",
        stats.downlink.sent, stats.downlink.dropped, stats.downlink.duplicated
    );
    println!("└──────────────────────────────────────────────────────────────────┘");

    println!("┌─ CLIENT ─────────────────────────────────────────────────────────┐");
    println!("│ Ticks:              {}", stats.ticks);
    println!(
        "│ Packets:            {} ({} moves, {} combined)",
        stats.client.packets_sent, stats.client.moves_sent, stats.client.moves_combined
    );
    println!("│ Important resends:  {}", stats.client.old_moves_resent);
    println!("│ Acks received:      {}", stats.client.acks_received);
    println!(
        "│ Corrections:        {} small, {} large, {} stale",
        stats.reconciliation.small_corrections,
        stats.reconciliation.large_corrections,
        stats.reconciliation.stale
    );
    println!("│ Resyncs:            {}", stats.reconciliation.resyncs);
    println!("│ Max error:          {:.2}", stats.reconciliation.max_position_error);
    println!("└──────────────────────────────────────────────────────────────────┘");

    println!("┌─ AUTHORITY ──────────────────────────────────────────────────────┐");
    println!(
        "│ Moves:              {} applied, {} resent applied, {} duplicates",
        stats.authority.moves_applied, stats.authority.old_moves_applied, stats.authority.duplicates
    );
    println!(
        "│ Ordering:           {} queued, {} gaps forced",
        stats.authority.queued, stats.authority.forced_gaps
    );
    println!("│ Rejected:           {}", stats.authority.rejected);
    println!(
        "│ Replies:            {} corrections, {} acks",
        stats.authority.corrections_sent, stats.authority.acks_sent
    );
    println!("└──────────────────────────────────────────────────────────────────┘");

    println!("┌─ OBSERVER ───────────────────────────────────────────────────────┐");
    println!("│ Extrapolated:       {} frames", stats.observer_extrapolated);
    println!("│ Stale:              {} frames", stats.observer_stale);
    println!("└──────────────────────────────────────────────────────────────────┘");

    println!();
    println!("Settled error:        {settled_error:.3}");
    println!("Real time:            {:.2} s", elapsed.as_secs_f64());

    ExitCode::SUCCESS
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).compact().init();
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<ScenarioConfig, String> {
    let mut config = ScenarioConfig::default();
    while let Some(flag) = args.next() {
        let value = args.next().ok_or_else(|| format!("missing value for {flag}"))?;
        match flag.as_str() {
            "--network" => {
                config.network = NetworkConditions::preset(&value)
                    .ok_or_else(|| format!("unknown network preset '{value}'"))?;
            }
            "--seconds" => {
                config.duration_secs = value
                    .parse()
                    .map_err(|_| format!("invalid duration '{value}'"))?;
            }
            "--seed" => {
                config.seed = value.parse().map_err(|_| format!("invalid seed '{value}'"))?;
            }
            "--config" => {
                config.movement = MovementConfig::from_file(&value).map_err(|e| e.to_string())?;
            }
            other => return Err(format!("unknown argument '{other}'")),
        }
    }
    Ok(config)
}
