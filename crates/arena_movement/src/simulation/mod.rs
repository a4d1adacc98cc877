//! # Network Simulation
//!
//! Simulates an unreliable link for testing prediction under realistic
//! conditions.
//!
//! ## Features
//!
//! - Latency with jitter (which also reorders messages)
//! - Packet loss
//! - Duplication
//!
//! Randomness comes from a seeded ChaCha stream, so a run with the same
//! seed and the same traffic delivers exactly the same messages at exactly
//! the same times.
//!
//! ## Modules
//!
//! - `scenario`: client, authority and observer wired over lossy links

pub mod scenario;

pub use scenario::{LinkScenario, ScenarioConfig, ScenarioStats};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Network conditions for simulation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NetworkConditions {
    /// One-way latency in milliseconds.
    pub base_latency_ms: u32,
    /// Jitter (uniform ±) in milliseconds.
    pub jitter_ms: u32,
    /// Packet loss percentage (0-100).
    pub packet_loss_percent: u8,
    /// Duplicate packet percentage (0-100).
    pub duplicate_percent: u8,
}

impl NetworkConditions {
    /// Perfect network conditions (LAN).
    pub const PERFECT: Self = Self {
        base_latency_ms: 1,
        jitter_ms: 0,
        packet_loss_percent: 0,
        duplicate_percent: 0,
    };

    /// Good network conditions (fiber).
    pub const GOOD: Self = Self {
        base_latency_ms: 20,
        jitter_ms: 5,
        packet_loss_percent: 0,
        duplicate_percent: 0,
    };

    /// Average network conditions (cable).
    pub const AVERAGE: Self = Self {
        base_latency_ms: 50,
        jitter_ms: 20,
        packet_loss_percent: 1,
        duplicate_percent: 1,
    };

    /// Poor network conditions (mobile/wifi).
    pub const POOR: Self = Self {
        base_latency_ms: 100,
        jitter_ms: 50,
        packet_loss_percent: 5,
        duplicate_percent: 2,
    };

    /// Looks up a preset by name.
    #[must_use]
    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "perfect" => Some(Self::PERFECT),
            "good" => Some(Self::GOOD),
            "average" => Some(Self::AVERAGE),
            "poor" => Some(Self::POOR),
            _ => None,
        }
    }
}

impl Default for NetworkConditions {
    fn default() -> Self {
        Self::AVERAGE
    }
}

/// Link statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LinkStats {
    /// Messages handed to the link.
    pub sent: u64,
    /// Messages lost.
    pub dropped: u64,
    /// Extra copies created.
    pub duplicated: u64,
    /// Messages delivered (copies included).
    pub delivered: u64,
}

/// A message in transit.
#[derive(Clone, Debug)]
struct InFlight<T> {
    deliver_at: f64,
    /// Send order, to keep equal delivery times stable.
    sequence: u64,
    payload: T,
}

/// One direction of a simulated unreliable link.
#[derive(Clone, Debug)]
pub struct LossyLink<T> {
    conditions: NetworkConditions,
    rng: ChaCha8Rng,
    /// Sorted by delivery time, then send order.
    in_flight: Vec<InFlight<T>>,
    next_sequence: u64,
    stats: LinkStats,
}

impl<T: Clone> LossyLink<T> {
    /// Creates a link with the given conditions and RNG seed.
    #[must_use]
    pub fn new(conditions: NetworkConditions, seed: u64) -> Self {
        Self {
            conditions,
            rng: ChaCha8Rng::seed_from_u64(seed),
            in_flight: Vec::with_capacity(64),
            next_sequence: 0,
            stats: LinkStats::default(),
        }
    }

    /// Hands `payload` to the link at time `now` (seconds).
    pub fn send(&mut self, payload: T, now: f64) {
        self.stats.sent += 1;
        if self.roll(self.conditions.packet_loss_percent) {
            self.stats.dropped += 1;
            return;
        }
        if self.roll(self.conditions.duplicate_percent) {
            self.stats.duplicated += 1;
            self.enqueue(payload.clone(), now);
        }
        self.enqueue(payload, now);
    }

    /// Takes every message due at or before `now`, in delivery order.
    pub fn deliver(&mut self, now: f64) -> Vec<T> {
        let due = self.in_flight.partition_point(|m| m.deliver_at <= now);
        self.stats.delivered += due as u64;
        self.in_flight.drain(..due).map(|m| m.payload).collect()
    }

    /// Messages still in transit.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Conditions in effect.
    #[must_use]
    pub const fn conditions(&self) -> &NetworkConditions {
        &self.conditions
    }

    /// Statistics.
    #[must_use]
    pub const fn stats(&self) -> &LinkStats {
        &self.stats
    }

    fn roll(&mut self, percent: u8) -> bool {
        percent > 0 && self.rng.gen_range(0..100u32) < u32::from(percent)
    }

    fn latency(&mut self) -> f64 {
        let jitter = i64::from(self.conditions.jitter_ms);
        let offset = if jitter > 0 { self.rng.gen_range(-jitter..=jitter) } else { 0 };
        let millis = (i64::from(self.conditions.base_latency_ms) + offset).max(0);
        millis as f64 / 1000.0
    }

    fn enqueue(&mut self, payload: T, now: f64) {
        let deliver_at = now + self.latency();
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        let at = self.in_flight.partition_point(|m| {
            m.deliver_at < deliver_at || (m.deliver_at == deliver_at && m.sequence < sequence)
        });
        self.in_flight.insert(at, InFlight { deliver_at, sequence, payload });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perfect_link_delivers_in_order() {
        let mut link = LossyLink::new(NetworkConditions::PERFECT, 1);
        for i in 0..10 {
            link.send(i, f64::from(i) * 0.01);
        }

        assert!(link.deliver(0.0).is_empty());
        let delivered = link.deliver(1.0);
        assert_eq!(delivered, (0..10).collect::<Vec<_>>());
        assert_eq!(link.stats().dropped, 0);
        assert_eq!(link.in_flight(), 0);
    }

    #[test]
    fn test_latency_delays_delivery() {
        let mut link = LossyLink::new(NetworkConditions::GOOD, 7);
        link.send("hello", 0.0);

        assert!(link.deliver(0.014).is_empty());
        assert_eq!(link.deliver(0.026), vec!["hello"]);
    }

    #[test]
    fn test_same_seed_same_traffic() {
        let run = |seed| {
            let mut link = LossyLink::new(NetworkConditions::POOR, seed);
            for i in 0..500u32 {
                link.send(i, f64::from(i) * 0.016);
            }
            (link.deliver(100.0), *link.stats())
        };

        assert_eq!(run(42), run(42));
    }

    #[test]
    fn test_poor_link_loses_and_duplicates() {
        let mut link = LossyLink::new(NetworkConditions::POOR, 3);
        for i in 0..2000u32 {
            link.send(i, f64::from(i) * 0.016);
        }
        let delivered = link.deliver(1000.0);
        let stats = *link.stats();

        assert!(stats.dropped > 0);
        assert!(stats.duplicated > 0);
        assert_eq!(delivered.len() as u64, stats.sent - stats.dropped + stats.duplicated);
        assert_eq!(stats.delivered, delivered.len() as u64);
    }

    #[test]
    fn test_presets_by_name() {
        assert_eq!(NetworkConditions::preset("poor"), Some(NetworkConditions::POOR));
        assert_eq!(NetworkConditions::preset("dial-up"), None);
    }
}
