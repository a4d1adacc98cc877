//! # Movement Authority
//!
//! The side whose simulation is the truth.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      ARENA AUTHORITY                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  packets ──► MoveAuthority (per character) ──► reply        │
//! │                     │                                       │
//! │                     ▼                                       │
//! │            ReplicationSchedule ──► RemoteSnapshot to all    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The authority never trusts a client position. It re-simulates every
//! move with the same [`LocalSimulator`] the client used and only tells
//! the client when the results differ.

mod authority;
mod schedule;

pub use authority::{AuthorityStats, MoveAuthority, MoveReceipt};
pub use schedule::ReplicationSchedule;

use std::collections::HashMap;
use std::sync::Arc;

use arena_shared::{ClientMovePacket, RemoteSnapshot, ServerMessage};

use crate::clock::Clock;
use crate::config::AuthorityConfig;
use crate::simulator::LocalSimulator;
use crate::state::KinematicState;

/// Identifies one character on the authority.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CharacterId(pub u32);

/// Authority for every character in one arena.
pub struct ArenaAuthority {
    simulator: LocalSimulator,
    config: AuthorityConfig,
    clock: Arc<dyn Clock>,
    characters: HashMap<CharacterId, MoveAuthority>,
    schedule: ReplicationSchedule,
}

impl ArenaAuthority {
    /// Creates an empty arena.
    #[must_use]
    pub fn new(simulator: LocalSimulator, config: AuthorityConfig, clock: Arc<dyn Clock>) -> Self {
        let schedule = ReplicationSchedule::new(config.snapshot_interval);
        Self {
            simulator,
            config,
            clock,
            characters: HashMap::new(),
            schedule,
        }
    }

    /// Adds a character at `state`, or respawns it if it already exists.
    pub fn spawn(&mut self, id: CharacterId, state: KinematicState) {
        if let Some(existing) = self.characters.get_mut(&id) {
            existing.respawn(state);
            return;
        }
        tracing::info!("Spawning character {} at {:?}", id.0, state.position);
        let authority = MoveAuthority::new(
            self.simulator.clone(),
            self.config.clone(),
            Arc::clone(&self.clock),
            state,
        );
        self.characters.insert(id, authority);
    }

    /// Removes a character. Returns false if it was not present.
    pub fn remove(&mut self, id: CharacterId) -> bool {
        let removed = self.characters.remove(&id).is_some();
        if removed {
            tracing::info!("Removed character {}", id.0);
        }
        removed
    }

    /// Routes a packet to the character it belongs to.
    ///
    /// Returns `None` for unknown characters.
    pub fn receive(&mut self, id: CharacterId, packet: &ClientMovePacket) -> Option<MoveReceipt> {
        let Some(authority) = self.characters.get_mut(&id) else {
            tracing::warn!(
                "Dropping packet of {} moves for unknown character {}",
                packet.moves.len(),
                id.0
            );
            return None;
        };
        Some(authority.receive(packet))
    }

    /// Collects every reply that became due since the last call, such as
    /// corrections held back by rate limiting.
    pub fn poll_all(&mut self) -> Vec<(CharacterId, ServerMessage)> {
        let mut replies: Vec<_> = self
            .characters
            .iter_mut()
            .filter_map(|(id, authority)| authority.poll().map(|reply| (*id, reply)))
            .collect();
        replies.sort_by_key(|(id, _)| *id);
        replies
    }

    /// Samples every character if a replication round is due.
    ///
    /// Returns an empty list between rounds.
    pub fn replicate(&mut self) -> Vec<(CharacterId, RemoteSnapshot)> {
        if !self.schedule.due(self.clock.now()) {
            return Vec::new();
        }
        let mut snapshots: Vec<_> = self
            .characters
            .iter()
            .map(|(id, authority)| (*id, authority.snapshot()))
            .collect();
        snapshots.sort_by_key(|(id, _)| *id);
        snapshots
    }

    /// Authority of one character.
    #[must_use]
    pub fn character(&self, id: CharacterId) -> Option<&MoveAuthority> {
        self.characters.get(&id)
    }

    /// Number of characters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.characters.len()
    }

    /// Returns true if no character is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.characters.is_empty()
    }

    /// Replication cadence.
    #[must_use]
    pub const fn schedule(&self) -> &ReplicationSchedule {
        &self.schedule
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::PhysicsConfig;
    use crate::simulator::FlatArena;
    use arena_shared::Vec3;

    fn arena(clock: &Arc<ManualClock>) -> ArenaAuthority {
        let simulator = LocalSimulator::new(PhysicsConfig::default(), Arc::new(FlatArena::square(5000.0)));
        ArenaAuthority::new(simulator, AuthorityConfig::default(), clock.clone())
    }

    #[test]
    fn test_spawn_and_remove() {
        let clock = Arc::new(ManualClock::new(0.0));
        let mut arena = arena(&clock);

        arena.spawn(CharacterId(1), KinematicState::at(Vec3::ZERO));
        arena.spawn(CharacterId(2), KinematicState::at(Vec3::new(100.0, 0.0, 0.0)));
        assert_eq!(arena.len(), 2);

        assert!(arena.remove(CharacterId(1)));
        assert!(!arena.remove(CharacterId(1)));
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn test_unknown_character_is_ignored() {
        let clock = Arc::new(ManualClock::new(0.0));
        let mut arena = arena(&clock);
        let packet = ClientMovePacket { old_move: None, moves: Vec::new() };
        assert!(arena.receive(CharacterId(7), &packet).is_none());
    }

    #[test]
    fn test_replicates_on_schedule() {
        let clock = Arc::new(ManualClock::new(0.0));
        let mut arena = arena(&clock);
        arena.spawn(CharacterId(2), KinematicState::at(Vec3::new(100.0, 0.0, 0.0)));
        arena.spawn(CharacterId(1), KinematicState::at(Vec3::ZERO));

        let first = arena.replicate();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].0, CharacterId(1));
        assert_eq!(first[1].1.position, Vec3::new(100.0, 0.0, 0.0));

        clock.advance(0.01);
        assert!(arena.replicate().is_empty());

        clock.advance(0.05);
        assert_eq!(arena.replicate().len(), 2);
    }

    #[test]
    fn test_respawn_keeps_character() {
        let clock = Arc::new(ManualClock::new(0.0));
        let mut arena = arena(&clock);
        arena.spawn(CharacterId(1), KinematicState::at(Vec3::ZERO));
        arena.spawn(CharacterId(1), KinematicState::at(Vec3::new(0.0, 50.0, 0.0)));

        assert_eq!(arena.len(), 1);
        let state = arena.character(CharacterId(1)).map(|c| c.state().position);
        assert_eq!(state, Some(Vec3::new(0.0, 50.0, 0.0)));
    }
}
