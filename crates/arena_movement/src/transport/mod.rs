//! # Transport Layer
//!
//! The movement core only needs two abstract operations per side: hand a
//! message to the network and take whatever has arrived. Wire encoding is
//! the transport's business.
//!
//! ## Design
//!
//! - [`ClientTransport`] / [`ServerTransport`] are the seams a real network
//!   layer plugs into
//! - [`LoopbackServer`] / [`LoopbackClient`] connect both sides inside one
//!   process over channels, for tests and local play
//! - Non-blocking: receiving never waits

use std::collections::HashMap;

use arena_shared::{ClientMovePacket, RemoteSnapshot, ServerMessage};
use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};

use crate::error::{MovementError, MovementResult};
use crate::server::CharacterId;

/// Everything the authority sends to a client.
#[derive(Clone, Debug, PartialEq)]
pub enum ClientBound {
    /// Reply about the client's own moves.
    Reply(ServerMessage),
    /// Replicated state of some character.
    Snapshot {
        /// Character the snapshot describes.
        character: CharacterId,
        /// The sample.
        snapshot: RemoteSnapshot,
    },
}

/// Client end of a movement connection.
pub trait ClientTransport {
    /// Sends a packet of moves to the authority.
    ///
    /// # Errors
    ///
    /// Returns `TransportClosed` if the authority is gone.
    fn send(&mut self, packet: ClientMovePacket) -> MovementResult<()>;

    /// Takes the next message that has arrived, if any.
    ///
    /// # Errors
    ///
    /// Returns `TransportClosed` if the authority is gone and nothing is left.
    fn try_recv(&mut self) -> MovementResult<Option<ClientBound>>;
}

/// Authority end of the movement connections.
pub trait ServerTransport {
    /// Takes the next packet that has arrived, with its sender.
    ///
    /// # Errors
    ///
    /// Returns `TransportClosed` if no client can send any more.
    fn try_recv(&mut self) -> MovementResult<Option<(CharacterId, ClientMovePacket)>>;

    /// Sends a message to one client.
    ///
    /// # Errors
    ///
    /// Returns `TransportClosed` if that client is gone.
    fn send(&mut self, to: CharacterId, message: ClientBound) -> MovementResult<()>;
}

/// Authority side of an in-process transport.
#[derive(Debug)]
pub struct LoopbackServer {
    uplink_tx: Sender<(CharacterId, ClientMovePacket)>,
    uplink_rx: Receiver<(CharacterId, ClientMovePacket)>,
    clients: HashMap<CharacterId, Sender<ClientBound>>,
}

impl LoopbackServer {
    /// Creates a server with no clients.
    #[must_use]
    pub fn new() -> Self {
        let (uplink_tx, uplink_rx) = unbounded();
        Self {
            uplink_tx,
            uplink_rx,
            clients: HashMap::new(),
        }
    }

    /// Connects a client controlling `id`. Reconnecting replaces the old one.
    pub fn connect(&mut self, id: CharacterId) -> LoopbackClient {
        let (downlink_tx, downlink_rx) = unbounded();
        if self.clients.insert(id, downlink_tx).is_some() {
            tracing::info!("Character {} reconnected, dropping old connection", id.0);
        }
        LoopbackClient {
            id,
            uplink: self.uplink_tx.clone(),
            downlink: downlink_rx,
        }
    }

    /// Characters with a connected client.
    pub fn connected(&self) -> impl Iterator<Item = CharacterId> + '_ {
        self.clients.keys().copied()
    }

    /// Sends `message` to every connected client, forgetting the ones
    /// that hung up. Returns how many received it.
    pub fn broadcast(&mut self, message: &ClientBound) -> usize {
        self.clients.retain(|id, tx| {
            let alive = tx.send(message.clone()).is_ok();
            if !alive {
                tracing::info!("Character {} disconnected", id.0);
            }
            alive
        });
        self.clients.len()
    }
}

impl Default for LoopbackServer {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerTransport for LoopbackServer {
    fn try_recv(&mut self) -> MovementResult<Option<(CharacterId, ClientMovePacket)>> {
        match self.uplink_rx.try_recv() {
            Ok(message) => Ok(Some(message)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(MovementError::TransportClosed),
        }
    }

    fn send(&mut self, to: CharacterId, message: ClientBound) -> MovementResult<()> {
        let tx = self.clients.get(&to).ok_or(MovementError::TransportClosed)?;
        if tx.send(message).is_err() {
            self.clients.remove(&to);
            return Err(MovementError::TransportClosed);
        }
        Ok(())
    }
}

/// Client side of an in-process transport.
#[derive(Debug)]
pub struct LoopbackClient {
    id: CharacterId,
    uplink: Sender<(CharacterId, ClientMovePacket)>,
    downlink: Receiver<ClientBound>,
}

impl LoopbackClient {
    /// Character this client controls.
    #[must_use]
    pub const fn id(&self) -> CharacterId {
        self.id
    }
}

impl ClientTransport for LoopbackClient {
    fn send(&mut self, packet: ClientMovePacket) -> MovementResult<()> {
        self.uplink
            .send((self.id, packet))
            .map_err(|_| MovementError::TransportClosed)
    }

    fn try_recv(&mut self) -> MovementResult<Option<ClientBound>> {
        match self.downlink.try_recv() {
            Ok(message) => Ok(Some(message)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(MovementError::TransportClosed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_shared::{MovementMode, Vec3};

    fn snapshot() -> ClientBound {
        ClientBound::Snapshot {
            character: CharacterId(1),
            snapshot: RemoteSnapshot {
                timestamp: 1.0,
                position: Vec3::ZERO,
                velocity: Vec3::ZERO,
                mode: MovementMode::Walking,
            },
        }
    }

    #[test]
    fn test_packets_reach_the_server_tagged() {
        let mut server = LoopbackServer::new();
        let mut client = server.connect(CharacterId(3));

        assert_eq!(server.try_recv(), Ok(None));
        assert!(client.send(ClientMovePacket::default()).is_ok());
        assert_eq!(server.try_recv(), Ok(Some((CharacterId(3), ClientMovePacket::default()))));
    }

    #[test]
    fn test_replies_reach_only_their_client() {
        let mut server = LoopbackServer::new();
        let mut a = server.connect(CharacterId(1));
        let mut b = server.connect(CharacterId(2));

        let ack = ClientBound::Reply(ServerMessage::AckGoodMove { timestamp: 0.5 });
        assert!(server.send(CharacterId(1), ack.clone()).is_ok());
        assert_eq!(a.try_recv(), Ok(Some(ack)));
        assert_eq!(b.try_recv(), Ok(None));
    }

    #[test]
    fn test_broadcast_forgets_closed_clients() {
        let mut server = LoopbackServer::new();
        let mut a = server.connect(CharacterId(1));
        drop(server.connect(CharacterId(2)));

        assert_eq!(server.broadcast(&snapshot()), 1);
        assert_eq!(a.try_recv(), Ok(Some(snapshot())));
        assert_eq!(server.send(CharacterId(2), snapshot()), Err(MovementError::TransportClosed));
    }

    #[test]
    fn test_client_sees_closed_server() {
        let mut server = LoopbackServer::new();
        let mut client = server.connect(CharacterId(1));
        drop(server);

        assert_eq!(client.send(ClientMovePacket::default()), Err(MovementError::TransportClosed));
        assert_eq!(client.try_recv(), Err(MovementError::TransportClosed));
    }
}
