//! Replay peers and their lifecycle.
//!
//! A peer is one receiver of the replayed stream. It is registered while
//! its transport is being negotiated, becomes ready once its video track
//! opens, and is removed as soon as it reaches a terminal state:
//!
//! ```text
//! register          -> Waiting
//! track open        -> Ready
//! Disconnected | Failed | Closed -> (removed)
//! ```
//!
//! The [`PeerRegistry`] is an ordinary value handed to whoever needs
//! lookups; there is no process-wide table. Callbacks receive a
//! [`Weak<Peer>`] and must upgrade it before use: a callback never keeps a
//! peer alive.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Weak};

use crate::error::{ReplayError, Result};

/// Peer connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    /// Registered, track not open yet.
    Waiting,
    /// Track open; samples may be sent.
    Ready,
    Disconnected,
    Failed,
    Closed,
}

impl PeerState {
    /// Terminal states remove the peer from its registry.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Disconnected | Self::Failed | Self::Closed)
    }
}

/// One receiver of the replayed stream.
#[derive(Debug)]
pub struct Peer {
    pub id: String,
    /// Where RTP for this peer is sent.
    pub destination: SocketAddr,
    state: RwLock<PeerState>,
}

impl Peer {
    fn new(id: &str, destination: SocketAddr) -> Self {
        Self {
            id: id.to_string(),
            destination,
            state: RwLock::new(PeerState::Waiting),
        }
    }

    pub fn state(&self) -> PeerState {
        *self.state.read()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == PeerState::Ready
    }

    fn set_state(&self, state: PeerState) {
        tracing::debug!(peer_id = %self.id, old_state = ?*self.state.read(), new_state = ?state, "state transition");
        *self.state.write() = state;
    }
}

/// Notified when a peer's video track opens.
pub trait TrackObserver: Send + Sync {
    fn on_track_open(&self, peer: Weak<Peer>);
}

/// Observer that moves a still-waiting peer to [`PeerState::Ready`].
#[derive(Debug, Default)]
pub struct MarkReady;

impl TrackObserver for MarkReady {
    fn on_track_open(&self, peer: Weak<Peer>) {
        let Some(peer) = peer.upgrade() else {
            tracing::debug!("track opened for a peer that is gone");
            return;
        };
        if peer.state() == PeerState::Waiting {
            peer.set_state(PeerState::Ready);
        }
    }
}

/// Registry of active peers.
///
/// Cloning shares the same underlying table.
#[derive(Clone, Default)]
pub struct PeerRegistry {
    peers: Arc<RwLock<HashMap<String, Arc<Peer>>>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a peer in [`PeerState::Waiting`], replacing any peer with the
    /// same ID.
    pub fn register(&self, id: &str, destination: SocketAddr) -> Arc<Peer> {
        let peer = Arc::new(Peer::new(id, destination));
        self.peers.write().insert(id.to_string(), peer.clone());

        let total = self.peers.read().len();
        tracing::debug!(peer_id = %id, %destination, total_peers = total, "peer registered");

        peer
    }

    pub fn get(&self, id: &str) -> Option<Arc<Peer>> {
        self.peers.read().get(id).cloned()
    }

    pub fn remove(&self, id: &str) -> Option<Arc<Peer>> {
        let removed = self.peers.write().remove(id);
        if removed.is_some() {
            let total = self.peers.read().len();
            tracing::debug!(peer_id = %id, total_peers = total, "peer removed");
        }
        removed
    }

    /// Transition a peer; terminal states remove it.
    pub fn set_state(&self, id: &str, state: PeerState) -> Result<()> {
        let peer = self
            .get(id)
            .ok_or_else(|| ReplayError::SessionNotFound(id.to_string()))?;
        peer.set_state(state);
        if state.is_terminal() {
            self.remove(id);
        }
        Ok(())
    }

    /// Report that a peer's track opened. The observer only gets a weak
    /// handle.
    pub fn open_track(&self, id: &str, observer: &dyn TrackObserver) -> Result<()> {
        let peer = self
            .get(id)
            .ok_or_else(|| ReplayError::SessionNotFound(id.to_string()))?;
        observer.on_track_open(Arc::downgrade(&peer));
        Ok(())
    }

    pub fn ready_peers(&self) -> Vec<Arc<Peer>> {
        self.peers
            .read()
            .values()
            .filter(|p| p.is_ready())
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.peers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> SocketAddr {
        "127.0.0.1:5004".parse().unwrap()
    }

    #[test]
    fn track_open_marks_ready() {
        let registry = PeerRegistry::new();
        let peer = registry.register("offer", addr());
        assert_eq!(peer.state(), PeerState::Waiting);
        assert!(registry.ready_peers().is_empty());

        registry.open_track("offer", &MarkReady).unwrap();
        assert!(peer.is_ready());
        assert_eq!(registry.ready_peers().len(), 1);
    }

    #[test]
    fn terminal_state_removes_peer() {
        let registry = PeerRegistry::new();
        registry.register("a", addr());
        registry.register("b", addr());

        registry.set_state("a", PeerState::Ready).unwrap();
        assert_eq!(registry.len(), 2);

        for state in [PeerState::Disconnected, PeerState::Failed] {
            registry.register("c", addr());
            registry.set_state("c", state).unwrap();
            assert!(registry.get("c").is_none());
        }
        registry.set_state("b", PeerState::Closed).unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unknown_peer_is_an_error() {
        let registry = PeerRegistry::new();
        assert!(matches!(
            registry.set_state("nope", PeerState::Ready),
            Err(ReplayError::SessionNotFound(_))
        ));
        assert!(registry.open_track("nope", &MarkReady).is_err());
    }

    #[test]
    fn observer_does_not_keep_removed_peer_alive() {
        let registry = PeerRegistry::new();
        let weak = Arc::downgrade(&registry.register("gone", addr()));
        registry.remove("gone");
        assert!(weak.upgrade().is_none());
        MarkReady.on_track_open(weak);
    }

    #[test]
    fn clones_share_state() {
        let registry = PeerRegistry::new();
        let other = registry.clone();
        registry.register("x", addr());
        assert!(other.get("x").is_some());
    }
}
