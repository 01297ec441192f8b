//! Per-peer channels and their lifecycle.
//!
//! Each channel walks `Connecting → Open → {Closed, Errored}`; the last two
//! are terminal. The [`ChannelTable`] owns every channel's outbound queue and
//! answers which peers are currently reachable.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{RwLock, mpsc, watch};

use crate::peer::PeerId;

/// Unique identifier for a channel within one mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub u64);

/// Atomic generator for monotonically increasing [`ChannelId`]s.
#[derive(Debug)]
pub struct IdGenerator {
    next: AtomicU64,
}

impl IdGenerator {
    /// Create a new generator starting at 1.
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Return the next unique [`ChannelId`].
    pub fn next_id(&self) -> ChannelId {
        ChannelId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Which side dialed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// We dialed the peer.
    Outbound,
    /// The peer dialed us.
    Inbound,
}

/// Channel lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Transport connected, handshake not finished.
    Connecting,
    /// Handshake finished; frames flow both ways.
    Open,
    /// Closed cleanly by either side.
    Closed,
    /// Failed with an I/O or protocol error.
    Errored,
}

impl ChannelState {
    /// Whether no further transitions are possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Errored)
    }

    /// Whether `self → next` is a legal transition.
    pub fn can_transition(self, next: ChannelState) -> bool {
        match (self, next) {
            (Self::Connecting, Self::Open) => true,
            (Self::Connecting | Self::Open, Self::Closed | Self::Errored) => true,
            _ => false,
        }
    }
}

/// Observable channel state backed by a [`watch`] channel.
#[derive(Debug)]
pub struct ChannelStateWatch {
    tx: watch::Sender<ChannelState>,
    rx: watch::Receiver<ChannelState>,
}

impl Default for ChannelStateWatch {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelStateWatch {
    /// Create a new watch initialized to [`ChannelState::Connecting`].
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(ChannelState::Connecting);
        Self { tx, rx }
    }

    /// Move to `next` if the transition is legal. Returns whether it was.
    pub fn advance(&self, next: ChannelState) -> bool {
        let current = self.current();
        if !current.can_transition(next) {
            return false;
        }
        let _ = self.tx.send(next);
        true
    }

    /// Return the current state without blocking.
    pub fn current(&self) -> ChannelState {
        *self.rx.borrow()
    }
}

/// Bytes queued for a channel's writer task: one encoded frame body.
pub type OutboundFrame = Arc<Vec<u8>>;

/// Table bookkeeping for one channel.
#[derive(Debug)]
pub struct ChannelEntry {
    /// Remote peer.
    pub peer_id: PeerId,
    /// Who dialed.
    pub direction: Direction,
    /// Lifecycle state.
    pub state: Arc<ChannelStateWatch>,
    /// Queue drained by the channel's writer task.
    pub outbound: mpsc::UnboundedSender<OutboundFrame>,
}

/// Error returned when the table is at capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("channel limit reached")]
pub struct ChannelLimitReached;

/// Result of removing a channel from the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Removed {
    /// Peer the channel belonged to.
    pub peer_id: PeerId,
    /// Whether that peer still has another live channel.
    pub peer_still_reachable: bool,
}

/// Thread-safe map of live channels keyed by [`ChannelId`].
#[derive(Debug)]
pub struct ChannelTable {
    inner: RwLock<HashMap<ChannelId, ChannelEntry>>,
    max_channels: usize,
}

impl ChannelTable {
    /// Create a new table with the given capacity limit.
    pub fn new(max_channels: usize) -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
            max_channels,
        }
    }

    /// Insert a channel. Returns `Err` if the table is at capacity.
    pub async fn insert(
        &self,
        id: ChannelId,
        entry: ChannelEntry,
    ) -> Result<(), ChannelLimitReached> {
        let mut map = self.inner.write().await;
        if map.len() >= self.max_channels {
            return Err(ChannelLimitReached);
        }
        map.insert(id, entry);
        Ok(())
    }

    /// Mark a channel open. Returns `true` if this made its peer reachable
    /// for the first time (no other open channel to the same peer).
    pub async fn mark_open(&self, id: ChannelId) -> bool {
        let map = self.inner.write().await;
        let Some(entry) = map.get(&id) else {
            return false;
        };
        let already_reachable = map.iter().any(|(other_id, other)| {
            *other_id != id
                && other.peer_id == entry.peer_id
                && other.state.current() == ChannelState::Open
        });
        entry.state.advance(ChannelState::Open);
        !already_reachable
    }

    /// Drop a channel, recording its terminal state.
    pub async fn remove(&self, id: ChannelId, terminal: ChannelState) -> Option<Removed> {
        let mut map = self.inner.write().await;
        let entry = map.remove(&id)?;
        entry.state.advance(terminal);
        let peer_still_reachable = map
            .values()
            .any(|other| other.peer_id == entry.peer_id && other.state.current() == ChannelState::Open);
        Some(Removed {
            peer_id: entry.peer_id,
            peer_still_reachable,
        })
    }

    /// Whether an outbound channel to `peer` exists in any live state.
    pub async fn has_outbound(&self, peer: &PeerId) -> bool {
        self.inner
            .read()
            .await
            .values()
            .any(|e| &e.peer_id == peer && e.direction == Direction::Outbound)
    }

    /// Queue `frame` on every open channel, optionally only towards `peers`.
    /// Returns how many channels accepted it.
    pub async fn fan_out(&self, frame: &OutboundFrame, peers: Option<&[PeerId]>) -> usize {
        let map = self.inner.read().await;
        map.values()
            .filter(|e| e.state.current() == ChannelState::Open)
            .filter(|e| peers.is_none_or(|wanted| wanted.contains(&e.peer_id)))
            .filter(|e| e.outbound.send(Arc::clone(frame)).is_ok())
            .count()
    }

    /// Peers with at least one open channel, sorted and deduplicated.
    pub async fn open_peers(&self) -> Vec<PeerId> {
        let map = self.inner.read().await;
        let mut peers: Vec<PeerId> = map
            .values()
            .filter(|e| e.state.current() == ChannelState::Open)
            .map(|e| e.peer_id.clone())
            .collect();
        peers.sort();
        peers.dedup();
        peers
    }

    /// Return the number of live channels.
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Return whether the table is empty.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}
