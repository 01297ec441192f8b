//! Host side of replication.

use serde::Serialize;
use serde_json::Value;

use crate::diff::diff;
use crate::error::SyncError;
use crate::messages::SyncMessage;

/// Owns the authoritative state and turns its changes into patches.
///
/// `version` counts updates. Patches are diffed against the last broadcast
/// snapshot, and each one names that snapshot's version as its base so a
/// client can tell whether the patch chains onto what it holds.
#[derive(Debug)]
pub struct HostReplicator<T> {
    state: T,
    version: u64,
    checked_version: u64,
    snapshot: Value,
    snapshot_version: u64,
}

impl<T: Serialize> HostReplicator<T> {
    /// Start replicating `initial` at version 0.
    pub fn new(initial: T) -> Result<Self, SyncError> {
        let snapshot = serde_json::to_value(&initial).map_err(SyncError::Encode)?;
        Ok(Self {
            state: initial,
            version: 0,
            checked_version: 0,
            snapshot,
            snapshot_version: 0,
        })
    }

    /// The current authoritative state.
    pub fn state(&self) -> &T {
        &self.state
    }

    /// Number of updates applied so far.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Replace the state with `f(state)` and bump the version.
    pub fn update_state(&mut self, f: impl FnOnce(&T) -> T) {
        self.state = f(&self.state);
        self.version += 1;
    }

    /// Diff the state against the last broadcast snapshot.
    ///
    /// Returns the patch to broadcast, or `None` when nothing changed
    /// structurally since the last one.
    pub fn tick(&mut self) -> Result<Option<SyncMessage>, SyncError> {
        if self.version == self.checked_version {
            return Ok(None);
        }
        self.checked_version = self.version;

        let current = serde_json::to_value(&self.state).map_err(SyncError::Encode)?;
        let Some(payload) = diff(&self.snapshot, &current) else {
            return Ok(None);
        };
        let message = SyncMessage::Patch {
            version: self.version,
            base_version: self.snapshot_version,
            payload,
        };
        tracing::trace!(version = self.version, base = self.snapshot_version, "Patch ready");
        self.snapshot = current;
        self.snapshot_version = self.version;
        Ok(Some(message))
    }

    /// The last broadcast snapshot, which the next patch will chain onto.
    pub fn full_state(&self) -> SyncMessage {
        SyncMessage::FullState {
            version: self.snapshot_version,
            payload: self.snapshot.clone(),
        }
    }

    /// Answer a sync message from a client, if it calls for a reply.
    pub fn handle(&self, message: &SyncMessage) -> Option<SyncMessage> {
        match message {
            SyncMessage::RequestFullState { version } => {
                tracing::debug!(client_version = version, "Full state requested");
                Some(self.full_state())
            }
            SyncMessage::FullState { .. } | SyncMessage::Patch { .. } => None,
        }
    }
}
