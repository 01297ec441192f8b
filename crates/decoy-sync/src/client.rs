//! Client side of replication.

use decoy_net::{MessageId, SeenMessages};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::diff::apply_patch;
use crate::error::SyncError;
use crate::messages::SyncMessage;

/// What [`ClientMirror::apply`] did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The mirror moved to a new version.
    Applied,
    /// The message id was already applied.
    Duplicate,
    /// The message is older than the mirror.
    Stale,
    /// The patch does not chain onto the mirror; ask for a full state.
    NeedsFullState,
    /// Not a message the mirror consumes.
    Ignored,
}

/// Local read-only copy of the host state.
#[derive(Debug)]
pub struct ClientMirror<T> {
    value: Value,
    state: Option<T>,
    version: u64,
    seen: SeenMessages,
}

impl<T: DeserializeOwned> ClientMirror<T> {
    /// Create an empty mirror. `dedup_capacity` bounds the message ids it
    /// remembers.
    pub fn new(dedup_capacity: usize) -> Self {
        Self {
            value: Value::Null,
            state: None,
            version: 0,
            seen: SeenMessages::new(dedup_capacity),
        }
    }

    /// Whether a snapshot has landed.
    pub fn is_ready(&self) -> bool {
        self.state.is_some()
    }

    /// Version of the mirrored state.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// The decoded state, once ready.
    pub fn state(&self) -> Option<&T> {
        self.state.as_ref()
    }

    /// The raw mirrored value.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// The request a client sends on connect or after a broken chain.
    pub fn request_full_state(&self) -> SyncMessage {
        SyncMessage::RequestFullState {
            version: self.version,
        }
    }

    /// Fold one message into the mirror.
    ///
    /// Patches are only applied on top of the exact version they were
    /// diffed against. A patch arriving before the first snapshot, or after
    /// a missed one, yields [`ApplyOutcome::NeedsFullState`] and leaves the
    /// mirror untouched.
    pub fn apply(
        &mut self,
        message_id: &MessageId,
        message: &SyncMessage,
    ) -> Result<ApplyOutcome, SyncError> {
        if !self.seen.insert(message_id) {
            tracing::trace!(id = %message_id, "Duplicate sync message");
            return Ok(ApplyOutcome::Duplicate);
        }

        match message {
            SyncMessage::FullState { version, payload } => {
                if self.is_ready() && *version < self.version {
                    return Ok(ApplyOutcome::Stale);
                }
                self.install(payload.clone(), *version)
            }
            SyncMessage::Patch {
                version,
                base_version,
                payload,
            } => {
                if !self.is_ready() {
                    tracing::debug!(version, "Patch before first snapshot");
                    return Ok(ApplyOutcome::NeedsFullState);
                }
                if *version <= self.version {
                    return Ok(ApplyOutcome::Stale);
                }
                if *base_version != self.version {
                    tracing::debug!(
                        have = self.version,
                        base = base_version,
                        "Patch does not chain onto mirror"
                    );
                    return Ok(ApplyOutcome::NeedsFullState);
                }
                let next = apply_patch(self.value.clone(), payload);
                self.install(next, *version)
            }
            SyncMessage::RequestFullState { .. } => Ok(ApplyOutcome::Ignored),
        }
    }

    fn install(&mut self, value: Value, version: u64) -> Result<ApplyOutcome, SyncError> {
        let state = T::deserialize(&value).map_err(|source| SyncError::Decode { version, source })?;
        self.value = value;
        self.state = Some(state);
        self.version = version;
        Ok(ApplyOutcome::Applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::PatchNode;
    use serde::Deserialize;
    use serde_json::json;
    use std::collections::BTreeMap;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Counter {
        count: u32,
    }

    fn set_count(n: u32) -> PatchNode {
        PatchNode::Merge(BTreeMap::from([(
            "count".to_string(),
            PatchNode::Set(json!(n)),
        )]))
    }

    fn full(version: u64, count: u32) -> SyncMessage {
        SyncMessage::FullState {
            version,
            payload: json!({ "count": count }),
        }
    }

    #[test]
    fn test_not_ready_until_snapshot() {
        let mut mirror = ClientMirror::<Counter>::new(16);
        assert!(!mirror.is_ready());
        assert_eq!(
            mirror.request_full_state(),
            SyncMessage::RequestFullState { version: 0 }
        );

        let outcome = mirror.apply(&MessageId::from("1"), &full(3, 7)).unwrap();
        assert_eq!(outcome, ApplyOutcome::Applied);
        assert!(mirror.is_ready());
        assert_eq!(mirror.version(), 3);
        assert_eq!(mirror.state(), Some(&Counter { count: 7 }));
    }

    #[test]
    fn test_patch_before_snapshot_requests_full_state() {
        let mut mirror = ClientMirror::<Counter>::new(16);
        let patch = SyncMessage::Patch {
            version: 1,
            base_version: 0,
            payload: set_count(1),
        };
        assert_eq!(
            mirror.apply(&MessageId::from("p"), &patch).unwrap(),
            ApplyOutcome::NeedsFullState
        );
        assert!(!mirror.is_ready());
    }

    #[test]
    fn test_reapplied_patch_is_noop() {
        let mut mirror = ClientMirror::<Counter>::new(16);
        mirror.apply(&MessageId::from("s"), &full(1, 0)).unwrap();
        let patch = SyncMessage::Patch {
            version: 2,
            base_version: 1,
            payload: set_count(5),
        };

        let id = MessageId::from("p");
        assert_eq!(mirror.apply(&id, &patch).unwrap(), ApplyOutcome::Applied);
        let before = mirror.value().clone();
        assert_eq!(mirror.apply(&id, &patch).unwrap(), ApplyOutcome::Duplicate);
        assert_eq!(mirror.value(), &before);
        assert_eq!(mirror.version(), 2);
    }

    #[test]
    fn test_gap_in_chain_requests_full_state() {
        let mut mirror = ClientMirror::<Counter>::new(16);
        mirror.apply(&MessageId::from("s"), &full(1, 0)).unwrap();
        let skipped = SyncMessage::Patch {
            version: 5,
            base_version: 4,
            payload: set_count(9),
        };
        assert_eq!(
            mirror.apply(&MessageId::from("p"), &skipped).unwrap(),
            ApplyOutcome::NeedsFullState
        );
        assert_eq!(mirror.state(), Some(&Counter { count: 0 }));
    }

    #[test]
    fn test_older_snapshot_is_stale() {
        let mut mirror = ClientMirror::<Counter>::new(16);
        mirror.apply(&MessageId::from("a"), &full(4, 4)).unwrap();
        assert_eq!(
            mirror.apply(&MessageId::from("b"), &full(2, 2)).unwrap(),
            ApplyOutcome::Stale
        );
        assert_eq!(mirror.version(), 4);
    }

    #[test]
    fn test_undecodable_snapshot_is_an_error() {
        let mut mirror = ClientMirror::<Counter>::new(16);
        let bad = SyncMessage::FullState {
            version: 1,
            payload: json!({"count": "many"}),
        };
        assert!(matches!(
            mirror.apply(&MessageId::from("x"), &bad),
            Err(SyncError::Decode { version: 1, .. })
        ));
        assert!(!mirror.is_ready());
    }
}
