//! State-sync message bodies.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::diff::PatchNode;

/// Body of a state-sync message. Travels inside a mesh envelope, which adds
/// `messageId` and `timestamp`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncMessage {
    /// Complete snapshot of the host state at `version`.
    FullState {
        /// Version of the snapshot.
        version: u64,
        /// The whole state.
        payload: Value,
    },
    /// Changes since the snapshot at `base_version`.
    Patch {
        /// Version after applying the patch.
        version: u64,
        /// Version the patch was diffed against.
        #[serde(rename = "baseVersion")]
        base_version: u64,
        /// The changes.
        payload: PatchNode,
    },
    /// A client asking for a [`SyncMessage::FullState`].
    RequestFullState {
        /// Version the client currently holds (0 when it holds nothing).
        version: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use decoy_net::{Envelope, MessageId};
    use serde_json::json;

    #[test]
    fn test_patch_wire_shape() {
        let envelope = Envelope {
            message_id: MessageId::from("m-9"),
            timestamp: 7,
            body: SyncMessage::Patch {
                version: 4,
                base_version: 3,
                payload: PatchNode::Delete,
            },
        };
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(
            json,
            json!({
                "messageId": "m-9",
                "timestamp": 7,
                "type": "PATCH",
                "version": 4,
                "baseVersion": 3,
                "payload": {"op": "delete"}
            })
        );
    }

    #[test]
    fn test_request_full_state_parses() {
        let parsed: SyncMessage =
            serde_json::from_value(json!({"type": "REQUEST_FULL_STATE", "version": 0})).unwrap();
        assert_eq!(parsed, SyncMessage::RequestFullState { version: 0 });
    }
}
