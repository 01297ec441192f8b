//! The body type carried by every mesh envelope.

use decoy_game::{GameMessage, PlayerId};
use decoy_sync::SyncMessage;
use serde::{Deserialize, Serialize};

/// Everything devices say to each other.
///
/// Internally tagged so the inner `"type"` stays at the top level of the
/// envelope next to `messageId` and `timestamp`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "channel", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum AppMessage {
    /// Intents, generation results and timer expiries for the host.
    Game(GameMessage),
    /// Replication traffic.
    Sync(SyncMessage),
    /// Host-to-player text, such as why an intent was refused.
    Notice { player_id: PlayerId, text: String },
}
