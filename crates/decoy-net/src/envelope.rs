//! Message envelopes and the JSON wire encoding.
//!
//! Every application message travels inside an [`Envelope`] carrying a
//! unique [`MessageId`] and a millisecond timestamp. On the wire each frame
//! payload is a protocol version byte followed by a JSON-encoded
//! [`WireFrame`].

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::peer::PeerId;

/// Current wire-protocol version. Prepended to every encoded frame payload.
pub const PROTOCOL_VERSION: u8 = 1;

/// Unique identifier of one logical message, used for deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl MessageId {
    /// Generate a fresh random id (128 random bits, hex encoded).
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let hi: u64 = rng.random();
        let lo: u64 = rng.random();
        Self(format!("{hi:016x}{lo:016x}"))
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Current wall-clock time in Unix milliseconds.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// A message plus the metadata every message type shares.
///
/// The body is flattened, so an envelope around an internally tagged enum
/// serializes as `{"messageId": .., "timestamp": .., "type": .., ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<M> {
    /// Unique id of this message.
    pub message_id: MessageId,
    /// Sender timestamp in Unix milliseconds.
    pub timestamp: u64,
    /// Type-specific content.
    #[serde(flatten)]
    pub body: M,
}

impl<M> Envelope<M> {
    /// Wrap `body` with a fresh id and the current time.
    pub fn new(body: M) -> Self {
        Self {
            message_id: MessageId::generate(),
            timestamp: now_millis(),
            body,
        }
    }
}

/// Channel handshake sent as the first frame in each direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hello {
    /// The sender's peer id.
    pub peer_id: PeerId,
    /// Address the sender accepts channels on, for the dial-back.
    pub listen_addr: String,
}

/// Everything that can appear in one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "frame", content = "data", rename_all = "lowercase")]
pub enum WireFrame<M> {
    /// Handshake.
    Hello(Hello),
    /// Application message.
    Data(Envelope<M>),
}

/// Errors that can occur while decoding a frame payload.
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    /// The payload was empty (no version byte).
    #[error("empty payload, no version byte")]
    EmptyPayload,

    /// The version byte does not match [`PROTOCOL_VERSION`].
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// JSON encoding or decoding failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Encode a frame: `[version: u8] [JSON WireFrame]`.
pub fn encode_frame<M: Serialize>(frame: &WireFrame<M>) -> Result<Vec<u8>, EnvelopeError> {
    let body = serde_json::to_vec(frame)?;
    let mut out = Vec::with_capacity(1 + body.len());
    out.push(PROTOCOL_VERSION);
    out.extend_from_slice(&body);
    Ok(out)
}

/// Decode a frame payload produced by [`encode_frame`].
pub fn decode_frame<M: DeserializeOwned>(data: &[u8]) -> Result<WireFrame<M>, EnvelopeError> {
    let (&version, body) = data.split_first().ok_or(EnvelopeError::EmptyPayload)?;
    if version != PROTOCOL_VERSION {
        return Err(EnvelopeError::UnsupportedVersion(version));
    }
    Ok(serde_json::from_slice(body)?)
}
