//! Peer identifiers and join tickets.

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Identifier a device uses on the mesh for its whole process lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(pub String);

impl PeerId {
    /// Allocate a random 12-character identifier.
    pub fn generate() -> Self {
        const ALPHABET: &[u8] = b"abcdefghijkmnpqrstuvwxyz23456789";
        let mut rng = rand::rng();
        let id: String = (0..12)
            .map(|_| char::from(ALPHABET[rng.random_range(0..ALPHABET.len())]))
            .collect();
        Self(id)
    }

    /// Borrow the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Everything needed to dial a peer: its id and listener address.
///
/// Rendered as `<peer-id>@<ip>:<port>`, the string a host shares with
/// players.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerTicket {
    /// Identifier of the peer behind the address.
    pub peer_id: PeerId,
    /// Listener address.
    pub addr: SocketAddr,
}

/// A ticket string that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TicketError {
    /// No `@` separator.
    #[error("ticket must look like <peer-id>@<host>:<port>")]
    MissingSeparator,
    /// The peer id part is empty.
    #[error("ticket has an empty peer id")]
    EmptyPeerId,
    /// The address part is not a socket address.
    #[error("invalid ticket address: {0}")]
    InvalidAddress(String),
}

impl fmt::Display for PeerTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.peer_id, self.addr)
    }
}

impl FromStr for PeerTicket {
    type Err = TicketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (id, addr) = s.split_once('@').ok_or(TicketError::MissingSeparator)?;
        if id.is_empty() {
            return Err(TicketError::EmptyPeerId);
        }
        let addr = addr
            .parse::<SocketAddr>()
            .map_err(|_| TicketError::InvalidAddress(addr.to_string()))?;
        Ok(Self {
            peer_id: PeerId::from(id),
            addr,
        })
    }
}
