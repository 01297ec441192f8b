//! State replication from the host to client mirrors.
//!
//! The host keeps the authoritative value and broadcasts structural diffs
//! against its last broadcast snapshot. Clients fold those patches into a
//! local mirror and fall back to a full snapshot whenever a patch does not
//! chain onto what they hold.

pub mod client;
pub mod diff;
pub mod error;
pub mod host;
pub mod messages;

pub use client::{ApplyOutcome, ClientMirror};
pub use diff::{PatchNode, apply_patch, diff};
pub use error::SyncError;
pub use host::HostReplicator;
pub use messages::SyncMessage;
