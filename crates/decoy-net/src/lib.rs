//! Peer mesh networking: framed TCP channels, JSON envelopes, duplicate
//! filtering and loopback delivery.

pub mod channel;
pub mod codec;
pub mod dedup;
pub mod envelope;
pub mod mesh;
pub mod peer;

pub use channel::{ChannelId, ChannelLimitReached, ChannelState, ChannelStateWatch, ChannelTable};
pub use codec::{CodecConfig, FrameError, read_frame, write_frame};
pub use dedup::SeenMessages;
pub use envelope::{Envelope, EnvelopeError, MessageId, PROTOCOL_VERSION, now_millis};
pub use mesh::{MeshConfig, MeshError, MeshEvent, PeerMesh};
pub use peer::{PeerId, PeerTicket, TicketError};
