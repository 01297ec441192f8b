//! Peer-to-peer mesh of framed TCP channels.
//!
//! Every device runs one [`PeerMesh`]: a listener plus any number of
//! channels to other devices. Joining a room dials the host's ticket; the
//! host dials back so that both sides hold an outbound channel. Broadcasts
//! fan out over every open channel, and a shared [`SeenMessages`] filter
//! drops the copies that arrive over the second channel.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};

use crate::channel::{
    ChannelEntry, ChannelId, ChannelLimitReached, ChannelState, ChannelStateWatch, ChannelTable,
    Direction, IdGenerator, OutboundFrame,
};
use crate::codec::{CodecConfig, FrameError, encode_body, read_frame, write_encoded};
use crate::dedup::SeenMessages;
use crate::envelope::{
    Envelope, EnvelopeError, Hello, MessageId, WireFrame, decode_frame, encode_frame,
};
use crate::peer::{PeerId, PeerTicket};

/// How long a fresh channel may take to exchange hellos.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Settings for one mesh instance.
#[derive(Debug, Clone)]
pub struct MeshConfig {
    /// Address the listener binds to. Port 0 picks a free port.
    pub bind_addr: SocketAddr,
    /// IP written into the ticket when the listener is bound to an
    /// unspecified address. Defaults to loopback.
    pub advertise_ip: Option<IpAddr>,
    /// Maximum number of simultaneous channels.
    pub max_channels: usize,
    /// Frame codec limits.
    pub codec: CodecConfig,
    /// How many message ids the duplicate filter remembers.
    pub dedup_capacity: usize,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            advertise_ip: None,
            max_channels: 64,
            codec: CodecConfig::default(),
            dedup_capacity: 4096,
        }
    }
}

/// Something that happened on the mesh.
#[derive(Debug, Clone, PartialEq)]
pub enum MeshEvent<M> {
    /// A peer became reachable (its first channel opened).
    PeerConnected(PeerId),
    /// A peer's last channel closed.
    PeerDisconnected(PeerId),
    /// A message arrived, already deduplicated.
    Message {
        /// Sender. Equals the local id for loopback deliveries.
        from: PeerId,
        /// The message.
        envelope: Envelope<M>,
    },
}

/// Errors surfaced by mesh operations.
#[derive(Debug, thiserror::Error)]
pub enum MeshError {
    /// Socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Framing error on a channel.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// A frame could not be encoded or decoded.
    #[error("envelope error: {0}")]
    Envelope(#[from] EnvelopeError),

    /// The remote side never sent its hello.
    #[error("handshake with {0} timed out")]
    HandshakeTimeout(SocketAddr),

    /// The remote side sent something other than the expected hello.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// Too many channels are open.
    #[error(transparent)]
    ChannelLimit(#[from] ChannelLimitReached),

    /// [`PeerMesh::shutdown`] was called.
    #[error("mesh is shut down")]
    Shutdown,
}

struct Shared<M> {
    local_id: PeerId,
    ticket: PeerTicket,
    config: MeshConfig,
    channels: ChannelTable,
    ids: IdGenerator,
    seen: Mutex<SeenMessages>,
    events: mpsc::UnboundedSender<MeshEvent<M>>,
    shutdown_tx: watch::Sender<bool>,
}

/// Handle to a running mesh. Cheap to clone.
pub struct PeerMesh<M> {
    shared: Arc<Shared<M>>,
}

impl<M> Clone for PeerMesh<M> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<M> PeerMesh<M>
where
    M: Serialize + DeserializeOwned + Send + 'static,
{
    /// Bind the listener and start accepting channels.
    ///
    /// Returns the mesh handle and the receiver every [`MeshEvent`] is
    /// delivered on.
    pub async fn open(
        config: MeshConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<MeshEvent<M>>), MeshError> {
        let listener = TcpListener::bind(config.bind_addr).await?;
        let bound = listener.local_addr()?;
        let local_id = PeerId::generate();
        let ticket = PeerTicket {
            peer_id: local_id.clone(),
            addr: advertised_addr(bound, config.advertise_ip),
        };
        let (events, events_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, _) = watch::channel(false);

        let shared = Arc::new(Shared {
            local_id,
            ticket,
            channels: ChannelTable::new(config.max_channels),
            ids: IdGenerator::new(),
            seen: Mutex::new(SeenMessages::new(config.dedup_capacity)),
            events,
            shutdown_tx,
            config,
        });
        tracing::info!(peer = %shared.local_id, %bound, "Mesh listening");

        let mesh = Self { shared };
        tokio::spawn(mesh.clone().accept_loop(listener));
        Ok((mesh, events_rx))
    }

    /// This device's peer id.
    pub fn local_id(&self) -> &PeerId {
        &self.shared.local_id
    }

    /// The ticket other devices dial to reach this one.
    pub fn ticket(&self) -> &PeerTicket {
        &self.shared.ticket
    }

    /// Dial a peer and complete the hello exchange.
    pub async fn connect(&self, ticket: &PeerTicket) -> Result<ChannelId, MeshError> {
        if self.is_shut_down() {
            return Err(MeshError::Shutdown);
        }
        let stream = TcpStream::connect(ticket.addr).await?;
        stream.set_nodelay(true)?;
        let (mut reader, writer) = stream.into_split();

        let (id, outbound) = self
            .register(ticket.peer_id.clone(), Direction::Outbound, writer)
            .await?;

        let handshake: Result<Hello, MeshError> = async {
            self.queue_hello(&outbound)?;
            let hello = self.read_hello(&mut reader, ticket.addr).await?;
            if hello.peer_id != ticket.peer_id {
                return Err(MeshError::Handshake(format!(
                    "expected peer {}, found {}",
                    ticket.peer_id, hello.peer_id
                )));
            }
            Ok(hello)
        }
        .await;

        match handshake {
            Ok(hello) => {
                tracing::debug!(peer = %hello.peer_id, channel = id.0, "Outbound channel open");
                self.open_channel(id, hello.peer_id, reader).await;
                Ok(id)
            }
            Err(e) => {
                self.shared.channels.remove(id, ChannelState::Errored).await;
                Err(e)
            }
        }
    }

    /// Send `body` to every connected peer. Returns the new message id.
    pub async fn broadcast(&self, body: M) -> Result<MessageId, MeshError> {
        let envelope = Envelope::new(body);
        self.broadcast_envelope(&envelope).await?;
        Ok(envelope.message_id)
    }

    /// Send an existing envelope to every connected peer, keeping its id.
    /// Returns how many channels it was queued on.
    pub async fn broadcast_envelope(&self, envelope: &Envelope<M>) -> Result<usize, MeshError> {
        self.mark_seen(&envelope.message_id);
        let frame = self.encode_data(envelope)?;
        Ok(self.shared.channels.fan_out(&frame, None).await)
    }

    /// Send `body` only to the listed peers. Returns the new message id.
    pub async fn send(&self, body: M, peers: &[PeerId]) -> Result<MessageId, MeshError> {
        let envelope = Envelope::new(body);
        self.mark_seen(&envelope.message_id);
        let frame = self.encode_data(&envelope)?;
        let queued = self.shared.channels.fan_out(&frame, Some(peers)).await;
        tracing::trace!(queued, "Directed send");
        Ok(envelope.message_id)
    }

    /// Deliver `body` to this device's own event queue after `delay`.
    ///
    /// Loopback messages pass the same duplicate filter as network ones.
    /// Zero-delay messages are queued immediately, in call order.
    pub fn send_to_self(&self, body: M, delay: Duration) -> MessageId {
        let envelope = Envelope::new(body);
        let id = envelope.message_id.clone();
        if delay.is_zero() {
            self.deliver_to_self(envelope);
            return id;
        }
        let mesh = self.clone();
        let mut shutdown_rx = self.shared.shutdown_tx.subscribe();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => mesh.deliver_to_self(envelope),
                _ = shut_down(&mut shutdown_rx) => {}
            }
        });
        id
    }

    fn deliver_to_self(&self, envelope: Envelope<M>) {
        if self.is_shut_down() || !self.mark_seen(&envelope.message_id) {
            return;
        }
        let from = self.shared.local_id.clone();
        let _ = self.shared.events.send(MeshEvent::Message { from, envelope });
    }

    /// Peers with at least one open channel.
    pub async fn connected_peers(&self) -> Vec<PeerId> {
        self.shared.channels.open_peers().await
    }

    /// Number of live channels.
    pub async fn channel_count(&self) -> usize {
        self.shared.channels.len().await
    }

    /// Stop accepting, close every channel and cancel pending loopbacks.
    pub fn shutdown(&self) {
        self.shared.shutdown_tx.send_replace(true);
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    pub fn is_shut_down(&self) -> bool {
        *self.shared.shutdown_tx.borrow()
    }

    async fn accept_loop(self, listener: TcpListener) {
        let mut shutdown_rx = self.shared.shutdown_tx.subscribe();
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, remote) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            tracing::warn!(error = %e, "Accept failed");
                            continue;
                        }
                    };
                    let mesh = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = mesh.accept_channel(stream, remote).await {
                            tracing::warn!(%remote, error = %e, "Inbound channel rejected");
                        }
                    });
                }
                _ = shut_down(&mut shutdown_rx) => {
                    tracing::info!(peer = %self.shared.local_id, "Mesh shutting down");
                    break;
                }
            }
        }
    }

    async fn accept_channel(&self, stream: TcpStream, remote: SocketAddr) -> Result<(), MeshError> {
        stream.set_nodelay(true)?;
        let (mut reader, writer) = stream.into_split();

        let hello = self.read_hello(&mut reader, remote).await?;
        if hello.peer_id == self.shared.local_id {
            return Err(MeshError::Handshake("peer dialed itself".to_string()));
        }

        let (id, outbound) = self
            .register(hello.peer_id.clone(), Direction::Inbound, writer)
            .await?;
        if let Err(e) = self.queue_hello(&outbound) {
            self.shared.channels.remove(id, ChannelState::Errored).await;
            return Err(e);
        }
        tracing::debug!(peer = %hello.peer_id, channel = id.0, %remote, "Inbound channel open");
        self.open_channel(id, hello.peer_id.clone(), reader).await;

        if self.shared.channels.has_outbound(&hello.peer_id).await {
            return Ok(());
        }
        let Some(addr) = dial_back_addr(&hello.listen_addr, remote) else {
            tracing::warn!(peer = %hello.peer_id, addr = %hello.listen_addr, "Unusable listen address, no dial-back");
            return Ok(());
        };
        let ticket = PeerTicket {
            peer_id: hello.peer_id,
            addr,
        };
        if let Err(e) = self.connect(&ticket).await {
            tracing::warn!(peer = %ticket.peer_id, error = %e, "Dial-back failed");
        }
        Ok(())
    }

    /// Insert a channel and spawn its writer task.
    async fn register(
        &self,
        peer_id: PeerId,
        direction: Direction,
        writer: OwnedWriteHalf,
    ) -> Result<(ChannelId, mpsc::UnboundedSender<OutboundFrame>), MeshError> {
        let id = self.shared.ids.next_id();
        let (tx, rx) = mpsc::unbounded_channel();
        let entry = ChannelEntry {
            peer_id,
            direction,
            state: Arc::new(ChannelStateWatch::new()),
            outbound: tx.clone(),
        };
        self.shared.channels.insert(id, entry).await?;

        let codec = self.shared.config.codec.clone();
        let shutdown_rx = self.shared.shutdown_tx.subscribe();
        tokio::spawn(write_loop(id, writer, rx, codec, shutdown_rx));
        Ok((id, tx))
    }

    async fn open_channel(&self, id: ChannelId, peer: PeerId, reader: OwnedReadHalf) {
        if self.shared.channels.mark_open(id).await {
            tracing::info!(peer = %peer, "Peer connected");
            let _ = self.shared.events.send(MeshEvent::PeerConnected(peer.clone()));
        }
        tokio::spawn(self.clone().read_loop(id, peer, reader));
    }

    async fn read_loop(self, id: ChannelId, peer: PeerId, mut reader: OwnedReadHalf) {
        let mut shutdown_rx = self.shared.shutdown_tx.subscribe();
        let terminal = loop {
            tokio::select! {
                frame = read_frame(&mut reader, &self.shared.config.codec) => match frame {
                    Ok(payload) => self.deliver(&peer, &payload),
                    Err(FrameError::ConnectionClosed) => break ChannelState::Closed,
                    Err(e) => {
                        tracing::warn!(peer = %peer, channel = id.0, error = %e, "Channel failed");
                        break ChannelState::Errored;
                    }
                },
                _ = shut_down(&mut shutdown_rx) => break ChannelState::Closed,
            }
        };

        tracing::debug!(peer = %peer, channel = id.0, state = ?terminal, "Channel ended");
        if let Some(removed) = self.shared.channels.remove(id, terminal).await
            && !removed.peer_still_reachable
        {
            tracing::info!(peer = %removed.peer_id, "Peer disconnected");
            let _ = self
                .shared
                .events
                .send(MeshEvent::PeerDisconnected(removed.peer_id));
        }
    }

    fn deliver(&self, peer: &PeerId, payload: &[u8]) {
        match decode_frame::<M>(payload) {
            Ok(WireFrame::Data(envelope)) => {
                if self.mark_seen(&envelope.message_id) {
                    let _ = self.shared.events.send(MeshEvent::Message {
                        from: peer.clone(),
                        envelope,
                    });
                } else {
                    tracing::trace!(id = %envelope.message_id, "Duplicate dropped");
                }
            }
            Ok(WireFrame::Hello(_)) => {
                tracing::debug!(peer = %peer, "Ignoring repeated hello");
            }
            Err(e) => {
                tracing::warn!(peer = %peer, error = %e, "Dropping malformed message");
            }
        }
    }

    async fn read_hello(
        &self,
        reader: &mut OwnedReadHalf,
        remote: SocketAddr,
    ) -> Result<Hello, MeshError> {
        let payload = tokio::time::timeout(
            HANDSHAKE_TIMEOUT,
            read_frame(reader, &self.shared.config.codec),
        )
        .await
        .map_err(|_| MeshError::HandshakeTimeout(remote))??;

        match decode_frame::<M>(&payload)? {
            WireFrame::Hello(hello) => Ok(hello),
            WireFrame::Data(_) => Err(MeshError::Handshake(
                "expected hello, received data".to_string(),
            )),
        }
    }

    fn queue_hello(&self, outbound: &mpsc::UnboundedSender<OutboundFrame>) -> Result<(), MeshError> {
        let hello: WireFrame<M> = WireFrame::Hello(Hello {
            peer_id: self.shared.local_id.clone(),
            listen_addr: self.shared.ticket.addr.to_string(),
        });
        let payload = encode_frame(&hello)?;
        outbound
            .send(Arc::new(encode_body(&payload, &self.shared.config.codec)))
            .map_err(|_| MeshError::Handshake("channel writer stopped".to_string()))
    }

    fn encode_data(&self, envelope: &Envelope<M>) -> Result<OutboundFrame, MeshError> {
        let borrowed = WireFrame::Data(Envelope {
            message_id: envelope.message_id.clone(),
            timestamp: envelope.timestamp,
            body: &envelope.body,
        });
        let payload = encode_frame(&borrowed)?;
        Ok(Arc::new(encode_body(&payload, &self.shared.config.codec)))
    }

    fn mark_seen(&self, id: &MessageId) -> bool {
        self.shared
            .seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id)
    }
}

/// Resolves once shutdown has been requested, including before this
/// receiver subscribed, or once the mesh is gone.
async fn shut_down(shutdown_rx: &mut watch::Receiver<bool>) {
    let _ = shutdown_rx.wait_for(|down| *down).await;
}

async fn write_loop(
    id: ChannelId,
    mut writer: OwnedWriteHalf,
    mut rx: mpsc::UnboundedReceiver<OutboundFrame>,
    codec: CodecConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            frame = rx.recv() => {
                let Some(frame) = frame else { break };
                if let Err(e) = write_encoded(&mut writer, &frame, &codec).await {
                    tracing::debug!(channel = id.0, error = %e, "Write failed");
                    break;
                }
            }
            _ = shut_down(&mut shutdown_rx) => break,
        }
    }
    let _ = writer.shutdown().await;
}

/// Address to put in the ticket for a listener bound to `bound`.
fn advertised_addr(bound: SocketAddr, advertise_ip: Option<IpAddr>) -> SocketAddr {
    match advertise_ip {
        Some(ip) => SocketAddr::new(ip, bound.port()),
        None if bound.ip().is_unspecified() => {
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), bound.port())
        }
        None => bound,
    }
}

/// Where to dial a peer back, given the listen address it announced and the
/// address its channel came from.
fn dial_back_addr(listen_addr: &str, remote: SocketAddr) -> Option<SocketAddr> {
    let announced: SocketAddr = listen_addr.parse().ok()?;
    let ip = announced.ip();
    if ip.is_unspecified() || (ip.is_loopback() && !remote.ip().is_loopback()) {
        Some(SocketAddr::new(remote.ip(), announced.port()))
    } else {
        Some(announced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::write_frame;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
    enum Chat {
        Say { text: String },
    }

    fn say(text: &str) -> Chat {
        Chat::Say {
            text: text.to_string(),
        }
    }

    async fn open() -> (PeerMesh<Chat>, mpsc::UnboundedReceiver<MeshEvent<Chat>>) {
        PeerMesh::open(MeshConfig::default()).await.unwrap()
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<MeshEvent<Chat>>) -> MeshEvent<Chat> {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for mesh event")
            .expect("event channel closed")
    }

    async fn wait_for_channels(mesh: &PeerMesh<Chat>, count: usize) {
        for _ in 0..100 {
            if mesh.channel_count().await == count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("mesh never reached {count} channels");
    }

    #[test]
    fn test_unspecified_bind_advertises_loopback() {
        let bound: SocketAddr = "0.0.0.0:7000".parse().unwrap();
        assert_eq!(
            advertised_addr(bound, None),
            "127.0.0.1:7000".parse().unwrap()
        );
        let lan: IpAddr = "192.168.1.5".parse().unwrap();
        assert_eq!(
            advertised_addr(bound, Some(lan)),
            "192.168.1.5:7000".parse().unwrap()
        );
    }

    #[test]
    fn test_dial_back_uses_remote_ip_for_unroutable_announcements() {
        let remote: SocketAddr = "10.0.0.7:51000".parse().unwrap();
        assert_eq!(
            dial_back_addr("0.0.0.0:9000", remote),
            Some("10.0.0.7:9000".parse().unwrap())
        );
        assert_eq!(
            dial_back_addr("127.0.0.1:9000", remote),
            Some("10.0.0.7:9000".parse().unwrap())
        );
        assert_eq!(
            dial_back_addr("10.0.0.9:9000", remote),
            Some("10.0.0.9:9000".parse().unwrap())
        );
        assert_eq!(dial_back_addr("garbage", remote), None);
    }

    #[tokio::test]
    async fn test_connect_reports_each_peer_once() {
        let (host, mut host_rx) = open().await;
        let (guest, mut guest_rx) = open().await;

        guest.connect(host.ticket()).await.unwrap();

        assert_eq!(
            next_event(&mut host_rx).await,
            MeshEvent::PeerConnected(guest.local_id().clone())
        );
        assert_eq!(
            next_event(&mut guest_rx).await,
            MeshEvent::PeerConnected(host.local_id().clone())
        );

        // Dial plus dial-back.
        wait_for_channels(&host, 2).await;
        wait_for_channels(&guest, 2).await;
        assert_eq!(host.connected_peers().await, vec![guest.local_id().clone()]);
        assert!(host_rx.try_recv().is_err());
        assert!(guest_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_broadcast_delivered_once_over_two_channels() {
        let (host, mut host_rx) = open().await;
        let (guest, mut guest_rx) = open().await;
        guest.connect(host.ticket()).await.unwrap();
        next_event(&mut host_rx).await;
        next_event(&mut guest_rx).await;
        wait_for_channels(&host, 2).await;
        wait_for_channels(&guest, 2).await;

        let id = host.broadcast(say("hello")).await.unwrap();

        match next_event(&mut guest_rx).await {
            MeshEvent::Message { from, envelope } => {
                assert_eq!(&from, host.local_id());
                assert_eq!(envelope.message_id, id);
                assert_eq!(envelope.body, say("hello"));
            }
            other => panic!("unexpected event {other:?}"),
        }
        let second = tokio::time::timeout(Duration::from_millis(300), guest_rx.recv()).await;
        assert!(second.is_err(), "duplicate delivered: {second:?}");
    }

    #[tokio::test]
    async fn test_directed_send_skips_other_peers() {
        let (host, mut host_rx) = open().await;
        let (a, mut a_rx) = open().await;
        let (b, mut b_rx) = open().await;
        a.connect(host.ticket()).await.unwrap();
        b.connect(host.ticket()).await.unwrap();
        next_event(&mut host_rx).await;
        next_event(&mut host_rx).await;
        next_event(&mut a_rx).await;
        next_event(&mut b_rx).await;

        host.send(say("only a"), &[a.local_id().clone()])
            .await
            .unwrap();

        assert!(matches!(
            next_event(&mut a_rx).await,
            MeshEvent::Message { .. }
        ));
        let leaked = tokio::time::timeout(Duration::from_millis(300), b_rx.recv()).await;
        assert!(leaked.is_err());
    }

    #[tokio::test]
    async fn test_send_to_self_arrives_after_delay() {
        let (mesh, mut rx) = open().await;
        let started = tokio::time::Instant::now();

        let id = mesh.send_to_self(say("tick"), Duration::from_millis(100));

        match next_event(&mut rx).await {
            MeshEvent::Message { from, envelope } => {
                assert_eq!(&from, mesh.local_id());
                assert_eq!(envelope.message_id, id);
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(started.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_shutdown_cancels_pending_loopback() {
        let (mesh, mut rx) = open().await;
        mesh.send_to_self(say("never"), Duration::from_millis(200));
        mesh.shutdown();

        let got = tokio::time::timeout(Duration::from_millis(400), rx.recv()).await;
        assert!(!matches!(got, Ok(Some(_))));
    }

    #[tokio::test]
    async fn test_shutdown_right_after_open_stops_listener() {
        let (mesh, _rx) = open().await;
        let addr = mesh.ticket().addr;
        mesh.shutdown();
        assert!(mesh.is_shut_down());

        let (guest, _guest_rx) = open().await;
        assert!(matches!(
            mesh.connect(guest.ticket()).await,
            Err(MeshError::Shutdown)
        ));

        let mut refused = false;
        for _ in 0..50 {
            if TcpStream::connect(addr).await.is_err() {
                refused = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(refused, "listener still accepting after shutdown");
    }

    #[tokio::test]
    async fn test_immediate_loopbacks_keep_call_order() {
        let (mesh, mut rx) = open().await;
        for n in 0..50 {
            mesh.send_to_self(say(&n.to_string()), Duration::ZERO);
        }
        for n in 0..50 {
            match next_event(&mut rx).await {
                MeshEvent::Message { envelope, .. } => {
                    assert_eq!(envelope.body, say(&n.to_string()));
                }
                other => panic!("unexpected event {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_peer_shutdown_reports_disconnect_once() {
        let (host, mut host_rx) = open().await;
        let (guest, mut guest_rx) = open().await;
        guest.connect(host.ticket()).await.unwrap();
        next_event(&mut host_rx).await;
        next_event(&mut guest_rx).await;
        wait_for_channels(&host, 2).await;

        guest.shutdown();

        assert_eq!(
            next_event(&mut host_rx).await,
            MeshEvent::PeerDisconnected(guest.local_id().clone())
        );
        wait_for_channels(&host, 0).await;
        let extra = tokio::time::timeout(Duration::from_millis(200), host_rx.recv()).await;
        assert!(extra.is_err());
    }

    #[tokio::test]
    async fn test_malformed_frame_dropped_channel_survives() {
        let (host, mut host_rx) = open().await;
        let codec = CodecConfig::default();
        let stream = TcpStream::connect(host.ticket().addr).await.unwrap();
        let (mut reader, mut writer) = stream.into_split();

        let hello: WireFrame<Chat> = WireFrame::Hello(Hello {
            peer_id: PeerId::from("raw-client"),
            listen_addr: "nonsense".to_string(),
        });
        write_frame(&mut writer, &encode_frame(&hello).unwrap(), &codec)
            .await
            .unwrap();
        let reply = read_frame(&mut reader, &codec).await.unwrap();
        assert!(matches!(
            decode_frame::<Chat>(&reply).unwrap(),
            WireFrame::Hello(_)
        ));
        assert_eq!(
            next_event(&mut host_rx).await,
            MeshEvent::PeerConnected(PeerId::from("raw-client"))
        );

        write_frame(&mut writer, b"\x01{not json", &codec).await.unwrap();
        let valid = WireFrame::Data(Envelope::new(say("still here")));
        write_frame(&mut writer, &encode_frame(&valid).unwrap(), &codec)
            .await
            .unwrap();

        match next_event(&mut host_rx).await {
            MeshEvent::Message { envelope, .. } => assert_eq!(envelope.body, say("still here")),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_channel_limit_rejects_extra_peers() {
        let (host, mut host_rx) = PeerMesh::<Chat>::open(MeshConfig {
            max_channels: 1,
            ..MeshConfig::default()
        })
        .await
        .unwrap();
        let (first, _first_rx) = open().await;
        let (second, _second_rx) = open().await;

        first.connect(host.ticket()).await.unwrap();
        next_event(&mut host_rx).await;

        let result = second.connect(host.ticket()).await;
        assert!(result.is_err());
        assert_eq!(host.channel_count().await, 1);
    }

    #[tokio::test]
    async fn test_connect_rejects_wrong_peer_id() {
        let (host, _host_rx) = open().await;
        let (guest, _guest_rx) = open().await;
        let forged = PeerTicket {
            peer_id: PeerId::from("someone-else"),
            addr: host.ticket().addr,
        };

        let result = guest.connect(&forged).await;
        assert!(matches!(result, Err(MeshError::Handshake(_))));
        assert!(!guest.connected_peers().await.contains(&PeerId::from("someone-else")));
    }
}
