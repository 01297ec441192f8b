//! The client session: a read-only mirror of the host's state.

use decoy_config::Config;
use decoy_game::{GameMessage, GameState};
use decoy_net::{Envelope, MeshEvent, PeerId, PeerMesh, PeerTicket};
use decoy_sync::{ApplyOutcome, ClientMirror, SyncMessage};
use tokio::sync::mpsc;

use crate::error::AppError;
use crate::input::{LineAction, interpret};
use crate::protocol::AppMessage;
use crate::view::Terminal;
use crate::{mesh_config, player_id_of};

/// A device that joined someone else's game.
pub struct ClientSession {
    mesh: PeerMesh<AppMessage>,
    events: mpsc::UnboundedReceiver<MeshEvent<AppMessage>>,
    host: PeerId,
    mirror: ClientMirror<GameState>,
    /// A full state request is outstanding.
    awaiting_snapshot: bool,
    terminal: Terminal,
    name: String,
    avatar_url: Option<String>,
}

impl ClientSession {
    /// Open a local mesh and dial the host behind `ticket`.
    pub async fn join(config: &Config, ticket: &PeerTicket) -> Result<Self, AppError> {
        let (mesh, events) = PeerMesh::open(mesh_config(&config.network)?).await?;
        mesh.connect(ticket).await?;
        tracing::info!(host = %ticket.peer_id, addr = %ticket.addr, "Joined");

        let me = player_id_of(mesh.local_id());
        Ok(Self {
            mesh,
            events,
            host: ticket.peer_id.clone(),
            mirror: ClientMirror::new(config.network.dedup_capacity),
            awaiting_snapshot: false,
            terminal: Terminal::new(me),
            name: config.player.name.clone(),
            avatar_url: Some(config.player.avatar_url.clone()).filter(|url| !url.is_empty()),
        })
    }

    /// Follow the game until `quit` arrives on `lines` or the host goes
    /// away. Returns the last mirrored state, if any arrived.
    pub async fn run(
        mut self,
        mut lines: mpsc::UnboundedReceiver<String>,
    ) -> Result<Option<GameState>, AppError> {
        self.request_snapshot().await?;
        self.to_host(AppMessage::Game(GameMessage::SetPlayerInfo {
            player_id: self.terminal.me().clone(),
            name: self.name.clone(),
            avatar_url: self.avatar_url.clone(),
        }))
        .await?;

        loop {
            tokio::select! {
                event = self.events.recv() => match event {
                    Some(MeshEvent::Message { from, envelope }) if from == self.host => {
                        self.handle_envelope(envelope).await?;
                    }
                    Some(MeshEvent::Message { from, .. }) => {
                        tracing::debug!(%from, "Ignoring message from a non-host peer");
                    }
                    Some(MeshEvent::PeerDisconnected(peer)) if peer == self.host => {
                        self.terminal.say("the host left the game");
                        break;
                    }
                    Some(_) => {}
                    None => break,
                },
                Some(line) = lines.recv() => {
                    if !self.handle_line(&line).await? {
                        break;
                    }
                }
            }
        }

        self.mesh.shutdown();
        Ok(self.mirror.state().cloned())
    }

    async fn handle_envelope(&mut self, envelope: Envelope<AppMessage>) -> Result<(), AppError> {
        match envelope.body {
            AppMessage::Sync(message) => {
                match self.mirror.apply(&envelope.message_id, &message) {
                    Ok(ApplyOutcome::Applied) => {
                        if matches!(message, SyncMessage::FullState { .. }) {
                            self.awaiting_snapshot = false;
                        }
                        if let Some(state) = self.mirror.state() {
                            self.terminal.observe(state);
                        }
                    }
                    Ok(ApplyOutcome::NeedsFullState) => {
                        if !self.awaiting_snapshot {
                            self.request_snapshot().await?;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(error = %e, "Mirror update failed, resyncing");
                        self.request_snapshot().await?;
                    }
                }
            }
            AppMessage::Notice { player_id, text } => {
                if &player_id == self.terminal.me() {
                    self.terminal.say(&text);
                }
            }
            AppMessage::Game(message) => {
                tracing::debug!(kind = message.kind(), "Ignoring game message from the host");
            }
        }
        Ok(())
    }

    async fn request_snapshot(&mut self) -> Result<(), AppError> {
        self.awaiting_snapshot = true;
        let request = self.mirror.request_full_state();
        self.to_host(AppMessage::Sync(request)).await
    }

    async fn to_host(&self, message: AppMessage) -> Result<(), AppError> {
        self.mesh
            .send(message, std::slice::from_ref(&self.host))
            .await?;
        Ok(())
    }

    /// Returns `false` once the player asked to quit.
    async fn handle_line(&self, line: &str) -> Result<bool, AppError> {
        let state = self.mirror.state();
        match interpret(line, self.terminal.me(), state, self.terminal.ballot()) {
            LineAction::Nothing => {}
            LineAction::Quit => return Ok(false),
            LineAction::Show => match state {
                Some(state) => self.terminal.show(state),
                None => self.terminal.say("still waiting for the game state"),
            },
            LineAction::Say(text) => self.terminal.say(&text),
            LineAction::Send(message) => self.to_host(AppMessage::Game(message)).await?,
        }
        Ok(true)
    }
}
