//! The host session.
//!
//! The host owns the authoritative [`GameState`]. Every game message, local
//! or remote, goes through the mesh's event queue and is folded in by the
//! orchestrator; the requested effects are carried out here, and a periodic
//! tick broadcasts the resulting patches.

use std::path::Path;
use std::time::Duration;

use decoy_config::Config;
use decoy_game::{
    Effect, EffectLog, GameMessage, GameState, HistoryStore, HistorySummary, JsonlHistory,
    Orchestrator, PlaceholderGenerator, Stage, run_generation,
};
use decoy_net::{MeshEvent, PeerId, PeerMesh, PeerTicket, now_millis};
use decoy_sync::{HostReplicator, SyncMessage};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::AppError;
use crate::input::{LineAction, interpret};
use crate::protocol::AppMessage;
use crate::view::Terminal;
use crate::{mesh_config, player_id_of};

/// A running host.
pub struct HostSession {
    mesh: PeerMesh<AppMessage>,
    events: mpsc::UnboundedReceiver<MeshEvent<AppMessage>>,
    orchestrator: Orchestrator,
    replicator: HostReplicator<GameState>,
    effects: EffectLog,
    generator: PlaceholderGenerator,
    generation_timeout: Duration,
    tick_interval: Duration,
    history: JsonlHistory,
    /// Set once the finished game has been handed to the history writer.
    history_task: Option<JoinHandle<()>>,
    terminal: Terminal,
    name: String,
    avatar_url: Option<String>,
}

impl HostSession {
    /// Open the mesh and set up an empty lobby. History goes to `data_dir`.
    pub async fn open(config: &Config, data_dir: &Path) -> Result<Self, AppError> {
        let (mesh, events) = PeerMesh::open(mesh_config(&config.network)?).await?;
        let orchestrator = Orchestrator::new(config.game.clone());
        let replicator = HostReplicator::new(orchestrator.initial_state())?;
        let me = player_id_of(mesh.local_id());
        let avatar_url = Some(config.player.avatar_url.clone()).filter(|url| !url.is_empty());

        Ok(Self {
            mesh,
            events,
            orchestrator,
            replicator,
            effects: EffectLog::new(),
            generator: PlaceholderGenerator::new(Duration::from_millis(
                config.generation.latency_ms,
            )),
            generation_timeout: Duration::from_secs(config.generation.timeout_seconds),
            tick_interval: Duration::from_millis(config.sync.tick_interval_ms.max(1)),
            history: JsonlHistory::in_dir(data_dir),
            history_task: None,
            terminal: Terminal::new(me),
            name: config.player.name.clone(),
            avatar_url,
        })
    }

    /// The ticket players join with.
    pub fn ticket(&self) -> &PeerTicket {
        self.mesh.ticket()
    }

    /// Serve until `quit` arrives on `lines` or the mesh goes away. Returns
    /// the final authoritative state.
    pub async fn run(
        mut self,
        mut lines: mpsc::UnboundedReceiver<String>,
    ) -> Result<GameState, AppError> {
        tracing::info!(ticket = %self.ticket(), "Hosting");
        self.mesh.send_to_self(
            AppMessage::Game(GameMessage::SetPlayerInfo {
                player_id: self.terminal.me().clone(),
                name: self.name.clone(),
                avatar_url: self.avatar_url.clone(),
            }),
            Duration::ZERO,
        );

        let mut tick = tokio::time::interval(self.tick_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                event = self.events.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => break,
                },
                _ = tick.tick() => self.broadcast_changes().await?,
                Some(line) = lines.recv() => {
                    if !self.handle_line(&line) {
                        break;
                    }
                }
            }
        }

        // Let clients see whatever happened last.
        self.broadcast_changes().await?;
        self.mesh.shutdown();
        if let Some(task) = self.history_task.take() {
            let _ = task.await;
        }
        tracing::info!("Host stopped");
        Ok(self.replicator.state().clone())
    }

    async fn handle_event(&mut self, event: MeshEvent<AppMessage>) {
        match event {
            MeshEvent::PeerConnected(peer) => {
                tracing::info!(%peer, "Peer connected");
            }
            MeshEvent::PeerDisconnected(peer) => {
                let player_id = player_id_of(&peer);
                if self.replicator.state().players.contains_key(&player_id) {
                    self.dispatch(&GameMessage::PlayerLeft { player_id }).await;
                }
            }
            MeshEvent::Message { from, envelope } => match envelope.body {
                AppMessage::Game(message) => {
                    if self.accepts(&from, &message) {
                        self.dispatch(&message).await;
                    } else {
                        tracing::warn!(
                            %from,
                            kind = message.kind(),
                            "Dropping message not owned by sender"
                        );
                    }
                }
                AppMessage::Sync(request) => self.answer_sync(&from, &request).await,
                AppMessage::Notice { .. } => {
                    tracing::debug!(%from, "Ignoring notice sent to the host");
                }
            },
        }
    }

    /// Remote peers may only speak for themselves. Generation results and
    /// timer expiries only come from this device.
    fn accepts(&self, from: &PeerId, message: &GameMessage) -> bool {
        if from == self.mesh.local_id() {
            return true;
        }
        message
            .player_id()
            .is_some_and(|player| player.as_str() == from.as_str())
    }

    async fn answer_sync(&self, from: &PeerId, request: &SyncMessage) {
        let Some(reply) = self.replicator.handle(request) else {
            tracing::debug!(%from, "Ignoring sync traffic sent to the host");
            return;
        };
        if let Err(e) = self
            .mesh
            .send(AppMessage::Sync(reply), std::slice::from_ref(from))
            .await
        {
            tracing::warn!(%from, error = %e, "Full state reply failed");
        }
    }

    /// Fold one message into the state and carry out what it asked for.
    async fn dispatch(&mut self, message: &GameMessage) {
        let now = now_millis();
        let orchestrator = &self.orchestrator;
        let effects = &mut self.effects;
        self.replicator
            .update_state(|state| orchestrator.reduce(state, message, now, effects));

        for effect in self.effects.drain() {
            self.perform(effect).await;
        }

        let state = self.replicator.state();
        self.terminal.observe(state);
        if state.stage == Stage::GameOver && self.history_task.is_none() {
            self.record_history();
        }
    }

    async fn perform(&self, effect: Effect) {
        match effect {
            Effect::Schedule { message, delay } => {
                self.mesh.send_to_self(AppMessage::Game(message), delay);
            }
            Effect::Generate {
                artifact_id,
                prompt,
            } => {
                let mesh = self.mesh.clone();
                let generator = self.generator.clone();
                let timeout = self.generation_timeout;
                tokio::spawn(async move {
                    let result = run_generation(&generator, artifact_id, &prompt, timeout).await;
                    mesh.send_to_self(AppMessage::Game(result), Duration::ZERO);
                });
            }
            Effect::Notify { player_id, text } => {
                if &player_id == self.terminal.me() {
                    self.terminal.say(&text);
                    return;
                }
                let peer = PeerId::from(player_id.as_str());
                let notice = AppMessage::Notice { player_id, text };
                if let Err(e) = self.mesh.send(notice, &[peer]).await {
                    tracing::warn!(error = %e, "Notice not sent");
                }
            }
        }
    }

    fn record_history(&mut self) {
        let Some(summary) = HistorySummary::from_state(self.replicator.state()) else {
            return;
        };
        self.history_task = Some(append_history(self.history.clone(), summary));
    }

    async fn broadcast_changes(&mut self) -> Result<(), AppError> {
        if let Some(patch) = self.replicator.tick()? {
            if let Err(e) = self.mesh.broadcast(AppMessage::Sync(patch)).await {
                tracing::warn!(error = %e, "Patch broadcast failed");
            }
        }
        Ok(())
    }

    /// Returns `false` once the player asked to quit.
    fn handle_line(&self, line: &str) -> bool {
        let state = self.replicator.state();
        match interpret(line, self.terminal.me(), Some(state), self.terminal.ballot()) {
            LineAction::Nothing => {}
            LineAction::Quit => return false,
            LineAction::Show => self.terminal.show(state),
            LineAction::Say(text) => self.terminal.say(&text),
            LineAction::Send(message) => {
                self.mesh.send_to_self(AppMessage::Game(message), Duration::ZERO);
            }
        }
        true
    }
}

/// Append `summary` on the blocking pool. Failures are logged, never fatal.
fn append_history(history: JsonlHistory, summary: HistorySummary) -> JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        if let Err(e) = history.append(&summary) {
            tracing::warn!(
                path = %history.path().display(),
                error = %e,
                "History not written"
            );
        }
    })
}
