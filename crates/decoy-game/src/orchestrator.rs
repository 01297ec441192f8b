//! The host's transition function.
//!
//! [`Orchestrator::reduce`] folds one message into a [`GameState`] and
//! returns the next state. Invalid, duplicate and stale messages are identity
//! transitions. Timers and generation are requested through [`Effects`] and
//! come back later as ordinary messages.
//!
//! ```text
//! LOBBY → PROMPTING → FOOLING → GUESSING → SCORING ─┬→ FOOLING    (next artifact)
//!                                                  ├→ PROMPTING  (next round)
//!                                                  └→ GAME_OVER
//! ```

use std::time::Duration;

use decoy_config::GameConfig;

use crate::achievements;
use crate::effects::Effects;
use crate::messages::{GameMessage, PromptOutcome};
use crate::scoring::score_round;
use crate::state::{
    ActiveRound, Artifact, ArtifactStatus, FakePrompt, GameState, Guess, Player, PlayerId,
    REAL_PROMPT_ID, Stage, Timer,
};

// ---------------------------------------------------------------------------
// Rejection
// ---------------------------------------------------------------------------

/// Why a message left the state unchanged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("not allowed during {0}")]
    WrongStage(Stage),

    #[error("unknown player {0}")]
    UnknownPlayer(PlayerId),

    #[error("the room is full")]
    RoomFull,

    #[error("need {needed} connected players to start, have {have}")]
    NotEnoughPlayers { needed: usize, have: usize },

    #[error("text must not be empty")]
    EmptyText,

    #[error("you already submitted a prompt this round")]
    AlreadyPrompted,

    #[error("unknown artifact {0}")]
    UnknownArtifact(String),

    #[error("artifact {0} is not the one being played")]
    NotActiveArtifact(String),

    #[error("generation result for {0} already recorded")]
    AlreadyResolved(String),

    #[error("you cannot play on your own artifact")]
    OwnArtifact,

    #[error("fake prompt already submitted")]
    AlreadySubmitted,

    #[error("guess already submitted")]
    AlreadyGuessed,

    #[error("you cannot pick your own fake prompt")]
    OwnFake,

    #[error("unknown prompt {0}")]
    UnknownPrompt(String),

    #[error("stale timer {0}")]
    StaleTimer(u64),
}

impl Rejection {
    /// Whether the player behind the intent should hear about it.
    /// Repeats and stale timers are dropped silently.
    pub fn notifies(&self) -> bool {
        !matches!(
            self,
            Self::WrongStage(_)
                | Self::AlreadySubmitted
                | Self::AlreadyGuessed
                | Self::AlreadyResolved(_)
                | Self::StaleTimer(_)
                | Self::NotActiveArtifact(_)
        )
    }

    fn is_repeat(&self) -> bool {
        matches!(
            self,
            Self::AlreadySubmitted
                | Self::AlreadyGuessed
                | Self::AlreadyResolved(_)
                | Self::StaleTimer(_)
        )
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Runs the game rules with a fixed configuration.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    config: GameConfig,
}

impl Orchestrator {
    pub fn new(config: GameConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    /// A lobby carrying this orchestrator's configuration.
    pub fn initial_state(&self) -> GameState {
        GameState::new(self.config.clone())
    }

    /// Fold `message`, received at `now` (Unix ms), into `state`.
    pub fn reduce(
        &self,
        state: &GameState,
        message: &GameMessage,
        now: u64,
        effects: &mut dyn Effects,
    ) -> GameState {
        let mut next = state.clone();
        match self.apply(&mut next, message, now, effects) {
            Ok(()) => {
                if next.stage != state.stage {
                    tracing::info!(
                        from = %state.stage,
                        to = %next.stage,
                        round = next.current_round,
                        "Stage changed"
                    );
                }
                next
            }
            Err(rejection) => {
                if rejection.is_repeat() {
                    tracing::trace!(kind = message.kind(), %rejection, "Ignored");
                } else {
                    tracing::debug!(kind = message.kind(), %rejection, "Rejected");
                }
                if rejection.notifies()
                    && let Some(player) = message.player_id()
                {
                    effects.notify(player, &rejection.to_string());
                }
                state.clone()
            }
        }
    }

    /// Validate and apply. Every check runs before the first mutation or
    /// effect, so an `Err` leaves no trace.
    fn apply(
        &self,
        s: &mut GameState,
        message: &GameMessage,
        now: u64,
        fx: &mut dyn Effects,
    ) -> Result<(), Rejection> {
        match message {
            GameMessage::SetPlayerInfo {
                player_id,
                name,
                avatar_url,
            } => self.set_player_info(s, player_id, name, avatar_url.as_deref(), now),
            GameMessage::PlayerLeft { player_id } => self.player_left(s, player_id, now, fx),
            GameMessage::RequestStartGame { player_id } => {
                self.request_start(s, player_id, now, fx)
            }
            GameMessage::SubmitPrompt { player_id, prompt } => {
                self.submit_prompt(s, player_id, prompt, now, fx)
            }
            GameMessage::PromptResult {
                artifact_id,
                outcome,
            } => self.prompt_result(s, artifact_id, outcome, now, fx),
            GameMessage::SubmitFakePrompt {
                player_id,
                artifact_id,
                fake_prompt,
            } => self.submit_fake_prompt(s, player_id, artifact_id, fake_prompt, now, fx),
            GameMessage::SubmitGuess {
                player_id,
                artifact_id,
                prompt_id,
            } => self.submit_guess(s, player_id, artifact_id, prompt_id, now, fx),
            GameMessage::TimerExpired { timer_id } => self.timer_expired(s, *timer_id, now, fx),
        }
    }

    // -- players ------------------------------------------------------------

    fn set_player_info(
        &self,
        s: &mut GameState,
        id: &PlayerId,
        name: &str,
        avatar_url: Option<&str>,
        now: u64,
    ) -> Result<(), Rejection> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Rejection::EmptyText);
        }
        if let Some(player) = s.players.get_mut(id) {
            player.name = name.to_string();
            player.avatar_url = avatar_url.map(str::to_string);
            player.connected = true;
            player.last_seen = now;
            return Ok(());
        }
        if s.connected_players().count() >= self.config.max_players as usize {
            return Err(Rejection::RoomFull);
        }
        s.players.insert(
            id.clone(),
            Player {
                id: id.clone(),
                name: name.to_string(),
                avatar_url: avatar_url.map(str::to_string),
                connected: true,
                points: 0,
                last_seen: now,
            },
        );
        tracing::info!(player = %id, name, "Player joined");
        Ok(())
    }

    fn player_left(
        &self,
        s: &mut GameState,
        id: &PlayerId,
        now: u64,
        fx: &mut dyn Effects,
    ) -> Result<(), Rejection> {
        let player = s
            .players
            .get_mut(id)
            .ok_or_else(|| Rejection::UnknownPlayer(id.clone()))?;
        if !player.connected {
            return Ok(());
        }
        player.connected = false;
        player.last_seen = now;
        tracing::info!(player = %id, "Player left");

        // Whoever is left may already have finished the current stage.
        let stage = s.stage;
        match stage {
            Stage::Prompting => self.check_prompting_done(s, now, fx),
            Stage::Fooling if self.fakes_done(s) => self.begin_guessing(s, now, fx),
            Stage::Guessing if self.guesses_done(s) => self.finish_guessing(s, now, fx),
            _ => {}
        }
        Ok(())
    }

    fn request_start(
        &self,
        s: &mut GameState,
        id: &PlayerId,
        now: u64,
        fx: &mut dyn Effects,
    ) -> Result<(), Rejection> {
        if s.stage != Stage::Lobby {
            return Err(Rejection::WrongStage(s.stage));
        }
        if !s.is_connected(id) {
            return Err(Rejection::UnknownPlayer(id.clone()));
        }
        let have = s.connected_players().count();
        let needed = self.config.min_players as usize;
        if have < needed {
            return Err(Rejection::NotEnoughPlayers { needed, have });
        }
        s.started_at = Some(now);
        self.start_round(s, 0, now, fx);
        Ok(())
    }

    // -- prompting ----------------------------------------------------------

    fn submit_prompt(
        &self,
        s: &mut GameState,
        id: &PlayerId,
        prompt: &str,
        now: u64,
        fx: &mut dyn Effects,
    ) -> Result<(), Rejection> {
        if s.stage != Stage::Prompting {
            return Err(Rejection::WrongStage(s.stage));
        }
        if !s.is_connected(id) {
            return Err(Rejection::UnknownPlayer(id.clone()));
        }
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(Rejection::EmptyText);
        }
        if self.has_prompted(s, id) {
            return Err(Rejection::AlreadyPrompted);
        }

        let round = s.current_round;
        let artifact_id = format!("artifact-{round}-{}", s.artifacts.len());
        s.artifacts.insert(
            artifact_id.clone(),
            Artifact {
                id: artifact_id.clone(),
                creator_id: id.clone(),
                prompt: prompt.to_string(),
                content: None,
                status: ArtifactStatus::Pending,
                round_index: round,
                timestamp: now,
            },
        );
        if let Some(ids) = s.round_artifacts.get_mut(round as usize) {
            ids.push(artifact_id.clone());
        }
        fx.generate(&artifact_id, prompt);

        self.check_prompting_done(s, now, fx);
        Ok(())
    }

    fn prompt_result(
        &self,
        s: &mut GameState,
        artifact_id: &str,
        outcome: &PromptOutcome,
        now: u64,
        fx: &mut dyn Effects,
    ) -> Result<(), Rejection> {
        let artifact = s
            .artifacts
            .get_mut(artifact_id)
            .ok_or_else(|| Rejection::UnknownArtifact(artifact_id.to_string()))?;
        if artifact.status != ArtifactStatus::Pending {
            return Err(Rejection::AlreadyResolved(artifact_id.to_string()));
        }

        match outcome {
            PromptOutcome::Success { content } => {
                artifact.status = ArtifactStatus::Complete;
                artifact.content = Some(content.clone());
            }
            PromptOutcome::Failure { error } => {
                artifact.status = ArtifactStatus::Error;
                let text = format!("Could not generate \"{}\": {error}", artifact.prompt);
                fx.notify(&artifact.creator_id, &text);
            }
        }

        if s.stage == Stage::Prompting {
            self.check_prompting_done(s, now, fx);
        }
        Ok(())
    }

    /// Leave PROMPTING early once every connected player has a prompt in
    /// and at least one artifact is ready.
    fn check_prompting_done(&self, s: &mut GameState, now: u64, fx: &mut dyn Effects) {
        if s.stage != Stage::Prompting {
            return;
        }
        let everyone_in = {
            let mut connected = s.connected_players().map(|p| &p.id).peekable();
            connected.peek().is_some() && connected.all(|id| self.has_prompted(s, id))
        };
        if !everyone_in {
            return;
        }
        if let Some(index) = next_complete(s, 0) {
            self.begin_fooling(s, index, now, fx);
        }
    }

    fn prompting_expired(&self, s: &mut GameState, now: u64, fx: &mut dyn Effects) {
        if let Some(index) = next_complete(s, 0) {
            self.begin_fooling(s, index, now, fx);
            return;
        }
        let pending = s
            .current_round_artifacts()
            .iter()
            .filter_map(|id| s.artifacts.get(id))
            .any(|a| a.status == ArtifactStatus::Pending);
        if pending {
            tracing::debug!(round = s.current_round, "Waiting on generation, extending");
            self.start_timer(s, self.config.generation_grace_ms(), now, fx);
        } else {
            tracing::info!(round = s.current_round, "No artifacts, skipping round");
            self.next_round_or_end(s, now, fx);
        }
    }

    // -- fooling and guessing -----------------------------------------------

    fn submit_fake_prompt(
        &self,
        s: &mut GameState,
        id: &PlayerId,
        artifact_id: &str,
        text: &str,
        now: u64,
        fx: &mut dyn Effects,
    ) -> Result<(), Rejection> {
        if s.stage != Stage::Fooling {
            return Err(Rejection::WrongStage(s.stage));
        }
        let creator = self.check_active_play(s, id, artifact_id)?;
        if &creator == id {
            return Err(Rejection::OwnArtifact);
        }
        let text = text.trim();
        if text.is_empty() {
            return Err(Rejection::EmptyText);
        }
        let Some(round) = s.active_round.as_mut() else {
            return Err(Rejection::WrongStage(s.stage));
        };
        if round.fake_by(id).is_some() {
            return Err(Rejection::AlreadySubmitted);
        }

        round.fake_prompts.push(FakePrompt {
            id: format!("fake-{artifact_id}-{id}"),
            artifact_id: artifact_id.to_string(),
            author_id: id.clone(),
            text: text.to_string(),
        });

        if self.fakes_done(s) {
            self.begin_guessing(s, now, fx);
        }
        Ok(())
    }

    fn submit_guess(
        &self,
        s: &mut GameState,
        id: &PlayerId,
        artifact_id: &str,
        prompt_id: &str,
        now: u64,
        fx: &mut dyn Effects,
    ) -> Result<(), Rejection> {
        if s.stage != Stage::Guessing {
            return Err(Rejection::WrongStage(s.stage));
        }
        let creator = self.check_active_play(s, id, artifact_id)?;
        if &creator == id {
            return Err(Rejection::OwnArtifact);
        }
        let Some(round) = s.active_round.as_mut() else {
            return Err(Rejection::WrongStage(s.stage));
        };
        if round.guess_by(id).is_some() {
            return Err(Rejection::AlreadyGuessed);
        }
        let is_correct = prompt_id == REAL_PROMPT_ID;
        if !is_correct {
            let fake = round
                .fake_prompts
                .iter()
                .find(|f| f.id == prompt_id)
                .ok_or_else(|| Rejection::UnknownPrompt(prompt_id.to_string()))?;
            if &fake.author_id == id {
                return Err(Rejection::OwnFake);
            }
        }

        round.guesses.push(Guess {
            player_id: id.clone(),
            artifact_id: artifact_id.to_string(),
            prompt_id: prompt_id.to_string(),
            is_correct,
        });

        if self.guesses_done(s) {
            self.finish_guessing(s, now, fx);
        }
        Ok(())
    }

    /// Shared checks for intents on the active artifact. Returns its creator.
    fn check_active_play(
        &self,
        s: &GameState,
        id: &PlayerId,
        artifact_id: &str,
    ) -> Result<PlayerId, Rejection> {
        if !s.is_connected(id) {
            return Err(Rejection::UnknownPlayer(id.clone()));
        }
        match s.active_artifact() {
            Some(artifact) if artifact.id == artifact_id => Ok(artifact.creator_id.clone()),
            _ => Err(Rejection::NotActiveArtifact(artifact_id.to_string())),
        }
    }

    fn fakes_done(&self, s: &GameState) -> bool {
        self.all_others_have(s, |round, id| round.fake_by(id).is_some())
    }

    fn guesses_done(&self, s: &GameState) -> bool {
        self.all_others_have(s, |round, id| round.guess_by(id).is_some())
    }

    /// Whether every connected player other than the active artifact's
    /// creator satisfies `done`. With nobody else connected the timer decides.
    fn all_others_have(
        &self,
        s: &GameState,
        done: impl Fn(&ActiveRound, &PlayerId) -> bool,
    ) -> bool {
        let (Some(round), Some(artifact)) = (s.active_round.as_ref(), s.active_artifact()) else {
            return false;
        };
        let mut others = s
            .connected_players()
            .map(|p| &p.id)
            .filter(|id| **id != artifact.creator_id)
            .peekable();
        others.peek().is_some() && others.all(|id| done(round, id))
    }

    fn begin_fooling(&self, s: &mut GameState, index: usize, now: u64, fx: &mut dyn Effects) {
        let Some(artifact_id) = s.current_round_artifacts().get(index).cloned() else {
            return;
        };
        s.active_artifact_index = index;
        s.active_round = Some(ActiveRound::new(artifact_id));
        s.stage = Stage::Fooling;
        self.start_timer(s, self.config.fooling_ms(), now, fx);
    }

    fn begin_guessing(&self, s: &mut GameState, now: u64, fx: &mut dyn Effects) {
        s.stage = Stage::Guessing;
        self.start_timer(s, self.config.guessing_ms(), now, fx);
    }

    fn finish_guessing(&self, s: &mut GameState, now: u64, fx: &mut dyn Effects) {
        let Some(round) = s.active_round.clone() else {
            return;
        };
        if let Some(creator) = s.artifacts.get(&round.artifact_id).map(|a| a.creator_id.clone()) {
            for (player, points) in score_round(&round, &creator) {
                if let Some(record) = s.players.get_mut(&player) {
                    record.points += points;
                }
            }
        }
        s.history.push(round);
        s.stage = Stage::Scoring;
        self.start_timer(s, self.config.scoring_ms(), now, fx);
    }

    // -- timers and progression ---------------------------------------------

    fn timer_expired(
        &self,
        s: &mut GameState,
        timer_id: u64,
        now: u64,
        fx: &mut dyn Effects,
    ) -> Result<(), Rejection> {
        if timer_id != s.timer.timer_id || !s.timer.is_running {
            return Err(Rejection::StaleTimer(timer_id));
        }
        s.timer.is_running = false;

        match s.stage {
            Stage::Prompting => self.prompting_expired(s, now, fx),
            Stage::Fooling => self.begin_guessing(s, now, fx),
            Stage::Guessing => self.finish_guessing(s, now, fx),
            Stage::Scoring => self.advance_after_scoring(s, now, fx),
            Stage::Lobby | Stage::GameOver => {}
        }
        Ok(())
    }

    fn advance_after_scoring(&self, s: &mut GameState, now: u64, fx: &mut dyn Effects) {
        match next_complete(s, s.active_artifact_index + 1) {
            Some(index) => self.begin_fooling(s, index, now, fx),
            None => self.next_round_or_end(s, now, fx),
        }
    }

    fn next_round_or_end(&self, s: &mut GameState, now: u64, fx: &mut dyn Effects) {
        if s.current_round + 1 < self.config.round_count {
            self.start_round(s, s.current_round + 1, now, fx);
        } else {
            self.end_game(s, now);
        }
    }

    fn start_round(&self, s: &mut GameState, round: u32, now: u64, fx: &mut dyn Effects) {
        s.stage = Stage::Prompting;
        s.current_round = round;
        while s.round_artifacts.len() <= round as usize {
            s.round_artifacts.push(Vec::new());
        }
        s.active_round = None;
        s.active_artifact_index = 0;
        self.start_timer(s, self.config.prompting_ms(), now, fx);
    }

    fn end_game(&self, s: &mut GameState, now: u64) {
        s.stage = Stage::GameOver;
        s.active_round = None;
        s.timer.is_running = false;
        s.ended_at = Some(now);
        s.achievements = achievements::compute(&s.history, &s.players, &s.artifacts);
    }

    /// Arm the stage timer under a fresh generation id.
    fn start_timer(&self, s: &mut GameState, duration_ms: u64, now: u64, fx: &mut dyn Effects) {
        let timer_id = s.timer.timer_id + 1;
        s.timer = Timer {
            start_time: now,
            duration: duration_ms,
            is_running: true,
            timer_id,
        };
        fx.schedule(
            GameMessage::TimerExpired { timer_id },
            Duration::from_millis(duration_ms),
        );
    }

    fn has_prompted(&self, s: &GameState, id: &PlayerId) -> bool {
        s.current_round_artifacts()
            .iter()
            .filter_map(|a| s.artifacts.get(a))
            .any(|a| &a.creator_id == id)
    }
}

/// Index of the first complete artifact of the current round at or after
/// `from`.
fn next_complete(s: &GameState, from: usize) -> Option<usize> {
    s.current_round_artifacts()
        .iter()
        .enumerate()
        .skip(from)
        .find(|(_, id)| {
            s.artifacts
                .get(*id)
                .is_some_and(|a| a.status == ArtifactStatus::Complete)
        })
        .map(|(index, _)| index)
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
