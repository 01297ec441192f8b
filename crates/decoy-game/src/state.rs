//! The authoritative game state and the records it holds.
//!
//! [`GameState`] is a plain value. The orchestrator never edits one in
//! place; every transition clones the previous value and returns the next.

use std::collections::BTreeMap;
use std::fmt;

use decoy_config::GameConfig;
use serde::{Deserialize, Serialize};

use crate::achievements::Achievement;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Identifier of a player. Equal to the peer id of the device they play on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub String);

impl PlayerId {
    /// Borrow the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlayerId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Prompt id a guess uses to name an artifact's real prompt.
pub const REAL_PROMPT_ID: &str = "real";

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// Where the game is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    /// Waiting for players.
    Lobby,
    /// Everyone writes a prompt; artifacts are generated.
    Prompting,
    /// Players write fake prompts for the active artifact.
    Fooling,
    /// Players pick which prompt they think is real.
    Guessing,
    /// Results for the active artifact are shown.
    Scoring,
    /// Terminal.
    GameOver,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Lobby => "LOBBY",
            Self::Prompting => "PROMPTING",
            Self::Fooling => "FOOLING",
            Self::Guessing => "GUESSING",
            Self::Scoring => "SCORING",
            Self::GameOver => "GAME_OVER",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A player. Records are never removed; leaving only clears `connected`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub avatar_url: Option<String>,
    pub connected: bool,
    pub points: i64,
    /// Timestamp of the last message that touched this record.
    pub last_seen: u64,
}

/// Generation status of an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactStatus {
    Pending,
    Complete,
    Error,
}

/// Generated content. Images travel as opaque bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "lowercase")]
pub enum ArtifactContent {
    Text(String),
    Image(Vec<u8>),
}

/// Something generated from one player's prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub id: String,
    pub creator_id: PlayerId,
    /// The real prompt.
    pub prompt: String,
    pub content: Option<ArtifactContent>,
    pub status: ArtifactStatus,
    pub round_index: u32,
    pub timestamp: u64,
}

/// A decoy prompt written for someone else's artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FakePrompt {
    pub id: String,
    pub artifact_id: String,
    pub author_id: PlayerId,
    pub text: String,
}

/// One player's pick among an artifact's prompts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Guess {
    pub player_id: PlayerId,
    pub artifact_id: String,
    /// [`REAL_PROMPT_ID`] or a fake prompt id.
    pub prompt_id: String,
    pub is_correct: bool,
}

/// The artifact currently being fooled, guessed or scored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveRound {
    pub artifact_id: String,
    pub fake_prompts: Vec<FakePrompt>,
    pub guesses: Vec<Guess>,
}

impl ActiveRound {
    /// Start an empty round for `artifact_id`.
    pub fn new(artifact_id: impl Into<String>) -> Self {
        Self {
            artifact_id: artifact_id.into(),
            fake_prompts: Vec::new(),
            guesses: Vec::new(),
        }
    }

    /// The fake prompt written by `author`, if any.
    pub fn fake_by(&self, author: &PlayerId) -> Option<&FakePrompt> {
        self.fake_prompts.iter().find(|f| &f.author_id == author)
    }

    /// The guess made by `player`, if any.
    pub fn guess_by(&self, player: &PlayerId) -> Option<&Guess> {
        self.guesses.iter().find(|g| &g.player_id == player)
    }

    /// Number of guesses naming `prompt_id`.
    pub fn votes_for(&self, prompt_id: &str) -> usize {
        self.guesses
            .iter()
            .filter(|g| g.prompt_id == prompt_id)
            .count()
    }
}

/// The single in-flight stage timer.
///
/// `timer_id` is a generation counter: each scheduled expiry gets the next
/// value, and an expiry carrying any other value is stale.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timer {
    pub start_time: u64,
    /// Milliseconds.
    pub duration: u64,
    pub is_running: bool,
    pub timer_id: u64,
}

impl Timer {
    /// Milliseconds left at `now`, zero once elapsed or stopped.
    pub fn remaining_ms(&self, now: u64) -> u64 {
        if !self.is_running {
            return 0;
        }
        (self.start_time + self.duration).saturating_sub(now)
    }
}

// ---------------------------------------------------------------------------
// GameState
// ---------------------------------------------------------------------------

/// Everything the host replicates to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    pub stage: Stage,
    pub players: BTreeMap<PlayerId, Player>,
    pub artifacts: BTreeMap<String, Artifact>,
    pub current_round: u32,
    /// Artifact ids per round, in submission order.
    pub round_artifacts: Vec<Vec<String>>,
    pub active_artifact_index: usize,
    pub active_round: Option<ActiveRound>,
    /// Every scored round, oldest first.
    pub history: Vec<ActiveRound>,
    pub timer: Timer,
    pub achievements: Vec<Achievement>,
    pub config: GameConfig,
    /// When the first round started.
    pub started_at: Option<u64>,
    /// When the game reached [`Stage::GameOver`].
    pub ended_at: Option<u64>,
}

impl GameState {
    /// A fresh lobby.
    pub fn new(config: GameConfig) -> Self {
        Self {
            stage: Stage::Lobby,
            players: BTreeMap::new(),
            artifacts: BTreeMap::new(),
            current_round: 0,
            round_artifacts: Vec::new(),
            active_artifact_index: 0,
            active_round: None,
            history: Vec::new(),
            timer: Timer::default(),
            achievements: Vec::new(),
            config,
            started_at: None,
            ended_at: None,
        }
    }

    /// Players with `connected == true`.
    pub fn connected_players(&self) -> impl Iterator<Item = &Player> {
        self.players.values().filter(|p| p.connected)
    }

    /// Whether `id` names a connected player.
    pub fn is_connected(&self, id: &PlayerId) -> bool {
        self.players.get(id).is_some_and(|p| p.connected)
    }

    /// Artifact ids of the current round.
    pub fn current_round_artifacts(&self) -> &[String] {
        self.round_artifacts
            .get(self.current_round as usize)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// The artifact under the active round.
    pub fn active_artifact(&self) -> Option<&Artifact> {
        let round = self.active_round.as_ref()?;
        self.artifacts.get(&round.artifact_id)
    }

    /// Players holding the most points. Empty when nobody has joined.
    pub fn leaders(&self) -> Vec<&Player> {
        let Some(best) = self.players.values().map(|p| p.points).max() else {
            return Vec::new();
        };
        self.players.values().filter(|p| p.points == best).collect()
    }
}
