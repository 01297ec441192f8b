//! Game rules for a prompt-guessing party game.
//!
//! Everything here is host-side and pure apart from [`generation`] and
//! [`history`]: the [`Orchestrator`] folds [`GameMessage`]s into a
//! [`GameState`] and asks for timers, generation and notices through
//! [`Effects`].

pub mod achievements;
pub mod effects;
pub mod generation;
pub mod history;
pub mod messages;
pub mod orchestrator;
pub mod scoring;
pub mod state;

pub use achievements::{Achievement, AchievementKind};
pub use effects::{Effect, EffectLog, Effects};
pub use generation::{ContentGenerator, GenerationError, PlaceholderGenerator, run_generation};
pub use history::{HistoryError, HistoryStore, HistorySummary, JsonlHistory};
pub use messages::{GameMessage, PromptOutcome};
pub use orchestrator::{Orchestrator, Rejection};
pub use state::{
    ActiveRound, Artifact, ArtifactContent, ArtifactStatus, FakePrompt, GameState, Guess, Player,
    PlayerId, REAL_PROMPT_ID, Stage, Timer,
};
