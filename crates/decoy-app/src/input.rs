//! Player intents typed on stdin.

use decoy_game::{GameMessage, GameState, PlayerId};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::view::Ballot;

/// One parsed command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Start,
    Prompt(String),
    Fake(String),
    /// A ballot number or a raw prompt id.
    Guess(String),
    /// Reprint the current view.
    Show,
    Help,
    Quit,
}

/// A command line that could not be understood.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InputError {
    #[error("unknown command {0:?}, try `help`")]
    UnknownCommand(String),

    #[error("`{0}` needs an argument")]
    MissingArgument(&'static str),

    #[error("nothing is being played right now")]
    NoActiveArtifact,

    #[error("no option {0} on the ballot")]
    NoSuchOption(String),
}

pub const HELP: &str = "commands: start | prompt <text> | fake <text> | guess <n> | show | quit";

impl Intent {
    /// Parse one line. Blank lines yield `Ok(None)`.
    pub fn parse(line: &str) -> Result<Option<Self>, InputError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let (command, rest) = match line.split_once(char::is_whitespace) {
            Some((command, rest)) => (command, rest.trim()),
            None => (line, ""),
        };
        let needs = |name: &'static str| {
            if rest.is_empty() {
                Err(InputError::MissingArgument(name))
            } else {
                Ok(rest.to_string())
            }
        };
        let intent = match command.to_ascii_lowercase().as_str() {
            "start" => Self::Start,
            "prompt" => Self::Prompt(needs("prompt")?),
            "fake" => Self::Fake(needs("fake")?),
            "guess" => Self::Guess(needs("guess")?),
            "show" => Self::Show,
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => return Err(InputError::UnknownCommand(other.to_string())),
        };
        Ok(Some(intent))
    }

    /// The game message this intent stands for, if it is one.
    ///
    /// `state` is the latest known game state and `ballot` the options last
    /// shown for guessing. Stage rules are left to the host.
    pub fn to_message(
        &self,
        player_id: &PlayerId,
        state: Option<&GameState>,
        ballot: Option<&Ballot>,
    ) -> Result<Option<GameMessage>, InputError> {
        let active = || {
            state
                .and_then(|s| s.active_round.as_ref())
                .map(|r| r.artifact_id.clone())
                .ok_or(InputError::NoActiveArtifact)
        };
        let message = match self {
            Self::Start => GameMessage::RequestStartGame {
                player_id: player_id.clone(),
            },
            Self::Prompt(prompt) => GameMessage::SubmitPrompt {
                player_id: player_id.clone(),
                prompt: prompt.clone(),
            },
            Self::Fake(text) => GameMessage::SubmitFakePrompt {
                player_id: player_id.clone(),
                artifact_id: active()?,
                fake_prompt: text.clone(),
            },
            Self::Guess(choice) => {
                let artifact_id = active()?;
                let prompt_id = match (choice.parse::<usize>(), ballot) {
                    (Ok(n), Some(ballot)) if ballot.artifact_id == artifact_id => ballot
                        .prompt_id(n)
                        .ok_or_else(|| InputError::NoSuchOption(choice.clone()))?
                        .to_string(),
                    (Ok(_), _) => return Err(InputError::NoSuchOption(choice.clone())),
                    (Err(_), _) => choice.clone(),
                };
                GameMessage::SubmitGuess {
                    player_id: player_id.clone(),
                    artifact_id,
                    prompt_id,
                }
            }
            Self::Show | Self::Help | Self::Quit => return Ok(None),
        };
        Ok(Some(message))
    }
}

/// What a session should do with one stdin line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineAction {
    Nothing,
    Quit,
    /// Reprint the current view.
    Show,
    /// Print a message for the local player.
    Say(String),
    /// Route a message to the orchestrator.
    Send(GameMessage),
}

/// Turn a stdin line into a [`LineAction`] for `me`.
pub fn interpret(
    line: &str,
    me: &PlayerId,
    state: Option<&GameState>,
    ballot: Option<&Ballot>,
) -> LineAction {
    let intent = match Intent::parse(line) {
        Ok(Some(intent)) => intent,
        Ok(None) => return LineAction::Nothing,
        Err(e) => return LineAction::Say(e.to_string()),
    };
    match intent {
        Intent::Quit => LineAction::Quit,
        Intent::Show => LineAction::Show,
        Intent::Help => LineAction::Say(HELP.to_string()),
        other => match other.to_message(me, state, ballot) {
            Ok(Some(message)) => LineAction::Send(message),
            Ok(None) => LineAction::Nothing,
            Err(e) => LineAction::Say(e.to_string()),
        },
    }
}

/// Forward stdin lines on a channel until EOF.
pub fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    tracing::debug!("Stdin closed");
                    break;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Stdin read failed");
                    break;
                }
            }
        }
    });
    rx
}
