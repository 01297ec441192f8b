//! Messages the orchestrator folds into the game state.

use serde::{Deserialize, Serialize};

use crate::state::{ArtifactContent, PlayerId};

/// How a generation request ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum PromptOutcome {
    Success { content: ArtifactContent },
    Failure { error: String },
}

/// Player intents, generation results and timer expiries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE", rename_all_fields = "camelCase")]
pub enum GameMessage {
    /// Join, rejoin, or update a profile.
    SetPlayerInfo {
        player_id: PlayerId,
        name: String,
        avatar_url: Option<String>,
    },
    /// A peer went away.
    PlayerLeft { player_id: PlayerId },
    /// Leave the lobby.
    RequestStartGame { player_id: PlayerId },
    /// A prompt for this round's artifact.
    SubmitPrompt { player_id: PlayerId, prompt: String },
    /// Generation finished for an artifact.
    PromptResult {
        artifact_id: String,
        outcome: PromptOutcome,
    },
    /// A decoy prompt for the active artifact.
    SubmitFakePrompt {
        player_id: PlayerId,
        artifact_id: String,
        fake_prompt: String,
    },
    /// A pick among the active artifact's prompts.
    SubmitGuess {
        player_id: PlayerId,
        artifact_id: String,
        prompt_id: String,
    },
    /// A stage timer fired.
    TimerExpired { timer_id: u64 },
}

impl GameMessage {
    /// The player an intent is from, if it is a player intent.
    pub fn player_id(&self) -> Option<&PlayerId> {
        match self {
            Self::SetPlayerInfo { player_id, .. }
            | Self::PlayerLeft { player_id }
            | Self::RequestStartGame { player_id }
            | Self::SubmitPrompt { player_id, .. }
            | Self::SubmitFakePrompt { player_id, .. }
            | Self::SubmitGuess { player_id, .. } => Some(player_id),
            Self::PromptResult { .. } | Self::TimerExpired { .. } => None,
        }
    }

    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SetPlayerInfo { .. } => "SET_PLAYER_INFO",
            Self::PlayerLeft { .. } => "PLAYER_LEFT",
            Self::RequestStartGame { .. } => "REQUEST_START_GAME",
            Self::SubmitPrompt { .. } => "SUBMIT_PROMPT",
            Self::PromptResult { .. } => "PROMPT_RESULT",
            Self::SubmitFakePrompt { .. } => "SUBMIT_FAKE_PROMPT",
            Self::SubmitGuess { .. } => "SUBMIT_GUESS",
            Self::TimerExpired { .. } => "TIMER_EXPIRED",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_guess_wire_shape() {
        let message = GameMessage::SubmitGuess {
            player_id: PlayerId::from("p3"),
            artifact_id: "artifact-0-0".to_string(),
            prompt_id: "real".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            json!({
                "type": "SUBMIT_GUESS",
                "playerId": "p3",
                "artifactId": "artifact-0-0",
                "promptId": "real"
            })
        );
    }

    #[test]
    fn test_prompt_result_parses() {
        let parsed: GameMessage = serde_json::from_value(json!({
            "type": "PROMPT_RESULT",
            "artifactId": "artifact-1-4",
            "outcome": {"status": "failure", "error": "backend down"}
        }))
        .unwrap();
        assert_eq!(
            parsed,
            GameMessage::PromptResult {
                artifact_id: "artifact-1-4".to_string(),
                outcome: PromptOutcome::Failure {
                    error: "backend down".to_string()
                },
            }
        );
    }

    #[test]
    fn test_unknown_type_rejected() {
        let parsed: Result<GameMessage, _> =
            serde_json::from_value(json!({"type": "DANCE", "playerId": "p1"}));
        assert!(parsed.is_err());
    }

    #[test]
    fn test_player_id_accessor() {
        assert_eq!(
            GameMessage::PlayerLeft {
                player_id: PlayerId::from("p2")
            }
            .player_id(),
            Some(&PlayerId::from("p2"))
        );
        assert_eq!(GameMessage::TimerExpired { timer_id: 1 }.player_id(), None);
    }
}
