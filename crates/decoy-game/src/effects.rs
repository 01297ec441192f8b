//! Side effects the orchestrator requests but never performs itself.

use std::time::Duration;

use crate::messages::GameMessage;
use crate::state::PlayerId;

/// Capabilities handed to the orchestrator for one transition.
pub trait Effects {
    /// Deliver `message` back to the orchestrator after `delay`.
    fn schedule(&mut self, message: GameMessage, delay: Duration);

    /// Start generating content for `artifact_id`. The result must come back
    /// as a [`GameMessage::PromptResult`].
    fn generate(&mut self, artifact_id: &str, prompt: &str);

    /// Tell one player something (a rejected intent, a failed generation).
    fn notify(&mut self, player_id: &PlayerId, text: &str);
}

/// One requested side effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Schedule {
        message: GameMessage,
        delay: Duration,
    },
    Generate {
        artifact_id: String,
        prompt: String,
    },
    Notify {
        player_id: PlayerId,
        text: String,
    },
}

/// [`Effects`] that records requests so the caller can carry them out after
/// the transition returns.
#[derive(Debug, Default)]
pub struct EffectLog {
    effects: Vec<Effect>,
}

impl EffectLog {
    /// An empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every recorded effect, oldest first.
    pub fn drain(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    /// Recorded effects.
    pub fn effects(&self) -> &[Effect] {
        &self.effects
    }

    /// The most recently scheduled timer expiry, if any.
    pub fn last_timer(&self) -> Option<u64> {
        self.effects.iter().rev().find_map(|e| match e {
            Effect::Schedule {
                message: GameMessage::TimerExpired { timer_id },
                ..
            } => Some(*timer_id),
            _ => None,
        })
    }
}

impl Effects for EffectLog {
    fn schedule(&mut self, message: GameMessage, delay: Duration) {
        self.effects.push(Effect::Schedule { message, delay });
    }

    fn generate(&mut self, artifact_id: &str, prompt: &str) {
        self.effects.push(Effect::Generate {
            artifact_id: artifact_id.to_string(),
            prompt: prompt.to_string(),
        });
    }

    fn notify(&mut self, player_id: &PlayerId, text: &str) {
        self.effects.push(Effect::Notify {
            player_id: player_id.clone(),
            text: text.to_string(),
        });
    }
}
