//! Content generation collaborator.
//!
//! The orchestrator only asks for generation through
//! [`Effects::generate`](crate::effects::Effects::generate); whoever carries
//! the effect out drives a [`ContentGenerator`] and feeds the result back as
//! a [`GameMessage::PromptResult`].

use std::future::Future;
use std::time::Duration;

use crate::messages::{GameMessage, PromptOutcome};
use crate::state::ArtifactContent;

/// Errors a generation backend can report.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    /// The backend refused or failed.
    #[error("generation failed: {0}")]
    Failed(String),

    /// No result within the allotted time.
    #[error("generation timed out after {0:?}")]
    Timeout(Duration),

    /// Nothing to generate from.
    #[error("prompt is empty")]
    EmptyPrompt,
}

/// Turns a prompt into an artifact's content.
pub trait ContentGenerator: Send + Sync {
    fn generate(
        &self,
        prompt: &str,
    ) -> impl Future<Output = Result<ArtifactContent, GenerationError>> + Send;
}

/// Offline stand-in backend: waits, then describes the prompt in text.
#[derive(Debug, Clone)]
pub struct PlaceholderGenerator {
    latency: Duration,
}

impl PlaceholderGenerator {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

impl ContentGenerator for PlaceholderGenerator {
    fn generate(
        &self,
        prompt: &str,
    ) -> impl Future<Output = Result<ArtifactContent, GenerationError>> + Send {
        let prompt = prompt.trim().to_string();
        let latency = self.latency;
        async move {
            if prompt.is_empty() {
                return Err(GenerationError::EmptyPrompt);
            }
            tokio::time::sleep(latency).await;
            let words = prompt.split_whitespace().count();
            Ok(ArtifactContent::Text(format!(
                "An untitled piece in {words} strokes, inspired by \"{prompt}\"."
            )))
        }
    }
}

/// Run `generator` for one artifact and package the outcome as the message
/// the orchestrator expects.
pub async fn run_generation<G: ContentGenerator>(
    generator: &G,
    artifact_id: String,
    prompt: &str,
    timeout: Duration,
) -> GameMessage {
    let result = match tokio::time::timeout(timeout, generator.generate(prompt)).await {
        Ok(result) => result,
        Err(_) => Err(GenerationError::Timeout(timeout)),
    };
    let outcome = match result {
        Ok(content) => PromptOutcome::Success { content },
        Err(e) => {
            tracing::warn!(artifact = %artifact_id, error = %e, "Generation failed");
            PromptOutcome::Failure {
                error: e.to_string(),
            }
        }
    };
    GameMessage::PromptResult {
        artifact_id,
        outcome,
    }
}
