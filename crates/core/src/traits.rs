//! Collaborator traits for the remote AI services
//!
//! The three downstream services are opaque request/response
//! collaborators with their own latency and failure modes. The
//! coordinator treats them uniformly through these traits, which keeps
//! the pipeline testable with in-process mocks.

use async_trait::async_trait;

use crate::conversation::Turn;
use crate::error::Result;

/// Speech-to-text backend.
///
/// Implementations may retry internally with relaxed parameters when a
/// first pass yields an empty transcript. An empty result is not an
/// error; the caller decides how to handle it.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// Transcribe a complete utterance of raw PCM16 audio.
    async fn transcribe(&self, audio: &[u8]) -> Result<String>;

    /// Model identifier for logging
    fn model_name(&self) -> &str;
}

/// Language-model completion backend.
///
/// Receives the full conversation history, not just the latest
/// utterance, so multi-turn coherence is preserved. Calls may be
/// abandoned by dropping the returned future; implementations should
/// abort any in-flight network request on drop.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Generate the assistant reply for the given history.
    async fn complete(&self, history: &[Turn]) -> Result<String>;

    /// Model identifier for logging
    fn model_name(&self) -> &str;
}

/// Text-to-speech backend.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize reply text into PCM16 audio bytes.
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>>;

    /// Model identifier for logging
    fn model_name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Turn;

    struct EchoModel;

    #[async_trait]
    impl LanguageModel for EchoModel {
        async fn complete(&self, history: &[Turn]) -> Result<String> {
            Ok(history
                .last()
                .map(|t| t.content.clone())
                .unwrap_or_default())
        }

        fn model_name(&self) -> &str {
            "echo"
        }
    }

    #[tokio::test]
    async fn test_trait_object_dispatch() {
        let model: Box<dyn LanguageModel> = Box::new(EchoModel);
        let history = vec![Turn::user("hello")];
        let reply = model.complete(&history).await.unwrap();
        assert_eq!(reply, "hello");
        assert_eq!(model.model_name(), "echo");
    }
}
