//! [`SpeechSynthesizer`] implementation: normalize, then delegate.

use std::sync::Arc;

use async_trait::async_trait;
use narrator_core::{
    CancellationToken, ReplaceRule, SpeechSynthesizer, SynthesisError, TextNormalizer,
};
use tracing::{debug, warn};

use crate::backend::TtsBackend;

/// Fragment synthesizer used by the dispatcher.
#[derive(Clone)]
pub struct Synthesizer {
    normalizer: TextNormalizer,
    backend: Arc<dyn TtsBackend>,
}

impl std::fmt::Debug for Synthesizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Synthesizer")
            .field("normalizer", &self.normalizer)
            .field("backend", &self.backend.name())
            .finish()
    }
}

impl Synthesizer {
    pub fn new(backend: Arc<dyn TtsBackend>) -> Self {
        Self {
            normalizer: TextNormalizer::default(),
            backend,
        }
    }

    #[must_use]
    pub fn with_replace_rules(mut self, rules: impl IntoIterator<Item = ReplaceRule>) -> Self {
        self.normalizer = TextNormalizer::new(rules);
        self
    }

    pub const fn normalizer(&self) -> &TextNormalizer {
        &self.normalizer
    }
}

#[async_trait]
impl SpeechSynthesizer for Synthesizer {
    /// Returns an empty clip, without calling the backend, when nothing
    /// speakable is left after normalization.
    async fn synthesize(
        &self,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, SynthesisError> {
        if cancel.is_cancelled() {
            return Err(SynthesisError::Cancelled);
        }

        let normalized = self.normalizer.normalize(text);
        if normalized.is_empty() {
            debug!("Nothing to synthesize after normalization");
            return Ok(Vec::new());
        }

        let result = self.backend.synthesize(&normalized, cancel).await;
        if let Err(ref e) = result {
            if !matches!(e, SynthesisError::Cancelled) {
                warn!(backend = self.backend.name(), error = %e, "Synthesis failed");
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingBackend {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TtsBackend for RecordingBackend {
        async fn synthesize(
            &self,
            text: &str,
            _cancel: &CancellationToken,
        ) -> Result<Vec<u8>, SynthesisError> {
            self.calls.lock().unwrap().push(text.to_string());
            Ok(text.as_bytes().to_vec())
        }

        fn name(&self) -> &'static str {
            "recording"
        }
    }

    #[tokio::test]
    async fn test_normalizes_before_backend() {
        let backend = Arc::new(RecordingBackend::default());
        let synth = Synthesizer::new(backend.clone())
            .with_replace_rules(vec![ReplaceRule::new("AI", "エーアイ")]);

        let audio = synth
            .synthesize("  AIです。\n", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(audio, "エーアイです。".as_bytes());
        assert_eq!(*backend.calls.lock().unwrap(), vec!["エーアイです。"]);
    }

    #[tokio::test]
    async fn test_cancelled_token_skips_backend() {
        let backend = Arc::new(RecordingBackend::default());
        let synth = Synthesizer::new(backend.clone());
        let token = CancellationToken::new();
        token.cancel();

        let err = synth.synthesize("こんにちは。", &token).await.unwrap_err();
        assert!(matches!(err, SynthesisError::Cancelled));
        assert!(backend.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_blank_text_skips_backend() {
        let backend = Arc::new(RecordingBackend::default());
        let synth = Synthesizer::new(backend.clone());

        let audio = synth.synthesize(" \n ", &CancellationToken::new()).await.unwrap();
        assert!(audio.is_empty());
        assert!(backend.calls.lock().unwrap().is_empty());
    }
}
