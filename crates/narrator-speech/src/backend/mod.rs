//! Speech engine backends.
//!
//! A [`TtsBackend`] turns already-normalized text into an encoded audio
//! clip. Backends are responsible for honoring the cancellation token at
//! every suspension point; the [`Synthesizer`](crate::Synthesizer) only
//! guarantees the backend is not called once the token has fired.

pub mod voicevox;

use async_trait::async_trait;
use narrator_core::{CancellationToken, SynthesisError};

/// Backend-agnostic text-to-speech engine.
#[async_trait]
pub trait TtsBackend: Send + Sync {
    /// Synthesize `text` into an encoded clip (WAV for VOICEVOX).
    async fn synthesize(
        &self,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, SynthesisError>;

    /// Short engine name for log fields.
    fn name(&self) -> &'static str;
}
