//! Speech synthesis port.

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Which upstream call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthesisStage {
    /// Building the synthesis query from text.
    AudioQuery,
    /// Rendering audio from the query.
    Synthesis,
}

impl fmt::Display for SynthesisStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AudioQuery => f.write_str("audio_query"),
            Self::Synthesis => f.write_str("synthesis"),
        }
    }
}

/// Errors from speech synthesis.
#[derive(Debug, Error)]
pub enum SynthesisError {
    /// The speech service answered with a non-success status.
    #[error("Speech synthesis {stage} failed with status {status}: {body}")]
    Upstream {
        stage: SynthesisStage,
        status: u16,
        body: String,
    },

    /// The call itself failed (connection refused, timeout, ...).
    #[error("Speech synthesis {stage} request failed: {message}")]
    Transport {
        stage: SynthesisStage,
        message: String,
    },

    /// The query returned by the service could not be read.
    #[error("Speech synthesis {stage} returned an invalid payload: {message}")]
    InvalidPayload {
        stage: SynthesisStage,
        message: String,
    },

    /// The owning task was cancelled; the call was skipped or discarded.
    #[error("Speech synthesis cancelled")]
    Cancelled,
}

impl SynthesisError {
    /// Stage the error came from, if any.
    pub const fn stage(&self) -> Option<SynthesisStage> {
        match self {
            Self::Upstream { stage, .. }
            | Self::Transport { stage, .. }
            | Self::InvalidPayload { stage, .. } => Some(*stage),
            Self::Cancelled => None,
        }
    }
}

/// Converts a text fragment into an audio payload.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize `text`.
    ///
    /// Must not contact the backing service when `cancel` is already
    /// cancelled, and must discard results that arrive after cancellation.
    async fn synthesize(
        &self,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, SynthesisError>;
}
