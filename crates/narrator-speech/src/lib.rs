//! Speech synthesis for narrator.
//!
//! [`Synthesizer`] implements the core [`SpeechSynthesizer`] port: it runs
//! the configured pronunciation fixes over each fragment and hands the
//! result to a [`TtsBackend`]. The only production backend is
//! [`VoicevoxBackend`], which talks to a VOICEVOX-compatible engine over
//! HTTP.
//!
//! [`SpeechSynthesizer`]: narrator_core::SpeechSynthesizer

pub mod backend;
pub mod error;
pub mod synthesizer;

pub use backend::voicevox::{Speaker, SpeakerStyle, VoicevoxBackend, VoicevoxConfig};
pub use backend::TtsBackend;
pub use error::SpeechError;
pub use synthesizer::Synthesizer;
