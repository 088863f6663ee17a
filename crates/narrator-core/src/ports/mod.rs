//! Port definitions (trait abstractions) for external systems.
//!
//! Ports define the interfaces that the dispatch engine expects from
//! infrastructure. They contain no implementation details and use only
//! domain types.
//!
//! # Design Rules
//!
//! - No `reqwest` types in any signature
//! - Every call that may suspend takes the task's cancellation token
//! - Errors carry enough context (stage, status, body) to diagnose upstream
//!   failures from a log line alone

pub mod command_sink;
pub mod language_model;
pub mod synthesizer;

pub use command_sink::{CommandSink, NoopSink};
pub use language_model::{
    GenerationError, LanguageModel, ModelEvent, ModelEventStream, ModelRequest, ToolChoice,
    ToolSpec,
};
pub use synthesizer::{SpeechSynthesizer, SynthesisError, SynthesisStage};
