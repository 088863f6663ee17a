//! Core domain types and port definitions for narrator.
//!
//! This crate holds everything the speech dispatch engine needs that is not
//! tied to a particular transport or vendor:
//!
//! - [`domain`]: requests, presentation commands, chat messages, history
//! - [`ports`]: trait seams for the language model, speech synthesis and the
//!   command sink
//! - [`text`]: streaming segmentation, directive extraction, normalization
//! - [`avatar`]: avatar image catalog lookup
//! - [`settings`]: configuration types and validation

pub mod avatar;
pub mod domain;
pub mod ports;
pub mod settings;
pub mod text;

// Re-export commonly used types for convenience
pub use avatar::{AvatarCatalog, DEFAULT_AVATAR};
pub use domain::{
    ChatMessage, Command, ContentPart, ConversationHistory, EmittedCommand, FrontendConfig,
    MessageContent, MessageRole, SpeechRequest, ToolCall,
};
pub use ports::{
    CommandSink, GenerationError, LanguageModel, ModelEvent, ModelEventStream, ModelRequest,
    NoopSink, SpeechSynthesizer, SynthesisError, SynthesisStage, ToolChoice, ToolSpec,
};
pub use settings::{
    AiSettings, AvatarSettings, DEFAULT_MAX_HISTORY, DEFAULT_MAX_STEPS, IdleSettings,
    NarratorSettings, ReplaceRule, SettingsError, VoicevoxSettings, validate_settings,
};
pub use text::{Extracted, Segmenter, TextNormalizer, extract_directives};

// Re-export the token type so adapters agree on one cancellation primitive.
pub use tokio_util::sync::CancellationToken;
