//! Language model port.
//!
//! A provider accepts a role-tagged message list, a tool set and sampling
//! parameters, and answers with a stream of typed events. One call to
//! [`LanguageModel::stream`] is one model turn; the tool loop that chains
//! turns together lives in the generation session, not in the provider.

use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::domain::{ChatMessage, ToolCall};

/// Tool description advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON Schema of the arguments object.
    pub input_schema: serde_json::Value,
}

/// Whether the model may call tools in this turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolChoice {
    #[default]
    Auto,
    /// Text-only answer; used for the final turn of the tool loop.
    None,
}

/// One model turn.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolSpec>,
    pub tool_choice: ToolChoice,
    pub temperature: f32,
}

/// Event produced by a streaming model turn.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelEvent {
    /// Incremental assistant text.
    TextDelta(String),
    /// A complete tool invocation.
    ToolCall(ToolCall),
    /// The provider reported an error mid-stream.
    Error(String),
    /// The turn finished.
    Done,
}

/// Boxed stream of model events.
///
/// An `Err` item ends the turn: the transport broke or an event could not be
/// decoded. Provider-reported errors arrive as [`ModelEvent::Error`].
pub type ModelEventStream = Pin<Box<dyn Stream<Item = Result<ModelEvent, GenerationError>> + Send>>;

/// Errors from the generation side of the pipeline.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// The provider answered with a non-success status.
    #[error("Language model request failed with status {status}: {body}")]
    Http { status: u16, body: String },

    /// Network or client failure talking to the provider.
    #[error("Language model transport error: {0}")]
    Transport(String),

    /// The provider reported an error event mid-stream.
    #[error("Language model error: {0}")]
    Model(String),

    /// A streamed event could not be understood.
    #[error("Malformed model event: {0}")]
    MalformedEvent(String),

    /// The owning task was cancelled.
    #[error("Generation cancelled")]
    Cancelled,
}

/// Streaming language model provider.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Open one streaming turn.
    ///
    /// Implementations should abandon the request when `cancel` fires.
    async fn stream(
        &self,
        request: ModelRequest,
        cancel: &CancellationToken,
    ) -> Result<ModelEventStream, GenerationError>;
}
