//! Generation session: conversation state plus the bounded tool loop.
//!
//! A [`GenerationSession`] lives as long as the dispatcher. Each call to
//! [`GenerationSession::stream`] starts one generation and returns a
//! [`GenerationStream`], a pull-based state machine:
//!
//! ```text
//! open turn ──► text deltas ──► segmenter ──► next_segment()
//!     ▲              │
//!     │         tool calls
//!     │              ▼
//!     └──── execute tools, append results
//! ```
//!
//! A turn that ends without tool calls ends the generation. The turn with
//! index `max_steps` is sent without tools, so a generation never takes
//! more than `max_steps` model turns.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::StreamExt;
use narrator_core::{
    CancellationToken, ChatMessage, ConversationHistory, DEFAULT_MAX_HISTORY, DEFAULT_MAX_STEPS,
    GenerationError, LanguageModel, ModelEvent, ModelEventStream, ModelRequest, NarratorSettings,
    Segmenter, ToolCall, ToolChoice,
};
use tracing::{debug, info, warn};

use crate::tools::{ToolContext, ToolRegistry};

/// Per-session generation parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub model: String,
    pub system_prompt: String,
    pub temperature: f32,
    pub max_history: usize,
    pub max_steps: usize,
}

impl SessionConfig {
    pub fn new(model: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system_prompt: system_prompt.into(),
            temperature: narrator_core::settings::DEFAULT_TEMPERATURE,
            max_history: DEFAULT_MAX_HISTORY,
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    #[must_use]
    pub const fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    #[must_use]
    pub const fn with_max_history(mut self, max_history: usize) -> Self {
        self.max_history = max_history;
        self
    }

    #[must_use]
    pub const fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }
}

impl From<&NarratorSettings> for SessionConfig {
    fn from(settings: &NarratorSettings) -> Self {
        Self::new(settings.ai.model.clone(), settings.prompt.clone())
            .with_temperature(settings.ai.temperature)
            .with_max_history(settings.max_history)
            .with_max_steps(settings.max_steps)
    }
}

/// Long-lived generation state shared by all dispatch tasks.
#[derive(Clone)]
pub struct GenerationSession {
    model: Arc<dyn LanguageModel>,
    tools: Arc<ToolRegistry>,
    config: Arc<SessionConfig>,
    history: Arc<Mutex<ConversationHistory>>,
}

impl std::fmt::Debug for GenerationSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationSession")
            .field("config", &self.config)
            .field("tools", &self.tools)
            .finish_non_exhaustive()
    }
}

impl GenerationSession {
    pub fn new(model: Arc<dyn LanguageModel>, tools: ToolRegistry, config: SessionConfig) -> Self {
        let history = ConversationHistory::new(config.max_history);
        Self {
            model,
            tools: Arc::new(tools),
            config: Arc::new(config),
            history: Arc::new(Mutex::new(history)),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Snapshot of past assistant utterances, oldest first.
    pub fn history(&self) -> Vec<String> {
        lock(&self.history).recent(self.config.max_history)
    }

    pub fn clear_history(&self) {
        lock(&self.history).clear();
    }

    /// Start a generation for `prompt`.
    ///
    /// Nothing is sent until the first [`GenerationStream::next_segment`].
    pub fn stream(
        &self,
        prompt: &str,
        image_url: Option<&str>,
        token: CancellationToken,
        tool_ctx: ToolContext,
    ) -> GenerationStream {
        let mut messages = vec![ChatMessage::system(self.config.system_prompt.clone())];
        messages.extend(
            lock(&self.history)
                .recent(self.config.max_history)
                .into_iter()
                .map(ChatMessage::assistant),
        );
        messages.push(ChatMessage::user(prompt, image_url));

        GenerationStream {
            session: self.clone(),
            tool_ctx: tool_ctx.with_token(token.clone()),
            token,
            messages,
            step: 0,
            current: None,
            segmenter: Segmenter::new(),
            pending: VecDeque::new(),
            response: String::new(),
            turn_text: String::new(),
            turn_calls: Vec::new(),
            finished: false,
        }
    }

    fn record(&self, response: &str) {
        if response.is_empty() {
            return;
        }
        lock(&self.history).push(response);
    }
}

fn lock(history: &Mutex<ConversationHistory>) -> std::sync::MutexGuard<'_, ConversationHistory> {
    history.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One generation in progress.
pub struct GenerationStream {
    session: GenerationSession,
    token: CancellationToken,
    tool_ctx: ToolContext,
    messages: Vec<ChatMessage>,
    /// Model turns opened so far.
    step: usize,
    current: Option<ModelEventStream>,
    segmenter: Segmenter,
    pending: VecDeque<String>,
    /// Everything the model said, across turns.
    response: String,
    turn_text: String,
    turn_calls: Vec<ToolCall>,
    finished: bool,
}

impl std::fmt::Debug for GenerationStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationStream")
            .field("step", &self.step)
            .field("pending", &self.pending)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl GenerationStream {
    /// Next speakable segment.
    ///
    /// The last segment is the unterminated remainder and may be empty.
    /// Returns `Ok(None)` once the generation is complete. On cancellation
    /// the text produced so far is recorded in history and
    /// [`GenerationError::Cancelled`] is returned.
    pub async fn next_segment(&mut self) -> Result<Option<String>, GenerationError> {
        loop {
            if let Some(segment) = self.pending.pop_front() {
                return Ok(Some(segment));
            }
            if self.finished {
                return Ok(None);
            }
            if self.token.is_cancelled() {
                return Err(self.cancelled());
            }

            let Some(stream) = self.current.as_mut() else {
                self.open_turn().await?;
                continue;
            };

            let event = tokio::select! {
                biased;
                () = self.token.cancelled() => None,
                event = stream.next() => Some(event),
            };
            let Some(event) = event else {
                return Err(self.cancelled());
            };

            match event {
                Some(Ok(ModelEvent::TextDelta(text))) => {
                    self.response.push_str(&text);
                    self.turn_text.push_str(&text);
                    self.pending.extend(self.segmenter.push(&text));
                }
                Some(Ok(ModelEvent::ToolCall(call))) => {
                    if self.is_final_turn() {
                        warn!(tool = %call.name, step = self.step, "Ignoring tool call in final turn");
                    } else {
                        self.turn_calls.push(call);
                    }
                }
                Some(Ok(ModelEvent::Error(message))) => {
                    return Err(self.fail(GenerationError::Model(message)));
                }
                Some(Err(e)) => return Err(self.fail(e)),
                Some(Ok(ModelEvent::Done)) | None => {
                    self.current = None;
                    self.end_turn().await?;
                }
            }
        }
    }

    /// Remaining segments, in order.
    pub async fn collect_segments(mut self) -> Result<Vec<String>, GenerationError> {
        let mut segments = Vec::new();
        while let Some(segment) = self.next_segment().await? {
            segments.push(segment);
        }
        Ok(segments)
    }

    fn is_final_turn(&self) -> bool {
        self.step >= self.session.config.max_steps
    }

    async fn open_turn(&mut self) -> Result<(), GenerationError> {
        self.step += 1;
        let final_turn = self.is_final_turn();
        let (tools, tool_choice) = if final_turn {
            (Vec::new(), ToolChoice::None)
        } else {
            (self.session.tools.specs(), ToolChoice::Auto)
        };

        let config = &self.session.config;
        let request = ModelRequest {
            model: config.model.clone(),
            messages: self.messages.clone(),
            tools,
            tool_choice,
            temperature: config.temperature,
        };
        debug!(step = self.step, final_turn, "Opening model turn");

        let opened = tokio::select! {
            biased;
            () = self.token.cancelled() => Err(GenerationError::Cancelled),
            opened = self.session.model.stream(request, &self.token) => opened,
        };
        match opened {
            Ok(stream) => {
                self.current = Some(stream);
                Ok(())
            }
            Err(GenerationError::Cancelled) => Err(self.cancelled()),
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Either run the requested tools and prepare the next turn, or finish.
    async fn end_turn(&mut self) -> Result<(), GenerationError> {
        let calls = std::mem::take(&mut self.turn_calls);
        let text = std::mem::take(&mut self.turn_text);

        if calls.is_empty() {
            self.pending.push_back(self.segmenter.finish());
            self.finished = true;
            self.session.record(&self.response);
            info!(steps = self.step, chars = self.response.chars().count(), "Generation complete");
            return Ok(());
        }

        self.messages
            .push(ChatMessage::assistant_tool_calls(text, calls.clone()));
        for call in &calls {
            let output = tokio::select! {
                biased;
                () = self.token.cancelled() => None,
                output = self.session.tools.execute(call, &self.tool_ctx) => Some(output),
            };
            let Some(output) = output else {
                return Err(self.cancelled());
            };
            debug!(tool = %call.name, step = self.step, "Tool result ready");
            self.messages
                .push(ChatMessage::tool_result(call.id.clone(), output));
        }
        Ok(())
    }

    fn cancelled(&mut self) -> GenerationError {
        if !self.finished {
            self.finished = true;
            self.current = None;
            self.pending.clear();
            self.session.record(&self.response);
            debug!(step = self.step, "Generation cancelled");
        }
        GenerationError::Cancelled
    }

    fn fail(&mut self, error: GenerationError) -> GenerationError {
        self.finished = true;
        self.current = None;
        self.pending.clear();
        warn!(step = self.step, error = %error, "Generation failed");
        error
    }
}
