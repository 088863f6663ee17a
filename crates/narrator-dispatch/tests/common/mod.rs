//! Common test utilities.
//!
//! Scripted ports for driving the dispatcher without a model or a speech
//! engine.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::StreamExt;
use narrator_core::{
    CancellationToken, Command, EmittedCommand, GenerationError, LanguageModel, MessageRole,
    ModelEvent, ModelEventStream, ModelRequest, SpeechSynthesizer, SynthesisError, SynthesisStage,
    ToolCall,
};
use narrator_dispatch::{Dispatcher, DispatcherConfig, DispatcherDeps};
use narrator_llm::{GenerationSession, SessionConfig, SetAvatarTool, ToolRegistry};
use serde_json::json;
use tokio::sync::{Notify, mpsc};

// ── Language model ─────────────────────────────────────────────────

/// Answers by echoing the prompt, one character per delta.
///
/// - `hang:<text>`: says `<text>`, then the stream never ends
/// - `fail`: HTTP 500
/// - `avatar`: calls `setAvatar`, then says `変えました。`
#[derive(Default)]
pub struct EchoModel {
    requests: Mutex<Vec<ModelRequest>>,
}

impl EchoModel {
    pub fn prompts(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter_map(|r| r.messages.iter().rev().find(|m| m.role == MessageRole::User))
            .map(|m| m.content.text())
            .collect()
    }
}

fn deltas(text: &str) -> Vec<Result<ModelEvent, GenerationError>> {
    text.chars()
        .map(|c| Ok(ModelEvent::TextDelta(c.to_string())))
        .collect()
}

#[async_trait]
impl LanguageModel for EchoModel {
    async fn stream(
        &self,
        request: ModelRequest,
        _cancel: &CancellationToken,
    ) -> Result<ModelEventStream, GenerationError> {
        let prompt = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::User)
            .map(|m| m.content.text())
            .unwrap_or_default();
        let after_tool = request.messages.iter().any(|m| m.role == MessageRole::Tool);
        self.requests.lock().unwrap().push(request);

        if prompt == "fail" {
            return Err(GenerationError::Http {
                status: 500,
                body: "internal error".to_string(),
            });
        }
        if let Some(text) = prompt.strip_prefix("hang:") {
            return Ok(futures_util::stream::iter(deltas(text))
                .chain(futures_util::stream::pending())
                .boxed());
        }
        if prompt == "avatar" && !after_tool {
            let call = ToolCall {
                id: "call_1".to_string(),
                name: "setAvatar".to_string(),
                arguments: json!({ "name": "喜び" }),
            };
            return Ok(futures_util::stream::iter(vec![
                Ok(ModelEvent::ToolCall(call)),
                Ok(ModelEvent::Done),
            ])
            .boxed());
        }

        let text = if prompt == "avatar" { "変えました。".to_string() } else { prompt };
        let mut events = deltas(&text);
        events.push(Ok(ModelEvent::Done));
        Ok(futures_util::stream::iter(events).boxed())
    }
}

// ── Synthesizer ────────────────────────────────────────────────────

/// Returns `RIFF` followed by the text.
///
/// Text containing `遅い` blocks until [`release`](Self::release) or
/// cancellation; text containing `boom` fails upstream; text containing
/// `爆` panics.
#[derive(Default)]
pub struct FakeSynth {
    calls: Mutex<Vec<String>>,
    pub started: Notify,
    release: Notify,
}

impl FakeSynth {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn release(&self) {
        self.release.notify_one();
    }
}

#[async_trait]
impl SpeechSynthesizer for FakeSynth {
    async fn synthesize(
        &self,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, SynthesisError> {
        if cancel.is_cancelled() {
            return Err(SynthesisError::Cancelled);
        }
        self.calls.lock().unwrap().push(text.to_string());

        if text.contains('爆') {
            panic!("synthesizer exploded on {text}");
        }
        if text.contains("boom") {
            return Err(SynthesisError::Upstream {
                stage: SynthesisStage::Synthesis,
                status: 500,
                body: "engine crashed".to_string(),
            });
        }
        if text.contains("遅い") {
            self.started.notify_one();
            tokio::select! {
                () = cancel.cancelled() => return Err(SynthesisError::Cancelled),
                () = self.release.notified() => {}
            }
        }
        tokio::task::yield_now().await;
        Ok(audio(text))
    }
}

pub fn audio(text: &str) -> Vec<u8> {
    let mut bytes = b"RIFF".to_vec();
    bytes.extend_from_slice(text.as_bytes());
    bytes
}

// ── Harness ────────────────────────────────────────────────────────

pub struct Harness {
    pub dispatcher: Dispatcher,
    pub commands: mpsc::UnboundedReceiver<EmittedCommand>,
    pub model: Arc<EchoModel>,
    pub synth: Arc<FakeSynth>,
    pub session: GenerationSession,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(DispatcherConfig::default())
    }

    pub fn with_config(config: DispatcherConfig) -> Self {
        let model = Arc::new(EchoModel::default());
        let synth = Arc::new(FakeSynth::default());
        let mut tools = ToolRegistry::new();
        tools.register(SetAvatarTool::default());
        let session = GenerationSession::new(
            model.clone(),
            tools,
            SessionConfig::new("test-model", "You narrate."),
        );
        let (dispatcher, commands) =
            Dispatcher::new(DispatcherDeps::new(session.clone(), synth.clone()), config);
        Self {
            dispatcher,
            commands,
            model,
            synth,
            session,
        }
    }

    /// Everything emitted so far.
    pub fn drain(&mut self) -> Vec<EmittedCommand> {
        let mut out = Vec::new();
        while let Ok(cmd) = self.commands.try_recv() {
            out.push(cmd);
        }
        out
    }

    pub fn drain_commands(&mut self) -> Vec<Command> {
        self.drain().into_iter().map(|c| c.command).collect()
    }
}

pub fn caption(text: &str) -> Command {
    Command::UpdateCaption {
        caption: text.to_string(),
    }
}

pub fn play(text: &str) -> Command {
    Command::PlayAudio { audio: audio(text) }
}
