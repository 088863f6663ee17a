//! CLI bootstrap - the composition root.
//!
//! This module is the ONLY place where concrete adapters are wired
//! together:
//! - Language model client (via narrator-llm)
//! - VOICEVOX backend and synthesizer (via narrator-speech)
//! - Tool registry and generation session (via narrator-llm)
//! - Dispatcher (via narrator-dispatch)

use std::sync::Arc;

use anyhow::{Context, Result};
use narrator_core::{AvatarCatalog, EmittedCommand, NarratorSettings};
use narrator_dispatch::{Dispatcher, DispatcherConfig, DispatcherDeps};
use narrator_llm::{
    GenerationSession, OpenAiCompatModel, OpenAiConfig, SessionConfig, SetAvatarTool, ToolRegistry,
};
use narrator_speech::{Synthesizer, VoicevoxBackend, VoicevoxConfig};
use tokio::sync::mpsc;
use tracing::info;

/// Everything the stdin loop needs.
pub struct CliContext {
    pub settings: NarratorSettings,
    pub dispatcher: Dispatcher,
    pub commands: mpsc::UnboundedReceiver<EmittedCommand>,
    pub avatars: AvatarCatalog,
}

/// Build the dispatcher and its collaborators from `settings`.
///
/// Must be called from within a Tokio runtime.
pub async fn bootstrap(settings: NarratorSettings, api_key: Option<String>) -> Result<CliContext> {
    let model_config = OpenAiConfig::new(settings.ai.base_url.clone()).with_api_key(api_key);
    let model = OpenAiCompatModel::new(&model_config)
        .context("Failed to create language model client")?;

    let backend = VoicevoxBackend::new(&VoicevoxConfig::from(&settings.voicevox))
        .context("Failed to create VOICEVOX client")?;
    let synthesizer = Synthesizer::new(Arc::new(backend)).with_replace_rules(settings.replace.clone());

    let avatars = AvatarCatalog::new(settings.avatar.directory.clone());
    let mut tools = ToolRegistry::new();
    if settings.avatar.enabled {
        let names = avatars.available().await;
        info!(dir = %avatars.dir().display(), avatars = names.len(), "Avatar catalog loaded");
        tools.register(SetAvatarTool::new(names));
    }

    let session = GenerationSession::new(Arc::new(model), tools, SessionConfig::from(&settings));
    let (dispatcher, commands) = Dispatcher::new(
        DispatcherDeps::new(session, Arc::new(synthesizer)),
        DispatcherConfig::default(),
    );

    info!(
        model = %settings.ai.model,
        endpoint = %model_config.base_url,
        voicevox = %settings.voicevox.origin,
        "Narrator ready"
    );

    Ok(CliContext {
        settings,
        dispatcher,
        commands,
        avatars,
    })
}
