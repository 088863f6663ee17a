//! VOICEVOX engine backend.
//!
//! Synthesis is two calls per fragment:
//!
//! 1. `POST {origin}/audio_query?speaker={id}&text={text}` returns a JSON
//!    synthesis query (accent phrases, speed, pitch...)
//! 2. `POST {origin}/synthesis?speaker={id}` with that query as the body
//!    returns a WAV clip
//!
//! Each call races the task's cancellation token; a result that arrives
//! after cancellation is dropped.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use narrator_core::{CancellationToken, SynthesisError, SynthesisStage, VoicevoxSettings};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use super::TtsBackend;
use crate::error::SpeechError;

/// Default per-request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection settings for [`VoicevoxBackend`].
#[derive(Debug, Clone)]
pub struct VoicevoxConfig {
    pub origin: String,
    pub speaker: u32,
    pub timeout: Duration,
}

impl VoicevoxConfig {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn with_speaker(mut self, speaker: u32) -> Self {
        self.speaker = speaker;
        self
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for VoicevoxConfig {
    fn default() -> Self {
        let settings = VoicevoxSettings::default();
        Self {
            origin: settings.origin,
            speaker: settings.speaker,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl From<&VoicevoxSettings> for VoicevoxConfig {
    fn from(settings: &VoicevoxSettings) -> Self {
        Self::new(settings.origin.clone()).with_speaker(settings.speaker)
    }
}

/// A voice offered by the engine (`GET /speakers`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Speaker {
    pub name: String,
    #[serde(default)]
    pub speaker_uuid: String,
    #[serde(default)]
    pub styles: Vec<SpeakerStyle>,
}

/// One style of a [`Speaker`]; its `id` is what `speaker=` expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeakerStyle {
    pub name: String,
    pub id: u32,
}

/// HTTP client for a VOICEVOX-compatible engine.
#[derive(Debug, Clone)]
pub struct VoicevoxBackend {
    client: reqwest::Client,
    origin: Url,
    speaker: u32,
}

impl VoicevoxBackend {
    pub fn new(config: &VoicevoxConfig) -> Result<Self, SpeechError> {
        let mut origin =
            Url::parse(&config.origin).map_err(|e| SpeechError::InvalidOrigin {
                origin: config.origin.clone(),
                message: e.to_string(),
            })?;
        if origin.cannot_be_a_base() {
            return Err(SpeechError::InvalidOrigin {
                origin: config.origin.clone(),
                message: "not a base URL".to_string(),
            });
        }
        // `Url::join` replaces the last path segment unless the path ends in '/'.
        if !origin.path().ends_with('/') {
            let path = format!("{}/", origin.path());
            origin.set_path(&path);
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| SpeechError::Client(e.to_string()))?;

        Ok(Self {
            client,
            origin,
            speaker: config.speaker,
        })
    }

    pub const fn speaker(&self) -> u32 {
        self.speaker
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    /// List the voices the engine offers.
    pub async fn speakers(&self) -> Result<Vec<Speaker>, SpeechError> {
        let url = self.endpoint("speakers");
        let request_error = |e: reqwest::Error| SpeechError::Request {
            url: url.to_string(),
            message: e.to_string(),
        };

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(request_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(SpeechError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        response.json().await.map_err(request_error)
    }

    fn endpoint(&self, path: &str) -> Url {
        let mut url = self.origin.clone();
        url.set_path(&format!("{}{path}", self.origin.path()));
        url
    }

    fn stage_url(&self, stage: SynthesisStage, text: Option<&str>) -> Url {
        let mut url = self.endpoint(&stage.to_string());
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("speaker", &self.speaker.to_string());
            if let Some(text) = text {
                query.append_pair("text", text);
            }
        }
        url
    }

    async fn audio_query(&self, text: &str) -> Result<serde_json::Value, SynthesisError> {
        let stage = SynthesisStage::AudioQuery;
        let response = self
            .client
            .post(self.stage_url(stage, Some(text)))
            .send()
            .await
            .map_err(|e| transport(stage, &e))?;
        let response = check_status(stage, response).await?;
        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| SynthesisError::InvalidPayload {
                stage,
                message: e.to_string(),
            })
    }

    async fn render(&self, query: &serde_json::Value) -> Result<Vec<u8>, SynthesisError> {
        let stage = SynthesisStage::Synthesis;
        let response = self
            .client
            .post(self.stage_url(stage, None))
            .json(query)
            .send()
            .await
            .map_err(|e| transport(stage, &e))?;
        let response = check_status(stage, response).await?;
        let bytes = response.bytes().await.map_err(|e| transport(stage, &e))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl TtsBackend for VoicevoxBackend {
    async fn synthesize(
        &self,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, SynthesisError> {
        let query = race(cancel, self.audio_query(text)).await?;
        let audio = race(cancel, self.render(&query)).await?;
        debug!(chars = text.chars().count(), bytes = audio.len(), "VOICEVOX synthesis complete");
        Ok(audio)
    }

    fn name(&self) -> &'static str {
        "voicevox"
    }
}

/// Run `call` unless `cancel` fires first.
async fn race<T>(
    cancel: &CancellationToken,
    call: impl Future<Output = Result<T, SynthesisError>>,
) -> Result<T, SynthesisError> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(SynthesisError::Cancelled),
        result = call => result,
    }
}

fn transport(stage: SynthesisStage, err: &reqwest::Error) -> SynthesisError {
    SynthesisError::Transport {
        stage,
        message: err.to_string(),
    }
}

async fn check_status(
    stage: SynthesisStage,
    response: reqwest::Response,
) -> Result<reqwest::Response, SynthesisError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(SynthesisError::Upstream {
        stage,
        status: status.as_u16(),
        body,
    })
}
