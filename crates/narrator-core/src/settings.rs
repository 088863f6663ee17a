//! Settings domain types and validation.
//!
//! These are pure data types loaded from a camelCase JSON document. Every
//! field has a default so a partial (or empty) document is a valid
//! configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::domain::FrontendConfig;

/// Default number of past utterances fed back to the model.
pub const DEFAULT_MAX_HISTORY: usize = 10;

/// Default number of model turns per generation (tool loop cap).
pub const DEFAULT_MAX_STEPS: usize = 5;

/// Default language model id.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Default OpenAI-compatible API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Default sampling temperature.
pub const DEFAULT_TEMPERATURE: f32 = 1.2;

/// Default VOICEVOX engine origin.
pub const DEFAULT_VOICEVOX_ORIGIN: &str = "http://localhost:50021";

/// Default VOICEVOX speaker id.
pub const DEFAULT_SPEAKER: u32 = 1;

/// Default idle timeout before the idle prompt is dispatched.
pub const DEFAULT_IDLE_TIMEOUT_MS: u64 = 30_000;

const DEFAULT_IDLE_PROMPT: &str = "簡単に雑談してください";

const DEFAULT_PROMPT: &str = "\
あなたはゲーム実況ストリーマーです。
あなたは情緒豊かで、いつも視聴者に楽しい時間を提供します。
これからゲームのプレイ状況を伝えるので、それに合わせたセリフを生成してください。

また、発言の内容に合わせて、文の前後に以下の形式のコマンドを挿入して表情を指定してください。
<setAvatar default>";

/// Language model section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AiSettings {
    /// Model id sent with every request.
    pub model: String,
    /// Base URL of the OpenAI-compatible API (without `/chat/completions`).
    pub base_url: String,
    /// Sampling temperature (0.0 - 2.0).
    pub temperature: f32,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

/// Speech synthesis section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VoicevoxSettings {
    pub origin: String,
    pub speaker: u32,
}

impl Default for VoicevoxSettings {
    fn default() -> Self {
        Self {
            origin: DEFAULT_VOICEVOX_ORIGIN.to_string(),
            speaker: DEFAULT_SPEAKER,
        }
    }
}

/// A literal pronunciation fix applied before synthesis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplaceRule {
    pub from: String,
    pub to: String,
}

impl ReplaceRule {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// Avatar section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AvatarSettings {
    /// Register the `setAvatar` tool and advertise avatars to the viewer.
    pub enabled: bool,
    /// Directory holding avatar images.
    pub directory: PathBuf,
}

impl Default for AvatarSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: PathBuf::from("avatars"),
        }
    }
}

/// Idle chatter section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IdleSettings {
    pub timeout_ms: u64,
    pub prompt: String,
}

impl Default for IdleSettings {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_IDLE_TIMEOUT_MS,
            prompt: DEFAULT_IDLE_PROMPT.to_string(),
        }
    }
}

/// Application settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NarratorSettings {
    pub ai: AiSettings,
    pub voicevox: VoicevoxSettings,
    /// System prompt.
    pub prompt: String,
    pub max_history: usize,
    pub max_steps: usize,
    pub replace: Vec<ReplaceRule>,
    pub avatar: AvatarSettings,
    /// Idle chatter is disabled when absent.
    pub idle: Option<IdleSettings>,
}

impl Default for NarratorSettings {
    fn default() -> Self {
        Self {
            ai: AiSettings::default(),
            voicevox: VoicevoxSettings::default(),
            prompt: DEFAULT_PROMPT.to_string(),
            max_history: DEFAULT_MAX_HISTORY,
            max_steps: DEFAULT_MAX_STEPS,
            replace: Vec::new(),
            avatar: AvatarSettings::default(),
            idle: None,
        }
    }
}

impl NarratorSettings {
    /// Viewer-facing subset announced with a `Configure` command.
    #[must_use]
    pub fn frontend_config(&self) -> FrontendConfig {
        FrontendConfig {
            idle_timeout_ms: self.idle.as_ref().map(|idle| idle.timeout_ms),
            avatar_enabled: self.avatar.enabled,
        }
    }
}

/// Settings validation error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SettingsError {
    #[error("Temperature must be between 0.0 and 2.0, got {0}")]
    InvalidTemperature(f32),

    #[error("Max history must be between 1 and 1000, got {0}")]
    InvalidMaxHistory(usize),

    #[error("Max steps must be between 1 and 20, got {0}")]
    InvalidMaxSteps(usize),

    #[error("Replace rule #{0} has an empty source string")]
    EmptyReplaceSource(usize),

    #[error("Model id cannot be empty")]
    EmptyModel,

    #[error("Idle timeout must be greater than zero")]
    ZeroIdleTimeout,
}

/// Validate settings values.
pub fn validate_settings(settings: &NarratorSettings) -> Result<(), SettingsError> {
    let temperature = settings.ai.temperature;
    if !(0.0..=2.0).contains(&temperature) {
        return Err(SettingsError::InvalidTemperature(temperature));
    }

    if settings.ai.model.trim().is_empty() {
        return Err(SettingsError::EmptyModel);
    }

    if !(1..=1000).contains(&settings.max_history) {
        return Err(SettingsError::InvalidMaxHistory(settings.max_history));
    }

    if !(1..=20).contains(&settings.max_steps) {
        return Err(SettingsError::InvalidMaxSteps(settings.max_steps));
    }

    if let Some(index) = settings.replace.iter().position(|rule| rule.from.is_empty()) {
        return Err(SettingsError::EmptyReplaceSource(index));
    }

    if settings.idle.as_ref().is_some_and(|idle| idle.timeout_ms == 0) {
        return Err(SettingsError::ZeroIdleTimeout);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = NarratorSettings::default();
        assert_eq!(settings.ai.model, DEFAULT_MODEL);
        assert!((settings.ai.temperature - 1.2).abs() < f32::EPSILON);
        assert_eq!(settings.voicevox.origin, "http://localhost:50021");
        assert_eq!(settings.max_history, 10);
        assert_eq!(settings.max_steps, 5);
        assert!(settings.replace.is_empty());
        assert!(settings.idle.is_none());
        assert!(validate_settings(&settings).is_ok());
    }

    #[test]
    fn test_partial_document_fills_defaults() {
        let json = r#"{
            "ai": { "temperature": 0.7 },
            "maxHistory": 3,
            "replace": [{ "from": "AI", "to": "エーアイ" }],
            "idle": { "prompt": "雑談して" }
        }"#;
        let settings: NarratorSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.ai.model, DEFAULT_MODEL);
        assert!((settings.ai.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(settings.max_history, 3);
        assert_eq!(settings.replace, vec![ReplaceRule::new("AI", "エーアイ")]);

        let idle = settings.idle.unwrap();
        assert_eq!(idle.timeout_ms, DEFAULT_IDLE_TIMEOUT_MS);
        assert_eq!(idle.prompt, "雑談して");
    }

    #[test]
    fn test_validate_temperature_out_of_range() {
        let mut settings = NarratorSettings::default();
        settings.ai.temperature = 2.5;
        assert!(matches!(
            validate_settings(&settings),
            Err(SettingsError::InvalidTemperature(_))
        ));
    }

    #[test]
    fn test_validate_history_and_steps() {
        let settings = NarratorSettings {
            max_history: 0,
            ..Default::default()
        };
        assert!(matches!(
            validate_settings(&settings),
            Err(SettingsError::InvalidMaxHistory(0))
        ));

        let settings = NarratorSettings {
            max_steps: 21,
            ..Default::default()
        };
        assert!(matches!(
            validate_settings(&settings),
            Err(SettingsError::InvalidMaxSteps(21))
        ));
    }

    #[test]
    fn test_validate_empty_replace_source() {
        let settings = NarratorSettings {
            replace: vec![ReplaceRule::new("a", "b"), ReplaceRule::new("", "x")],
            ..Default::default()
        };
        let err = validate_settings(&settings).unwrap_err();
        assert!(matches!(err, SettingsError::EmptyReplaceSource(1)));
        assert!(err.to_string().contains("#1"));
    }

    #[test]
    fn test_validate_empty_model() {
        let mut settings = NarratorSettings::default();
        settings.ai.model = "  ".to_string();
        assert!(matches!(
            validate_settings(&settings),
            Err(SettingsError::EmptyModel)
        ));
    }

    #[test]
    fn test_validate_zero_idle_timeout() {
        let settings = NarratorSettings {
            idle: Some(IdleSettings {
                timeout_ms: 0,
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(matches!(
            validate_settings(&settings),
            Err(SettingsError::ZeroIdleTimeout)
        ));
    }

    #[test]
    fn test_frontend_config() {
        let mut settings = NarratorSettings::default();
        assert_eq!(settings.frontend_config().idle_timeout_ms, None);

        settings.idle = Some(IdleSettings::default());
        settings.avatar.enabled = false;
        let config = settings.frontend_config();
        assert_eq!(config.idle_timeout_ms, Some(30_000));
        assert!(!config.avatar_enabled);
    }
}
