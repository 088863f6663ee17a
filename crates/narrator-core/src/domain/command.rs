//! Presentation commands sent to the display surface.
//!
//! Commands are transient: they are stamped with an emission sequence number
//! when they leave the dispatcher and are never persisted.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Viewer-facing configuration pushed with [`Command::Configure`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrontendConfig {
    /// Idle timeout in milliseconds, if idle chatter is enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_timeout_ms: Option<u64>,

    /// Whether the avatar layer is shown.
    #[serde(default)]
    pub avatar_enabled: bool,
}

/// A presentation command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    /// Replace the caption with the given text.
    UpdateCaption { caption: String },

    /// Switch the avatar expression.
    SetAvatar { avatar: String },

    /// Play an encoded audio clip (WAV bytes from the synthesizer).
    PlayAudio {
        #[serde(
            rename = "audioDataBase64",
            serialize_with = "serialize_base64",
            deserialize_with = "deserialize_base64"
        )]
        audio: Vec<u8>,
    },

    /// Drop everything the display has buffered but not yet played.
    ClearQueue,

    /// Push viewer configuration.
    Configure { config: FrontendConfig },
}

impl Command {
    /// Short name used in log fields.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::UpdateCaption { .. } => "update_caption",
            Self::SetAvatar { .. } => "set_avatar",
            Self::PlayAudio { .. } => "play_audio",
            Self::ClearQueue => "clear_queue",
            Self::Configure { .. } => "configure",
        }
    }
}

/// A command stamped with its position in the global emission order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmittedCommand {
    /// Monotonically increasing, starting at 1.
    pub seq: u64,

    #[serde(flatten)]
    pub command: Command,
}

fn serialize_base64<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&STANDARD.encode(bytes))
}

fn deserialize_base64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    let encoded = String::deserialize(deserializer)?;
    STANDARD
        .decode(encoded.as_bytes())
        .map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format() {
        let json = serde_json::to_value(EmittedCommand {
            seq: 3,
            command: Command::UpdateCaption {
                caption: "こんにちは。".to_string(),
            },
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({"seq": 3, "type": "UPDATE_CAPTION", "caption": "こんにちは。"})
        );

        let json = serde_json::to_value(Command::ClearQueue).unwrap();
        assert_eq!(json, serde_json::json!({"type": "CLEAR_QUEUE"}));
    }

    #[test]
    fn test_audio_is_base64() {
        let json = serde_json::to_value(Command::PlayAudio {
            audio: vec![0x52, 0x49, 0x46, 0x46],
        })
        .unwrap();
        assert_eq!(json["type"], "PLAY_AUDIO");
        assert_eq!(json["audioDataBase64"], "UklGRg==");

        let back: Command = serde_json::from_value(json).unwrap();
        assert_eq!(
            back,
            Command::PlayAudio {
                audio: b"RIFF".to_vec()
            }
        );
    }

    #[test]
    fn test_configure_payload() {
        let json = serde_json::to_value(Command::Configure {
            config: FrontendConfig {
                idle_timeout_ms: Some(30_000),
                avatar_enabled: true,
            },
        })
        .unwrap();
        assert_eq!(json["config"]["idleTimeoutMs"], 30_000);
        assert_eq!(json["config"]["avatarEnabled"], true);
    }
}
