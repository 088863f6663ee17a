//! Speech request domain type.

use serde::{Deserialize, Serialize};

/// A single request to make the narrator speak.
///
/// Consumed by exactly one dispatch task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechRequest {
    /// Prompt for the language model, or the literal line when `direct`.
    pub text: String,

    /// Optional image attached to the user turn (URL or `data:` URI).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,

    /// Cancel the active task and discard queued tasks before enqueuing.
    #[serde(default)]
    pub interrupt: bool,

    /// Speak `text` as-is instead of generating dialogue from it.
    #[serde(default)]
    pub direct: bool,
}

impl SpeechRequest {
    /// Request generated dialogue for a prompt.
    pub fn generate(prompt: impl Into<String>) -> Self {
        Self {
            text: prompt.into(),
            ..Self::default()
        }
    }

    /// Request the given line to be spoken literally.
    pub fn direct(line: impl Into<String>) -> Self {
        Self {
            text: line.into(),
            direct: true,
            ..Self::default()
        }
    }

    /// Attach an image to the user turn.
    #[must_use]
    pub fn with_image(mut self, image_url: impl Into<String>) -> Self {
        self.image_url = Some(image_url.into());
        self
    }

    /// Mark this request as interrupting.
    #[must_use]
    pub const fn interrupting(mut self) -> Self {
        self.interrupt = true;
        self
    }
}
