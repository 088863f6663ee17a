//! Built-in `setAvatar` tool.

use async_trait::async_trait;
use narrator_core::Command;
use serde_json::{Value, json};
use tracing::debug;

use super::{Tool, ToolContext, ToolError};

/// Switches the avatar expression through the command stream.
#[derive(Debug, Clone, Default)]
pub struct SetAvatarTool {
    avatars: Vec<String>,
}

impl SetAvatarTool {
    /// `avatars` becomes the enum of accepted names; empty accepts any name.
    pub fn new(avatars: Vec<String>) -> Self {
        Self { avatars }
    }

    pub fn avatars(&self) -> &[String] {
        &self.avatars
    }
}

#[async_trait]
impl Tool for SetAvatarTool {
    fn name(&self) -> &str {
        "setAvatar"
    }

    fn description(&self) -> &str {
        "Update current avatar for ai-streamer"
    }

    fn input_schema(&self) -> Value {
        let mut name = json!({
            "type": "string",
            "description": "Avatar name",
        });
        if !self.avatars.is_empty() {
            name["enum"] = json!(self.avatars);
        }
        json!({
            "type": "object",
            "properties": { "name": name },
            "required": ["name"],
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<String, ToolError> {
        let name = args
            .get("name")
            .and_then(Value::as_str)
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("'name' must be a string".to_string()))?;

        if !self.avatars.is_empty() && !self.avatars.iter().any(|a| a == name) {
            return Err(ToolError::InvalidArguments(format!(
                "unknown avatar '{name}', expected one of: {}",
                self.avatars.join(", ")
            )));
        }

        let command = Command::SetAvatar {
            avatar: name.to_string(),
        };
        if !ctx.sink.emit_run(&ctx.token, vec![command]) {
            debug!(avatar = %name, "Avatar change dropped, task cancelled");
            return Err(ToolError::Execution("task was cancelled".to_string()));
        }

        Ok(format!("アバターを{name}に変更しました"))
    }
}
