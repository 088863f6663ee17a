//! OpenAI-compatible Chat Completions client.
//!
//! Works against any server exposing `POST {base_url}/chat/completions`
//! with `stream: true` (OpenAI, llama-server, vLLM, Ollama's `/v1`...).

mod sse;

use std::time::Duration;

use async_trait::async_trait;
use narrator_core::{
    CancellationToken, ChatMessage, ContentPart, GenerationError, LanguageModel, MessageContent,
    MessageRole, ModelEventStream, ModelRequest,
};
use serde_json::{Value, json};
use tracing::debug;

pub use sse::model_events;

/// Connection settings for [`OpenAiCompatModel`].
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// API base URL without the `/chat/completions` suffix.
    pub base_url: String,
    /// Bearer token; omitted from requests when `None`.
    pub api_key: Option<String>,
    pub connect_timeout: Duration,
}

impl OpenAiConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            connect_timeout: Duration::from_secs(10),
        }
    }

    #[must_use]
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|key| !key.is_empty());
        self
    }
}

/// Streaming Chat Completions provider.
#[derive(Debug, Clone)]
pub struct OpenAiCompatModel {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl OpenAiCompatModel {
    pub fn new(config: &OpenAiConfig) -> Result<Self, GenerationError> {
        // No overall timeout: a streamed answer may legitimately take minutes.
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| GenerationError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl LanguageModel for OpenAiCompatModel {
    async fn stream(
        &self,
        request: ModelRequest,
        cancel: &CancellationToken,
    ) -> Result<ModelEventStream, GenerationError> {
        let body = request_body(&request);
        debug!(
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Opening chat completion stream"
        );

        let mut builder = self.client.post(&self.endpoint).json(&body);
        if let Some(ref key) = self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(GenerationError::Cancelled),
            result = builder.send() => result.map_err(|e| GenerationError::Transport(e.to_string()))?,
        };

        let status = response.status();
        if !status.is_success() {
            let body = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(GenerationError::Cancelled),
                text = response.text() => text.unwrap_or_default(),
            };
            return Err(GenerationError::Http {
                status: status.as_u16(),
                body,
            });
        }

        Ok(model_events(response.bytes_stream()))
    }
}

/// Build the JSON request body for one streamed turn.
pub fn request_body(request: &ModelRequest) -> Value {
    let mut body = json!({
        "model": request.model,
        "messages": request.messages.iter().map(message_json).collect::<Vec<_>>(),
        "temperature": request.temperature,
        "stream": true,
    });

    // `tool_choice` without `tools` is rejected by the API.
    if !request.tools.is_empty() {
        body["tools"] = request
            .tools
            .iter()
            .map(|tool| {
                json!({
                    "type": "function",
                    "function": {
                        "name": tool.name,
                        "description": tool.description,
                        "parameters": tool.input_schema,
                    }
                })
            })
            .collect();
        body["tool_choice"] = json!(request.tool_choice);
    }

    body
}

fn message_json(message: &ChatMessage) -> Value {
    let role = match message.role {
        MessageRole::System => "system",
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
        MessageRole::Tool => "tool",
    };

    let content = match &message.content {
        MessageContent::Text(text) if text.is_empty() && !message.tool_calls.is_empty() => {
            Value::Null
        }
        MessageContent::Text(text) => json!(text),
        MessageContent::Parts(parts) => parts
            .iter()
            .map(|part| match part {
                ContentPart::Text { text } => json!({ "type": "text", "text": text }),
                ContentPart::ImageUrl { url } => {
                    json!({ "type": "image_url", "image_url": { "url": url } })
                }
            })
            .collect(),
    };

    let mut value = json!({ "role": role, "content": content });

    if !message.tool_calls.is_empty() {
        value["tool_calls"] = message
            .tool_calls
            .iter()
            .map(|call| {
                json!({
                    "id": call.id,
                    "type": "function",
                    "function": {
                        "name": call.name,
                        "arguments": call.arguments.to_string(),
                    }
                })
            })
            .collect();
    }
    if let Some(ref id) = message.tool_call_id {
        value["tool_call_id"] = json!(id);
    }

    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use narrator_core::{ToolCall, ToolChoice, ToolSpec};

    fn request(tools: Vec<ToolSpec>, tool_choice: ToolChoice) -> ModelRequest {
        ModelRequest {
            model: "gpt-4o-mini".to_string(),
            messages: vec![
                ChatMessage::system("You narrate."),
                ChatMessage::assistant("前回の発言。"),
                ChatMessage::user("実況して", Some("data:image/png;base64,AAAA")),
            ],
            tools,
            tool_choice,
            temperature: 1.2,
        }
    }

    fn avatar_spec() -> ToolSpec {
        ToolSpec {
            name: "setAvatar".to_string(),
            description: "Update current avatar".to_string(),
            input_schema: json!({ "type": "object" }),
        }
    }

    #[test]
    fn test_body_shape() {
        let body = request_body(&request(vec![avatar_spec()], ToolChoice::Auto));

        assert_eq!(body["stream"], json!(true));
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["messages"][0], json!({ "role": "system", "content": "You narrate." }));
        assert_eq!(body["messages"][1]["role"], "assistant");
        assert_eq!(
            body["messages"][2]["content"],
            json!([
                { "type": "text", "text": "実況して" },
                { "type": "image_url", "image_url": { "url": "data:image/png;base64,AAAA" } }
            ])
        );
        assert_eq!(body["tools"][0]["function"]["name"], "setAvatar");
        assert_eq!(body["tool_choice"], "auto");
    }

    #[test]
    fn test_no_tools_omits_tool_choice() {
        let body = request_body(&request(Vec::new(), ToolChoice::None));
        assert!(body.get("tools").is_none());
        assert!(body.get("tool_choice").is_none());
    }

    #[test]
    fn test_tool_messages() {
        let call = ToolCall {
            id: "call_1".to_string(),
            name: "setAvatar".to_string(),
            arguments: json!({ "name": "喜び" }),
        };
        let assistant = message_json(&ChatMessage::assistant_tool_calls("", vec![call]));
        assert_eq!(assistant["content"], Value::Null);
        assert_eq!(assistant["tool_calls"][0]["id"], "call_1");
        assert_eq!(
            assistant["tool_calls"][0]["function"]["arguments"],
            "{\"name\":\"喜び\"}"
        );

        let result = message_json(&ChatMessage::tool_result("call_1", "ok"));
        assert_eq!(result, json!({ "role": "tool", "content": "ok", "tool_call_id": "call_1" }));
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let model = OpenAiCompatModel::new(&OpenAiConfig::new("http://localhost:8080/v1/")).unwrap();
        assert_eq!(model.endpoint(), "http://localhost:8080/v1/chat/completions");
    }
}
