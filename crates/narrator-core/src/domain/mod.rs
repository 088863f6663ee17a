//! Domain types for the speech dispatch engine.

pub mod chat;
pub mod command;
pub mod history;
pub mod request;

pub use chat::{ChatMessage, ContentPart, MessageContent, MessageRole, ToolCall};
pub use command::{Command, EmittedCommand, FrontendConfig};
pub use history::ConversationHistory;
pub use request::SpeechRequest;
