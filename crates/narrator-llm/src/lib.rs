//! Language model side of narrator.
//!
//! - [`openai`]: streaming Chat Completions client implementing the
//!   [`LanguageModel`](narrator_core::LanguageModel) port
//! - [`tools`]: tool trait, registry and the built-in avatar tool
//! - [`session`]: [`GenerationSession`], which composes the conversation,
//!   runs the bounded tool loop and yields speakable segments

pub mod openai;
pub mod session;
pub mod tools;

pub use openai::{OpenAiCompatModel, OpenAiConfig};
pub use session::{GenerationSession, GenerationStream, SessionConfig};
pub use tools::{SetAvatarTool, Tool, ToolContext, ToolError, ToolRegistry, ToolStore};
