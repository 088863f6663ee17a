//! Tools the model may call mid-generation.
//!
//! Tools are registered once, before the first dispatch, in a
//! [`ToolRegistry`] that keeps registration order (the order they are
//! advertised to the model). A tool failure never aborts generation: the
//! registry turns it into an `Error: ...` tool result so the model can see
//! what went wrong and carry on.

mod avatar;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use indexmap::IndexMap;
use narrator_core::{CancellationToken, CommandSink, ToolCall, ToolSpec};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

pub use avatar::SetAvatarTool;

/// Errors a tool reports back to the model.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("{0}")]
    Execution(String),
}

/// Key/value state shared by tools across calls and tasks.
#[derive(Debug, Clone, Default)]
pub struct ToolStore {
    inner: Arc<Mutex<HashMap<String, Value>>>,
}

impl ToolStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.lock().get(key).cloned()
    }

    /// Insert `value`, returning the previous value.
    pub fn insert(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.lock().insert(key.into(), value)
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.lock().remove(key)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Value>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// What a tool can reach while it runs.
#[derive(Clone)]
pub struct ToolContext {
    /// Ordered command stream of the dispatcher.
    pub sink: Arc<dyn CommandSink>,
    /// Token of the task the call belongs to.
    pub token: CancellationToken,
    pub store: ToolStore,
}

impl ToolContext {
    pub fn new(sink: Arc<dyn CommandSink>, store: ToolStore) -> Self {
        Self {
            sink,
            token: CancellationToken::new(),
            store,
        }
    }

    /// Same sink and store, bound to `token`.
    #[must_use]
    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }
}

impl std::fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolContext")
            .field("cancelled", &self.token.is_cancelled())
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

/// A capability the model can invoke.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name used in function calls.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema of the arguments object.
    fn input_schema(&self) -> Value;

    /// Run the tool. The returned string is fed back to the model.
    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<String, ToolError>;

    /// Description advertised to the model.
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }
}

/// Registered tools, in registration order.
#[derive(Default)]
pub struct ToolRegistry {
    tools: IndexMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            warn!(tool = %name, "Replacing previously registered tool");
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.values().map(|tool| tool.spec()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Execute `call` and return the tool result text.
    ///
    /// Unknown tools and tool failures come back as `Error: ...`.
    pub async fn execute(&self, call: &ToolCall, ctx: &ToolContext) -> String {
        let Some(tool) = self.tools.get(&call.name) else {
            warn!(tool = %call.name, "Model called an unknown tool");
            return format!("Error: Tool '{}' not found", call.name);
        };

        debug!(tool = %call.name, call_id = %call.id, "Executing tool");
        match tool.execute(call.arguments.clone(), ctx).await {
            Ok(output) => output,
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Tool failed");
                format!("Error: {e}")
            }
        }
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}
