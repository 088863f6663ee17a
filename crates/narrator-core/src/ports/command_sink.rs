//! Command sink trait for emitting presentation commands.
//!
//! The dispatcher owns the concrete sink (an ordered outbound channel).
//! Tools receive it through their execution context so side effects such as
//! an avatar change land in the same ordered stream as captions and audio.

use tokio_util::sync::CancellationToken;

use crate::domain::Command;

/// Destination for presentation commands.
pub trait CommandSink: Send + Sync {
    /// Emit `commands` as one uninterrupted, ordered run.
    ///
    /// Nothing is emitted if `token` is already cancelled when the sink
    /// takes its emission lock. Returns whether the run was emitted.
    fn emit_run(&self, token: &CancellationToken, commands: Vec<Command>) -> bool;
}

/// A sink that discards everything, for tests and contexts with no viewer.
#[derive(Debug, Clone, Default)]
pub struct NoopSink;

impl NoopSink {
    pub const fn new() -> Self {
        Self
    }
}

impl CommandSink for NoopSink {
    fn emit_run(&self, token: &CancellationToken, _commands: Vec<Command>) -> bool {
        !token.is_cancelled()
    }
}
