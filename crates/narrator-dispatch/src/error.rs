//! Errors observed by callers of [`Dispatcher::dispatch`](crate::Dispatcher::dispatch).

use narrator_core::{GenerationError, SynthesisError};
use thiserror::Error;

/// Why a dispatch task did not run to completion.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The language model failed mid-generation.
    #[error("Generation failed: {0}")]
    Generation(#[from] GenerationError),

    /// The speech service failed for one of the task's fragments.
    #[error("Synthesis failed: {0}")]
    Synthesis(#[from] SynthesisError),

    /// An interrupting request dropped the task before it started.
    #[error("Task discarded by an interrupt before it started")]
    Discarded,

    /// The queue already holds the configured maximum of waiting tasks.
    #[error("Dispatch queue is full ({capacity} tasks waiting)")]
    QueueFull { capacity: usize },

    /// A collaborator panicked while the task was running.
    #[error("Task panicked: {0}")]
    TaskPanicked(String),

    /// The dispatcher was shut down before the task could finish.
    #[error("Dispatcher is shut down")]
    ShutDown,
}

impl DispatchError {
    /// Whether the error only reports that the task's token was cancelled.
    ///
    /// A cancelled task ends its segment stream normally instead of
    /// surfacing one of these.
    pub const fn is_cancellation(&self) -> bool {
        matches!(
            self,
            Self::Generation(GenerationError::Cancelled) | Self::Synthesis(SynthesisError::Cancelled)
        )
    }
}
