//! Speech dispatch for narrator.
//!
//! [`Dispatcher`] is the single-worker queue that turns speech requests
//! into an ordered stream of presentation commands. [`IdleScheduler`]
//! feeds it an idle prompt when nothing else is happening.

pub mod dispatcher;
pub mod error;
pub mod idle;

pub use dispatcher::{
    DEFAULT_MAX_QUEUED, Dispatcher, DispatcherConfig, DispatcherDeps, QueueState, SegmentStream,
};
pub use error::DispatchError;
pub use idle::IdleScheduler;
