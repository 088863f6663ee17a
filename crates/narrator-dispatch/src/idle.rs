//! Idle chatter.
//!
//! [`IdleScheduler`] watches the dispatcher's [`QueueState`] and, once the
//! queue has stayed idle for the configured timeout, dispatches the idle
//! prompt as an ordinary generated request. Any activity restarts the
//! timer, including the idle request itself.

use std::time::Duration;

use narrator_core::{CancellationToken, IdleSettings, SpeechRequest};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::dispatcher::{Dispatcher, QueueState};

/// Background task that keeps the narrator talking when nobody asks.
#[derive(Debug)]
pub struct IdleScheduler {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl IdleScheduler {
    /// Start watching `dispatcher`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(dispatcher: Dispatcher, settings: IdleSettings) -> Self {
        let cancel = CancellationToken::new();
        let timeout = Duration::from_millis(settings.timeout_ms);
        let state = dispatcher.subscribe_idle();
        info!(timeout_ms = settings.timeout_ms, "Idle scheduler started");

        let handle = tokio::spawn(run(dispatcher, state, timeout, settings.prompt, cancel.clone()));
        Self { cancel, handle }
    }

    /// Stop the scheduler and wait for its task to exit.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            warn!(error = %e, "Idle scheduler task ended abnormally");
        }
    }
}

async fn run(
    dispatcher: Dispatcher,
    mut state: watch::Receiver<QueueState>,
    timeout: Duration,
    prompt: String,
    cancel: CancellationToken,
) {
    loop {
        // Wait until nothing is running or queued.
        loop {
            let idle = state.borrow_and_update().is_idle();
            if idle {
                break;
            }
            tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                () = dispatcher.shut_down() => return,
                changed = state.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            () = dispatcher.shut_down() => return,
            changed = state.changed() => {
                if changed.is_err() {
                    return;
                }
                debug!("Activity before idle timeout, timer reset");
            }
            () = tokio::time::sleep(timeout) => {
                info!(timeout = ?timeout, "Queue idle, dispatching idle prompt");
                // Segments are not needed; the commands reach the viewer anyway.
                drop(dispatcher.dispatch(SpeechRequest::generate(prompt.clone())));
            }
        }
    }
}
