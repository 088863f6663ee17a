//! Ordered command emission.
//!
//! Every command leaves the dispatcher through one [`Emitter`]. A single
//! lock covers sequence stamping and the channel send, so a run of
//! commands is never interleaved with another run, and the token check in
//! [`CommandSink::emit_run`] cannot race an interrupt.

use std::sync::{Mutex, MutexGuard, PoisonError};

use narrator_core::{CancellationToken, Command, CommandSink, EmittedCommand};
use tokio::sync::mpsc;
use tracing::{debug, trace};

struct EmitterState {
    /// Sequence number of the last emitted command.
    seq: u64,
    tx: mpsc::UnboundedSender<EmittedCommand>,
    /// Set once the receiver is gone, to log that only once.
    closed: bool,
}

/// Owner of the outbound command channel.
pub(crate) struct Emitter {
    state: Mutex<EmitterState>,
}

impl Emitter {
    pub(crate) fn new(tx: mpsc::UnboundedSender<EmittedCommand>) -> Self {
        Self {
            state: Mutex::new(EmitterState {
                seq: 0,
                tx,
                closed: false,
            }),
        }
    }

    /// Emit a command that belongs to no task.
    pub(crate) fn emit(&self, command: Command) {
        let mut state = self.lock();
        send(&mut state, command);
    }

    /// Run `cancel` and emit `ClearQueue` under the emission lock.
    ///
    /// Any run checked after this returns sees the cancelled token, so
    /// nothing from the interrupted task follows the `ClearQueue`.
    pub(crate) fn interrupt<T>(&self, cancel: impl FnOnce() -> T) -> T {
        let mut state = self.lock();
        let out = cancel();
        send(&mut state, Command::ClearQueue);
        out
    }

    fn lock(&self) -> MutexGuard<'_, EmitterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CommandSink for Emitter {
    fn emit_run(&self, token: &CancellationToken, commands: Vec<Command>) -> bool {
        let mut state = self.lock();
        if token.is_cancelled() {
            trace!(commands = commands.len(), "Dropping run of cancelled task");
            return false;
        }
        for command in commands {
            send(&mut state, command);
        }
        true
    }
}

fn send(state: &mut EmitterState, command: Command) {
    state.seq += 1;
    trace!(seq = state.seq, kind = command.kind(), "Emitting command");
    let emitted = EmittedCommand {
        seq: state.seq,
        command,
    };
    if state.tx.send(emitted).is_err() && !state.closed {
        state.closed = true;
        debug!("Command receiver dropped; further commands are discarded");
    }
}
