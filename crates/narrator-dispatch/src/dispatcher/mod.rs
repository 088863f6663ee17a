//! Speech dispatcher.
//!
//! Turns [`SpeechRequest`]s into an ordered stream of presentation
//! commands, one task at a time.
//!
//! # Architecture
//!
//! - **Dispatcher**: cheap handle; `dispatch` enqueues synchronously
//! - **Runner**: one long-lived task that pulls the FIFO and runs each
//!   request to completion before taking the next
//! - **Emitter**: owns the outbound channel; every run of commands for one
//!   segment goes out under its lock
//!
//! # Concurrency Model
//!
//! - Single runner, started lazily on first dispatch, stopped by `shutdown`
//! - A panicking task fails with `TaskPanicked`; the runner moves on
//! - `Notify` wakes the runner when work arrives
//! - Each task gets a fresh token; the active slot keeps a clone tagged
//!   with a lease so a stale clear is a no-op
//! - Lock order: emitter → queue → active (consistent everywhere)

mod emitter;
mod segments;

use std::any::Any;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use narrator_core::text::split_all;
use narrator_core::{
    CancellationToken, Command, CommandSink, EmittedCommand, Extracted, FrontendConfig,
    SpeechRequest, SpeechSynthesizer, extract_directives,
};
use futures_util::FutureExt;
use narrator_llm::{GenerationSession, ToolContext, ToolStore};
use tokio::sync::{Notify, mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::error::DispatchError;
use emitter::Emitter;
use segments::SegmentSender;

pub use segments::SegmentStream;

/// Default number of tasks that may wait behind the active one.
pub const DEFAULT_MAX_QUEUED: usize = 64;

/// Collaborators the dispatcher composes.
#[derive(Clone)]
pub struct DispatcherDeps {
    pub session: GenerationSession,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    /// State shared by tools across tasks.
    pub tool_store: ToolStore,
}

impl DispatcherDeps {
    pub fn new(session: GenerationSession, synthesizer: Arc<dyn SpeechSynthesizer>) -> Self {
        Self {
            session,
            synthesizer,
            tool_store: ToolStore::new(),
        }
    }

    #[must_use]
    pub fn with_tool_store(mut self, tool_store: ToolStore) -> Self {
        self.tool_store = tool_store;
        self
    }
}

/// Dispatcher tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Waiting tasks beyond this are rejected with
    /// [`DispatchError::QueueFull`].
    pub max_queued: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_queued: DEFAULT_MAX_QUEUED,
        }
    }
}

/// Snapshot of the runner's load, published on every change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueState {
    /// A task is currently running.
    pub active: bool,
    /// Tasks waiting behind it.
    pub queued: usize,
}

impl QueueState {
    pub const fn is_idle(&self) -> bool {
        !self.active && self.queued == 0
    }
}

/// Lease ID for the active slot.
///
/// Prevents a finishing task from clearing a slot that already belongs
/// to its successor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct LeaseId(u64);

struct ActiveTask {
    lease: LeaseId,
    task_id: u64,
    token: CancellationToken,
}

/// One request waiting in the FIFO.
struct Task {
    id: u64,
    request: SpeechRequest,
    segments: SegmentSender,
}

impl Task {
    fn fail(self, error: DispatchError) {
        debug!(task = self.id, error = %error, "Task dropped before start");
        let _ = self.segments.send(Err(error));
    }
}

/// Handle to the speech dispatcher.
///
/// Cloning is cheap; all clones share one queue and one runner.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("state", &*self.inner.state_tx.borrow())
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

struct Inner {
    session: GenerationSession,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    tool_store: ToolStore,
    config: DispatcherConfig,
    emitter: Arc<Emitter>,
    /// Tasks not yet started.
    queue: Mutex<VecDeque<Task>>,
    /// Token of the running task.
    /// Lock order: always acquire queue lock before active lock.
    active: Mutex<Option<ActiveTask>>,
    lease_counter: AtomicU64,
    task_counter: AtomicU64,
    /// Notifier for waking the runner when work is available.
    queue_notify: Notify,
    /// Whether the runner has been started (never reset).
    runner_started: AtomicBool,
    /// Parent of every task token; cancelled by `shutdown`.
    shutdown: CancellationToken,
    state_tx: watch::Sender<QueueState>,
}

impl Dispatcher {
    /// Create a dispatcher and the receiving end of its command stream.
    ///
    /// The caller (the outer transport) drains the receiver; commands
    /// arrive in emission order, stamped with increasing `seq`.
    pub fn new(
        deps: DispatcherDeps,
        config: DispatcherConfig,
    ) -> (Self, mpsc::UnboundedReceiver<EmittedCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(QueueState::default());

        let inner = Inner {
            session: deps.session,
            synthesizer: deps.synthesizer,
            tool_store: deps.tool_store,
            config,
            emitter: Arc::new(Emitter::new(tx)),
            queue: Mutex::new(VecDeque::new()),
            active: Mutex::new(None),
            lease_counter: AtomicU64::new(0),
            task_counter: AtomicU64::new(0),
            queue_notify: Notify::new(),
            runner_started: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            state_tx,
        };

        (
            Self {
                inner: Arc::new(inner),
            },
            rx,
        )
    }

    /// Enqueue `request` and return its segment stream.
    ///
    /// An interrupting request first cancels the running task, discards
    /// every waiting task and emits `ClearQueue`. Must be called from
    /// within a Tokio runtime.
    pub fn dispatch(&self, request: SpeechRequest) -> SegmentStream {
        let inner = &self.inner;
        let id = inner.task_counter.fetch_add(1, Ordering::Relaxed) + 1;

        if inner.shutdown.is_cancelled() {
            return SegmentStream::failed(id, DispatchError::ShutDown);
        }
        if request.interrupt {
            inner.interrupt();
        }

        let (segments, stream) = SegmentStream::channel(id);
        {
            let mut queue = lock(&inner.queue);
            if queue.len() >= inner.config.max_queued {
                warn!(task = id, queued = queue.len(), "Dispatch queue full");
                return SegmentStream::failed(
                    id,
                    DispatchError::QueueFull {
                        capacity: inner.config.max_queued,
                    },
                );
            }
            debug!(
                task = id,
                direct = request.direct,
                interrupt = request.interrupt,
                queued = queue.len(),
                "Task enqueued"
            );
            queue.push_back(Task {
                id,
                request,
                segments,
            });
        }

        inner.publish_state();
        inner.queue_notify.notify_one();
        inner.ensure_runner();
        stream
    }

    /// Dispatch `request` and wait for all of its segments.
    pub async fn dispatch_collect(&self, request: SpeechRequest) -> Result<Vec<String>, DispatchError> {
        self.dispatch(request).collect_segments().await
    }

    /// Push viewer configuration to the display.
    pub fn announce_config(&self, config: FrontendConfig) {
        info!(idle_timeout_ms = ?config.idle_timeout_ms, "Announcing frontend config");
        self.inner.emitter.emit(Command::Configure { config });
    }

    /// Watch whether the runner is idle.
    pub fn subscribe_idle(&self) -> watch::Receiver<QueueState> {
        self.inner.state_tx.subscribe()
    }

    pub fn queue_state(&self) -> QueueState {
        *self.inner.state_tx.borrow()
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Resolves once [`shutdown`](Self::shutdown) has been called.
    pub async fn shut_down(&self) {
        self.inner.shutdown.cancelled().await;
    }

    /// Cancel the running task, discard waiting ones and stop the runner.
    ///
    /// Later dispatches fail with [`DispatchError::ShutDown`].
    pub fn shutdown(&self) {
        let inner = &self.inner;
        if inner.shutdown.is_cancelled() {
            return;
        }
        info!("Shutting down dispatcher");
        inner.shutdown.cancel();
        let discarded: Vec<Task> = lock(&inner.queue).drain(..).collect();
        for task in discarded {
            task.fail(DispatchError::ShutDown);
        }
        inner.publish_state();
        inner.queue_notify.notify_one();
    }
}

impl Inner {
    /// Ensure the runner is started.
    ///
    /// Idempotent: the runner runs until shutdown.
    fn ensure_runner(self: &Arc<Self>) {
        if self
            .runner_started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let inner = Arc::clone(self);
            tokio::spawn(async move {
                inner.run_loop().await;
            });
        }
    }

    async fn run_loop(&self) {
        debug!("Dispatcher runner started");
        loop {
            if self.shutdown.is_cancelled() {
                break;
            }
            if let Some((lease, task, token)) = self.next_task() {
                let (task_id, segments) = (task.id, task.segments.clone());
                let outcome = AssertUnwindSafe(self.run_task(task, &token))
                    .catch_unwind()
                    .await;
                if let Err(payload) = outcome {
                    let message = panic_message(payload.as_ref());
                    error!(task = task_id, panic = %message, "Task panicked");
                    let _ = segments.send(Err(DispatchError::TaskPanicked(message)));
                }
                self.finish_task(lease);
                continue;
            }
            tokio::select! {
                () = self.shutdown.cancelled() => break,
                () = self.queue_notify.notified() => {}
            }
        }
        debug!("Dispatcher runner stopped");
    }

    /// Pop the next task and make it active.
    ///
    /// The queue lock is held while the slot is filled, so an interrupt
    /// sees the task either waiting or active, never in between.
    fn next_task(&self) -> Option<(LeaseId, Task, CancellationToken)> {
        let task = {
            let mut queue = lock(&self.queue);
            let task = queue.pop_front()?;
            let lease = LeaseId(self.lease_counter.fetch_add(1, Ordering::Relaxed));
            let token = self.shutdown.child_token();
            *lock(&self.active) = Some(ActiveTask {
                lease,
                task_id: task.id,
                token: token.clone(),
            });
            (lease, task, token)
        };
        self.publish_state();
        Some(task)
    }

    /// Clear the active slot if it still belongs to `lease`.
    fn finish_task(&self, lease: LeaseId) {
        {
            let mut active = lock(&self.active);
            if active.as_ref().is_some_and(|a| a.lease == lease) {
                *active = None;
            } else {
                debug!(lease = lease.0, "Ignoring stale finish (lease mismatch)");
            }
        }
        self.publish_state();
    }

    /// Cancel the active task, discard waiting tasks, emit `ClearQueue`.
    fn interrupt(&self) {
        let (cancelled, discarded) = self.emitter.interrupt(|| {
            let discarded: Vec<Task> = lock(&self.queue).drain(..).collect();
            let cancelled = lock(&self.active).as_ref().map(|active| {
                active.token.cancel();
                active.task_id
            });
            (cancelled, discarded)
        });

        info!(cancelled = ?cancelled, discarded = discarded.len(), "Interrupt");
        for task in discarded {
            task.fail(DispatchError::Discarded);
        }
        self.publish_state();
    }

    fn publish_state(&self) {
        let state = {
            let queue = lock(&self.queue);
            let active = lock(&self.active);
            QueueState {
                active: active.is_some(),
                queued: queue.len(),
            }
        };
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
    }

    // ── Task execution ─────────────────────────────────────────────

    async fn run_task(&self, task: Task, token: &CancellationToken) {
        info!(task = task.id, direct = task.request.direct, "Task started");

        let result = if task.request.direct {
            self.speak_direct(&task, token).await
        } else {
            self.speak_generated(&task, token).await
        };

        match result {
            Ok(()) if token.is_cancelled() => info!(task = task.id, "Task cancelled"),
            Ok(()) => info!(task = task.id, "Task finished"),
            Err(e) if e.is_cancellation() || token.is_cancelled() => {
                info!(task = task.id, "Task cancelled");
            }
            Err(e) => {
                warn!(task = task.id, error = %e, "Task failed");
                let _ = task.segments.send(Err(e));
            }
        }
    }

    async fn speak_direct(&self, task: &Task, token: &CancellationToken) -> Result<(), DispatchError> {
        for fragment in split_all(&task.request.text) {
            if token.is_cancelled() {
                break;
            }
            self.speak(task, token, &fragment).await?;
        }
        Ok(())
    }

    async fn speak_generated(&self, task: &Task, token: &CancellationToken) -> Result<(), DispatchError> {
        let sink: Arc<dyn CommandSink> = self.emitter.clone();
        let tool_ctx = ToolContext::new(sink, self.tool_store.clone());
        let mut stream = self.session.stream(
            &task.request.text,
            task.request.image_url.as_deref(),
            token.clone(),
            tool_ctx,
        );

        // Keep pulling after cancellation so the stream records what was
        // generated so far; `speak` is a no-op for a cancelled token.
        while let Some(fragment) = stream.next_segment().await? {
            self.speak(task, token, &fragment).await?;
        }
        Ok(())
    }

    /// Emit one fragment: directives, then caption, then audio.
    async fn speak(&self, task: &Task, token: &CancellationToken, fragment: &str) -> Result<(), DispatchError> {
        if token.is_cancelled() {
            return Ok(());
        }

        let Extracted {
            display_text,
            mut commands,
        } = extract_directives(fragment);

        let spoken = !display_text.trim().is_empty();
        if spoken {
            let audio = self.synthesizer.synthesize(&display_text, token).await?;
            commands.push(Command::UpdateCaption {
                caption: display_text.clone(),
            });
            if audio.is_empty() {
                debug!(task = task.id, "Synthesizer returned no audio");
            } else {
                commands.push(Command::PlayAudio { audio });
            }
        }

        if commands.is_empty() {
            return Ok(());
        }
        if self.emitter.emit_run(token, commands) && spoken {
            debug!(task = task.id, chars = display_text.chars().count(), "Segment emitted");
            let _ = task.segments.send(Ok(display_text));
        }
        Ok(())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
