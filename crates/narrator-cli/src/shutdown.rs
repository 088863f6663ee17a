//! Orderly exit of the stdin loop.

use std::future::Future;

use narrator_dispatch::{Dispatcher, QueueState};
use tracing::info;

/// Why the stdin loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// stdin closed; queued requests still get spoken.
    EndOfInput,
    /// Ctrl-C; queued requests are dropped.
    Interrupted,
}

/// Shut the dispatcher down.
///
/// On [`ExitReason::EndOfInput`] this first waits for the queue to go idle,
/// or for `abort` to resolve, whichever comes first.
pub async fn wind_down(dispatcher: &Dispatcher, reason: ExitReason, abort: impl Future<Output = ()>) {
    if reason == ExitReason::EndOfInput {
        let mut state = dispatcher.subscribe_idle();
        tokio::select! {
            _ = state.wait_for(QueueState::is_idle) => {}
            () = abort => info!("Dropping queued requests"),
        }
    }
    dispatcher.shutdown();
}

#[cfg(test)]
mod tests {
    use std::future;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use narrator_core::{
        CancellationToken, GenerationError, LanguageModel, ModelEventStream, ModelRequest,
        SpeechRequest, SpeechSynthesizer, SynthesisError,
    };
    use narrator_dispatch::{DispatchError, DispatcherConfig, DispatcherDeps};
    use narrator_llm::{GenerationSession, SessionConfig, ToolRegistry};

    use super::*;

    struct NoModel;

    #[async_trait]
    impl LanguageModel for NoModel {
        async fn stream(
            &self,
            _request: ModelRequest,
            _cancel: &CancellationToken,
        ) -> Result<ModelEventStream, GenerationError> {
            Err(GenerationError::Model("unused".to_string()))
        }
    }

    /// Hangs on text containing `…` until cancelled.
    struct StallingSynth;

    #[async_trait]
    impl SpeechSynthesizer for StallingSynth {
        async fn synthesize(
            &self,
            text: &str,
            cancel: &CancellationToken,
        ) -> Result<Vec<u8>, SynthesisError> {
            if text.contains('…') {
                cancel.cancelled().await;
                return Err(SynthesisError::Cancelled);
            }
            Ok(text.as_bytes().to_vec())
        }
    }

    fn dispatcher() -> Dispatcher {
        let session = GenerationSession::new(
            Arc::new(NoModel),
            ToolRegistry::new(),
            SessionConfig::new("test-model", "You narrate."),
        );
        let deps = DispatcherDeps::new(session, Arc::new(StallingSynth));
        // The command receiver is dropped; emits are silently discarded.
        Dispatcher::new(deps, DispatcherConfig::default()).0
    }

    async fn wait_until_active(dispatcher: &Dispatcher) {
        let mut state = dispatcher.subscribe_idle();
        state.wait_for(|s| s.active).await.unwrap();
    }

    async fn within_a_second(fut: impl Future<Output = ()>) {
        tokio::time::timeout(Duration::from_secs(1), fut)
            .await
            .expect("wind down should not block");
    }

    #[tokio::test]
    async fn test_interrupt_drops_queued_work() {
        let dispatcher = dispatcher();
        let active = dispatcher.dispatch(SpeechRequest::direct("えーと…"));
        wait_until_active(&dispatcher).await;
        let waiting = dispatcher.dispatch(SpeechRequest::direct("次。"));

        within_a_second(wind_down(
            &dispatcher,
            ExitReason::Interrupted,
            future::pending(),
        ))
        .await;

        assert!(dispatcher.is_shut_down());
        assert!(active.collect_segments().await.unwrap().is_empty());
        assert!(matches!(
            waiting.collect_segments().await,
            Err(DispatchError::ShutDown)
        ));
    }

    #[tokio::test]
    async fn test_end_of_input_finishes_queued_work() {
        let dispatcher = dispatcher();
        let first = dispatcher.dispatch(SpeechRequest::direct("一。"));
        let second = dispatcher.dispatch(SpeechRequest::direct("二。"));

        within_a_second(wind_down(
            &dispatcher,
            ExitReason::EndOfInput,
            future::pending(),
        ))
        .await;

        assert!(dispatcher.is_shut_down());
        assert_eq!(first.collect_segments().await.unwrap(), vec!["一。"]);
        assert_eq!(second.collect_segments().await.unwrap(), vec!["二。"]);
    }

    #[tokio::test]
    async fn test_end_of_input_abort_stops_waiting() {
        let dispatcher = dispatcher();
        let active = dispatcher.dispatch(SpeechRequest::direct("えーと…"));
        wait_until_active(&dispatcher).await;

        within_a_second(wind_down(
            &dispatcher,
            ExitReason::EndOfInput,
            future::ready(()),
        ))
        .await;

        assert!(dispatcher.is_shut_down());
        assert!(active.collect_segments().await.unwrap().is_empty());
    }
}
