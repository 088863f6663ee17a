//! Caller side of a dispatch task.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::mpsc;

use crate::error::DispatchError;

pub(crate) type SegmentSender = mpsc::UnboundedSender<Result<String, DispatchError>>;

/// Display text of each segment, in emission order.
///
/// Yields a segment once its commands have been emitted. A failed task ends
/// with one `Err`; a cancelled task simply ends.
#[derive(Debug)]
pub struct SegmentStream {
    task_id: u64,
    rx: mpsc::UnboundedReceiver<Result<String, DispatchError>>,
}

impl SegmentStream {
    pub(crate) fn channel(task_id: u64) -> (SegmentSender, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { task_id, rx })
    }

    /// Stream that ends immediately with `error`.
    pub(crate) fn failed(task_id: u64, error: DispatchError) -> Self {
        let (tx, stream) = Self::channel(task_id);
        let _ = tx.send(Err(error));
        stream
    }

    pub const fn task_id(&self) -> u64 {
        self.task_id
    }

    pub async fn next_segment(&mut self) -> Option<Result<String, DispatchError>> {
        self.rx.recv().await
    }

    /// Wait for the task to finish and return all of its segments.
    pub async fn collect_segments(mut self) -> Result<Vec<String>, DispatchError> {
        let mut segments = Vec::new();
        while let Some(segment) = self.rx.recv().await {
            segments.push(segment?);
        }
        Ok(segments)
    }
}

impl Stream for SegmentStream {
    type Item = Result<String, DispatchError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
