//! Server-sent events decoder for streamed Chat Completions.
//!
//! SSE format: `data: {"choices":[{"delta":{"content":"hi"}}]}\n\n`, ended
//! by `data: [DONE]`. Lines may be split across network chunks, so bytes
//! are buffered until a full line is available.
//!
//! Tool calls arrive as fragments keyed by `index`: the first fragment
//! carries the id and function name, later ones append to the arguments
//! string. They are assembled here and emitted, in index order, when the
//! turn finishes.

use std::collections::{BTreeMap, VecDeque};

use bytes::{Bytes, BytesMut};
use futures_util::{Stream, StreamExt};
use narrator_core::{GenerationError, ModelEvent, ModelEventStream, ToolCall};
use serde_json::Value;
use tracing::{debug, warn};

type Item = Result<ModelEvent, GenerationError>;

/// A tool call being assembled from deltas.
#[derive(Debug, Default)]
struct PartialCall {
    id: String,
    name: String,
    arguments: String,
}

/// State threaded through the `unfold` stream.
struct SseState {
    stream: futures_util::stream::BoxStream<'static, Result<Bytes, reqwest::Error>>,
    buf: BytesMut,
    calls: BTreeMap<u64, PartialCall>,
    queue: VecDeque<Item>,
    done: bool,
}

/// Decode an SSE byte stream into model events.
pub fn model_events<S>(byte_stream: S) -> ModelEventStream
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
{
    let state = SseState {
        stream: byte_stream.boxed(),
        buf: BytesMut::new(),
        calls: BTreeMap::new(),
        queue: VecDeque::new(),
        done: false,
    };

    futures_util::stream::unfold(state, |mut st| async move {
        loop {
            if let Some(item) = st.queue.pop_front() {
                return Some((item, st));
            }
            if st.done {
                return None;
            }

            // Try to extract a complete SSE line from the buffer.
            if let Some(pos) = st.buf.iter().position(|b| *b == b'\n') {
                let line = st.buf.split_to(pos + 1);
                st.handle_line(&String::from_utf8_lossy(&line));
                continue;
            }

            match st.stream.next().await {
                Some(Ok(bytes)) => st.buf.extend_from_slice(&bytes),
                Some(Err(e)) => {
                    st.done = true;
                    return Some((Err(GenerationError::Transport(e.to_string())), st));
                }
                None => {
                    // Flush a trailing line without newline.
                    if !st.buf.is_empty() {
                        let rest = st.buf.split();
                        st.handle_line(&String::from_utf8_lossy(&rest));
                    }
                    if !st.done {
                        debug!("SSE stream ended without [DONE]");
                        st.finish();
                    }
                }
            }
        }
    })
    .boxed()
}

impl SseState {
    fn handle_line(&mut self, line: &str) {
        if self.done {
            return;
        }
        let trimmed = line.trim();

        // Skip empty lines and SSE comments.
        if trimmed.is_empty() || trimmed.starts_with(':') {
            return;
        }

        // `event:`, `id:` and `retry:` fields carry nothing we use.
        let Some(data) = trimmed.strip_prefix("data:") else {
            return;
        };
        let data = data.trim();

        if data == "[DONE]" {
            self.finish();
            return;
        }

        let chunk: Value = match serde_json::from_str(data) {
            Ok(v) => v,
            Err(e) => {
                self.fail(GenerationError::MalformedEvent(format!("{e}: {data}")));
                return;
            }
        };

        if let Some(error) = chunk.get("error") {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .map_or_else(|| error.to_string(), str::to_string);
            self.queue.push_back(Ok(ModelEvent::Error(message)));
            self.done = true;
            return;
        }

        let delta = &chunk["choices"][0]["delta"];

        if let Some(content) = delta.get("content").and_then(Value::as_str) {
            if !content.is_empty() {
                self.queue
                    .push_back(Ok(ModelEvent::TextDelta(content.to_string())));
            }
        }

        if let Some(fragments) = delta.get("tool_calls").and_then(Value::as_array) {
            for fragment in fragments {
                self.accumulate(fragment);
            }
        }
    }

    fn accumulate(&mut self, fragment: &Value) {
        let index = fragment.get("index").and_then(Value::as_u64).unwrap_or(0);
        let entry = self.calls.entry(index).or_default();

        if let Some(id) = fragment.get("id").and_then(Value::as_str) {
            entry.id = id.to_string();
        }
        if let Some(function) = fragment.get("function") {
            if let Some(name) = function.get("name").and_then(Value::as_str) {
                entry.name.push_str(name);
            }
            if let Some(args) = function.get("arguments").and_then(Value::as_str) {
                entry.arguments.push_str(args);
            }
        }
    }

    /// End of turn: emit assembled tool calls, then `Done`.
    fn finish(&mut self) {
        for (index, call) in std::mem::take(&mut self.calls) {
            if call.name.is_empty() {
                warn!(index, "Dropping tool call without a function name");
                continue;
            }
            let arguments = if call.arguments.trim().is_empty() {
                Value::Object(serde_json::Map::new())
            } else {
                serde_json::from_str(&call.arguments).unwrap_or_else(|e| {
                    warn!(tool = %call.name, error = %e, "Tool arguments are not valid JSON");
                    Value::String(call.arguments.clone())
                })
            };
            let id = if call.id.is_empty() {
                format!("call_{index}")
            } else {
                call.id
            };
            self.queue.push_back(Ok(ModelEvent::ToolCall(ToolCall {
                id,
                name: call.name,
                arguments,
            })));
        }
        self.queue.push_back(Ok(ModelEvent::Done));
        self.done = true;
    }

    fn fail(&mut self, error: GenerationError) {
        self.queue.push_back(Err(error));
        self.done = true;
    }
}
