//! Streaming normalizer
//!
//! [`ChunkStream`] runs every raw SSE payload through the owning provider's
//! chunk parser and yields canonical [`StreamEvent`]s. Tool-call fragments are
//! collected by index and emitted as whole [`ToolCall`]s once the vendor
//! reports a finish reason.
//!
//! Transform combinators (`filter`, `map`, `take`, `skip`) act on content
//! deltas only. Tool-call assembly and the final summary always see every
//! chunk the vendor sent.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::{Stream, StreamExt};
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

use crate::error::LlmError;
use crate::provider::Provider;
use crate::transport::RawEventStream;
use crate::types::{FinishReason, StreamChunk, StreamEvent, StreamState, StreamSummary, ToolCall, ToolCallDelta, Usage, parse_arguments};

type ChunkHook = Box<dyn FnMut(&StreamChunk) + Send>;
type CompleteHook = Box<dyn FnOnce(&StreamSummary) + Send>;
type ErrorHook = Box<dyn FnMut(&str) + Send>;

/// Handle that cancels a [`ChunkStream`] from another task
#[derive(Debug, Clone)]
pub struct StreamCancelHandle(CancellationToken);

impl StreamCancelHandle {
    /// Stop the stream; no further deltas are delivered
    pub fn cancel(&self) {
        self.0.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.is_cancelled()
    }
}

/// In-progress tool call
#[derive(Debug, Default)]
struct PartialToolCall {
    /// Index the vendor gave the call
    index: u32,
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

impl PartialToolCall {
    fn build(self) -> Result<ToolCall, String> {
        let index = self.index;
        let Some(name) = self.name else {
            return Err(format!("tool call at index {index} ended without a name"));
        };
        let id = self.id.unwrap_or_else(|| format!("call_{index}"));
        Ok(ToolCall::new(id, name, parse_arguments(&self.arguments)))
    }
}

/// Arena of partial tool calls, drained in arrival order
///
/// Fragments are routed to slots by vendor index. A `whole` fragment always
/// opens a fresh slot, since vendors that send whole calls restart their
/// index in every payload.
#[derive(Debug, Default)]
pub(crate) struct ToolCallAccumulator {
    calls: BTreeMap<u32, PartialToolCall>,
    slots: HashMap<u32, u32>,
    next_slot: u32,
    issued_ids: HashSet<String>,
}

impl ToolCallAccumulator {
    /// Merge one fragment; argument text is appended in arrival order
    pub(crate) fn push(&mut self, delta: &ToolCallDelta) {
        let slot = match self.slots.get(&delta.index) {
            Some(&slot) if !delta.whole => slot,
            _ => {
                let slot = self.next_slot;
                self.next_slot += 1;
                self.slots.insert(delta.index, slot);
                slot
            }
        };
        let entry = self.calls.entry(slot).or_insert_with(|| PartialToolCall {
            index: delta.index,
            ..PartialToolCall::default()
        });

        if let Some(id) = delta.id.as_deref().filter(|id| !id.is_empty()) {
            entry.id = Some(id.to_owned());
        }
        if let Some(name) = delta.name.as_deref().filter(|name| !name.is_empty()) {
            entry.name = Some(name.to_owned());
        }
        if let Some(arguments) = &delta.arguments {
            entry.arguments.push_str(arguments);
        }
    }

    /// Finalize and evict every entry
    ///
    /// Ids stay unique for the life of the stream; a repeated id gets the
    /// slot number appended.
    pub(crate) fn drain(&mut self) -> Vec<Result<ToolCall, String>> {
        self.slots.clear();

        std::mem::take(&mut self.calls)
            .into_iter()
            .map(|(slot, partial)| {
                let mut call = partial.build()?;
                if !self.issued_ids.insert(call.id.clone()) {
                    call.id = format!("{}_{slot}", call.id);
                    self.issued_ids.insert(call.id.clone());
                }
                Ok(call)
            })
            .collect()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

enum Transform {
    Filter(Box<dyn FnMut(&StreamChunk) -> bool + Send>),
    Map(Box<dyn FnMut(StreamChunk) -> StreamChunk + Send>),
    Take(usize),
    Skip(usize),
}

#[derive(Default)]
struct Pipeline {
    transforms: Vec<Transform>,
    /// A `take` limit was reached
    exhausted: bool,
}

impl Pipeline {
    fn apply(&mut self, mut chunk: StreamChunk) -> Option<StreamChunk> {
        for transform in &mut self.transforms {
            match transform {
                Transform::Filter(keep) => {
                    if !keep(&chunk) {
                        return None;
                    }
                }
                Transform::Map(f) => chunk = f(chunk),
                Transform::Skip(remaining) => {
                    if *remaining > 0 {
                        *remaining -= 1;
                        return None;
                    }
                }
                Transform::Take(remaining) => {
                    if *remaining == 0 {
                        self.exhausted = true;
                        return None;
                    }
                    *remaining -= 1;
                    if *remaining == 0 {
                        self.exhausted = true;
                    }
                }
            }
        }
        Some(chunk)
    }
}

/// Canonical event stream over one provider response
pub struct ChunkStream {
    provider: Arc<dyn Provider>,
    raw: Option<RawEventStream>,
    state: StreamState,
    accumulator: ToolCallAccumulator,
    pipeline: Pipeline,
    pending: VecDeque<StreamEvent>,
    content: String,
    tool_calls: Vec<ToolCall>,
    finish_reason: Option<FinishReason>,
    usage: Option<Usage>,
    errors: Vec<String>,
    on_chunk: Option<ChunkHook>,
    on_complete: Option<CompleteHook>,
    on_error: Option<ErrorHook>,
    token: CancellationToken,
    cancelled: Pin<Box<WaitForCancellationFutureOwned>>,
}

impl ChunkStream {
    pub fn new(provider: Arc<dyn Provider>, raw: RawEventStream) -> Self {
        let token = CancellationToken::new();
        let cancelled = Box::pin(token.clone().cancelled_owned());

        Self {
            provider,
            raw: Some(raw),
            state: StreamState::Idle,
            accumulator: ToolCallAccumulator::default(),
            pipeline: Pipeline::default(),
            pending: VecDeque::new(),
            content: String::new(),
            tool_calls: Vec::new(),
            finish_reason: None,
            usage: None,
            errors: Vec::new(),
            on_chunk: None,
            on_complete: None,
            on_error: None,
            token,
            cancelled,
        }
    }

    pub const fn state(&self) -> StreamState {
        self.state
    }

    pub fn cancel_handle(&self) -> StreamCancelHandle {
        StreamCancelHandle(self.token.clone())
    }

    /// Cancel the stream; the next poll yields the final summary
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Called with every delivered content delta
    #[must_use]
    pub fn on_chunk(mut self, hook: impl FnMut(&StreamChunk) + Send + 'static) -> Self {
        self.on_chunk = Some(Box::new(hook));
        self
    }

    /// Called exactly once when the stream completes, errors, or is cancelled
    #[must_use]
    pub fn on_complete(mut self, hook: impl FnOnce(&StreamSummary) + Send + 'static) -> Self {
        self.on_complete = Some(Box::new(hook));
        self
    }

    /// Called for in-band errors and transport failures
    #[must_use]
    pub fn on_error(mut self, hook: impl FnMut(&str) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(hook));
        self
    }

    /// Drop deltas for which `keep` returns false
    #[must_use]
    pub fn filter(mut self, keep: impl FnMut(&StreamChunk) -> bool + Send + 'static) -> Self {
        self.pipeline.transforms.push(Transform::Filter(Box::new(keep)));
        self
    }

    /// Rewrite each delta
    #[must_use]
    pub fn map(mut self, f: impl FnMut(StreamChunk) -> StreamChunk + Send + 'static) -> Self {
        self.pipeline.transforms.push(Transform::Map(Box::new(f)));
        self
    }

    /// Deliver at most `n` deltas, then end the stream
    #[must_use]
    pub fn take(mut self, n: usize) -> Self {
        self.pipeline.transforms.push(Transform::Take(n));
        self
    }

    /// Discard the first `n` deltas
    #[must_use]
    pub fn skip(mut self, n: usize) -> Self {
        self.pipeline.transforms.push(Transform::Skip(n));
        self
    }

    /// Drain the stream into one aggregate
    ///
    /// # Errors
    ///
    /// Returns `LlmError::Streaming` if the transport failed mid-stream
    pub async fn collect(mut self) -> Result<StreamSummary, LlmError> {
        while let Some(event) = self.next().await {
            if let StreamEvent::Done(summary) = event {
                if summary.state == StreamState::Errored {
                    let message = summary.errors.last().cloned().unwrap_or_default();
                    return Err(LlmError::Streaming(message));
                }
                return Ok(summary);
            }
        }

        Err(LlmError::Streaming("stream ended without a summary".to_owned()))
    }

    fn ingest(&mut self, data: &str) {
        let mut chunk = self.provider.parse_stream_chunk(data);

        if let Some(message) = chunk.error.take() {
            tracing::warn!(provider = %self.provider.name(), error = %message, "stream chunk reported an error");
            self.report_error(message);
        }

        if let Some(usage) = chunk.usage {
            self.usage = Some(self.usage.map_or(usage, |seen| seen.merge(usage)));
        }
        if chunk.finish_reason.is_some() {
            self.finish_reason = chunk.finish_reason;
        }

        for delta in &chunk.tool_calls {
            self.accumulator.push(delta);
        }

        let finished_calls = chunk.finish_reason.is_some();
        let complete = chunk.complete;

        if carries_delta(&chunk)
            && let Some(chunk) = self.pipeline.apply(chunk)
        {
            if let Some(text) = &chunk.content {
                self.content.push_str(text);
            }
            if let Some(hook) = self.on_chunk.as_mut() {
                hook(&chunk);
            }
            self.pending.push_back(StreamEvent::Delta(chunk));
        }

        if finished_calls || complete {
            self.flush_tool_calls();
        }
        if complete {
            self.finish(StreamState::Complete);
        }
    }

    fn flush_tool_calls(&mut self) {
        if self.accumulator.is_empty() {
            return;
        }

        for assembled in self.accumulator.drain() {
            match assembled {
                Ok(call) => {
                    tracing::debug!(provider = %self.provider.name(), tool = %call.name, id = %call.id, "tool call assembled");
                    self.tool_calls.push(call.clone());
                    self.pending.push_back(StreamEvent::ToolCall(call));
                }
                Err(message) => self.report_error(message),
            }
        }
    }

    fn report_error(&mut self, message: String) {
        if let Some(hook) = self.on_error.as_mut() {
            hook(&message);
        }
        self.errors.push(message.clone());
        self.pending.push_back(StreamEvent::Error(message));
    }

    /// Move to a terminal state and queue the summary
    fn finish(&mut self, state: StreamState) {
        if self.state.is_terminal() {
            return;
        }

        if state == StreamState::Cancelled {
            self.pending.clear();
        } else {
            self.flush_tool_calls();
        }

        // Dropping the raw stream closes the upstream connection
        self.raw = None;
        self.state = state;

        let summary = StreamSummary {
            content: std::mem::take(&mut self.content),
            tool_calls: self.tool_calls.clone(),
            finish_reason: self.finish_reason,
            usage: self.usage,
            errors: self.errors.clone(),
            state,
            cancelled: state == StreamState::Cancelled,
        };

        tracing::debug!(provider = %self.provider.name(), state = ?state, "stream finished");

        if let Some(hook) = self.on_complete.take() {
            hook(&summary);
        }
        self.pending.push_back(StreamEvent::Done(summary));
    }
}

/// Whether a parsed chunk has anything to deliver as a delta
fn carries_delta(chunk: &StreamChunk) -> bool {
    chunk.content.as_deref().is_some_and(|text| !text.is_empty())
        || !chunk.tool_calls.is_empty()
        || chunk.finish_reason.is_some()
        || chunk.usage.is_some()
}

impl Stream for ChunkStream {
    type Item = StreamEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if !this.state.is_terminal() && this.cancelled.as_mut().poll(cx).is_ready() {
                this.finish(StreamState::Cancelled);
            }

            if let Some(event) = this.pending.pop_front() {
                return Poll::Ready(Some(event));
            }
            if this.state.is_terminal() {
                return Poll::Ready(None);
            }
            if this.pipeline.exhausted {
                this.finish(StreamState::Complete);
                continue;
            }

            this.state = StreamState::Streaming;

            let Some(raw) = this.raw.as_mut() else {
                this.finish(StreamState::Complete);
                continue;
            };

            match raw.poll_next_unpin(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(None) => this.finish(StreamState::Complete),
                Poll::Ready(Some(Err(e))) => {
                    tracing::warn!(provider = %this.provider.name(), error = %e, "stream transport failed");
                    this.report_error(e.to_string());
                    this.finish(StreamState::Errored);
                }
                Poll::Ready(Some(Ok(data))) => this.ingest(&data),
            }
        }
    }
}
