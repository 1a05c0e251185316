//! Streaming bridge
//!
//! Re-frames a chat-completions chunk stream as a Messages API event stream.
//! Backend chunk boundaries do not line up with content blocks, so a small
//! state machine decides when blocks open and close. Whatever the backend
//! does, the emitted sequence is well-formed: one `message_start`, balanced
//! `content_block_start`/`content_block_stop` pairs with increasing indices,
//! then `message_delta` and `message_stop`. A failure after the stream has
//! started ends it with a single `error` event instead.

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use serde_json::Value;
use switchboard_core::HttpError;

use crate::backend::ChunkStream;
use crate::convert::{map_finish_reason, map_usage};
use crate::error::LlmError;
use crate::protocol::anthropic::{
    BlockDelta, ErrorDetail, MessageDelta, MessagesResponse, ResponseBlock, StopReason, StreamEvent,
};
use crate::protocol::openai::{ChatChunk, ChatUsage, ToolCallDelta};

/// Block currently receiving deltas
#[derive(Debug)]
enum OpenBlock {
    Text {
        index: u32,
    },
    Tool {
        index: u32,
        call_index: u32,
        id: String,
        /// Argument fragments received so far
        arguments: String,
    },
}

impl OpenBlock {
    const fn index(&self) -> u32 {
        match self {
            Self::Text { index } | Self::Tool { index, .. } => *index,
        }
    }
}

/// Tool call whose block has not been opened yet
///
/// Name fragments accumulate here until the arguments start, so a name
/// split across chunks reaches `content_block_start` whole.
#[derive(Debug)]
struct PendingTool {
    call_index: u32,
    id: Option<String>,
    name: String,
    arguments: String,
}

/// Per-stream translation state
///
/// Owned by exactly one in-flight stream and dropped with it.
#[derive(Debug)]
pub struct TranslationState {
    message_id: String,
    model: String,
    next_index: u32,
    open: Option<OpenBlock>,
    pending: Option<PendingTool>,
    /// Backend call indices whose block has been closed; never reopened
    closed_calls: HashSet<u32>,
    saw_tool_calls: bool,
    stop_reason: Option<StopReason>,
    usage: Option<ChatUsage>,
    /// Deltas emitted, used when the backend reports no usage
    output_units: u32,
    completed: bool,
}

impl TranslationState {
    /// `model` is the id the client asked for
    pub fn new(message_id: String, model: String) -> Self {
        Self {
            message_id,
            model,
            next_index: 0,
            open: None,
            pending: None,
            closed_calls: HashSet::new(),
            saw_tool_calls: false,
            stop_reason: None,
            usage: None,
            output_units: 0,
            completed: false,
        }
    }

    /// `message_start` carrying an empty message
    pub fn start(&self) -> StreamEvent {
        StreamEvent::MessageStart {
            message: MessagesResponse::skeleton(self.message_id.clone(), self.model.clone()),
        }
    }

    /// Events produced by one backend chunk
    pub fn on_chunk(&mut self, chunk: ChatChunk) -> Vec<StreamEvent> {
        let mut events = Vec::new();

        if let Some(usage) = chunk.usage {
            self.usage = Some(usage);
        }

        // Only the first choice is relayed
        let Some(choice) = chunk.choices.into_iter().find(|choice| choice.index == 0) else {
            return events;
        };

        if let Some(text) = choice.delta.content.filter(|text| !text.is_empty()) {
            self.push_text(text, &mut events);
        }

        for call in choice.delta.tool_calls.unwrap_or_default() {
            self.push_tool_fragment(call, &mut events);
        }

        if let Some(reason) = choice.finish_reason {
            self.flush_pending(&mut events);
            self.stop_reason = Some(map_finish_reason(Some(&reason), self.saw_tool_calls));
            events.extend(self.close_open());
        }

        events
    }

    /// Closing sequence once the backend stream has ended
    ///
    /// A stream that ended without a finish reason was truncated and is
    /// closed as a normal end of turn.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        if self.completed {
            return Vec::new();
        }
        self.completed = true;

        let mut events = Vec::new();
        self.flush_pending(&mut events);

        if self.next_index == 0 {
            let index = self.allocate_index();
            events.push(StreamEvent::ContentBlockStart {
                index,
                content_block: ResponseBlock::Text { text: String::new() },
            });
            events.push(StreamEvent::ContentBlockStop { index });
        }
        events.extend(self.close_open());

        let stop_reason = self.stop_reason.unwrap_or_else(|| {
            tracing::debug!(message_id = %self.message_id, "backend stream ended without finish reason");
            map_finish_reason(None, self.saw_tool_calls)
        });

        let mut usage = map_usage(self.usage.as_ref());
        if self.usage.is_none() {
            usage.output_tokens = self.output_units;
        }

        events.push(StreamEvent::MessageDelta {
            delta: MessageDelta {
                stop_reason: Some(stop_reason),
                stop_sequence: None,
            },
            usage,
        });
        events.push(StreamEvent::MessageStop);
        events
    }

    /// Terminal `error` event for a failure after the stream started
    pub fn fail(&mut self, error: &LlmError) -> StreamEvent {
        self.completed = true;
        tracing::warn!(message_id = %self.message_id, error = %error, "stream failed after start");

        StreamEvent::Error {
            error: ErrorDetail {
                error_type: error.error_type().to_owned(),
                message: error.client_message(),
            },
        }
    }

    const fn allocate_index(&mut self) -> u32 {
        let index = self.next_index;
        self.next_index += 1;
        index
    }

    fn push_text(&mut self, text: String, events: &mut Vec<StreamEvent>) {
        if self.pending.as_ref().is_some_and(|pending| !pending.name.is_empty()) {
            self.flush_pending(events);
        }

        let index = if let Some(OpenBlock::Text { index }) = self.open {
            index
        } else {
            events.extend(self.close_open());
            let index = self.allocate_index();
            self.open = Some(OpenBlock::Text { index });
            events.push(StreamEvent::ContentBlockStart {
                index,
                content_block: ResponseBlock::Text { text: String::new() },
            });
            index
        };

        self.output_units += 1;
        events.push(StreamEvent::ContentBlockDelta {
            index,
            delta: BlockDelta::TextDelta { text },
        });
    }

    fn push_tool_fragment(&mut self, call: ToolCallDelta, events: &mut Vec<StreamEvent>) {
        let call_index = call.index;
        let (name, arguments) = call
            .function
            .map(|f| (f.name.unwrap_or_default(), f.arguments.unwrap_or_default()))
            .unwrap_or_default();

        if self.closed_calls.contains(&call_index) {
            tracing::warn!(call_index, "dropping fragment for a tool call that was already closed");
            return;
        }
        self.saw_tool_calls = true;

        // Continuation of the open call
        if let Some(OpenBlock::Tool {
            call_index: open_call,
            index,
            arguments: buffer,
            ..
        }) = &mut self.open
            && *open_call == call_index
        {
            if !name.is_empty() {
                tracing::debug!(call_index, "ignoring name fragment after tool block start");
            }
            if !arguments.is_empty() {
                buffer.push_str(&arguments);
                let index = *index;
                self.push_arguments(index, arguments, events);
            }
            return;
        }

        let pending = match self.pending.take() {
            Some(mut pending) if pending.call_index == call_index => {
                pending.id = pending.id.or(call.id);
                pending.name.push_str(&name);
                pending.arguments.push_str(&arguments);
                pending
            }
            superseded => {
                if let Some(old) = superseded {
                    self.open_pending(old, events);
                }
                PendingTool {
                    call_index,
                    id: call.id,
                    name,
                    arguments,
                }
            }
        };

        if pending.name.is_empty() || pending.arguments.is_empty() {
            self.pending = Some(pending);
        } else {
            self.open_pending(pending, events);
        }
    }

    /// Open a block for the pending call, or drop it if it never got a name
    fn flush_pending(&mut self, events: &mut Vec<StreamEvent>) {
        if let Some(pending) = self.pending.take() {
            self.open_pending(pending, events);
        }
    }

    fn open_pending(&mut self, pending: PendingTool, events: &mut Vec<StreamEvent>) {
        let PendingTool {
            call_index,
            id,
            name,
            arguments,
        } = pending;

        if name.is_empty() {
            tracing::warn!(
                call_index,
                buffered_bytes = arguments.len(),
                "dropping tool call that never received a name"
            );
            self.closed_calls.insert(call_index);
            return;
        }

        events.extend(self.close_open());
        let index = self.allocate_index();
        let id = id.unwrap_or_else(new_tool_id);

        events.push(StreamEvent::ContentBlockStart {
            index,
            content_block: ResponseBlock::ToolUse {
                id: id.clone(),
                name,
                input: Value::Object(serde_json::Map::new()),
            },
        });
        self.open = Some(OpenBlock::Tool {
            index,
            call_index,
            id,
            arguments: arguments.clone(),
        });

        if !arguments.is_empty() {
            self.push_arguments(index, arguments, events);
        }
    }

    fn push_arguments(&mut self, index: u32, partial_json: String, events: &mut Vec<StreamEvent>) {
        self.output_units += 1;
        events.push(StreamEvent::ContentBlockDelta {
            index,
            delta: BlockDelta::InputJsonDelta { partial_json },
        });
    }

    fn close_open(&mut self) -> Option<StreamEvent> {
        let block = self.open.take()?;
        let index = block.index();

        if let OpenBlock::Tool {
            call_index,
            id,
            arguments,
            ..
        } = block
        {
            self.closed_calls.insert(call_index);
            if !arguments.trim().is_empty() && serde_json::from_str::<Value>(&arguments).is_err() {
                tracing::warn!(tool_call_id = %id, "streamed tool arguments are not valid JSON");
            }
        }

        Some(StreamEvent::ContentBlockStop { index })
    }
}

impl Drop for TranslationState {
    fn drop(&mut self) {
        if !self.completed {
            tracing::debug!(message_id = %self.message_id, "stream dropped before completion");
        }
    }
}

fn new_tool_id() -> String {
    format!("toolu_{}", uuid::Uuid::new_v4().simple())
}

/// Driver state threaded through the event stream
struct Bridge {
    chunks: ChunkStream,
    state: TranslationState,
    queue: VecDeque<StreamEvent>,
    idle_timeout: Duration,
    done: bool,
}

/// Lazily translate `chunks` into client events
///
/// The first event is `message_start`. Waiting longer than `idle_timeout`
/// for the next chunk fails the stream. Dropping the returned stream drops
/// the backend body with it.
pub fn bridge_stream(
    chunks: ChunkStream,
    state: TranslationState,
    idle_timeout: Duration,
) -> impl Stream<Item = StreamEvent> + Send + 'static {
    let mut queue = VecDeque::new();
    queue.push_back(state.start());

    let bridge = Bridge {
        chunks,
        state,
        queue,
        idle_timeout,
        done: false,
    };

    futures_util::stream::unfold(bridge, |mut bridge| async move {
        loop {
            if let Some(event) = bridge.queue.pop_front() {
                return Some((event, bridge));
            }
            if bridge.done {
                return None;
            }

            match tokio::time::timeout(bridge.idle_timeout, bridge.chunks.next()).await {
                Ok(Some(Ok(chunk))) => {
                    let events = bridge.state.on_chunk(chunk);
                    bridge.queue.extend(events);
                }
                Ok(Some(Err(e))) => {
                    let event = bridge.state.fail(&e);
                    bridge.queue.push_back(event);
                    bridge.done = true;
                }
                Ok(None) => {
                    let events = bridge.state.finish();
                    bridge.queue.extend(events);
                    bridge.done = true;
                }
                Err(_) => {
                    let event = bridge.state.fail(&LlmError::Timeout(bridge.idle_timeout.as_secs()));
                    bridge.queue.push_back(event);
                    bridge.done = true;
                }
            }
        }
    })
}
