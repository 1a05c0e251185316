//! Chat-completions reply -> Messages API reply

use serde_json::Value;

use crate::protocol::anthropic::{MessagesResponse, ResponseBlock, StopReason, Usage};
use crate::protocol::openai::{ChatResponse, ChatUsage, ToolCall};

/// Fresh message id in the `msg_` namespace
pub fn new_message_id() -> String {
    format!("msg_{}", uuid::Uuid::new_v4().simple())
}

/// Map a backend finish reason onto a stop reason
///
/// A missing reason means the model simply finished, unless it produced tool
/// calls, in which case it is waiting on their results.
pub fn map_finish_reason(reason: Option<&str>, has_tool_calls: bool) -> StopReason {
    match reason {
        Some("length") => StopReason::MaxTokens,
        Some("tool_calls" | "function_call") => StopReason::ToolUse,
        Some("stop_sequence") => StopReason::StopSequence,
        Some("stop" | "content_filter") => StopReason::EndTurn,
        Some(other) => {
            tracing::debug!(finish_reason = %other, "unrecognized finish reason");
            StopReason::EndTurn
        }
        None if has_tool_calls => StopReason::ToolUse,
        None => StopReason::EndTurn,
    }
}

/// Backend token accounting in Messages API terms
///
/// Cache creation is never reported by chat-completions backends and stays
/// zero; cache reads come from `prompt_tokens_details.cached_tokens`.
pub fn map_usage(usage: Option<&ChatUsage>) -> Usage {
    usage.map_or_else(Usage::default, |usage| Usage {
        input_tokens: usage.prompt_tokens,
        output_tokens: usage.completion_tokens,
        cache_creation_input_tokens: 0,
        cache_read_input_tokens: usage.cached_tokens(),
    })
}

/// Parse accumulated tool arguments, falling back to an empty object
pub(crate) fn decode_arguments(call_id: &str, arguments: &str) -> Value {
    if arguments.trim().is_empty() {
        return Value::Object(serde_json::Map::new());
    }

    match serde_json::from_str::<Value>(arguments) {
        Ok(value @ Value::Object(_)) => value,
        Ok(other) => {
            tracing::warn!(tool_call_id = %call_id, "tool arguments are not an object, wrapping");
            serde_json::json!({ "input": other })
        }
        Err(e) => {
            tracing::warn!(tool_call_id = %call_id, error = %e, "tool arguments are not valid JSON");
            Value::Object(serde_json::Map::new())
        }
    }
}

fn tool_block(call: ToolCall) -> ResponseBlock {
    let input = decode_arguments(&call.id, &call.function.arguments);
    ResponseBlock::ToolUse {
        id: call.id,
        name: call.function.name,
        input,
    }
}

/// Build the client reply from a completed backend response
///
/// Only the first choice is used. `model` is the id the client requested,
/// not the one the backend reports.
pub fn translate_response(response: ChatResponse, model: &str) -> MessagesResponse {
    let usage = map_usage(response.usage.as_ref());
    let mut message = MessagesResponse::skeleton(new_message_id(), model.to_owned());
    message.usage = usage;

    let Some(choice) = response.choices.into_iter().next() else {
        tracing::warn!(backend_id = %response.id, "backend response has no choices");
        message.content.push(ResponseBlock::Text { text: String::new() });
        message.stop_reason = Some(StopReason::EndTurn);
        return message;
    };

    if let Some(text) = choice.message.content.filter(|text| !text.is_empty()) {
        message.content.push(ResponseBlock::Text { text });
    }

    let calls = choice.message.tool_calls.unwrap_or_default();
    let has_tool_calls = !calls.is_empty();
    message.content.extend(calls.into_iter().map(tool_block));

    if message.content.is_empty() {
        message.content.push(ResponseBlock::Text { text: String::new() });
    }

    message.stop_reason = Some(map_finish_reason(choice.finish_reason.as_deref(), has_tool_calls));
    message
}
