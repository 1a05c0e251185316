//! Messages API request -> chat-completions request

use serde_json::{Value, json};

use crate::error::LlmError;
use crate::protocol::anthropic::{
    ContentBlock, ImageSource, InputMessage, MessageContent, MessagesRequest, Role, ToolChoice, ToolDefinition,
};
use crate::protocol::openai::{
    ChatContent, ChatMessage, ChatRequest, ChatRole, ChatTool, ContentPart, FunctionCall, FunctionDefinition, ImageUrl,
    StreamOptions, ToolCall,
};
use crate::routing::{Provider, RoutingTarget};

/// Backend-facing knobs that shape the outbound request
#[derive(Debug, Clone, Copy)]
pub struct TranscodeOptions {
    /// Prefix routed model ids with their provider tag
    pub qualify_model_ids: bool,
    /// Request a trailing usage chunk when streaming
    pub include_stream_usage: bool,
}

impl Default for TranscodeOptions {
    fn default() -> Self {
        Self {
            qualify_model_ids: true,
            include_stream_usage: true,
        }
    }
}

/// Build the backend request for `request` routed to `target`
///
/// Sampling parameters keep their values; only names change. `thinking` has
/// no backend equivalent and is dropped, as is `top_k` for providers that
/// do not accept it.
pub fn translate_request(
    request: &MessagesRequest,
    target: &RoutingTarget,
    options: &TranscodeOptions,
) -> Result<ChatRequest, LlmError> {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);

    if let Some(system) = &request.system {
        let text = system.to_text();
        if !text.is_empty() {
            messages.push(ChatMessage::text(ChatRole::System, text));
        }
    }

    for (position, message) in request.messages.iter().enumerate() {
        translate_turn(message, &mut messages).map_err(|reason| LlmError::Translation(format!("messages[{position}]: {reason}")))?;
    }

    let tools = request
        .tools
        .as_ref()
        .filter(|tools| !tools.is_empty())
        .map(|tools| tools.iter().map(translate_tool).collect::<Vec<_>>());

    // A choice without declared tools is rejected by most backends
    let tool_choice = tools
        .as_ref()
        .and(request.tool_choice.as_ref())
        .map(translate_tool_choice);

    let stream = request.is_stream();

    Ok(ChatRequest {
        model: target.wire_model(options.qualify_model_ids),
        messages,
        max_tokens: Some(request.max_tokens),
        temperature: request.temperature,
        top_p: request.top_p,
        top_k: request.top_k.filter(|_| target.provider == Provider::Gemini),
        stop: request.stop_sequences.clone().filter(|stop| !stop.is_empty()),
        stream,
        stream_options: (stream && options.include_stream_usage).then_some(StreamOptions { include_usage: true }),
        tools,
        tool_choice,
        user: request.metadata.as_ref().and_then(|m| m.user_id.clone()),
        api_key: None,
    })
}

fn translate_turn(message: &InputMessage, out: &mut Vec<ChatMessage>) -> Result<(), String> {
    match (&message.content, message.role) {
        (MessageContent::Text(text), Role::User) => out.push(ChatMessage::text(ChatRole::User, text.clone())),
        (MessageContent::Text(text), Role::Assistant) => out.push(ChatMessage::text(ChatRole::Assistant, text.clone())),
        (MessageContent::Blocks(blocks), Role::User) => translate_user_blocks(blocks, out)?,
        (MessageContent::Blocks(blocks), Role::Assistant) => out.push(translate_assistant_blocks(blocks)?),
    }

    Ok(())
}

/// Tool results become `tool` turns ahead of the remaining user content
fn translate_user_blocks(blocks: &[ContentBlock], out: &mut Vec<ChatMessage>) -> Result<(), String> {
    let mut parts = Vec::new();

    for block in blocks {
        match block {
            ContentBlock::Text { text } => parts.push(ContentPart::Text { text: text.clone() }),
            ContentBlock::Image { source } => parts.push(ContentPart::ImageUrl {
                image_url: ImageUrl { url: image_url(source) },
            }),
            ContentBlock::ToolResult {
                tool_use_id,
                content,
                is_error,
            } => {
                let mut text = tool_result_text(content.as_ref());
                if is_error.unwrap_or(false) {
                    text.insert_str(0, "Error: ");
                }

                out.push(ChatMessage {
                    role: ChatRole::Tool,
                    content: Some(ChatContent::Text(text)),
                    tool_calls: None,
                    tool_call_id: Some(tool_use_id.clone()),
                });
            }
            ContentBlock::ToolUse { name, .. } => {
                return Err(format!("tool_use block '{name}' is only valid in an assistant turn"));
            }
        }
    }

    if let Some(content) = collapse_parts(parts) {
        out.push(ChatMessage {
            role: ChatRole::User,
            content: Some(content),
            tool_calls: None,
            tool_call_id: None,
        });
    }

    Ok(())
}

fn translate_assistant_blocks(blocks: &[ContentBlock]) -> Result<ChatMessage, String> {
    let mut texts = Vec::new();
    let mut tool_calls = Vec::new();

    for block in blocks {
        match block {
            ContentBlock::Text { text } => texts.push(text.as_str()),
            ContentBlock::ToolUse { id, name, input } => tool_calls.push(ToolCall {
                id: id.clone(),
                tool_type: "function".to_owned(),
                function: FunctionCall {
                    name: name.clone(),
                    arguments: input.to_string(),
                },
            }),
            ContentBlock::Image { .. } => return Err("image blocks are only valid in a user turn".to_owned()),
            ContentBlock::ToolResult { tool_use_id, .. } => {
                return Err(format!("tool_result for '{tool_use_id}' is only valid in a user turn"));
            }
        }
    }

    let text = texts.join("\n");
    let content = if text.is_empty() && !tool_calls.is_empty() {
        None
    } else {
        Some(ChatContent::Text(text))
    };

    Ok(ChatMessage {
        role: ChatRole::Assistant,
        content,
        tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
        tool_call_id: None,
    })
}

/// A lone text part is sent as plain string content
fn collapse_parts(mut parts: Vec<ContentPart>) -> Option<ChatContent> {
    match parts.len() {
        0 => None,
        1 => match parts.pop() {
            Some(ContentPart::Text { text }) => Some(ChatContent::Text(text)),
            Some(part) => Some(ChatContent::Parts(vec![part])),
            None => None,
        },
        _ => Some(ChatContent::Parts(parts)),
    }
}

fn image_url(source: &ImageSource) -> String {
    match source {
        ImageSource::Base64 { media_type, data } => format!("data:{media_type};base64,{data}"),
        ImageSource::Url { url } => url.clone(),
    }
}

/// Flatten tool-result content into the text a `tool` turn carries
fn tool_result_text(content: Option<&Value>) -> String {
    match content {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item.get("text").and_then(Value::as_str) {
                Some(text) if item.get("type").and_then(Value::as_str) == Some("text") => text.to_owned(),
                _ => item.to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n"),
        Some(other) => other.to_string(),
    }
}

fn translate_tool(tool: &ToolDefinition) -> ChatTool {
    ChatTool {
        tool_type: "function".to_owned(),
        function: FunctionDefinition {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters: tool.input_schema.clone(),
        },
    }
}

fn translate_tool_choice(choice: &ToolChoice) -> Value {
    match choice {
        ToolChoice::Auto => json!("auto"),
        ToolChoice::Any => json!("required"),
        ToolChoice::None => json!("none"),
        ToolChoice::Tool { name } => json!({ "type": "function", "function": { "name": name } }),
    }
}
