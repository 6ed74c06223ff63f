//! Message, tool-call, and streaming types shared by every provider client.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Who produced a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

/// A single part of a multi-part message (used for mixed text/image turns).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    Image { source: String, media_type: String },
}

/// The body of a message: plain text, a set of tool calls the assistant
/// wants to make, the result of a tool call, or several content parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    ToolCalls(Vec<ToolCall>),
    ToolResult(ToolCallResult),
    MultiPart(Vec<ContentPart>),
}

/// A request from the assistant to invoke a tool, and the arguments to call
/// it with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

impl ToolCall {
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self { id: id.into(), name: name.into(), arguments: Value::Null }
    }

    #[must_use]
    pub fn with_arguments(mut self, arguments: Value) -> Self {
        self.arguments = arguments;
        self
    }

    /// Split a `"server:tool"` name into its namespace and bare tool name.
    /// Names without a `:` have no namespace.
    #[must_use]
    pub fn parse_name(&self) -> (Option<&str>, &str) {
        match self.name.split_once(':') {
            Some((server, tool)) => (Some(server), tool),
            None => (None, self.name.as_str()),
        }
    }
}

/// The outcome of executing a tool call, fed back to the provider as a
/// `tool` role message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub call_id: String,
    pub content: String,
    #[serde(default)]
    pub is_error: bool,
}

impl ToolCallResult {
    #[must_use]
    pub fn success(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self { call_id: call_id.into(), content: content.into(), is_error: false }
    }

    #[must_use]
    pub fn error(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self { call_id: call_id.into(), content: content.into(), is_error: true }
    }
}

/// A single turn in a conversation sent to or received from a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: MessageContent,
}

impl Message {
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self { role: MessageRole::User, content: MessageContent::Text(text.into()) }
    }

    #[must_use]
    pub fn assistant(text: impl Into<String>) -> Self {
        Self { role: MessageRole::Assistant, content: MessageContent::Text(text.into()) }
    }

    #[must_use]
    pub fn system(text: impl Into<String>) -> Self {
        Self { role: MessageRole::System, content: MessageContent::Text(text.into()) }
    }

    #[must_use]
    pub fn assistant_with_tools(tool_calls: Vec<ToolCall>) -> Self {
        Self { role: MessageRole::Assistant, content: MessageContent::ToolCalls(tool_calls) }
    }

    #[must_use]
    pub fn tool_result(result: ToolCallResult) -> Self {
        Self { role: MessageRole::Tool, content: MessageContent::ToolResult(result) }
    }

    /// The message's plain text, if it carries any (multi-part messages
    /// concatenate their text parts).
    #[must_use]
    pub fn text(&self) -> Option<String> {
        match &self.content {
            MessageContent::Text(text) => Some(text.clone()),
            MessageContent::MultiPart(parts) => {
                let text: String = parts
                    .iter()
                    .filter_map(|part| match part {
                        ContentPart::Text { text } => Some(text.as_str()),
                        ContentPart::Image { .. } => None,
                    })
                    .collect::<Vec<_>>()
                    .join("");
                if text.is_empty() { None } else { Some(text) }
            }
            MessageContent::ToolCalls(_) | MessageContent::ToolResult(_) => None,
        }
    }

    #[must_use]
    pub fn tool_calls(&self) -> Option<&[ToolCall]> {
        match &self.content {
            MessageContent::ToolCalls(calls) => Some(calls),
            _ => None,
        }
    }
}

/// A tool definition advertised to a provider alongside the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

impl LlmToolDefinition {
    #[must_use]
    pub fn new(name: impl Into<String>, input_schema: Value) -> Self {
        Self { name: name.into(), description: String::new(), input_schema }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Why a streamed response stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    ToolUse,
    StopSequence,
    Cancelled,
}

/// Token accounting for a single query.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl Usage {
    #[must_use]
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// One increment of a streaming response. Text chunks are delivered in
/// order; `tool_use` chunks may interleave with them; `Done` is terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    TextDelta { text: String },
    ToolCallStart { id: String, name: String },
    ToolCallDelta { id: String, partial_arguments: String },
    ToolCallEnd { id: String },
    ReasoningDelta { text: String },
    Usage { usage: Usage },
    Done { stop_reason: StopReason },
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_text_concatenates_multipart() {
        let message = Message {
            role: MessageRole::User,
            content: MessageContent::MultiPart(vec![
                ContentPart::Text { text: "a".into() },
                ContentPart::Image { source: "data:...".into(), media_type: "image/png".into() },
                ContentPart::Text { text: "b".into() },
            ]),
        };
        assert_eq!(message.text().as_deref(), Some("ab"));
    }

    #[test]
    fn tool_call_parses_namespaced_name() {
        let call = ToolCall::new("1", "fs:read_file");
        assert_eq!(call.parse_name(), (Some("fs"), "read_file"));
        let call = ToolCall::new("2", "http_fetch");
        assert_eq!(call.parse_name(), (None, "http_fetch"));
    }

    #[test]
    fn tool_result_roundtrips() {
        let ok = ToolCallResult::success("1", "done");
        assert!(!ok.is_error);
        let err = ToolCallResult::error("1", "boom");
        assert!(err.is_error);
    }
}
