//! Driving a client's raw event stream into a single accumulated result.

use futures::StreamExt;

use crate::error::{LlmError, LlmResult};
use crate::provider::LlmClient;
use crate::types::{LlmToolDefinition, Message, StopReason, StreamEvent, Usage};

/// Per-query knobs that don't belong on the client's fixed configuration.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub system: Option<String>,
    pub tools: Vec<LlmToolDefinition>,
    pub cost_per_input_token: f64,
    pub cost_per_output_token: f64,
}

/// Token and dollar accounting for a completed query.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub cost_usd: f64,
}

/// The accumulated result of driving a client's stream to completion.
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub text: String,
    pub tool_calls: Vec<crate::types::ToolCall>,
    pub usage: QueryUsage,
    pub finish_reason: StopReason,
}

/// Stream a query to `client`, concatenating text deltas in order and
/// invoking `on_chunk` for every event as it arrives. `tool_use` chunks may
/// interleave with text; a `Done` event is terminal.
///
/// # Errors
///
/// Returns an error if the client fails to start streaming or the stream
/// itself yields an error event.
pub async fn query(
    client: &dyn LlmClient,
    messages: &[Message],
    options: &QueryOptions,
    mut on_chunk: impl FnMut(&StreamEvent),
) -> LlmResult<QueryResult> {
    let mut stream = client.stream(messages, &options.tools, options.system.as_deref()).await?;

    let mut text = String::new();
    let mut tool_calls: Vec<crate::types::ToolCall> = Vec::new();
    let mut pending_tool: Option<(String, String, String)> = None;
    let mut usage = Usage::default();
    let mut finish_reason = StopReason::EndTurn;

    while let Some(event) = stream.next().await {
        let event = event?;
        on_chunk(&event);
        match &event {
            StreamEvent::TextDelta { text: delta } => text.push_str(delta),
            StreamEvent::ReasoningDelta { .. } => {}
            StreamEvent::ToolCallStart { id, name } => {
                pending_tool = Some((id.clone(), name.clone(), String::new()));
            }
            StreamEvent::ToolCallDelta { id, partial_arguments } => {
                if let Some((pending_id, _, args)) = pending_tool.as_mut() {
                    if pending_id == id {
                        args.push_str(partial_arguments);
                    }
                }
            }
            StreamEvent::ToolCallEnd { id } => {
                if let Some((pending_id, name, args)) = pending_tool.take() {
                    if pending_id == *id {
                        let arguments = serde_json::from_str(&args).unwrap_or(serde_json::Value::Null);
                        tool_calls.push(crate::types::ToolCall::new(pending_id, name).with_arguments(arguments));
                    }
                }
            }
            StreamEvent::Usage { usage: reported } => usage = *reported,
            StreamEvent::Done { stop_reason } => finish_reason = *stop_reason,
            StreamEvent::Error { message } => return Err(LlmError::StreamingError(message.clone())),
        }
    }

    let cost_usd = (usage.input_tokens as f64) * options.cost_per_input_token
        + (usage.output_tokens as f64) * options.cost_per_output_token;

    Ok(QueryResult {
        text,
        tool_calls,
        usage: QueryUsage {
            prompt_tokens: usage.input_tokens,
            completion_tokens: usage.output_tokens,
            cost_usd,
        },
        finish_reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::echo::EchoClient;

    #[tokio::test]
    async fn query_concatenates_text_and_reports_usage() {
        let client = EchoClient::new("echo-1");
        let messages = vec![Message::user("hello there")];
        let mut chunks = Vec::new();
        let result = query(&client, &messages, &QueryOptions::default(), |event| {
            chunks.push(event.clone());
        })
        .await
        .unwrap();

        assert!(result.text.contains("hello there"));
        assert_eq!(result.finish_reason, StopReason::EndTurn);
        assert!(result.usage.prompt_tokens > 0);
        assert!(!chunks.is_empty());
    }
}
