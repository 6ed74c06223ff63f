//! HTTP provider skeleton for Anthropic's Messages API. Demonstrates the
//! wiring for a real network-backed provider; the request path is not
//! exercised by tests since it requires a live credential.

use async_stream::try_stream;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{LlmError, LlmResult};
use crate::provider::{ClientConfig, CredentialType, LlmClient, ProviderDescriptor, StreamBox};
use crate::types::{LlmToolDefinition, Message, MessageContent, MessageRole, StopReason, StreamEvent, Usage};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Descriptor for the `claude` provider id.
pub struct ClaudeProvider;

impl ProviderDescriptor for ClaudeProvider {
    fn id(&self) -> &str {
        "claude"
    }

    fn name(&self) -> &str {
        "Claude"
    }

    fn default_model(&self) -> &str {
        "claude-sonnet-4-20250514"
    }

    fn credential_type(&self) -> CredentialType {
        CredentialType::ApiKey
    }

    fn validate_credentials(&self, credential: &str) -> bool {
        credential.starts_with("sk-ant-")
    }

    fn create_client(&self, model: &str, credential: Option<&str>) -> LlmResult<Box<dyn LlmClient>> {
        let credential = credential.ok_or_else(|| LlmError::CredentialNotConfigured {
            provider: self.id().to_string(),
        })?;
        let config = ClientConfig::new(credential, model);
        Ok(Box::new(ClaudeClient { http: Client::new(), config }))
    }
}

/// A credentialed connection to the Anthropic Messages API.
pub struct ClaudeClient {
    http: Client,
    config: ClientConfig,
}

impl ClaudeClient {
    fn build_request(&self, messages: &[Message], tools: &[LlmToolDefinition], system: Option<&str>) -> Value {
        let api_messages: Vec<Value> = messages
            .iter()
            .filter(|message| message.role != MessageRole::System)
            .map(Self::convert_message)
            .collect();

        let mut request = serde_json::json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "messages": api_messages,
            "stream": true,
        });

        if let Some(system) = system.filter(|s| !s.is_empty()) {
            request["system"] = Value::String(system.to_string());
        }

        if !tools.is_empty() {
            let api_tools: Vec<Value> = tools
                .iter()
                .map(|tool| {
                    serde_json::json!({
                        "name": tool.name,
                        "description": tool.description,
                        "input_schema": tool.input_schema,
                    })
                })
                .collect();
            request["tools"] = Value::Array(api_tools);
        }

        request
    }

    fn convert_message(message: &Message) -> Value {
        match &message.content {
            MessageContent::Text(text) => serde_json::json!({
                "role": match message.role {
                    MessageRole::Assistant => "assistant",
                    MessageRole::User | MessageRole::Tool | MessageRole::System => "user",
                },
                "content": text,
            }),
            MessageContent::ToolCalls(calls) => serde_json::json!({
                "role": "assistant",
                "content": calls.iter().map(|call| serde_json::json!({
                    "type": "tool_use",
                    "id": call.id,
                    "name": call.name,
                    "input": call.arguments,
                })).collect::<Vec<_>>(),
            }),
            MessageContent::ToolResult(result) => serde_json::json!({
                "role": "user",
                "content": [{
                    "type": "tool_result",
                    "tool_use_id": result.call_id,
                    "content": result.content,
                    "is_error": result.is_error,
                }],
            }),
            MessageContent::MultiPart(_) => serde_json::json!({
                "role": "user",
                "content": message.text().unwrap_or_default(),
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicEvent {
    ContentBlockDelta { delta: AnthropicDelta },
    MessageDelta { delta: AnthropicStop, usage: Option<AnthropicUsage> },
    MessageStop,
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicDelta {
    TextDelta { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct AnthropicStop {
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: Option<u64>,
    output_tokens: Option<u64>,
}

fn parse_stop_reason(raw: Option<&str>) -> StopReason {
    match raw {
        Some("max_tokens") => StopReason::MaxTokens,
        Some("tool_use") => StopReason::ToolUse,
        Some("stop_sequence") => StopReason::StopSequence,
        _ => StopReason::EndTurn,
    }
}

#[async_trait]
impl LlmClient for ClaudeClient {
    fn name(&self) -> &str {
        "claude"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn list_models(&self) -> LlmResult<Vec<String>> {
        Ok(vec![self.config.model.clone()])
    }

    async fn health_check(&self) -> bool {
        self.config.credential.is_some()
    }

    async fn stream(
        &self,
        messages: &[Message],
        tools: &[LlmToolDefinition],
        system: Option<&str>,
    ) -> LlmResult<StreamBox> {
        let credential = self
            .config
            .credential
            .clone()
            .ok_or_else(|| LlmError::CredentialNotConfigured { provider: "claude".to_string() })?;
        let body = self.build_request(messages, tools, system);
        let base_url = self.config.base_url.as_deref().unwrap_or(ANTHROPIC_API_URL);
        let http = self.http.clone();
        let url = base_url.to_string();

        let stream = try_stream! {
            let response = http
                .post(&url)
                .header("x-api-key", credential)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&body)
                .send()
                .await?;
            let response = response.error_for_status().map_err(LlmError::Http)?;
            let bytes = response.bytes().await?;
            debug!(len = bytes.len(), "received claude response body");

            for line in bytes.as_ref().split(|byte| *byte == b'\n') {
                let Some(payload) = line.strip_prefix(b"data: ") else { continue };
                if payload == b"[DONE]" {
                    continue;
                }
                let Ok(event) = serde_json::from_slice::<AnthropicEvent>(payload) else { continue };
                match event {
                    AnthropicEvent::ContentBlockDelta { delta: AnthropicDelta::TextDelta { text } } => {
                        yield StreamEvent::TextDelta { text };
                    }
                    AnthropicEvent::MessageDelta { delta, usage } => {
                        if let Some(usage) = usage {
                            yield StreamEvent::Usage {
                                usage: Usage {
                                    input_tokens: usage.input_tokens.unwrap_or(0),
                                    output_tokens: usage.output_tokens.unwrap_or(0),
                                },
                            };
                        }
                        yield StreamEvent::Done { stop_reason: parse_stop_reason(delta.stop_reason.as_deref()) };
                    }
                    AnthropicEvent::MessageStop | AnthropicEvent::Other | AnthropicEvent::ContentBlockDelta { .. } => {}
                }
            }
        };

        Ok(Box::pin(stream))
    }

    fn max_context_length(&self) -> usize {
        self.config.context_window
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_request_carries_system_and_tools() {
        let client = ClaudeClient {
            http: Client::new(),
            config: ClientConfig::new("sk-ant-test", "claude-sonnet-4-20250514"),
        };
        let tools = vec![LlmToolDefinition::new("http_fetch", serde_json::json!({}))];
        let request = client.build_request(&[Message::user("hi")], &tools, Some("be terse"));
        assert_eq!(request["system"], "be terse");
        assert_eq!(request["tools"][0]["name"], "http_fetch");
    }

    #[test]
    fn descriptor_rejects_malformed_credentials() {
        let descriptor = ClaudeProvider;
        assert!(!descriptor.validate_credentials("not-a-key"));
        assert!(descriptor.validate_credentials("sk-ant-abc123"));
    }

    #[test]
    fn parses_known_stop_reasons() {
        assert_eq!(parse_stop_reason(Some("max_tokens")), StopReason::MaxTokens);
        assert_eq!(parse_stop_reason(Some("tool_use")), StopReason::ToolUse);
        assert_eq!(parse_stop_reason(None), StopReason::EndTurn);
    }
}
