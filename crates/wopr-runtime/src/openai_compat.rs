//! A pure translation layer between the OpenAI chat-completions wire shape
//! and the dispatch core's own types, plus the thin orchestration
//! (ephemeral session, dispatch, teardown) that drives it end to end.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use wopr_core::{InjectId, InjectionSource, InjectionType, ProviderBinding, Session, Timestamp, TrustLevel};
use wopr_llm::ProviderRegistry;
use wopr_storage::Store;

use crate::dispatch::DispatchOutcome;
use crate::error::RuntimeResult;
use crate::queue::QueueManager;

/// One message in an OpenAI-shaped chat request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// `POST /v1/chat/completions` request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub stream: Option<bool>,
}

/// A single returned choice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChoice {
    pub index: u32,
    pub message: ChatMessage,
    pub finish_reason: String,
}

/// Token accounting, mirroring the upstream `usage` object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// The non-streaming `chat.completion` response object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChatChoice>,
    pub usage: ChatUsage,
}

/// One delta within a streamed `chat.completion.chunk`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChunkDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// One choice within a streamed chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChunkChoice {
    pub index: u32,
    pub delta: ChatChunkDelta,
    pub finish_reason: Option<String>,
}

/// A single `data: {...}` frame of a streamed response, sans the `[DONE]`
/// sentinel the caller appends after the last one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChatChunkChoice>,
}

/// One entry of `GET /v1/models`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub object: String,
    pub owned_by: String,
    pub created: i64,
}

/// `GET /v1/models` response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsResponse {
    pub object: String,
    pub data: Vec<ModelInfo>,
}

/// Mint a `chatcmpl-<id>` using the same inject-id primitive the dispatch
/// core uses, so ids stay unique across restarts without a new dependency.
#[must_use]
pub fn completion_id(now: Timestamp) -> String {
    format!("chatcmpl-{}", InjectId::new(now).as_str())
}

/// Name an ephemeral session for one OpenAI-compat request.
#[must_use]
pub fn ephemeral_session_name(now: Timestamp) -> String {
    format!("openai-{}", InjectId::new(now).as_str())
}

/// Pull the first `role: system` message's content, if any.
#[must_use]
pub fn extract_system_prompt(messages: &[ChatMessage]) -> Option<String> {
    messages.iter().find(|m| m.role == "system").map(|m| m.content.clone())
}

/// Fold every non-system message into one turn, in order, the way a
/// session with no prior conversation log needs it spelled out.
#[must_use]
pub fn format_conversation(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .filter(|m| m.role != "system")
        .map(|m| format!("{}: {}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Resolve a requested model string to a provider binding: an exact
/// provider-id match wins, otherwise fall back to the first available
/// provider with the requested string recorded as a model override.
#[must_use]
pub fn resolve_provider_binding(model: &str, provider_ids: &[String]) -> ProviderBinding {
    if provider_ids.iter().any(|id| id == model) {
        return ProviderBinding { name: model.to_string(), ..Default::default() };
    }
    match provider_ids.first() {
        Some(id) => ProviderBinding { name: id.clone(), model: Some(model.to_string()), ..Default::default() },
        None => ProviderBinding { name: model.to_string(), ..Default::default() },
    }
}

/// Build the non-streaming response object from a settled dispatch.
#[must_use]
pub fn build_response(id: String, created: Timestamp, model: &str, outcome: &DispatchOutcome) -> ChatCompletionResponse {
    let usage = &outcome.usage;
    ChatCompletionResponse {
        id,
        object: "chat.completion".to_string(),
        created: created.timestamp(),
        model: model.to_string(),
        choices: vec![ChatChoice {
            index: 0,
            message: ChatMessage { role: "assistant".to_string(), content: outcome.text.clone() },
            finish_reason: finish_reason_str(&outcome.finish_reason),
        }],
        usage: ChatUsage {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.prompt_tokens + usage.completion_tokens,
        },
    }
}

/// Split a settled dispatch into the chunk sequence a streaming caller
/// expects: a role-opening chunk, one content chunk, then a closing chunk
/// carrying `finish_reason`. The `data: [DONE]` sentinel is an SSE framing
/// concern the HTTP layer appends, not part of this sequence.
#[must_use]
pub fn stream_chunks(id: String, created: Timestamp, model: &str, outcome: &DispatchOutcome) -> Vec<ChatCompletionChunk> {
    let created = created.timestamp();
    let base = |choices| ChatCompletionChunk {
        id: id.clone(),
        object: "chat.completion.chunk".to_string(),
        created,
        model: model.to_string(),
        choices,
    };
    vec![
        base(vec![ChatChunkChoice {
            index: 0,
            delta: ChatChunkDelta { role: Some("assistant".to_string()), content: None },
            finish_reason: None,
        }]),
        base(vec![ChatChunkChoice {
            index: 0,
            delta: ChatChunkDelta { role: None, content: Some(outcome.text.clone()) },
            finish_reason: None,
        }]),
        base(vec![ChatChunkChoice {
            index: 0,
            delta: ChatChunkDelta { role: None, content: None },
            finish_reason: Some(finish_reason_str(&outcome.finish_reason)),
        }]),
    ]
}

fn finish_reason_str(reason: &wopr_llm::StopReason) -> String {
    match reason {
        wopr_llm::StopReason::EndTurn | wopr_llm::StopReason::StopSequence => "stop".to_string(),
        wopr_llm::StopReason::ToolUse => "tool_calls".to_string(),
        wopr_llm::StopReason::MaxTokens => "length".to_string(),
        wopr_llm::StopReason::Cancelled => "cancelled".to_string(),
    }
}

/// Enumerate one model entry per registered provider, using its id as the
/// model id and `created` pinned to `now` since providers carry no
/// publication timestamp of their own.
#[must_use]
pub fn list_models(provider_ids: &[String], now: Timestamp) -> ModelsResponse {
    ModelsResponse {
        object: "list".to_string(),
        data: provider_ids
            .iter()
            .map(|id| ModelInfo { id: id.clone(), object: "model".to_string(), owned_by: id.clone(), created: now.timestamp() })
            .collect(),
    }
}

/// Drives one `/v1/chat/completions` call: creates an ephemeral session
/// bound to the resolved provider, enqueues the flattened history as a
/// single turn, and tears the session down whether or not dispatch
/// succeeded.
pub struct OpenAiGateway {
    store: Store,
    providers: Arc<ProviderRegistry>,
    queue: Arc<QueueManager>,
}

impl OpenAiGateway {
    #[must_use]
    pub fn new(store: Store, providers: Arc<ProviderRegistry>, queue: Arc<QueueManager>) -> Self {
        Self { store, providers, queue }
    }

    /// Run one non-streaming completion end to end.
    pub async fn complete(&self, request: &ChatCompletionRequest, now: Timestamp) -> RuntimeResult<ChatCompletionResponse> {
        let outcome = self.dispatch_once(request, now).await?;
        Ok(build_response(completion_id(now), now, &request.model, &outcome))
    }

    /// Run one completion and return it pre-split into stream chunks.
    pub async fn complete_streamed(
        &self,
        request: &ChatCompletionRequest,
        now: Timestamp,
    ) -> RuntimeResult<Vec<ChatCompletionChunk>> {
        let outcome = self.dispatch_once(request, now).await?;
        Ok(stream_chunks(completion_id(now), now, &request.model, &outcome))
    }

    /// `GET /v1/models`.
    pub async fn models(&self, now: Timestamp) -> ModelsResponse {
        list_models(&self.providers.provider_ids().await, now)
    }

    async fn dispatch_once(&self, request: &ChatCompletionRequest, now: Timestamp) -> RuntimeResult<DispatchOutcome> {
        let name = ephemeral_session_name(now);
        let binding = resolve_provider_binding(&request.model, &self.providers.provider_ids().await);
        let mut session = Session::new(name.clone(), now);
        session.context = extract_system_prompt(&request.messages);
        session.provider_binding = Some(binding);
        self.store.sessions()?.put(&session).await?;

        let message = format_conversation(&request.messages);
        let source = InjectionSource::new(InjectionType::Daemon, now).with_trust_level(TrustLevel::Owner).with_target(name.clone());
        let (_id, rx) = self.queue.enqueue(&name, message, source, 0, now).await;
        let result = rx.await.map_err(|_| crate::error::RuntimeError::Cancelled)?;

        let _ = self.store.sessions()?.delete(&name).await;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts() -> Timestamp {
        chrono::DateTime::from_timestamp(1_700_000_000, 0).expect("valid epoch")
    }

    fn msgs() -> Vec<ChatMessage> {
        vec![
            ChatMessage { role: "system".to_string(), content: "be terse".to_string() },
            ChatMessage { role: "user".to_string(), content: "hi".to_string() },
            ChatMessage { role: "assistant".to_string(), content: "hello".to_string() },
            ChatMessage { role: "user".to_string(), content: "again".to_string() },
        ]
    }

    #[test]
    fn extracts_system_prompt() {
        assert_eq!(extract_system_prompt(&msgs()), Some("be terse".to_string()));
        assert_eq!(extract_system_prompt(&msgs()[1..]), None);
    }

    #[test]
    fn flattens_non_system_messages_in_order() {
        let flat = format_conversation(&msgs());
        assert_eq!(flat, "user: hi\nassistant: hello\nuser: again");
    }

    #[test]
    fn exact_provider_id_match_wins() {
        let ids = vec!["claude".to_string(), "echo".to_string()];
        let binding = resolve_provider_binding("echo", &ids);
        assert_eq!(binding.name, "echo");
        assert_eq!(binding.model, None);
    }

    #[test]
    fn unknown_model_falls_back_to_first_provider_with_override() {
        let ids = vec!["claude".to_string(), "echo".to_string()];
        let binding = resolve_provider_binding("gpt-4o", &ids);
        assert_eq!(binding.name, "claude");
        assert_eq!(binding.model, Some("gpt-4o".to_string()));
    }

    #[test]
    fn models_list_mirrors_provider_ids() {
        let ids = vec!["claude".to_string(), "echo".to_string()];
        let list = list_models(&ids, ts());
        assert_eq!(list.data.len(), 2);
        assert_eq!(list.data[0].id, "claude");
        assert_eq!(list.data[0].owned_by, "claude");
    }

    #[test]
    fn stream_chunks_end_with_finish_reason() {
        let outcome = DispatchOutcome {
            inject_id: InjectId::new(ts()),
            text: "hello there".to_string(),
            usage: wopr_llm::QueryUsage::default(),
            finish_reason: wopr_llm::StopReason::EndTurn,
        };
        let chunks = stream_chunks("chatcmpl-x".to_string(), ts(), "echo", &outcome);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[1].choices[0].delta.content.as_deref(), Some("hello there"));
        assert_eq!(chunks[2].choices[0].finish_reason.as_deref(), Some("stop"));
    }
}
