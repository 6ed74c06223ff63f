//! A scripted in-process provider for tests that need a specific canned
//! response, a simulated failure, or an unhealthy provider to exercise the
//! fallback chain.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream;

use crate::error::{LlmError, LlmResult};
use crate::provider::{ClientConfig, CredentialType, LlmClient, ProviderDescriptor, StreamBox};
use crate::types::{LlmToolDefinition, Message, StopReason, StreamEvent, Usage};

/// Descriptor for a mock provider whose client always returns a fixed
/// script of events and whose health can be flipped at runtime.
pub struct MockProvider {
    id: String,
    script: Vec<StreamEvent>,
    healthy: Arc<AtomicBool>,
}

impl MockProvider {
    #[must_use]
    pub fn new(id: impl Into<String>, script: Vec<StreamEvent>) -> Self {
        Self { id: id.into(), script, healthy: Arc::new(AtomicBool::new(true)) }
    }

    /// A handle to flip this provider's health without reconstructing it.
    #[must_use]
    pub fn health_handle(&self) -> Arc<AtomicBool> {
        self.healthy.clone()
    }
}

impl ProviderDescriptor for MockProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.id
    }

    fn default_model(&self) -> &str {
        "mock-1"
    }

    fn credential_type(&self) -> CredentialType {
        CredentialType::ApiKey
    }

    fn validate_credentials(&self, credential: &str) -> bool {
        !credential.is_empty()
    }

    fn create_client(&self, model: &str, _credential: Option<&str>) -> LlmResult<Box<dyn LlmClient>> {
        Ok(Box::new(MockClient {
            config: ClientConfig { model: model.into(), ..Default::default() },
            name: self.id.clone(),
            script: self.script.clone(),
            healthy: self.healthy.clone(),
        }))
    }
}

/// The client half of `MockProvider`: replays a fixed event script, or
/// fails the stream outright if the script is empty.
pub struct MockClient {
    config: ClientConfig,
    name: String,
    script: Vec<StreamEvent>,
    healthy: Arc<AtomicBool>,
}

impl MockClient {
    #[must_use]
    pub fn scripted(name: impl Into<String>, model: impl Into<String>, script: Vec<StreamEvent>) -> Self {
        Self {
            config: ClientConfig { model: model.into(), ..Default::default() },
            name: name.into(),
            script,
            healthy: Arc::new(AtomicBool::new(true)),
        }
    }
}

#[async_trait]
impl LlmClient for MockClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn list_models(&self) -> LlmResult<Vec<String>> {
        Ok(vec![self.config.model.clone()])
    }

    async fn health_check(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    async fn stream(
        &self,
        _messages: &[Message],
        _tools: &[LlmToolDefinition],
        _system: Option<&str>,
    ) -> LlmResult<StreamBox> {
        if self.script.is_empty() {
            return Err(LlmError::RequestFailed {
                provider: self.name.clone(),
                message: "mock script is empty".into(),
            });
        }
        let events = self.script.clone().into_iter().map(Ok);
        Ok(Box::pin(stream::iter(events)))
    }

    fn max_context_length(&self) -> usize {
        self.config.context_window
    }
}

/// A ready-made single-turn script: one text chunk then a clean stop.
#[must_use]
pub fn fixed_reply(text: impl Into<String>) -> Vec<StreamEvent> {
    let text = text.into();
    vec![
        StreamEvent::TextDelta { text: text.clone() },
        StreamEvent::Usage { usage: Usage { input_tokens: 1, output_tokens: text.len() as u64 } },
        StreamEvent::Done { stop_reason: StopReason::EndTurn },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn mock_client_replays_script() {
        let client = MockClient::scripted("mock", "mock-1", fixed_reply("hi"));
        let mut stream = client.stream(&[], &[], None).await.unwrap();
        let mut text = String::new();
        while let Some(event) = stream.next().await {
            if let StreamEvent::TextDelta { text: delta } = event.unwrap() {
                text.push_str(&delta);
            }
        }
        assert_eq!(text, "hi");
    }

    #[tokio::test]
    async fn empty_script_fails_the_stream() {
        let client = MockClient::scripted("mock", "mock-1", vec![]);
        assert!(client.stream(&[], &[], None).await.is_err());
    }

    #[tokio::test]
    async fn health_handle_flips_provider_health() {
        let provider = MockProvider::new("flaky", fixed_reply("ok"));
        let handle = provider.health_handle();
        let client = provider.create_client("mock-1", None).unwrap();
        assert!(client.health_check().await);
        handle.store(false, Ordering::SeqCst);
        assert!(!client.health_check().await);
    }
}
