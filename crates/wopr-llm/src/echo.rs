//! An in-process provider that echoes the last user message back, in
//! streamed chunks. Used for tests and local development where no network
//! credentials are available.

use async_trait::async_trait;
use futures::stream;

use crate::error::LlmResult;
use crate::provider::{ClientConfig, CredentialType, LlmClient, ProviderDescriptor, StreamBox};
use crate::types::{LlmToolDefinition, Message, StopReason, StreamEvent, Usage};

/// Descriptor for the echo provider; always available, needs no credential.
pub struct EchoProvider;

impl ProviderDescriptor for EchoProvider {
    fn id(&self) -> &str {
        "echo"
    }

    fn name(&self) -> &str {
        "Echo"
    }

    fn default_model(&self) -> &str {
        "echo-1"
    }

    fn credential_type(&self) -> CredentialType {
        CredentialType::None
    }

    fn validate_credentials(&self, _credential: &str) -> bool {
        true
    }

    fn create_client(&self, model: &str, _credential: Option<&str>) -> LlmResult<Box<dyn LlmClient>> {
        Ok(Box::new(EchoClient::new(model)))
    }
}

/// A client that streams back the last user message prefixed with `"echo: "`.
pub struct EchoClient {
    config: ClientConfig,
}

impl EchoClient {
    #[must_use]
    pub fn new(model: impl Into<String>) -> Self {
        Self { config: ClientConfig { model: model.into(), ..Default::default() } }
    }
}

#[async_trait]
impl LlmClient for EchoClient {
    fn name(&self) -> &str {
        "echo"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn list_models(&self) -> LlmResult<Vec<String>> {
        Ok(vec![self.config.model.clone()])
    }

    async fn health_check(&self) -> bool {
        true
    }

    async fn stream(
        &self,
        messages: &[Message],
        _tools: &[LlmToolDefinition],
        _system: Option<&str>,
    ) -> LlmResult<StreamBox> {
        let last_user_text = messages
            .iter()
            .rev()
            .find_map(Message::text)
            .unwrap_or_default();
        let reply = format!("echo: {last_user_text}");
        let input_tokens = self.count_tokens(&last_user_text) as u64;
        let output_tokens = self.count_tokens(&reply) as u64;

        let events = vec![
            Ok(StreamEvent::TextDelta { text: reply }),
            Ok(StreamEvent::Usage { usage: Usage { input_tokens, output_tokens } }),
            Ok(StreamEvent::Done { stop_reason: StopReason::EndTurn }),
        ];
        Ok(Box::pin(stream::iter(events)))
    }

    fn max_context_length(&self) -> usize {
        self.config.context_window
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn echo_client_streams_prefixed_reply() {
        let client = EchoClient::new("echo-1");
        let messages = vec![Message::user("ping")];
        let mut stream = client.stream(&messages, &[], None).await.unwrap();

        let mut text = String::new();
        while let Some(event) = stream.next().await {
            if let StreamEvent::TextDelta { text: delta } = event.unwrap() {
                text.push_str(&delta);
            }
        }
        assert_eq!(text, "echo: ping");
    }

    #[test]
    fn descriptor_accepts_any_credential() {
        let descriptor = EchoProvider;
        assert_eq!(descriptor.credential_type(), CredentialType::None);
        assert!(descriptor.validate_credentials(""));
    }
}
