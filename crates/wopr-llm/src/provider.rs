//! The provider descriptor and client traits every backend implements.

use std::fmt;
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::LlmResult;
use crate::types::{LlmToolDefinition, Message, StreamEvent};

/// A stream of incremental response events.
pub type StreamBox = Pin<Box<dyn Stream<Item = LlmResult<StreamEvent>> + Send>>;

/// How a provider expects to be authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialType {
    ApiKey,
    OAuth,
    None,
}

/// Connection settings for a client, redacting the credential in `Debug`.
#[derive(Clone)]
pub struct ClientConfig {
    pub credential: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub base_url: Option<String>,
    pub context_window: usize,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("has_credential", &self.credential.is_some())
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("has_base_url", &self.base_url.is_some())
            .field("context_window", &self.context_window)
            .finish()
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            credential: None,
            model: String::from("default"),
            max_tokens: 4096,
            temperature: 0.7,
            base_url: None,
            context_window: 200_000,
        }
    }
}

impl ClientConfig {
    #[must_use]
    pub fn new(credential: impl Into<String>, model: impl Into<String>) -> Self {
        Self { credential: Some(credential.into()), model: model.into(), ..Default::default() }
    }

    #[must_use]
    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    #[must_use]
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature.clamp(0.0, 1.0);
        self
    }

    #[must_use]
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    #[must_use]
    pub fn context_window(mut self, context_window: usize) -> Self {
        self.context_window = context_window;
        self
    }
}

/// A live, credentialed connection to a provider, able to stream a query.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// The provider id this client talks to (e.g. `"claude"`, `"echo"`).
    fn name(&self) -> &str;

    /// The model this client is bound to.
    fn model(&self) -> &str;

    /// List the model ids this client can serve, if the provider supports
    /// discovery; otherwise a single-entry list naming the bound model.
    async fn list_models(&self) -> LlmResult<Vec<String>>;

    /// A cheap reachability check, used by `resolveProvider`'s fallback walk
    /// and by `checkHealth`.
    async fn health_check(&self) -> bool;

    /// Stream a response to the given conversation, with the given tool
    /// catalogue and system prompt available to the model.
    async fn stream(
        &self,
        messages: &[Message],
        tools: &[LlmToolDefinition],
        system: Option<&str>,
    ) -> LlmResult<StreamBox>;

    /// The provider's advertised context window, in tokens.
    fn max_context_length(&self) -> usize;

    /// A crude token estimate (~4 characters per token) used for context
    /// budgeting before trimming conversation history. Providers with a
    /// real tokenizer should override this.
    fn count_tokens(&self, text: &str) -> usize {
        text.len().div_ceil(4)
    }
}

#[async_trait]
impl LlmClient for Box<dyn LlmClient> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn model(&self) -> &str {
        (**self).model()
    }

    async fn list_models(&self) -> LlmResult<Vec<String>> {
        (**self).list_models().await
    }

    async fn health_check(&self) -> bool {
        (**self).health_check().await
    }

    async fn stream(
        &self,
        messages: &[Message],
        tools: &[LlmToolDefinition],
        system: Option<&str>,
    ) -> LlmResult<StreamBox> {
        (**self).stream(messages, tools, system).await
    }

    fn max_context_length(&self) -> usize {
        (**self).max_context_length()
    }

    fn count_tokens(&self, text: &str) -> usize {
        (**self).count_tokens(text)
    }
}

/// Describes a provider and knows how to mint a credentialed client for it.
/// The registry holds one of these per registered provider id.
pub trait ProviderDescriptor: Send + Sync {
    /// The stable provider id (e.g. `"claude"`).
    fn id(&self) -> &str;

    /// A human-readable display name.
    fn name(&self) -> &str;

    /// The model used when a session doesn't override one.
    fn default_model(&self) -> &str;

    /// How this provider expects to be authenticated.
    fn credential_type(&self) -> CredentialType;

    /// A cheap, non-network shape check of a credential string (e.g. prefix
    /// and length), used before ever dialing out.
    fn validate_credentials(&self, credential: &str) -> bool;

    /// Build a client bound to the given model and credential.
    fn create_client(&self, model: &str, credential: Option<&str>) -> LlmResult<Box<dyn LlmClient>>;
}
