//! Enumerates registered providers, binds credentials, and resolves a
//! session's effective client through its explicit binding, fallback chain,
//! and the global priority order.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::timeout;

use wopr_core::model::Session;

use crate::error::{LlmError, LlmResult};
use crate::provider::{LlmClient, ProviderDescriptor};

const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// A provider's last-known availability, refreshed by `check_health`.
#[derive(Debug, Clone, Copy)]
pub struct ProviderHealth {
    pub available: bool,
    pub last_checked: wopr_core::ids::Timestamp,
}

struct RegisteredProvider {
    descriptor: Arc<dyn ProviderDescriptor>,
    credential: Option<String>,
    client: Option<Arc<dyn LlmClient>>,
}

/// The provider registry: the daemon's single source of truth for "what
/// providers exist, what credentials do they have, and which one should
/// service this session".
pub struct ProviderRegistry {
    providers: RwLock<HashMap<String, RegisteredProvider>>,
    priority: RwLock<Vec<String>>,
    health: RwLock<HashMap<String, ProviderHealth>>,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            providers: RwLock::new(HashMap::new()),
            priority: RwLock::new(Vec::new()),
            health: RwLock::new(HashMap::new()),
        }
    }

    /// Register a provider descriptor with no credential yet. Providers are
    /// tried, in the global fallback case, in registration order.
    pub async fn register(&self, descriptor: Arc<dyn ProviderDescriptor>) {
        let id = descriptor.id().to_string();
        self.providers
            .write()
            .await
            .insert(id.clone(), RegisteredProvider { descriptor, credential: None, client: None });
        let mut priority = self.priority.write().await;
        if !priority.contains(&id) {
            priority.push(id);
        }
    }

    /// Attach (or replace) a credential for a registered provider, minting
    /// its client eagerly so later lookups don't re-pay the construction
    /// cost.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider id is unknown, the credential fails
    /// the descriptor's own validation, or client construction fails.
    pub async fn configure(&self, provider_id: &str, credential: Option<&str>) -> LlmResult<()> {
        let mut providers = self.providers.write().await;
        let entry = providers
            .get_mut(provider_id)
            .ok_or_else(|| LlmError::UnknownProvider(provider_id.to_string()))?;

        if let Some(credential) = credential {
            if !entry.descriptor.validate_credentials(credential) {
                return Err(LlmError::CredentialRejected { provider: provider_id.to_string() });
            }
        }

        let client = entry.descriptor.create_client(entry.descriptor.default_model(), credential)?;
        entry.credential = credential.map(String::from);
        entry.client = Some(Arc::from(client));
        Ok(())
    }

    async fn client_for(&self, provider_id: &str, model: Option<&str>) -> LlmResult<Arc<dyn LlmClient>> {
        let providers = self.providers.read().await;
        let entry = providers
            .get(provider_id)
            .ok_or_else(|| LlmError::UnknownProvider(provider_id.to_string()))?;
        match model {
            Some(model) if entry.client.as_ref().is_none_or(|client| client.model() != model) => {
                let client = entry.descriptor.create_client(model, entry.credential.as_deref())?;
                Ok(Arc::from(client))
            }
            _ => entry
                .client
                .clone()
                .ok_or_else(|| LlmError::CredentialNotConfigured { provider: provider_id.to_string() }),
        }
    }

    async fn is_available(&self, provider_id: &str) -> bool {
        match self.client_for(provider_id, None).await {
            Ok(client) => client.health_check().await,
            Err(_) => false,
        }
    }

    /// Resolve the client a session's next dispatch should use:
    /// (1) the session's explicit provider binding, if available;
    /// (2) the first entry of its fallback list that passes a health check;
    /// (3) the first healthy provider in global priority order.
    ///
    /// # Errors
    ///
    /// Returns `no_providers` if every candidate is unavailable or
    /// unconfigured.
    pub async fn resolve_provider(&self, session: &Session) -> LlmResult<Arc<dyn LlmClient>> {
        if let Some(binding) = &session.provider_binding {
            if self.is_available(&binding.name).await {
                return self.client_for(&binding.name, binding.model.as_deref()).await;
            }
            for fallback_id in &binding.fallback {
                if self.is_available(fallback_id).await {
                    return self.client_for(fallback_id, None).await;
                }
            }
        }

        for provider_id in self.priority.read().await.iter() {
            if self.is_available(provider_id).await {
                return self.client_for(provider_id, None).await;
            }
        }

        Err(LlmError::NoProviders)
    }

    /// Poll every registered, configured provider concurrently with a
    /// bounded per-provider timeout and record the result.
    pub async fn check_health(&self, now: wopr_core::ids::Timestamp) {
        let ids: Vec<String> = self.providers.read().await.keys().cloned().collect();
        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            let client = self.client_for(&id, None).await.ok();
            let available = match client {
                Some(client) => timeout(HEALTH_CHECK_TIMEOUT, client.health_check()).await.unwrap_or(false),
                None => false,
            };
            results.push((id, available));
        }

        let mut health = self.health.write().await;
        for (id, available) in results {
            health.insert(id, ProviderHealth { available, last_checked: now });
        }
    }

    /// The last-recorded health of every provider, as of the most recent
    /// `check_health` call.
    pub async fn health_snapshot(&self) -> HashMap<String, ProviderHealth> {
        self.health.read().await.clone()
    }

    /// List the registered provider ids in priority order.
    pub async fn provider_ids(&self) -> Vec<String> {
        self.priority.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::echo::EchoProvider;
    use crate::mock::{fixed_reply, MockProvider};
    use std::sync::atomic::Ordering;
    use wopr_core::ids::Timestamp;
    use wopr_core::model::ProviderBinding;

    fn ts() -> Timestamp {
        chrono::DateTime::from_timestamp(0, 0).expect("epoch is a valid timestamp")
    }

    #[tokio::test]
    async fn resolves_explicit_binding_when_available() {
        let registry = ProviderRegistry::new();
        registry.register(Arc::new(EchoProvider)).await;
        registry.configure("echo", None).await.unwrap();

        let mut session = Session::new("s1", ts());
        session.provider_binding = Some(ProviderBinding { name: "echo".into(), ..Default::default() });

        let client = registry.resolve_provider(&session).await.unwrap();
        assert_eq!(client.name(), "echo");
    }

    #[tokio::test]
    async fn falls_back_when_explicit_binding_is_unhealthy() {
        let registry = ProviderRegistry::new();
        let flaky = MockProvider::new("flaky", fixed_reply("x"));
        let handle = flaky.health_handle();
        registry.register(Arc::new(flaky)).await;
        registry.configure("flaky", Some("k")).await.unwrap();
        registry.register(Arc::new(EchoProvider)).await;
        registry.configure("echo", None).await.unwrap();
        handle.store(false, Ordering::SeqCst);

        let mut session = Session::new("s1", ts());
        session.provider_binding = Some(ProviderBinding {
            name: "flaky".into(),
            fallback: vec!["echo".into()],
            ..Default::default()
        });

        let client = registry.resolve_provider(&session).await.unwrap();
        assert_eq!(client.name(), "echo");
    }

    #[tokio::test]
    async fn falls_back_to_global_priority_with_no_binding() {
        let registry = ProviderRegistry::new();
        registry.register(Arc::new(EchoProvider)).await;
        registry.configure("echo", None).await.unwrap();

        let session = Session::new("s1", ts());
        let client = registry.resolve_provider(&session).await.unwrap();
        assert_eq!(client.name(), "echo");
    }

    #[tokio::test]
    async fn no_providers_available_is_an_error() {
        let registry = ProviderRegistry::new();
        let session = Session::new("s1", ts());
        assert!(matches!(registry.resolve_provider(&session).await, Err(LlmError::NoProviders)));
    }

    #[tokio::test]
    async fn configure_rejects_invalid_credential_shape() {
        let registry = ProviderRegistry::new();
        registry.register(Arc::new(crate::claude::ClaudeProvider)).await;
        let result = registry.configure("claude", Some("not-a-key")).await;
        assert!(matches!(result, Err(LlmError::CredentialRejected { .. })));
    }
}
