//! Request/response shapes and the `ManagementApi` trait modeling the HTTP
//! management surface's route contracts, independent of any HTTP binding.
//! `http` wires a minimal subset of this through `axum`; the rest is
//! exercised directly by this module's tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use wopr_core::{ApiKey, ApiKeyScope, CronJob, CronScript, ErrorKind, Session, Timestamp};
use wopr_cron::NewCronJob;
use wopr_runtime::DispatchOutcome;

/// `POST /sessions` body.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateSessionRequest {
    pub name: String,
    #[serde(default)]
    pub context: Option<String>,
}

/// `POST /sessions` / `GET /sessions` response shape.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub name: String,
    pub created: Timestamp,
    pub context: Option<String>,
}

impl From<&Session> for SessionSummary {
    fn from(session: &Session) -> Self {
        Self { name: session.name.clone(), created: session.created, context: session.context.clone() }
    }
}

/// `POST /sessions/{name}/inject` body.
#[derive(Debug, Clone, Deserialize)]
pub struct InjectRequest {
    pub message: String,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub silent: bool,
}

/// `POST /sessions/{name}/inject` non-streaming response.
#[derive(Debug, Clone, Serialize)]
pub struct InjectResponse {
    pub inject_id: String,
    pub text: String,
    pub finish_reason: String,
}

impl From<DispatchOutcome> for InjectResponse {
    fn from(outcome: DispatchOutcome) -> Self {
        Self {
            inject_id: outcome.inject_id.to_string(),
            text: outcome.text,
            finish_reason: format!("{:?}", outcome.finish_reason),
        }
    }
}

/// `POST /crons` body.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCronRequest {
    pub name: String,
    pub schedule: String,
    pub session: String,
    pub message: String,
    #[serde(default)]
    pub scripts: Vec<CronScript>,
}

impl From<CreateCronRequest> for NewCronJob {
    fn from(req: CreateCronRequest) -> Self {
        NewCronJob { name: req.name, schedule: req.schedule, session: req.session, message: req.message, scripts: req.scripts }
    }
}

/// `POST /api/keys` body.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateApiKeyRequest {
    pub name: String,
    pub scope: ApiKeyScope,
}

/// `POST /api/keys` response: the raw secret, shown once.
#[derive(Debug, Clone, Serialize)]
pub struct CreatedApiKey {
    pub id: String,
    pub secret: String,
}

/// `GET /api/keys` listing entry: never includes the secret or its hash.
#[derive(Debug, Clone, Serialize)]
pub struct MaskedApiKey {
    pub id: String,
    pub name: String,
    pub scope: ApiKeyScope,
    pub prefix: String,
    pub created_at: Timestamp,
    pub last_used_at: Option<Timestamp>,
}

/// A uniform management-surface error, carrying the taxonomy kind needed
/// for HTTP status mapping alongside a human-readable message.
#[derive(Debug, Clone)]
pub struct ManagementError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ManagementError {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    /// The HTTP status this error maps to, per the error taxonomy table.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        self.kind.category().http_status()
    }

    /// The machine-readable error code (e.g. `"session_not_found"`).
    #[must_use]
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }
}

impl std::fmt::Display for ManagementError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code(), self.message)
    }
}

impl std::error::Error for ManagementError {}

impl From<wopr_runtime::RuntimeError> for ManagementError {
    fn from(err: wopr_runtime::RuntimeError) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

impl From<wopr_cron::CronError> for ManagementError {
    fn from(err: wopr_cron::CronError) -> Self {
        let message = err.to_string();
        Self::new(ErrorKind::from(err), message)
    }
}

impl From<wopr_storage::StorageError> for ManagementError {
    fn from(err: wopr_storage::StorageError) -> Self {
        let message = err.to_string();
        Self::new(ErrorKind::from(err), message)
    }
}

/// Result type for management-surface operations.
pub type ManagementResult<T> = Result<T, ManagementError>;

/// The full route contract of the HTTP management surface (§6.1), modeled
/// independently of any transport so it can be exercised by unit tests or
/// bound through `axum`/`tungstenite` without touching the dispatch core.
#[async_trait]
pub trait ManagementApi: Send + Sync {
    async fn create_session(&self, req: CreateSessionRequest, now: Timestamp) -> ManagementResult<SessionSummary>;
    async fn delete_session(&self, name: &str) -> ManagementResult<()>;
    async fn inject(&self, session: &str, req: InjectRequest, now: Timestamp) -> ManagementResult<InjectResponse>;
    async fn list_sessions(&self) -> ManagementResult<Vec<SessionSummary>>;
    async fn create_cron(&self, req: CreateCronRequest, now: Timestamp) -> ManagementResult<CronJob>;
    async fn list_crons(&self) -> ManagementResult<Vec<CronJob>>;
    async fn delete_cron(&self, name: &str) -> ManagementResult<()>;
    async fn cron_history(&self, name: &str) -> ManagementResult<Vec<wopr_core::CronHistoryEntry>>;
    async fn list_providers(&self) -> Vec<String>;
    async fn create_api_key(&self, req: CreateApiKeyRequest, now: Timestamp) -> ManagementResult<CreatedApiKey>;
    async fn list_api_keys(&self) -> ManagementResult<Vec<MaskedApiKey>>;
    /// Revoke an API key. Once this returns, `validate_api_key` on the same
    /// key's raw secret must return `None` (invariant 7).
    async fn revoke_api_key(&self, id: &str) -> ManagementResult<()>;
    /// Look up the stored key whose prefix matches `raw` and constant-time
    /// verify it, returning `None` if no stored key validates (including a
    /// just-revoked one).
    async fn validate_api_key(&self, raw: &str) -> ManagementResult<Option<ApiKey>>;
    /// `validate_api_key`, raising `TokenRevoked` for call sites that need
    /// a hard authentication failure rather than an `Option`.
    async fn authenticate_api_key(&self, raw: &str) -> ManagementResult<ApiKey> {
        self.validate_api_key(raw)
            .await?
            .ok_or_else(|| ManagementError::new(ErrorKind::TokenRevoked, "api key is invalid or has been revoked"))
    }
    /// Session history, most recent last, optionally limited to the last
    /// `limit` entries.
    async fn get_conversation(&self, session: &str, limit: Option<usize>) -> ManagementResult<Vec<wopr_core::ConversationEntry>>;
}

#[async_trait]
impl ManagementApi for crate::state::AppState {
    async fn create_session(&self, req: CreateSessionRequest, now: Timestamp) -> ManagementResult<SessionSummary> {
        let sessions = self.store.sessions().map_err(ManagementError::from)?;
        if let Some(existing) = sessions.get(&req.name).await.map_err(ManagementError::from)? {
            return Ok(SessionSummary::from(&existing));
        }
        let mut session = Session::new(req.name.clone(), now);
        session.context = req.context;
        sessions.put(&session).await.map_err(ManagementError::from)?;
        self.events.publish(wopr_events::WoprEvent::SessionCreate {
            metadata: wopr_events::EventMetadata::for_session(req.name.as_str()),
            session: req.name.clone(),
        });
        Ok(SessionSummary::from(&session))
    }

    async fn delete_session(&self, name: &str) -> ManagementResult<()> {
        let sessions = self.store.sessions().map_err(ManagementError::from)?;
        if !sessions.delete(name).await.map_err(ManagementError::from)? {
            return Err(ManagementError::new(ErrorKind::SessionNotFound, format!("no session named {name}")));
        }
        self.events.publish(wopr_events::WoprEvent::SessionDestroy {
            metadata: wopr_events::EventMetadata::for_session(name),
            session: name.to_string(),
        });
        Ok(())
    }

    async fn inject(&self, session: &str, req: InjectRequest, now: Timestamp) -> ManagementResult<InjectResponse> {
        let source = wopr_core::InjectionSource::new(wopr_core::InjectionType::Api, now)
            .with_trust_level(wopr_core::TrustLevel::Trusted)
            .with_target(session);
        let (_id, rx) = self.queue.enqueue(session, req.message, source, 0, now).await;
        let outcome = rx.await.map_err(|_| ManagementError::new(ErrorKind::Cancelled, "dispatch worker dropped the result channel"))?;
        let _ = req.from;
        let _ = req.silent;
        Ok(InjectResponse::from(outcome.map_err(ManagementError::from)?))
    }

    async fn list_sessions(&self) -> ManagementResult<Vec<SessionSummary>> {
        let sessions = self.store.sessions().map_err(ManagementError::from)?;
        Ok(sessions.list().await.map_err(ManagementError::from)?.iter().map(SessionSummary::from).collect())
    }

    async fn create_cron(&self, req: CreateCronRequest, now: Timestamp) -> ManagementResult<CronJob> {
        let source = wopr_core::InjectionSource::new(wopr_core::InjectionType::Api, now).with_trust_level(wopr_core::TrustLevel::Owner);
        self.cron.create_job(req.into(), source, None, now).await.map_err(ManagementError::from)
    }

    async fn list_crons(&self) -> ManagementResult<Vec<CronJob>> {
        self.cron.list_jobs().await.map_err(ManagementError::from)
    }

    async fn delete_cron(&self, name: &str) -> ManagementResult<()> {
        self.cron.remove_job(name).await.map_err(ManagementError::from)
    }

    async fn cron_history(&self, name: &str) -> ManagementResult<Vec<wopr_core::CronHistoryEntry>> {
        self.cron.history(name).await.map_err(ManagementError::from)
    }

    async fn list_providers(&self) -> Vec<String> {
        self.providers.provider_ids().await
    }

    async fn create_api_key(&self, req: CreateApiKeyRequest, now: Timestamp) -> ManagementResult<CreatedApiKey> {
        let minted = wopr_security::api_key::mint();
        let key = wopr_core::ApiKey {
            id: uuid::Uuid::new_v4().to_string(),
            name: req.name,
            scope: req.scope,
            prefix: minted.prefix,
            hashed_secret: minted.hashed_secret,
            salt: minted.salt,
            created_at: now,
            last_used_at: None,
        };
        self.store.api_keys().map_err(ManagementError::from)?.put(&key).await.map_err(ManagementError::from)?;
        Ok(CreatedApiKey { id: key.id, secret: minted.raw })
    }

    async fn list_api_keys(&self) -> ManagementResult<Vec<MaskedApiKey>> {
        let keys = self.store.api_keys().map_err(ManagementError::from)?.list().await.map_err(ManagementError::from)?;
        Ok(keys
            .into_iter()
            .map(|k| MaskedApiKey { id: k.id, name: k.name, scope: k.scope, prefix: k.prefix, created_at: k.created_at, last_used_at: k.last_used_at })
            .collect())
    }

    async fn revoke_api_key(&self, id: &str) -> ManagementResult<()> {
        let repo = self.store.api_keys().map_err(ManagementError::from)?;
        if !repo.delete(id).await.map_err(ManagementError::from)? {
            return Err(ManagementError::new(ErrorKind::SessionNotFound, format!("no api key with id {id}")));
        }
        Ok(())
    }

    async fn validate_api_key(&self, raw: &str) -> ManagementResult<Option<ApiKey>> {
        let keys = self.store.api_keys().map_err(ManagementError::from)?.list().await.map_err(ManagementError::from)?;
        Ok(keys
            .into_iter()
            .find(|key| raw.starts_with(&key.prefix) && wopr_security::api_key::verify(raw, &key.salt, &key.hashed_secret)))
    }

    async fn get_conversation(&self, session: &str, limit: Option<usize>) -> ManagementResult<Vec<wopr_core::ConversationEntry>> {
        let repo = self.store.conversation(session).map_err(ManagementError::from)?;
        repo.history_tail(limit).await.map_err(ManagementError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::bootstrap;

    fn now() -> Timestamp {
        chrono::Utc::now()
    }

    async fn state() -> (crate::state::AppState, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let state = bootstrap(dir.path().to_path_buf()).await.unwrap();
        (state, dir)
    }

    #[tokio::test]
    async fn create_session_is_idempotent_by_name() {
        let (state, _dir) = state().await;
        let a = state.create_session(CreateSessionRequest { name: "alpha".into(), context: None }, now()).await.unwrap();
        let b = state.create_session(CreateSessionRequest { name: "alpha".into(), context: Some("ignored".into()) }, now()).await.unwrap();
        assert_eq!(a.created, b.created);
    }

    #[tokio::test]
    async fn deleting_unknown_session_is_not_found() {
        let (state, _dir) = state().await;
        let err = state.delete_session("ghost").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::SessionNotFound);
        assert_eq!(err.status_code(), 404);
    }

    #[tokio::test]
    async fn inject_against_echo_provider_round_trips() {
        let (state, _dir) = state().await;
        state.create_session(CreateSessionRequest { name: "alpha".into(), context: None }, now()).await.unwrap();
        let response = state.inject("alpha", InjectRequest { message: "ping".into(), from: None, silent: false }, now()).await.unwrap();
        assert!(response.text.contains("ping"));
    }

    #[tokio::test]
    async fn api_key_listing_never_exposes_the_secret() {
        let (state, _dir) = state().await;
        let created = state.create_api_key(CreateApiKeyRequest { name: "ci".into(), scope: ApiKeyScope::ReadOnly }, now()).await.unwrap();
        let listed = state.list_api_keys().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, created.id);
        assert!(created.secret.starts_with("wopr_"));
    }

    #[tokio::test]
    async fn revoked_key_no_longer_validates() {
        let (state, _dir) = state().await;
        let created = state.create_api_key(CreateApiKeyRequest { name: "ci".into(), scope: ApiKeyScope::Full }, now()).await.unwrap();

        assert!(state.validate_api_key(&created.secret).await.unwrap().is_some());

        state.revoke_api_key(&created.id).await.unwrap();

        assert!(state.validate_api_key(&created.secret).await.unwrap().is_none());
        let err = state.authenticate_api_key(&created.secret).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::TokenRevoked);
    }

    #[tokio::test]
    async fn revoking_an_unknown_key_is_not_found() {
        let (state, _dir) = state().await;
        let err = state.revoke_api_key("ghost").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::SessionNotFound);
    }

    #[tokio::test]
    async fn get_conversation_respects_tail_limit() {
        let (state, _dir) = state().await;
        state.create_session(CreateSessionRequest { name: "alpha".into(), context: None }, now()).await.unwrap();
        for i in 0..3 {
            state
                .inject("alpha", InjectRequest { message: format!("ping-{i}"), from: None, silent: false }, now())
                .await
                .unwrap();
        }

        let full = state.get_conversation("alpha", None).await.unwrap();
        assert_eq!(full.len(), 6);

        let tail = state.get_conversation("alpha", Some(2)).await.unwrap();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail, full[full.len() - 2..]);
    }
}
