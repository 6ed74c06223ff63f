//! Typed repositories over the namespaced key-value store.
//!
//! Each method here is a thin, JSON-typed wrapper around a [`ScopedKvStore`]
//! for one entity kind in the persisted data model. `wopr-runtime` and
//! `wopr-cron` depend on this instead of talking to [`KvStore`] directly.

use std::sync::Arc;

use wopr_core::{AccessGrant, ApiKey, ConversationEntry, CronHistoryEntry, CronJob, Identity, Peer, Session};

use crate::error::{StorageError, StorageResult};
use crate::kv::{KvStore, ScopedKvStore};

const NS_SESSIONS: &str = "sessions";
const NS_CONVERSATION_PREFIX: &str = "conversation:";
const NS_CRON_JOBS: &str = "cron_jobs";
const NS_CRON_HISTORY_PREFIX: &str = "cron_history:";
const NS_IDENTITY: &str = "identity";
const NS_PEERS: &str = "peers";
const NS_ACCESS_GRANTS: &str = "access_grants";
const NS_API_KEYS: &str = "api_keys";
const NS_PROFILE: &str = "profile";

/// Aggregates every typed repository over one shared [`KvStore`].
///
/// Construct once per daemon instance and clone the `Arc`-backed handles
/// out to whichever component needs them.
#[derive(Clone)]
pub struct Store {
    kv: Arc<dyn KvStore>,
}

impl Store {
    /// Wrap an existing key-value backend.
    #[must_use]
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    fn scoped(&self, namespace: impl Into<String>) -> StorageResult<ScopedKvStore> {
        ScopedKvStore::new(Arc::clone(&self.kv), namespace)
    }

    /// The session repository.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidKey`] if the namespace cannot be scoped
    /// (unreachable for the fixed namespace constant).
    pub fn sessions(&self) -> StorageResult<SessionRepo> {
        Ok(SessionRepo(self.scoped(NS_SESSIONS)?))
    }

    /// The conversation-history repository for one session.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidKey`] if `session_name` is empty.
    pub fn conversation(&self, session_name: &str) -> StorageResult<ConversationRepo> {
        Ok(ConversationRepo(
            self.scoped(format!("{NS_CONVERSATION_PREFIX}{session_name}"))?,
        ))
    }

    /// The cron job repository, keyed by job name.
    pub fn cron_jobs(&self) -> StorageResult<CronJobRepo> {
        Ok(CronJobRepo(self.scoped(NS_CRON_JOBS)?))
    }

    /// The cron run-history repository for one job.
    pub fn cron_history(&self, job_name: &str) -> StorageResult<CronHistoryRepo> {
        Ok(CronHistoryRepo(
            self.scoped(format!("{NS_CRON_HISTORY_PREFIX}{job_name}"))?,
        ))
    }

    /// The daemon identity repository (a single entry keyed `"current"`).
    pub fn identity(&self) -> StorageResult<IdentityRepo> {
        Ok(IdentityRepo(self.scoped(NS_IDENTITY)?))
    }

    /// The known-peer repository.
    pub fn peers(&self) -> StorageResult<PeerRepo> {
        Ok(PeerRepo(self.scoped(NS_PEERS)?))
    }

    /// The access-grant repository.
    pub fn access_grants(&self) -> StorageResult<AccessGrantRepo> {
        Ok(AccessGrantRepo(self.scoped(NS_ACCESS_GRANTS)?))
    }

    /// The API key repository.
    pub fn api_keys(&self) -> StorageResult<ApiKeyRepo> {
        Ok(ApiKeyRepo(self.scoped(NS_API_KEYS)?))
    }

    /// The freeform profile repository backing the memory/identity/soul
    /// tool surface, keyed by whatever scheme the caller chooses (the tool
    /// handlers key by `"{kind}:{session}:{key}"`).
    pub fn profile(&self) -> StorageResult<ProfileRepo> {
        Ok(ProfileRepo(self.scoped(NS_PROFILE)?))
    }
}

/// CRUD over [`Session`] records, keyed by session name.
pub struct SessionRepo(ScopedKvStore);

impl SessionRepo {
    /// Fetch a session by name.
    pub async fn get(&self, name: &str) -> StorageResult<Option<Session>> {
        self.0.get_json(name).await
    }

    /// Insert or replace a session.
    pub async fn put(&self, session: &Session) -> StorageResult<()> {
        self.0.set_json(&session.name, session).await
    }

    /// Remove a session. Returns `true` if it existed.
    pub async fn delete(&self, name: &str) -> StorageResult<bool> {
        self.0.delete(name).await
    }

    /// List every persisted session.
    pub async fn list(&self) -> StorageResult<Vec<Session>> {
        let mut out = Vec::new();
        for key in self.0.list_keys().await? {
            if let Some(session) = self.0.get_json(&key).await? {
                out.push(session);
            }
        }
        Ok(out)
    }
}

/// Append-only conversation history for one session.
///
/// Entries carry no id of their own, so each append is keyed by a fresh
/// UUID; ordering on read is by [`ConversationEntry::ts`], not key order.
pub struct ConversationRepo(ScopedKvStore);

impl ConversationRepo {
    /// Append an entry under a freshly generated key.
    pub async fn append(&self, entry: &ConversationEntry) -> StorageResult<()> {
        let key = uuid::Uuid::new_v4().to_string();
        self.0.set_json(&key, entry).await
    }

    /// Load the full history in chronological order.
    pub async fn history(&self) -> StorageResult<Vec<ConversationEntry>> {
        self.history_tail(None).await
    }

    /// Load history in chronological order, optionally keeping only the
    /// last `n` entries (order is preserved either way).
    pub async fn history_tail(&self, n: Option<usize>) -> StorageResult<Vec<ConversationEntry>> {
        let mut entries = Vec::new();
        for key in self.0.list_keys().await? {
            if let Some(entry) = self.0.get_json(&key).await? {
                entries.push(entry);
            }
        }
        entries.sort_by_key(|e: &ConversationEntry| e.ts);
        if let Some(n) = n {
            let start = entries.len().saturating_sub(n);
            entries.drain(..start);
        }
        Ok(entries)
    }
}

/// CRUD over [`CronJob`] records, keyed by job name.
pub struct CronJobRepo(ScopedKvStore);

impl CronJobRepo {
    /// Fetch a job by name.
    pub async fn get(&self, name: &str) -> StorageResult<Option<CronJob>> {
        self.0.get_json(name).await
    }

    /// Insert or replace a job.
    pub async fn put(&self, job: &CronJob) -> StorageResult<()> {
        self.0.set_json(&job.name, job).await
    }

    /// Remove a job. Returns `true` if it existed.
    pub async fn delete(&self, name: &str) -> StorageResult<bool> {
        self.0.delete(name).await
    }

    /// List every persisted job.
    pub async fn list(&self) -> StorageResult<Vec<CronJob>> {
        let mut out = Vec::new();
        for key in self.0.list_keys().await? {
            if let Some(job) = self.0.get_json(&key).await? {
                out.push(job);
            }
        }
        Ok(out)
    }
}

/// Append-only run history for one cron job.
pub struct CronHistoryRepo(ScopedKvStore);

impl CronHistoryRepo {
    /// Append a history entry under a freshly generated key.
    pub async fn append(&self, entry: &CronHistoryEntry) -> StorageResult<()> {
        let key = uuid::Uuid::new_v4().to_string();
        self.0.set_json(&key, entry).await
    }

    /// Load the run history in chronological order.
    pub async fn history(&self) -> StorageResult<Vec<CronHistoryEntry>> {
        let mut entries = Vec::new();
        for key in self.0.list_keys().await? {
            if let Some(entry) = self.0.get_json(&key).await? {
                entries.push(entry);
            }
        }
        entries.sort_by_key(|e: &CronHistoryEntry| e.ts);
        Ok(entries)
    }
}

/// The daemon's own identity record.
pub struct IdentityRepo(ScopedKvStore);

const CURRENT_IDENTITY_KEY: &str = "current";

impl IdentityRepo {
    /// Load the current identity, if one has been generated.
    pub async fn get(&self) -> StorageResult<Option<Identity>> {
        self.0.get_json(CURRENT_IDENTITY_KEY).await
    }

    /// Persist the current identity.
    pub async fn put(&self, identity: &Identity) -> StorageResult<()> {
        self.0.set_json(CURRENT_IDENTITY_KEY, identity).await
    }
}

/// CRUD over known [`Peer`] records, keyed by public key hex.
pub struct PeerRepo(ScopedKvStore);

impl PeerRepo {
    /// Fetch a peer by its public key.
    pub async fn get(&self, public_key: &str) -> StorageResult<Option<Peer>> {
        self.0.get_json(public_key).await
    }

    /// Insert or replace a peer.
    pub async fn put(&self, peer: &Peer) -> StorageResult<()> {
        self.0.set_json(&peer.public_key, peer).await
    }

    /// Remove a peer. Returns `true` if it existed.
    pub async fn delete(&self, public_key: &str) -> StorageResult<bool> {
        self.0.delete(public_key).await
    }

    /// List every known peer.
    pub async fn list(&self) -> StorageResult<Vec<Peer>> {
        let mut out = Vec::new();
        for key in self.0.list_keys().await? {
            if let Some(peer) = self.0.get_json(&key).await? {
                out.push(peer);
            }
        }
        Ok(out)
    }
}

/// CRUD over [`AccessGrant`] records, keyed by grant id.
pub struct AccessGrantRepo(ScopedKvStore);

impl AccessGrantRepo {
    /// Fetch a grant by id.
    pub async fn get(&self, id: &str) -> StorageResult<Option<AccessGrant>> {
        self.0.get_json(id).await
    }

    /// Insert or replace a grant.
    pub async fn put(&self, grant: &AccessGrant) -> StorageResult<()> {
        self.0.set_json(&grant.id, grant).await
    }

    /// Revoke (delete) a grant. Returns `true` if it existed.
    pub async fn delete(&self, id: &str) -> StorageResult<bool> {
        self.0.delete(id).await
    }

    /// List every grant.
    pub async fn list(&self) -> StorageResult<Vec<AccessGrant>> {
        let mut out = Vec::new();
        for key in self.0.list_keys().await? {
            if let Some(grant) = self.0.get_json(&key).await? {
                out.push(grant);
            }
        }
        Ok(out)
    }
}

/// CRUD over [`ApiKey`] records, keyed by the key id (not the secret).
pub struct ApiKeyRepo(ScopedKvStore);

impl ApiKeyRepo {
    /// Fetch an API key record by id.
    pub async fn get(&self, id: &str) -> StorageResult<Option<ApiKey>> {
        self.0.get_json(id).await
    }

    /// Insert or replace an API key record.
    pub async fn put(&self, key: &ApiKey) -> StorageResult<()> {
        self.0.set_json(&key.id, key).await
    }

    /// Revoke (delete) an API key. Returns `true` if it existed.
    pub async fn delete(&self, id: &str) -> StorageResult<bool> {
        self.0.delete(id).await
    }

    /// List every API key record.
    pub async fn list(&self) -> StorageResult<Vec<ApiKey>> {
        let mut out = Vec::new();
        for key in self.0.list_keys().await? {
            if let Some(k) = self.0.get_json(&key).await? {
                out.push(k);
            }
        }
        Ok(out)
    }
}

/// Freeform `String`-valued entries keyed by an arbitrary string, backing
/// the memory/identity/soul tool surface. Unlike the other repositories
/// this has no fixed record shape — callers own their own key scheme and
/// value format.
pub struct ProfileRepo(ScopedKvStore);

impl ProfileRepo {
    /// Fetch an entry by key.
    pub async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        self.0.get_json(key).await
    }

    /// Insert or replace an entry.
    pub async fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.0.set_json(key, &value).await
    }

    /// Remove an entry. Returns `true` if it existed.
    pub async fn delete(&self, key: &str) -> StorageResult<bool> {
        self.0.delete(key).await
    }

    /// Every key currently stored under `prefix`, with its value.
    pub async fn list_prefixed(&self, prefix: &str) -> StorageResult<Vec<(String, String)>> {
        let mut out = Vec::new();
        for key in self.0.list_keys().await? {
            if !key.starts_with(prefix) {
                continue;
            }
            if let Some(value) = self.0.get_json(&key).await? {
                out.push((key, value));
            }
        }
        Ok(out)
    }

    /// Keys (and values) under `prefix` whose key or value contains `query`
    /// as a case-insensitive substring.
    pub async fn search_prefixed(&self, prefix: &str, query: &str) -> StorageResult<Vec<(String, String)>> {
        let needle = query.to_lowercase();
        Ok(self
            .list_prefixed(prefix)
            .await?
            .into_iter()
            .filter(|(key, value)| key.to_lowercase().contains(&needle) || value.to_lowercase().contains(&needle))
            .collect())
    }
}

impl From<StorageError> for wopr_core::ErrorKind {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(_) => wopr_core::ErrorKind::SessionNotFound,
            StorageError::AlreadyExists(_) => wopr_core::ErrorKind::SessionAlreadyExists,
            StorageError::InvalidKey(_) | StorageError::Serialization(_) => {
                wopr_core::ErrorKind::MissingField
            }
            StorageError::Internal(_) => wopr_core::ErrorKind::ProviderUnavailable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKvStore;

    fn store() -> Store {
        Store::new(Arc::new(MemoryKvStore::new()))
    }

    #[tokio::test]
    async fn session_repo_roundtrip() {
        let store = store();
        let repo = store.sessions().unwrap();
        let session = Session::new("alice", chrono::Utc::now());
        repo.put(&session).await.unwrap();
        assert_eq!(repo.get("alice").await.unwrap().unwrap().name, "alice");
        assert_eq!(repo.list().await.unwrap().len(), 1);
        assert!(repo.delete("alice").await.unwrap());
        assert!(repo.get("alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn conversation_repo_sorts_by_timestamp() {
        let store = store();
        let repo = store.conversation("alice").unwrap();
        let now = chrono::Utc::now();
        let later = ConversationEntry {
            ts: now + chrono::Duration::seconds(10),
            from: "alice".into(),
            sender_id: None,
            content: "later".into(),
            kind: wopr_core::ConversationEntryType::Message,
            channel: None,
        };
        let earlier = ConversationEntry {
            ts: now,
            content: "earlier".into(),
            ..later.clone()
        };
        repo.append(&later).await.unwrap();
        repo.append(&earlier).await.unwrap();

        let history = repo.history().await.unwrap();
        assert_eq!(history[0].content, "earlier");
        assert_eq!(history[1].content, "later");
    }

    #[tokio::test]
    async fn history_tail_keeps_the_last_n_entries_in_order() {
        let store = store();
        let repo = store.conversation("alice").unwrap();
        let now = chrono::Utc::now();
        for i in 0..5 {
            let entry = ConversationEntry {
                ts: now + chrono::Duration::seconds(i),
                from: "alice".into(),
                sender_id: None,
                content: format!("msg-{i}"),
                kind: wopr_core::ConversationEntryType::Message,
                channel: None,
            };
            repo.append(&entry).await.unwrap();
        }

        let tail = repo.history_tail(Some(2)).await.unwrap();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].content, "msg-3");
        assert_eq!(tail[1].content, "msg-4");

        let untruncated = repo.history_tail(Some(100)).await.unwrap();
        assert_eq!(untruncated.len(), 5);

        let all = repo.history_tail(None).await.unwrap();
        assert_eq!(all.len(), 5);
    }

    #[tokio::test]
    async fn profile_repo_search_is_case_insensitive_over_key_and_value() {
        let store = store();
        let repo = store.profile().unwrap();
        repo.set("memory:alice:shopping", "buy Milk").await.unwrap();
        repo.set("memory:alice:notes", "unrelated").await.unwrap();
        repo.set("memory:bob:shopping", "buy bread").await.unwrap();

        let hits = repo.search_prefixed("memory:alice:", "milk").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, "memory:alice:shopping");
    }

    #[tokio::test]
    async fn cron_job_repo_keys_by_name() {
        let store = store();
        let repo = store.cron_jobs().unwrap();
        let job = CronJob {
            name: "nightly".into(),
            schedule: "0 2 * * *".into(),
            session: "alice".into(),
            message: "run report".into(),
            scripts: vec![],
            once: false,
            run_at: None,
        };
        repo.put(&job).await.unwrap();
        assert!(repo.get("nightly").await.unwrap().is_some());
        assert!(repo.delete("nightly").await.unwrap());
        assert!(repo.get("nightly").await.unwrap().is_none());
    }
}
