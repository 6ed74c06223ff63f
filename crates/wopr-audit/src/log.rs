//! The append-only, chain-verified audit log.

use std::sync::Arc;

use wopr_core::Timestamp;
use wopr_crypto::ContentHash;
use wopr_storage::{KvStore, ScopedKvStore};

use crate::entry::{AuditAction, AuditEntry, AuditOutcome};
use crate::error::{AuditError, AuditResult};

const NAMESPACE: &str = "audit:entries";
const HEAD_KEY: &str = "__chain_head__";

/// An append-only audit log backed by a [`KvStore`].
///
/// Entries are chain-linked by content hash: each new entry's `prev_hash`
/// is set to the current head's hash before it is appended, and the head
/// pointer then advances to the new entry. [`AuditLog::verify_chain`]
/// walks the whole log and checks both per-entry integrity and inter-entry
/// linkage.
pub struct AuditLog {
    store: ScopedKvStore,
}

impl AuditLog {
    /// Open an audit log over the given store.
    ///
    /// # Errors
    ///
    /// Returns an error if the fixed audit namespace is somehow rejected by
    /// the store (it never is, in practice).
    pub fn new(store: Arc<dyn KvStore>) -> AuditResult<Self> {
        Ok(Self {
            store: ScopedKvStore::new(store, NAMESPACE).map_err(AuditError::Storage)?,
        })
    }

    /// Append a new entry, linking it to the current chain head.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails to read the head or persist the
    /// entry.
    pub async fn append(
        &self,
        ts: Timestamp,
        action: AuditAction,
        outcome: AuditOutcome,
        source: wopr_core::InjectionSource,
        target_session: Option<String>,
        reason: Option<String>,
    ) -> AuditResult<AuditEntry> {
        let prev_hash = self.chain_head_hash().await?;
        let entry = AuditEntry::new(ts, action, outcome, source, target_session, reason, prev_hash);
        self.store
            .set_json(&entry.id.to_string(), &entry)
            .await
            .map_err(AuditError::Storage)?;
        self.store
            .set_json(HEAD_KEY, &entry.id.to_string())
            .await
            .map_err(AuditError::Storage)?;
        tracing::debug!(entry_id = %entry.id, target = ?entry.target_session, "audit entry appended");
        Ok(entry)
    }

    async fn chain_head_hash(&self) -> AuditResult<ContentHash> {
        let head_id: Option<String> = self
            .store
            .get_json(HEAD_KEY)
            .await
            .map_err(AuditError::Storage)?;
        match head_id {
            None => Ok(ContentHash::zero()),
            Some(id) => {
                let entry = self.get(&id).await?.ok_or_else(|| {
                    AuditError::IntegrityViolation {
                        entry_id: id.clone(),
                        reason: "chain head points to a missing entry".into(),
                    }
                })?;
                Ok(entry.hash)
            }
        }
    }

    /// Fetch a single entry by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the store read or deserialization fails.
    pub async fn get(&self, id: &str) -> AuditResult<Option<AuditEntry>> {
        self.store
            .get_json(id)
            .await
            .map_err(AuditError::Storage)
    }

    /// Return every entry, ordered oldest-first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store read or deserialization fails.
    pub async fn history(&self) -> AuditResult<Vec<AuditEntry>> {
        let keys = self
            .store
            .list_keys()
            .await
            .map_err(AuditError::Storage)?;
        let mut entries = Vec::new();
        for key in keys {
            if key == HEAD_KEY {
                continue;
            }
            if let Some(entry) = self.get(&key).await? {
                entries.push(entry);
            }
        }
        entries.sort_by_key(|e| e.ts);
        Ok(entries)
    }

    /// Entries targeting a specific session, ordered oldest-first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store read or deserialization fails.
    pub async fn session_history(&self, session: &str) -> AuditResult<Vec<AuditEntry>> {
        Ok(self
            .history()
            .await?
            .into_iter()
            .filter(|e| e.target_session.as_deref() == Some(session))
            .collect())
    }

    /// Walk the whole log, verifying each entry's own integrity and its
    /// linkage to the entry before it.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::IntegrityViolation`] at the first entry whose
    /// hash doesn't match its contents, or whose `prev_hash` doesn't match
    /// the preceding entry's hash.
    pub async fn verify_chain(&self) -> AuditResult<()> {
        let entries = self.history().await?;
        let mut prev: Option<&AuditEntry> = None;
        for entry in &entries {
            if !entry.verify_integrity() {
                tracing::warn!(entry_id = %entry.id, "audit entry failed integrity check");
                return Err(AuditError::IntegrityViolation {
                    entry_id: entry.id.to_string(),
                    reason: "stored hash does not match entry contents".into(),
                });
            }
            let expected_prev = prev.map_or(ContentHash::zero(), |p| p.hash);
            if entry.prev_hash != expected_prev {
                tracing::warn!(entry_id = %entry.id, "audit chain linkage broken");
                return Err(AuditError::IntegrityViolation {
                    entry_id: entry.id.to_string(),
                    reason: "prev_hash does not match the preceding entry".into(),
                });
            }
            prev = Some(entry);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wopr_core::{InjectionSource, InjectionType};
    use wopr_storage::MemoryKvStore;

    fn source() -> InjectionSource {
        InjectionSource::new(InjectionType::Cli, chrono::Utc::now())
    }

    #[tokio::test]
    async fn append_and_verify_chain() {
        let log = AuditLog::new(Arc::new(MemoryKvStore::new())).unwrap();
        log.append(
            chrono::Utc::now(),
            AuditAction::SessionCreated,
            AuditOutcome::success(),
            source(),
            Some("alice".into()),
            None,
        )
        .await
        .unwrap();
        log.append(
            chrono::Utc::now(),
            AuditAction::ToolInvoked {
                tool: "http_fetch".into(),
                session: "alice".into(),
                duration_ms: 5,
            },
            AuditOutcome::success(),
            source(),
            Some("alice".into()),
            None,
        )
        .await
        .unwrap();

        let history = log.history().await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].prev_hash, ContentHash::zero());
        assert_eq!(history[1].prev_hash, history[0].hash);
        log.verify_chain().await.unwrap();
    }

    #[tokio::test]
    async fn session_history_filters_by_target() {
        let log = AuditLog::new(Arc::new(MemoryKvStore::new())).unwrap();
        log.append(
            chrono::Utc::now(),
            AuditAction::SessionCreated,
            AuditOutcome::success(),
            source(),
            Some("alice".into()),
            None,
        )
        .await
        .unwrap();
        log.append(
            chrono::Utc::now(),
            AuditAction::SessionCreated,
            AuditOutcome::success(),
            source(),
            Some("bob".into()),
            None,
        )
        .await
        .unwrap();

        let alice_history = log.session_history("alice").await.unwrap();
        assert_eq!(alice_history.len(), 1);
        assert_eq!(alice_history[0].target_session.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn tampered_entry_fails_verification() {
        let log = AuditLog::new(Arc::new(MemoryKvStore::new())).unwrap();
        let entry = log
            .append(
                chrono::Utc::now(),
                AuditAction::SessionCreated,
                AuditOutcome::success(),
                source(),
                Some("alice".into()),
                None,
            )
            .await
            .unwrap();

        let mut tampered = entry.clone();
        tampered.reason = Some("forged".into());
        log.store
            .set_json(&tampered.id.to_string(), &tampered)
            .await
            .unwrap();

        let result = log.verify_chain().await;
        assert!(matches!(result, Err(AuditError::IntegrityViolation { .. })));
    }
}
