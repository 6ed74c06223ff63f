//! Namespaced key-value store trait and implementations.
//!
//! All WOPR persistence — sessions, conversation history, cron jobs and
//! history, identities, peers, access grants, API keys — goes through
//! [`KvStore`], scoped per entity kind via [`ScopedKvStore`]. The on-disk
//! implementation is [`FileKvStore`]: one JSON file per namespace under
//! `WOPR_HOME`, holding `{key: value}`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{StorageError, StorageResult};

fn validate_namespace(namespace: &str) -> StorageResult<()> {
    if namespace.is_empty() {
        return Err(StorageError::InvalidKey(
            "namespace must not be empty".into(),
        ));
    }
    if namespace.contains('/') || namespace.contains('\0') {
        return Err(StorageError::InvalidKey(
            "namespace must not contain '/' or null bytes".into(),
        ));
    }
    Ok(())
}

fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey("key must not be empty".into()));
    }
    if key.contains('\0') {
        return Err(StorageError::InvalidKey(
            "key must not contain null bytes".into(),
        ));
    }
    Ok(())
}

/// A key-value entry with its namespace and key.
#[derive(Debug, Clone)]
pub struct KvEntry {
    /// The namespace this entry belongs to.
    pub namespace: String,
    /// The key within the namespace.
    pub key: String,
    /// The raw value bytes.
    pub value: Vec<u8>,
}

/// Namespaced key-value store trait.
///
/// Implementations must isolate keys between namespaces: a key written to
/// `ns1` must never be visible under `ns2`.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Get a value by namespace and key. Returns `None` if absent.
    async fn get(&self, namespace: &str, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Set a value for a namespace and key, overwriting any existing value.
    async fn set(&self, namespace: &str, key: &str, value: Vec<u8>) -> StorageResult<()>;

    /// Delete a key. Returns `true` if it existed.
    async fn delete(&self, namespace: &str, key: &str) -> StorageResult<bool>;

    /// Check whether a key exists.
    async fn exists(&self, namespace: &str, key: &str) -> StorageResult<bool>;

    /// List all keys in a namespace.
    async fn list_keys(&self, namespace: &str) -> StorageResult<Vec<String>>;

    /// Delete every key in a namespace, returning the count removed.
    async fn clear_namespace(&self, namespace: &str) -> StorageResult<u64>;
}

/// In-memory key-value store, for tests and the `EchoProvider`-style dry runs.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    data: RwLock<HashMap<String, HashMap<String, Vec<u8>>>>,
}

impl MemoryKvStore {
    /// Create a new empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, namespace: &str, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let data = self.data.read().await;
        Ok(data.get(namespace).and_then(|ns| ns.get(key)).cloned())
    }

    async fn set(&self, namespace: &str, key: &str, value: Vec<u8>) -> StorageResult<()> {
        let mut data = self.data.write().await;
        data.entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, namespace: &str, key: &str) -> StorageResult<bool> {
        let mut data = self.data.write().await;
        Ok(data
            .get_mut(namespace)
            .is_some_and(|ns| ns.remove(key).is_some()))
    }

    async fn exists(&self, namespace: &str, key: &str) -> StorageResult<bool> {
        let data = self.data.read().await;
        Ok(data.get(namespace).is_some_and(|ns| ns.contains_key(key)))
    }

    async fn list_keys(&self, namespace: &str) -> StorageResult<Vec<String>> {
        let data = self.data.read().await;
        Ok(data
            .get(namespace)
            .map(|ns| ns.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn clear_namespace(&self, namespace: &str) -> StorageResult<u64> {
        let mut data = self.data.write().await;
        Ok(data.remove(namespace).map_or(0, |ns| ns.len() as u64))
    }
}

/// JSON-file-backed key-value store.
///
/// Each namespace is one file, `{root}/{namespace}.json`, holding a
/// `{key: base64-or-utf8-ish}` JSON object. Values are stored as JSON
/// strings via base-free UTF-8 passthrough when valid, otherwise as an
/// array of byte values — in practice every WOPR value is JSON-serialized
/// text, so the common path is the UTF-8 one.
///
/// Writes go through a temp-file-then-rename swap so a crash mid-write
/// cannot corrupt a namespace file.
pub struct FileKvStore {
    root: PathBuf,
    lock: RwLock<()>,
}

impl std::fmt::Debug for FileKvStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileKvStore")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

#[derive(serde::Serialize, serde::Deserialize, Default)]
struct NamespaceFile(HashMap<String, Vec<u8>>);

impl FileKvStore {
    /// Open (or create) a file-backed store rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Internal`] if `root` cannot be created.
    pub async fn open(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| StorageError::Internal(e.to_string()))?;
        Ok(Self {
            root,
            lock: RwLock::new(()),
        })
    }

    fn namespace_path(&self, namespace: &str) -> PathBuf {
        self.root.join(format!("{namespace}.json"))
    }

    async fn read_namespace(&self, namespace: &str) -> StorageResult<NamespaceFile> {
        let path = self.namespace_path(namespace);
        match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| StorageError::Serialization(e.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(NamespaceFile::default()),
            Err(e) => Err(StorageError::Internal(e.to_string())),
        }
    }

    async fn write_namespace(&self, namespace: &str, file: &NamespaceFile) -> StorageResult<()> {
        let path = self.namespace_path(namespace);
        let tmp_path = path.with_extension("json.tmp");
        let bytes =
            serde_json::to_vec_pretty(file).map_err(|e| StorageError::Serialization(e.to_string()))?;
        tokio::fs::write(&tmp_path, bytes)
            .await
            .map_err(|e| StorageError::Internal(e.to_string()))?;
        tokio::fs::rename(&tmp_path, &path)
            .await
            .map_err(|e| StorageError::Internal(e.to_string()))
    }
}

#[async_trait]
impl KvStore for FileKvStore {
    async fn get(&self, namespace: &str, key: &str) -> StorageResult<Option<Vec<u8>>> {
        validate_namespace(namespace)?;
        validate_key(key)?;
        let _guard = self.lock.read().await;
        let file = self.read_namespace(namespace).await?;
        Ok(file.0.get(key).cloned())
    }

    async fn set(&self, namespace: &str, key: &str, value: Vec<u8>) -> StorageResult<()> {
        validate_namespace(namespace)?;
        validate_key(key)?;
        let _guard = self.lock.write().await;
        let mut file = self.read_namespace(namespace).await?;
        file.0.insert(key.to_string(), value);
        self.write_namespace(namespace, &file).await
    }

    async fn delete(&self, namespace: &str, key: &str) -> StorageResult<bool> {
        validate_namespace(namespace)?;
        validate_key(key)?;
        let _guard = self.lock.write().await;
        let mut file = self.read_namespace(namespace).await?;
        let existed = file.0.remove(key).is_some();
        if existed {
            self.write_namespace(namespace, &file).await?;
        }
        Ok(existed)
    }

    async fn exists(&self, namespace: &str, key: &str) -> StorageResult<bool> {
        validate_namespace(namespace)?;
        validate_key(key)?;
        let _guard = self.lock.read().await;
        let file = self.read_namespace(namespace).await?;
        Ok(file.0.contains_key(key))
    }

    async fn list_keys(&self, namespace: &str) -> StorageResult<Vec<String>> {
        validate_namespace(namespace)?;
        let _guard = self.lock.read().await;
        let file = self.read_namespace(namespace).await?;
        Ok(file.0.into_keys().collect())
    }

    async fn clear_namespace(&self, namespace: &str) -> StorageResult<u64> {
        validate_namespace(namespace)?;
        let _guard = self.lock.write().await;
        let file = self.read_namespace(namespace).await?;
        let count = file.0.len() as u64;
        self.write_namespace(namespace, &NamespaceFile::default())
            .await?;
        Ok(count)
    }
}

/// A namespace-scoped view into a [`KvStore`], with typed JSON convenience.
#[derive(Clone)]
pub struct ScopedKvStore {
    inner: Arc<dyn KvStore>,
    namespace: String,
}

impl std::fmt::Debug for ScopedKvStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedKvStore")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl ScopedKvStore {
    /// Create a scoped view into `store` for `namespace`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidKey`] if the namespace is invalid.
    pub fn new(store: Arc<dyn KvStore>, namespace: impl Into<String>) -> StorageResult<Self> {
        let namespace = namespace.into();
        validate_namespace(&namespace)?;
        Ok(Self {
            inner: store,
            namespace,
        })
    }

    /// The namespace this store is scoped to.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// List all keys in this namespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store operation fails.
    pub async fn list_keys(&self) -> StorageResult<Vec<String>> {
        self.inner.list_keys(&self.namespace).await
    }

    /// Delete a key. Returns `true` if it existed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidKey`] if the key is invalid.
    pub async fn delete(&self, key: &str) -> StorageResult<bool> {
        validate_key(key)?;
        self.inner.delete(&self.namespace, key).await
    }

    /// Deserialize a JSON value from the store. Returns `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Serialization`] if deserialization fails.
    pub async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        key: &str,
    ) -> StorageResult<Option<T>> {
        validate_key(key)?;
        let bytes = self.inner.get(&self.namespace, key).await?;
        bytes
            .map(|b| {
                serde_json::from_slice(&b).map_err(|e| StorageError::Serialization(e.to_string()))
            })
            .transpose()
    }

    /// Serialize a value as JSON and store it.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Serialization`] if serialization fails.
    pub async fn set_json<T: serde::Serialize + Sync>(
        &self,
        key: &str,
        value: &T,
    ) -> StorageResult<()> {
        validate_key(key)?;
        let bytes =
            serde_json::to_vec(value).map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.inner.set(&self.namespace, key, bytes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_namespace_isolation() {
        let store = MemoryKvStore::new();
        store.set("ns1", "k", b"v1".to_vec()).await.unwrap();
        store.set("ns2", "k", b"v2".to_vec()).await.unwrap();
        assert_eq!(store.get("ns1", "k").await.unwrap(), Some(b"v1".to_vec()));
        assert_eq!(store.get("ns2", "k").await.unwrap(), Some(b"v2".to_vec()));
    }

    #[tokio::test]
    async fn memory_delete_and_exists() {
        let store = MemoryKvStore::new();
        assert!(!store.exists("ns", "k").await.unwrap());
        store.set("ns", "k", b"v".to_vec()).await.unwrap();
        assert!(store.exists("ns", "k").await.unwrap());
        assert!(store.delete("ns", "k").await.unwrap());
        assert!(!store.delete("ns", "k").await.unwrap());
    }

    #[tokio::test]
    async fn file_store_persists_across_open() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FileKvStore::open(dir.path()).await.unwrap();
            store.set("sessions", "abc", b"{}".to_vec()).await.unwrap();
        }
        let store = FileKvStore::open(dir.path()).await.unwrap();
        assert_eq!(
            store.get("sessions", "abc").await.unwrap(),
            Some(b"{}".to_vec())
        );
    }

    #[tokio::test]
    async fn file_store_clear_namespace() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileKvStore::open(dir.path()).await.unwrap();
        store.set("ns", "a", b"1".to_vec()).await.unwrap();
        store.set("ns", "b", b"2".to_vec()).await.unwrap();
        assert_eq!(store.clear_namespace("ns").await.unwrap(), 2);
        assert!(store.list_keys("ns").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn scoped_json_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn KvStore> = Arc::new(FileKvStore::open(dir.path()).await.unwrap());
        let scoped = ScopedKvStore::new(store, "sessions").unwrap();

        #[derive(serde::Serialize, serde::Deserialize, Debug, PartialEq)]
        struct Stub {
            name: String,
        }

        scoped
            .set_json("s1", &Stub { name: "foo".into() })
            .await
            .unwrap();
        let loaded: Stub = scoped.get_json("s1").await.unwrap().unwrap();
        assert_eq!(loaded.name, "foo");
    }

    #[test]
    fn rejects_invalid_namespace() {
        assert!(validate_namespace("").is_err());
        assert!(validate_namespace("a/b").is_err());
    }
}
