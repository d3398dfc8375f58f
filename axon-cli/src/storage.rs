use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::fs;
use tokio::sync::RwLock;

use axon_types::ports::Storage;
use axon_types::KernelError;

/// A whole key-value map held in memory and flushed to `<base>/store.json`
/// after every mutation. Grounded on the reference platform's `Storage`
/// (load the JSON file on construction, rewrite it on every write),
/// generalized from a session-record-shaped store to the kernel's
/// generic string-keyed `Value` contract.
pub struct FileStorage {
    path: PathBuf,
    entries: RwLock<HashMap<String, Value>>,
}

impl FileStorage {
    pub async fn new(base: impl AsRef<Path>) -> anyhow::Result<Self> {
        let base = base.as_ref();
        fs::create_dir_all(base).await?;
        let path = base.join("store.json");
        let entries = if path.exists() {
            let raw = fs::read_to_string(&path).await?;
            serde_json::from_str(&raw).unwrap_or_default()
        } else {
            HashMap::new()
        };
        Ok(Self { path, entries: RwLock::new(entries) })
    }

    async fn flush(&self, entries: &HashMap<String, Value>) -> Result<(), KernelError> {
        let payload =
            serde_json::to_string_pretty(entries).map_err(|err| KernelError::ValidationError(err.to_string()))?;
        fs::write(&self.path, payload)
            .await
            .map_err(|err| KernelError::ValidationError(err.to_string()))
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn get(&self, key: &str) -> Result<Option<Value>, KernelError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), KernelError> {
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), value);
        self.flush(&entries).await
    }

    async fn delete(&self, key: &str) -> Result<(), KernelError> {
        let mut entries = self.entries.write().await;
        entries.remove(key);
        self.flush(&entries).await
    }

    async fn has(&self, key: &str) -> Result<bool, KernelError> {
        Ok(self.entries.read().await.contains_key(key))
    }

    async fn keys(&self, prefix: Option<&str>) -> Result<Vec<String>, KernelError> {
        Ok(self
            .entries
            .read()
            .await
            .keys()
            .filter(|k| prefix.map(|p| k.starts_with(p)).unwrap_or(true))
            .cloned()
            .collect())
    }

    async fn clear(&self) -> Result<(), KernelError> {
        let mut entries = self.entries.write().await;
        entries.clear();
        self.flush(&entries).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test]
    async fn a_value_written_survives_a_reload_from_disk() {
        let dir = tempdir().expect("tempdir");
        {
            let store = FileStorage::new(dir.path()).await.expect("open");
            store.set("session.one", json!({"turns": 3})).await.expect("set");
        }
        let reopened = FileStorage::new(dir.path()).await.expect("reopen");
        assert_eq!(reopened.get("session.one").await.unwrap(), Some(json!({"turns": 3})));
    }

    #[tokio::test]
    async fn keys_filters_by_prefix() {
        let dir = tempdir().expect("tempdir");
        let store = FileStorage::new(dir.path()).await.expect("open");
        store.set("session.a", json!(1)).await.unwrap();
        store.set("session.b", json!(2)).await.unwrap();
        store.set("other.c", json!(3)).await.unwrap();
        let mut keys = store.keys(Some("session.")).await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["session.a".to_string(), "session.b".to_string()]);
    }

    #[tokio::test]
    async fn clear_empties_the_store_and_the_file() {
        let dir = tempdir().expect("tempdir");
        let store = FileStorage::new(dir.path()).await.expect("open");
        store.set("k", json!(1)).await.unwrap();
        store.clear().await.unwrap();
        assert!(!store.has("k").await.unwrap());
    }
}
