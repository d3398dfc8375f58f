use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tokio::fs;
use tokio::sync::RwLock;

use axon_types::{SnapshotIndexEntry, SnapshotRecord};

/// Append-only per-execution snapshot store. Each record is written to its
/// own `<executionId>/<version>.json` file; an in-memory index (flushed to
/// `index.json`) lets `list` answer without reading every record back.
pub struct SnapshotStore {
    base: PathBuf,
    index: RwLock<HashMap<String, Vec<SnapshotIndexEntry>>>,
}

impl SnapshotStore {
    pub async fn new(base: impl AsRef<Path>) -> anyhow::Result<Self> {
        let base = base.as_ref().to_path_buf();
        fs::create_dir_all(&base).await?;
        let index_path = base.join("index.json");
        let index = if index_path.exists() {
            let raw = fs::read_to_string(&index_path).await?;
            serde_json::from_str(&raw).unwrap_or_default()
        } else {
            HashMap::new()
        };
        Ok(Self {
            base,
            index: RwLock::new(index),
        })
    }

    /// Persists `record` and appends it to the execution's index entry
    /// list. Never overwrites a prior version; each `save` is a new file.
    pub async fn save(&self, record: SnapshotRecord) -> anyhow::Result<()> {
        let exec_dir = self.base.join(&record.execution_id);
        fs::create_dir_all(&exec_dir).await?;
        let record_path = exec_dir.join(format!("{}.json", record.version));
        let payload = serde_json::to_string_pretty(&record)?;
        fs::write(&record_path, payload)
            .await
            .with_context(|| format!("writing snapshot record to {:?}", record_path))?;

        let entry = SnapshotIndexEntry {
            execution_id: record.execution_id.clone(),
            agent_id: record.agent_id.clone(),
            version: record.version.clone(),
            created_at: record.timestamp,
        };
        {
            let mut index = self.index.write().await;
            index.entry(record.execution_id.clone()).or_default().push(entry);
        }
        self.flush_index().await
    }

    pub async fn load(&self, execution_id: &str, version: &str) -> anyhow::Result<Option<SnapshotRecord>> {
        let record_path = self.base.join(execution_id).join(format!("{version}.json"));
        if !record_path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&record_path).await?;
        Ok(Some(serde_json::from_str(&raw)?))
    }

    /// Returns the index entries for an execution, oldest first.
    pub async fn list(&self, execution_id: &str) -> Vec<SnapshotIndexEntry> {
        self.index
            .read()
            .await
            .get(execution_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Returns the most recent snapshot for an execution, if any.
    pub async fn latest(&self, execution_id: &str) -> anyhow::Result<Option<SnapshotRecord>> {
        let Some(entry) = self.list(execution_id).await.into_iter().last() else {
            return Ok(None);
        };
        self.load(execution_id, &entry.version).await
    }

    /// Deletes every record for an execution and drops its index entries.
    pub async fn delete(&self, execution_id: &str) -> anyhow::Result<bool> {
        let exec_dir = self.base.join(execution_id);
        let removed = self.index.write().await.remove(execution_id).is_some();
        if exec_dir.exists() {
            fs::remove_dir_all(&exec_dir).await?;
        }
        if removed {
            self.flush_index().await?;
        }
        Ok(removed)
    }

    async fn flush_index(&self) -> anyhow::Result<()> {
        let snapshot = self.index.read().await.clone();
        let payload = serde_json::to_string_pretty(&snapshot)?;
        fs::write(self.base.join("index.json"), payload).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axon_types::{LifecycleState, TokenUsage};
    use chrono::Utc;
    use uuid::Uuid;

    fn record(execution_id: &str, version: &str) -> SnapshotRecord {
        SnapshotRecord {
            execution_id: execution_id.to_string(),
            agent_id: "agent.a".to_string(),
            graph_id: "graph.default".to_string(),
            node_pointer: Some("node.1".to_string()),
            timestamp: Utc::now(),
            variables: Default::default(),
            call_stack: Vec::new(),
            lifecycle_state: LifecycleState::Completed,
            token_usage: TokenUsage::default(),
            memory_reference: None,
            event_log_reference: None,
            version: version.to_string(),
        }
    }

    async fn temp_store() -> SnapshotStore {
        let dir = std::env::temp_dir().join(format!("axon-snapshot-test-{}", Uuid::new_v4()));
        SnapshotStore::new(dir).await.expect("store")
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let store = temp_store().await;
        store.save(record("exec.1", "v1")).await.expect("save");
        let loaded = store.load("exec.1", "v1").await.expect("load").expect("present");
        assert_eq!(loaded.execution_id, "exec.1");
    }

    #[tokio::test]
    async fn list_returns_entries_in_save_order() {
        let store = temp_store().await;
        store.save(record("exec.1", "v1")).await.expect("save v1");
        store.save(record("exec.1", "v2")).await.expect("save v2");
        let entries = store.list("exec.1").await;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].version, "v1");
        assert_eq!(entries[1].version, "v2");
    }

    #[tokio::test]
    async fn latest_returns_the_most_recently_saved_version() {
        let store = temp_store().await;
        store.save(record("exec.1", "v1")).await.expect("save v1");
        store.save(record("exec.1", "v2")).await.expect("save v2");
        let latest = store.latest("exec.1").await.expect("latest").expect("present");
        assert_eq!(latest.version, "v2");
    }

    #[tokio::test]
    async fn delete_removes_records_and_index_entries() {
        let store = temp_store().await;
        store.save(record("exec.1", "v1")).await.expect("save");
        assert!(store.delete("exec.1").await.expect("delete"));
        assert!(store.list("exec.1").await.is_empty());
        assert!(store.load("exec.1", "v1").await.expect("load").is_none());
    }

    #[tokio::test]
    async fn index_survives_reopening_the_store() {
        let dir = std::env::temp_dir().join(format!("axon-snapshot-reopen-{}", Uuid::new_v4()));
        {
            let store = SnapshotStore::new(&dir).await.expect("store");
            store.save(record("exec.1", "v1")).await.expect("save");
        }
        let reopened = SnapshotStore::new(&dir).await.expect("reopen");
        assert_eq!(reopened.list("exec.1").await.len(), 1);
    }
}
