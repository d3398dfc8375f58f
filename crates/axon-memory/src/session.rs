use std::sync::Arc;

use serde_json::Value;

use axon_types::ports::Storage;
use axon_types::KernelError;

/// Per-session keyed get/set/clear over the injected Storage port. No
/// semantic indexing — a plain namespaced key-value view, distinct from
/// the embedded, searchable long-term layer.
#[derive(Clone)]
pub struct SessionMemory {
    storage: Arc<dyn Storage>,
}

impl SessionMemory {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    fn key(session_id: &str, key: &str) -> String {
        format!("memory:session:{session_id}:{key}")
    }

    fn prefix(session_id: &str) -> String {
        format!("memory:session:{session_id}:")
    }

    pub async fn get(&self, session_id: &str, key: &str) -> Result<Option<Value>, KernelError> {
        self.storage.get(&Self::key(session_id, key)).await
    }

    pub async fn set(&self, session_id: &str, key: &str, value: Value) -> Result<(), KernelError> {
        self.storage.set(&Self::key(session_id, key), value).await
    }

    pub async fn clear(&self, session_id: &str) -> Result<(), KernelError> {
        let prefix = Self::prefix(session_id);
        for key in self.storage.keys(Some(&prefix)).await? {
            self.storage.delete(&key).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;
    use tokio::sync::RwLock;

    use super::*;

    #[derive(Default)]
    struct InMemoryStorage {
        data: RwLock<HashMap<String, Value>>,
    }

    #[async_trait]
    impl Storage for InMemoryStorage {
        async fn get(&self, key: &str) -> Result<Option<Value>, KernelError> {
            Ok(self.data.read().await.get(key).cloned())
        }
        async fn set(&self, key: &str, value: Value) -> Result<(), KernelError> {
            self.data.write().await.insert(key.to_string(), value);
            Ok(())
        }
        async fn delete(&self, key: &str) -> Result<(), KernelError> {
            self.data.write().await.remove(key);
            Ok(())
        }
        async fn has(&self, key: &str) -> Result<bool, KernelError> {
            Ok(self.data.read().await.contains_key(key))
        }
        async fn keys(&self, prefix: Option<&str>) -> Result<Vec<String>, KernelError> {
            let data = self.data.read().await;
            Ok(match prefix {
                Some(p) => data.keys().filter(|k| k.starts_with(p)).cloned().collect(),
                None => data.keys().cloned().collect(),
            })
        }
        async fn clear(&self) -> Result<(), KernelError> {
            self.data.write().await.clear();
            Ok(())
        }
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let memory = SessionMemory::new(Arc::new(InMemoryStorage::default()));
        memory.set("sess-1", "greeting", serde_json::json!("hello")).await.unwrap();
        assert_eq!(memory.get("sess-1", "greeting").await.unwrap(), Some(serde_json::json!("hello")));
    }

    #[tokio::test]
    async fn clear_removes_only_the_target_sessions_keys() {
        let memory = SessionMemory::new(Arc::new(InMemoryStorage::default()));
        memory.set("sess-1", "a", serde_json::json!(1)).await.unwrap();
        memory.set("sess-2", "a", serde_json::json!(2)).await.unwrap();

        memory.clear("sess-1").await.unwrap();

        assert_eq!(memory.get("sess-1", "a").await.unwrap(), None);
        assert_eq!(memory.get("sess-2", "a").await.unwrap(), Some(serde_json::json!(2)));
    }
}
