use std::cmp::Ordering;
use std::sync::Arc;

use serde_json::json;

use axon_core::PermissionManager;
use axon_types::ports::{EmbeddingProvider, Storage, VectorStore};
use axon_types::{resolve_memory_scope, KernelError, MemoryItem, Permission, PruneStrategy};

const ITEM_PREFIX: &str = "memory:item:";

fn item_key(id: &str) -> String {
    format!("{ITEM_PREFIX}{id}")
}

/// Embeds, indexes and prunes long-lived memory items. Grounded on the
/// reference platform's `embeddings.rs` (`cosine_similarity`-ranked
/// retrieval) and `db.rs` (item persistence), generalized from a local
/// sqlite+fastembed stack to the injected `Storage`/`VectorStore`/
/// `EmbeddingProvider` ports.
#[derive(Clone)]
pub struct LongTermMemory {
    storage: Arc<dyn Storage>,
    vector_store: Arc<dyn VectorStore>,
    embeddings: Arc<dyn EmbeddingProvider>,
    permissions: PermissionManager,
}

impl LongTermMemory {
    pub fn new(
        storage: Arc<dyn Storage>,
        vector_store: Arc<dyn VectorStore>,
        embeddings: Arc<dyn EmbeddingProvider>,
        permissions: PermissionManager,
    ) -> Self {
        Self { storage, vector_store, embeddings, permissions }
    }

    /// Resolves `scope_alias` (`private`/`shared`/raw) against `module_id`,
    /// requires `MemorySharedWrite` when the resolved scope is
    /// `workspace:shared`, then embeds and upserts `item`.
    pub async fn upsert(
        &self,
        module_id: &str,
        scope_alias: &str,
        mut item: MemoryItem,
    ) -> Result<(), KernelError> {
        let resolved_scope = resolve_memory_scope(scope_alias, module_id);
        if resolved_scope == "workspace:shared" {
            self.permissions.check(Permission::MemorySharedWrite, module_id).await?;
        }
        item.scope = resolved_scope;
        self.store(item).await
    }

    async fn store(&self, item: MemoryItem) -> Result<(), KernelError> {
        let embedding = self.embeddings.embed(&item.content).await?;
        self.vector_store
            .upsert(&item.id, &embedding, json!({"agentId": item.agent_id, "scope": item.scope}))
            .await?;
        self.storage.set(&item_key(&item.id), serde_json::to_value(&item).map_err(to_kernel_error)?).await
    }

    /// Embeds `query`, searches the vector store, then resolves each match
    /// back to its `MemoryItem` and orders by descending score with ties
    /// broken by most-recent `updated_at`.
    pub async fn search_semantic(
        &self,
        agent_id: &str,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<MemoryItem>, KernelError> {
        let embedding = self.embeddings.embed(query).await?;
        let matches = self.vector_store.search(&embedding, top_k).await?;

        let mut scored = Vec::new();
        for m in matches {
            if let Some(value) = self.storage.get(&item_key(&m.id)).await? {
                let item: MemoryItem = serde_json::from_value(value).map_err(to_kernel_error)?;
                if item.agent_id == agent_id {
                    scored.push((m.score, item));
                }
            }
        }

        scored.sort_by(|(score_a, item_a), (score_b, item_b)| {
            score_b
                .partial_cmp(score_a)
                .unwrap_or(Ordering::Equal)
                .then_with(|| item_b.updated_at.cmp(&item_a.updated_at))
        });
        Ok(scored.into_iter().map(|(_, item)| item).collect())
    }

    async fn items_for_agent(&self, agent_id: &str) -> Result<Vec<MemoryItem>, KernelError> {
        let mut items = Vec::new();
        for key in self.storage.keys(Some(ITEM_PREFIX)).await? {
            let Some(value) = self.storage.get(&key).await? else { continue };
            let item: MemoryItem = serde_json::from_value(value).map_err(to_kernel_error)?;
            if item.agent_id == agent_id {
                items.push(item);
            }
        }
        Ok(items)
    }

    async fn delete_item(&self, id: &str) -> Result<(), KernelError> {
        self.storage.delete(&item_key(id)).await?;
        self.vector_store.delete(id).await
    }

    /// Applies `strategy` against every item belonging to `agent_id` whose
    /// relevance falls below `threshold`, returning the number removed.
    /// `decay`/`ttl` delete; `summarize` collapses the pruned set into one
    /// synthetic item; `manual` never deletes automatically.
    pub async fn prune(
        &self,
        agent_id: &str,
        threshold: f32,
        strategy: PruneStrategy,
    ) -> Result<usize, KernelError> {
        if strategy == PruneStrategy::Manual {
            return Ok(0);
        }

        let items = self.items_for_agent(agent_id).await?;
        let now = chrono::Utc::now();
        let stale: Vec<MemoryItem> = items
            .into_iter()
            .filter(|item| match strategy {
                PruneStrategy::Decay | PruneStrategy::Summarize => item.importance < threshold,
                PruneStrategy::Ttl => {
                    let age_days = (now - item.updated_at).num_days() as f32;
                    age_days > threshold
                }
                PruneStrategy::Manual => false,
            })
            .collect();

        if stale.is_empty() {
            return Ok(0);
        }

        let removed = stale.len();
        if strategy == PruneStrategy::Summarize {
            let summary_content =
                stale.iter().map(|i| i.content.as_str()).collect::<Vec<_>>().join("\n---\n");
            let summary = MemoryItem {
                id: format!("{agent_id}-summary-{}", now.timestamp_millis()),
                agent_id: agent_id.to_string(),
                scope: stale[0].scope.clone(),
                item_type: axon_types::MemoryItemType::Semantic,
                importance: threshold,
                embedding: Vec::new(),
                content: format!("[summary of {removed} pruned item(s)]\n{summary_content}"),
                created_at: now,
                updated_at: now,
                metadata: None,
            };
            for item in &stale {
                self.delete_item(&item.id).await?;
            }
            self.store(summary).await?;
        } else {
            for item in &stale {
                self.delete_item(&item.id).await?;
            }
        }
        Ok(removed)
    }
}

fn to_kernel_error(err: serde_json::Error) -> KernelError {
    KernelError::ValidationError(err.to_string())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;
    use axon_types::MemoryItemType;
    use axon_core::EventBus;
    use tokio::sync::RwLock;

    use super::*;

    #[derive(Default)]
    struct InMemoryStorage {
        data: RwLock<HashMap<String, serde_json::Value>>,
    }

    #[async_trait]
    impl Storage for InMemoryStorage {
        async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, KernelError> {
            Ok(self.data.read().await.get(key).cloned())
        }
        async fn set(&self, key: &str, value: serde_json::Value) -> Result<(), KernelError> {
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

    struct StubEmbedder;

    #[async_trait]
    impl EmbeddingProvider for StubEmbedder {
        fn dimension(&self) -> usize {
            1
        }
        async fn embed(&self, text: &str) -> Result<Vec<f32>, KernelError> {
            Ok(vec![text.len() as f32])
        }
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, KernelError> {
            let mut out = Vec::new();
            for t in texts {
                out.push(self.embed(t).await?);
            }
            Ok(out)
        }
    }

    #[derive(Default)]
    struct StubVectorStore {
        vectors: RwLock<HashMap<String, (Vec<f32>, serde_json::Value)>>,
    }

    #[async_trait]
    impl VectorStore for StubVectorStore {
        async fn upsert(&self, id: &str, vector: &[f32], meta: serde_json::Value) -> Result<(), KernelError> {
            self.vectors.write().await.insert(id.to_string(), (vector.to_vec(), meta));
            Ok(())
        }
        async fn search(&self, vector: &[f32], top_k: usize) -> Result<Vec<axon_types::ports::VectorMatch>, KernelError> {
            let vectors = self.vectors.read().await;
            let mut matches: Vec<axon_types::ports::VectorMatch> = vectors
                .iter()
                .map(|(id, (v, _))| axon_types::ports::VectorMatch {
                    id: id.clone(),
                    score: -(v[0] - vector[0]).abs(),
                })
                .collect();
            matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());
            matches.truncate(top_k);
            Ok(matches)
        }
        async fn delete(&self, id: &str) -> Result<(), KernelError> {
            self.vectors.write().await.remove(id);
            Ok(())
        }
    }

    fn item(id: &str, agent_id: &str, content: &str, importance: f32) -> MemoryItem {
        let now = chrono::Utc::now();
        MemoryItem {
            id: id.to_string(),
            agent_id: agent_id.to_string(),
            scope: "bot:agent-a".to_string(),
            item_type: MemoryItemType::Episodic,
            importance,
            embedding: Vec::new(),
            content: content.to_string(),
            created_at: now,
            updated_at: now,
            metadata: None,
        }
    }

    fn memory() -> LongTermMemory {
        LongTermMemory::new(
            Arc::new(InMemoryStorage::default()),
            Arc::new(StubVectorStore::default()),
            Arc::new(StubEmbedder),
            PermissionManager::new(EventBus::new()),
        )
    }

    #[tokio::test]
    async fn shared_scope_write_is_denied_without_the_permission() {
        let memory = memory();
        let result = memory.upsert("agent-a", "shared", item("1", "agent-a", "hi", 0.5)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn shared_scope_write_succeeds_once_granted() {
        let memory = memory();
        memory.permissions.grant("agent-a", Permission::MemorySharedWrite).await;
        let result = memory.upsert("agent-a", "shared", item("1", "agent-a", "hi", 0.5)).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn private_scope_resolves_without_requiring_a_permission() {
        let memory = memory();
        let result = memory.upsert("agent-a", "private", item("1", "agent-a", "hi", 0.5)).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn search_semantic_returns_only_the_querying_agents_items() {
        let memory = memory();
        memory.upsert("agent-a", "private", item("1", "agent-a", "hello world", 0.5)).await.unwrap();
        memory.upsert("agent-b", "private", item("2", "agent-b", "hello world too", 0.5)).await.unwrap();

        let results = memory.search_semantic("agent-a", "hello", 5).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "1");
    }

    #[tokio::test]
    async fn decay_prune_removes_items_below_threshold() {
        let memory = memory();
        memory.upsert("agent-a", "private", item("low", "agent-a", "stale", 0.1)).await.unwrap();
        memory.upsert("agent-a", "private", item("high", "agent-a", "fresh", 0.9)).await.unwrap();

        let removed = memory.prune("agent-a", 0.5, PruneStrategy::Decay).await.unwrap();
        assert_eq!(removed, 1);

        let remaining = memory.items_for_agent("agent-a").await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, "high");
    }

    #[tokio::test]
    async fn manual_strategy_never_deletes() {
        let memory = memory();
        memory.upsert("agent-a", "private", item("low", "agent-a", "stale", 0.0)).await.unwrap();

        let removed = memory.prune("agent-a", 1.0, PruneStrategy::Manual).await.unwrap();
        assert_eq!(removed, 0);
    }

    #[tokio::test]
    async fn summarize_strategy_collapses_pruned_items_into_one() {
        let memory = memory();
        memory.upsert("agent-a", "private", item("a", "agent-a", "one", 0.1)).await.unwrap();
        memory.upsert("agent-a", "private", item("b", "agent-a", "two", 0.1)).await.unwrap();

        let removed = memory.prune("agent-a", 0.5, PruneStrategy::Summarize).await.unwrap();
        assert_eq!(removed, 2);

        let remaining = memory.items_for_agent("agent-a").await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert!(remaining[0].content.starts_with("[summary of 2 pruned item(s)]"));
    }
}
