use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Classification of a stored memory item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryItemType {
    Episodic,
    Semantic,
    Procedural,
}

/// A unit of long-term memory. `scope` is a logical namespace string:
/// `bot:{id}`, `workspace:shared`, `task:{runId}`, or an arbitrary caller
/// string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryItem {
    pub id: String,
    pub agent_id: String,
    pub scope: String,
    pub item_type: MemoryItemType,
    pub importance: f32,
    #[serde(default)]
    pub embedding: Vec<f32>,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

/// Pruning strategy applied to long-term memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PruneStrategy {
    Decay,
    Ttl,
    Summarize,
    Manual,
}

/// Resolves a logical memory scope alias to a concrete scope string:
/// `private -> bot:{moduleId}`, `shared -> workspace:shared`, raw strings
/// pass through unchanged.
pub fn resolve_memory_scope(alias: &str, module_id: &str) -> String {
    match alias {
        "private" => format!("bot:{module_id}"),
        "shared" => "workspace:shared".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn private_scope_resolves_to_bot_namespace() {
        assert_eq!(resolve_memory_scope("private", "m1"), "bot:m1");
    }

    #[test]
    fn shared_scope_resolves_to_workspace_shared() {
        assert_eq!(resolve_memory_scope("shared", "m1"), "workspace:shared");
    }

    #[test]
    fn raw_scope_strings_pass_through() {
        assert_eq!(resolve_memory_scope("task:run-42", "m1"), "task:run-42");
    }
}
