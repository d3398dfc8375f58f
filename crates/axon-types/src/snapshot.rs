use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::execution::{CallFrame, LifecycleState, TokenUsage};

/// Durable record of an execution's state at a terminal or checkpoint
/// transition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SnapshotRecord {
    pub execution_id: String,
    pub agent_id: String,
    pub graph_id: String,
    pub node_pointer: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub variables: HashMap<String, Value>,
    pub call_stack: Vec<CallFrame>,
    pub lifecycle_state: LifecycleState,
    pub token_usage: TokenUsage,
    #[serde(default)]
    pub memory_reference: Option<String>,
    #[serde(default)]
    pub event_log_reference: Option<String>,
    pub version: String,
}

/// `{executionId, agentId, version, createdAt}` index entry used to list
/// snapshots without loading every record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotIndexEntry {
    pub execution_id: String,
    pub agent_id: String,
    pub version: String,
    pub created_at: DateTime<Utc>,
}

impl SnapshotRecord {
    pub fn is_checkpoint_or_terminal(&self) -> bool {
        self.lifecycle_state.is_terminal()
            || self.lifecycle_state == LifecycleState::SnapshotPersisted
    }
}
