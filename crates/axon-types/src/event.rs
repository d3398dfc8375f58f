use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// A typed discriminated event record over the closed set of dotted event
/// families (`execution.*`, `graph.*`, `memory.*`, `capability.*`,
/// `policy.*`, `budget.*`, `agent_message.*`, `stream.chunk`). The type tag
/// is kept as a dotted string rather than a Rust enum so new leaf events can
/// be added within an owning crate without every listener crate needing a
/// matching variant — listeners match on `event_type` by prefix or exact
/// string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KernelEvent {
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub data: Value,
}

impl KernelEvent {
    pub fn new(event_type: impl Into<String>, data: Value) -> Self {
        KernelEvent {
            event_type: event_type.into(),
            timestamp: Utc::now(),
            execution_id: None,
            agent_id: None,
            data,
        }
    }

    pub fn for_execution(
        event_type: impl Into<String>,
        execution_id: impl Into<String>,
        agent_id: impl Into<String>,
        data: Value,
    ) -> Self {
        KernelEvent {
            event_type: event_type.into(),
            timestamp: Utc::now(),
            execution_id: Some(execution_id.into()),
            agent_id: Some(agent_id.into()),
            data,
        }
    }

    pub fn empty(event_type: impl Into<String>) -> Self {
        Self::new(event_type, json!({}))
    }
}
