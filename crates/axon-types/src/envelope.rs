use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::FailureDetail;

/// Wire message envelope for transport-mediated control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireAction {
    StartExecution,
    SubscribeEvents,
    InjectMemory,
    ApproveCheckpoint,
    AbortExecution,
    Heartbeat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireEnvelope {
    pub action: WireAction,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "executionId")]
    pub execution_id: Option<String>,
    #[serde(default)]
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<FailureDetail>,
}

impl WireResponse {
    pub fn ok(data: Value) -> Self {
        WireResponse {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(error: FailureDetail) -> Self {
        WireResponse {
            success: false,
            data: None,
            error: Some(error),
        }
    }
}
