use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// The closed lifecycle state set an execution moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Created,
    Validated,
    Planned,
    Scheduled,
    Running,
    ToolExecution,
    MemoryInjection,
    Completed,
    Failed,
    Aborted,
    SnapshotPersisted,
}

impl LifecycleState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LifecycleState::Completed | LifecycleState::Failed | LifecycleState::Aborted
        )
    }
}

/// One frame of the orchestrator call stack, pushed when a parent agent
/// calls a sub-agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallFrame {
    pub agent_id: String,
    pub execution_id: String,
}

/// Running token/cost accounting for one execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub usd_spent: f64,
}

impl TokenUsage {
    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }

    pub fn add(&mut self, other: TokenUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.usd_spent += other.usd_spent;
    }
}

/// The mutable state for one scheduled run. Owned exclusively by the
/// worker running it; frozen on terminal transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub execution_id: String,
    pub agent_id: String,
    pub session_id: String,
    pub graph_id: String,
    pub current_node_id: Option<String>,
    #[serde(default)]
    pub variables: HashMap<String, Value>,
    #[serde(default)]
    pub call_stack: Vec<CallFrame>,
    pub memory_scope: String,
    #[serde(default)]
    pub token_usage: TokenUsage,
    pub budget_remaining: u64,
    pub lifecycle_state: LifecycleState,
    #[serde(default)]
    pub iteration_counts: HashMap<String, u32>,
    pub priority: i64,
}

pub const MAX_CALL_STACK_DEPTH: usize = 5;

impl ExecutionContext {
    pub fn new(agent_id: impl Into<String>, graph_id: impl Into<String>, budget: u64) -> Self {
        ExecutionContext {
            execution_id: Uuid::new_v4().to_string(),
            agent_id: agent_id.into(),
            session_id: Uuid::new_v4().to_string(),
            graph_id: graph_id.into(),
            current_node_id: None,
            variables: HashMap::new(),
            call_stack: Vec::new(),
            memory_scope: String::new(),
            token_usage: TokenUsage::default(),
            budget_remaining: budget,
            lifecycle_state: LifecycleState::Created,
            iteration_counts: HashMap::new(),
            priority: 0,
        }
    }
}
