//! Suspension-point hook pipeline for the execution lifecycle.
//!
//! `HookHandler` implementations can observe or cancel the points where an
//! execution would otherwise proceed unconditionally: before an LLM call,
//! before a tool call, before a memory read/write, and before dispatching a
//! sub-agent call. Hooks run in priority order (lowest value first); a
//! cancelling hook short-circuits the remaining chain.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;

/// Result of a suspension-point hook: continue with (possibly modified)
/// data, or cancel with a reason that becomes the execution's failure
/// detail.
#[derive(Debug, Clone)]
pub enum HookResult<T> {
    Continue(T),
    Cancel(String),
}

impl<T> HookResult<T> {
    pub fn is_cancel(&self) -> bool {
        matches!(self, HookResult::Cancel(_))
    }
}

#[async_trait::async_trait]
pub trait HookHandler: Send + Sync {
    fn name(&self) -> &str;

    fn priority(&self) -> i32 {
        0
    }

    async fn before_llm_call(&self, messages: Vec<Value>, model: String) -> HookResult<(Vec<Value>, String)> {
        HookResult::Continue((messages, model))
    }

    async fn before_tool_call(&self, tool_name: String, args: Value) -> HookResult<(String, Value)> {
        HookResult::Continue((tool_name, args))
    }

    async fn before_memory_op(&self, scope: String, op: String) -> HookResult<(String, String)> {
        HookResult::Continue((scope, op))
    }

    async fn before_sub_agent_dispatch(&self, agent_id: String) -> HookResult<String> {
        HookResult::Continue(agent_id)
    }
}

pub struct HookPipeline {
    hooks: Vec<Arc<dyn HookHandler>>,
}

impl HookPipeline {
    pub fn new() -> Self {
        Self { hooks: Vec::new() }
    }

    pub fn register(&mut self, handler: Arc<dyn HookHandler>) {
        self.hooks.push(handler);
        self.hooks.sort_by_key(|h| h.priority());
    }

    pub async fn run_before_llm_call(&self, messages: Vec<Value>, model: String) -> Option<(Vec<Value>, String)> {
        let mut current = (messages, model);
        for hook in &self.hooks {
            match hook.before_llm_call(current.0.clone(), current.1.clone()).await {
                HookResult::Continue(next) => current = next,
                HookResult::Cancel(reason) => {
                    tracing::info!(hook = hook.name(), %reason, "before_llm_call cancelled");
                    return None;
                }
            }
        }
        Some(current)
    }

    pub async fn run_before_tool_call(&self, tool_name: String, args: Value) -> Option<(String, Value)> {
        let mut current = (tool_name, args);
        for hook in &self.hooks {
            match hook.before_tool_call(current.0.clone(), current.1.clone()).await {
                HookResult::Continue(next) => current = next,
                HookResult::Cancel(reason) => {
                    tracing::info!(hook = hook.name(), %reason, "before_tool_call cancelled");
                    return None;
                }
            }
        }
        Some(current)
    }

    pub async fn run_before_memory_op(&self, scope: String, op: String) -> Option<(String, String)> {
        let mut current = (scope, op);
        for hook in &self.hooks {
            match hook.before_memory_op(current.0.clone(), current.1.clone()).await {
                HookResult::Continue(next) => current = next,
                HookResult::Cancel(reason) => {
                    tracing::info!(hook = hook.name(), %reason, "before_memory_op cancelled");
                    return None;
                }
            }
        }
        Some(current)
    }

    pub async fn run_before_sub_agent_dispatch(&self, agent_id: String) -> Option<String> {
        let mut current = agent_id;
        for hook in &self.hooks {
            match hook.before_sub_agent_dispatch(current.clone()).await {
                HookResult::Continue(next) => current = next,
                HookResult::Cancel(reason) => {
                    tracing::info!(hook = hook.name(), %reason, "before_sub_agent_dispatch cancelled");
                    return None;
                }
            }
        }
        Some(current)
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

impl Default for HookPipeline {
    fn default() -> Self {
        Self::new()
    }
}

pub type SharedHookPipeline = Arc<RwLock<HookPipeline>>;

pub fn new_hook_pipeline() -> SharedHookPipeline {
    Arc::new(RwLock::new(HookPipeline::new()))
}
