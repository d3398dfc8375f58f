use serde_json::{json, Value};

use axon_capabilities::CapabilityRegistry;
use axon_core::EventBus;
use axon_scheduler::Scheduler;
use axon_types::{
    AgentDefinition, CallFrame, CapabilityPropagation, ExecutionContext, Grant, KernelError,
    KernelEvent, MAX_CALL_STACK_DEPTH,
};

/// Dispatches sub-agent calls: cycle detection over the call stack, depth
/// enforcement, capability propagation and budget isolation, then hands
/// the new execution to the Scheduler and awaits its terminal event.
/// Grounded on the reference platform's `SpawnPolicy::evaluate` (deny-code
/// early returns over a `SpawnRequest`) and `AgentInstance`/`BudgetLimit`
/// parent/child budget model, generalized per spec.md §4.13 from its
/// role-based `spawn_edges`/`required_skills` policy to the closed
/// `callAgent` contract: cycle check, depth ≤ 5, and
/// `none`/`subset`/`full` capability propagation.
#[derive(Clone)]
pub struct Orchestrator {
    scheduler: Scheduler,
    event_bus: EventBus,
    capabilities: CapabilityRegistry,
}

impl Orchestrator {
    pub fn new(scheduler: Scheduler, event_bus: EventBus, capabilities: CapabilityRegistry) -> Self {
        Self { scheduler, event_bus, capabilities }
    }

    /// `callAgent(parentExecutionId, childAgentId, input)`. Detects a cycle
    /// (`child_agent.id` already on the parent's call stack), enforces
    /// `callStack.length < 5`, builds the child's `ExecutionContext` with
    /// the parent frame appended to its call stack, derives and registers
    /// the child's capability grant, enqueues it at the parent's priority,
    /// and resolves once the child reaches a terminal lifecycle event.
    pub async fn call_agent(
        &self,
        parent: &ExecutionContext,
        child_agent: &AgentDefinition,
        input: Value,
    ) -> Result<ExecutionContext, KernelError> {
        if parent.call_stack.iter().any(|frame| frame.agent_id == child_agent.id) {
            return Err(KernelError::GraphValidationError(format!(
                "circular agent call: {}→{}",
                parent.agent_id, child_agent.id
            )));
        }
        if parent.call_stack.len() >= MAX_CALL_STACK_DEPTH {
            return Err(KernelError::ValidationError(format!(
                "call stack depth exceeds the maximum of {MAX_CALL_STACK_DEPTH}"
            )));
        }

        let mut call_stack = parent.call_stack.clone();
        call_stack.push(CallFrame {
            agent_id: parent.agent_id.clone(),
            execution_id: parent.execution_id.clone(),
        });

        // Memory scope and session id are always fresh per child; only the
        // budget counter conditionally ties back to the parent.
        let budget_remaining =
            if child_agent.budget_isolated { child_agent.max_token_budget } else { parent.budget_remaining };

        let mut child_ctx =
            ExecutionContext::new(child_agent.id.clone(), child_agent.graph_id.clone(), budget_remaining);
        child_ctx.call_stack = call_stack;
        child_ctx.priority = parent.priority;

        let parent_grant = self.capabilities.grant_for(&parent.agent_id).await;
        let child_own_grant = self.capabilities.grant_for(&child_agent.id).await;
        let derived_grant = derive_child_grant(
            child_agent.capability_propagation,
            parent_grant.as_ref(),
            child_own_grant.as_ref(),
            &child_agent.id,
        );
        self.capabilities.grant(derived_grant).await;

        self.event_bus.publish(KernelEvent::for_execution(
            "execution.call_enqueued",
            child_ctx.execution_id.clone(),
            child_ctx.agent_id.clone(),
            json!({"parentExecutionId": parent.execution_id, "input": input}),
        ));
        self.scheduler.enqueue(child_ctx.execution_id.clone(), Some(parent.priority as i32)).await;

        self.await_terminal(child_ctx).await
    }

    /// Blocks on the event bus for the child's terminal event
    /// (`execution.completed`/`execution.failed`/`execution.aborted`),
    /// returning the frozen context it carries. Falls back to the
    /// context built at enqueue time if the event's payload can't be
    /// parsed as one.
    async fn await_terminal(&self, fallback: ExecutionContext) -> Result<ExecutionContext, KernelError> {
        let execution_id = fallback.execution_id.clone();
        let mut rx = self.event_bus.subscribe();
        loop {
            let event = rx
                .recv()
                .await
                .map_err(|err| KernelError::TransportError(err.to_string()))?;
            if event.execution_id.as_deref() != Some(execution_id.as_str()) {
                continue;
            }
            match event.event_type.as_str() {
                "execution.completed" | "execution.failed" | "execution.aborted" => {
                    let ctx = serde_json::from_value::<ExecutionContext>(event.data).unwrap_or(fallback);
                    return Ok(ctx);
                }
                _ => continue,
            }
        }
    }
}

fn empty_grant(agent_id: &str) -> Grant {
    Grant {
        agent_id: agent_id.to_string(),
        capabilities: Default::default(),
        max_token_budget: 0,
        max_usd_cost: 0.0,
        allowed_tools: Vec::new(),
        allowed_network_hosts: Vec::new(),
        allowed_memory_scopes: Vec::new(),
        allowed_agent_targets: Vec::new(),
    }
}

fn intersect(a: &[String], b: &[String]) -> Vec<String> {
    a.iter().filter(|item| b.contains(item)).cloned().collect()
}

fn derive_child_grant(
    propagation: CapabilityPropagation,
    parent: Option<&Grant>,
    child_own: Option<&Grant>,
    child_id: &str,
) -> Grant {
    match propagation {
        CapabilityPropagation::None => child_own.cloned().unwrap_or_else(|| empty_grant(child_id)),
        CapabilityPropagation::Full => {
            let mut grant = parent.cloned().unwrap_or_else(|| empty_grant(child_id));
            grant.agent_id = child_id.to_string();
            grant
        }
        CapabilityPropagation::Subset => {
            let parent = parent.cloned().unwrap_or_else(|| empty_grant(child_id));
            let child_own = child_own.cloned().unwrap_or_else(|| empty_grant(child_id));
            Grant {
                agent_id: child_id.to_string(),
                capabilities: parent.capabilities.intersection(&child_own.capabilities).cloned().collect(),
                max_token_budget: parent.max_token_budget.min(child_own.max_token_budget),
                max_usd_cost: parent.max_usd_cost.min(child_own.max_usd_cost),
                allowed_tools: intersect(&parent.allowed_tools, &child_own.allowed_tools),
                allowed_network_hosts: intersect(&parent.allowed_network_hosts, &child_own.allowed_network_hosts),
                allowed_memory_scopes: intersect(&parent.allowed_memory_scopes, &child_own.allowed_memory_scopes),
                allowed_agent_targets: intersect(&parent.allowed_agent_targets, &child_own.allowed_agent_targets),
            }
        }
    }
}
