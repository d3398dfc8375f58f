use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use axon_budget::{BudgetManager, BudgetScope};
use axon_capabilities::{CapabilityRegistry, CapabilityVerifier};
use axon_core::EventBus;
use axon_graph::{resolve_next_node, validate, IterationTracker};
use axon_lifecycle::hooks::SharedHookPipeline;
use axon_lifecycle::transition::StateMachine;
use axon_memory::{LongTermMemory, SessionMemory, WorkingMemory};
use axon_observability::{emit_event, ObservabilityEvent, ProcessKind};
use axon_orchestrator::Orchestrator;
use axon_policy::{PolicyContext, PolicyDecision, PolicyEngine};
use axon_providers::ProviderRouter;
use axon_tools::ToolExecutor;
use axon_types::{
    AgentDefinition, ChatMessage, CompletionRequest, ExecutionContext, Graph, KernelError,
    KernelEvent, LifecycleState, MemoryItem, MemoryItemType, ModelSpec, NodeType,
};
use tracing::Level;

const DEFAULT_APPROVAL_TIMEOUT: Duration = Duration::from_secs(300);

/// Everything one graph run needs to call into the rest of the kernel.
/// Built once by the Runtime composition root and shared (cheaply
/// cloned, each field an `Arc`/handle-style type) across every worker.
#[derive(Clone)]
pub struct ExecutorContext {
    pub event_bus: EventBus,
    pub budget: BudgetManager,
    pub capabilities: CapabilityRegistry,
    pub policy: PolicyEngine,
    pub providers: ProviderRouter,
    pub tools: ToolExecutor,
    pub working_memory: Arc<WorkingMemory>,
    pub session_memory: Arc<SessionMemory>,
    pub long_term_memory: Option<Arc<LongTermMemory>>,
    pub orchestrator: Orchestrator,
    pub hooks: SharedHookPipeline,
}

/// Runs one `ExecutionContext` through its `Graph` to a terminal
/// lifecycle state. Grounded on the reference engine's `run_prompt_async`
/// turn loop (provider call, tool-call loop, permission-gated execution,
/// final narrative), generalized from a single chat turn to the spec's
/// typed node-by-node graph walk over `START/END/LLM/TOOL/MEMORY_READ/
/// MEMORY_WRITE/AGENT_CALL/CONDITION/HUMAN_APPROVAL/PARALLEL`.
pub struct GraphExecutor<'a> {
    ctx: &'a ExecutorContext,
    agent: &'a AgentDefinition,
    graph: &'a Graph,
    cancellation: CancellationToken,
}

impl<'a> GraphExecutor<'a> {
    pub fn new(ctx: &'a ExecutorContext, agent: &'a AgentDefinition, graph: &'a Graph, cancellation: CancellationToken) -> Self {
        Self { ctx, agent, graph, cancellation }
    }

    /// Drives `context` from its current node to a terminal lifecycle
    /// state, mutating it in place and returning it once terminal. A
    /// malformed graph fails validation before the first node runs.
    pub async fn run(&self, mut context: ExecutionContext) -> Result<ExecutionContext, KernelError> {
        let validation = validate(self.graph);
        if !validation.valid {
            return Err(KernelError::GraphValidationError(validation.errors.join("; ")));
        }

        let mut state_machine = StateMachine::new();
        for state in [LifecycleState::Validated, LifecycleState::Planned, LifecycleState::Scheduled, LifecycleState::Running]
        {
            state_machine.transition(state)?;
        }
        context.lifecycle_state = LifecycleState::Running;

        let mut current_node_id = self
            .graph
            .start_nodes()
            .first()
            .map(|n| n.id.clone())
            .ok_or_else(|| KernelError::GraphValidationError("graph has no START node".to_string()))?;
        let mut iterations = IterationTracker::new();

        loop {
            if self.cancellation.is_cancelled() {
                context.lifecycle_state = LifecycleState::Aborted;
                self.publish("execution.aborted", &context, json!({}));
                return Ok(context);
            }

            iterations.enter(self.graph, &current_node_id)?;
            context.current_node_id = Some(current_node_id.clone());
            self.publish("graph.node_entered", &context, json!({"nodeId": current_node_id}));

            let node = self
                .graph
                .node(&current_node_id)
                .ok_or_else(|| KernelError::GraphValidationError(format!("node `{current_node_id}` not found")))?;

            match node.node_type {
                NodeType::Start | NodeType::Condition => {}
                NodeType::End => {
                    context.lifecycle_state = LifecycleState::Completed;
                    self.publish("execution.completed", &context, json!({}));
                    return Ok(context);
                }
                NodeType::Llm => {
                    if let Err(err) = self.run_llm_node(&mut context, &node.config).await {
                        return self.fail(context, err);
                    }
                }
                NodeType::Tool => {
                    if let Err(err) = self.run_tool_node(&mut context, &node.config).await {
                        return self.fail(context, err);
                    }
                }
                NodeType::MemoryRead => {
                    if let Err(err) = self.run_memory_read_node(&mut context, &node.config).await {
                        return self.fail(context, err);
                    }
                }
                NodeType::MemoryWrite => {
                    if let Err(err) = self.run_memory_write_node(&mut context, &node.config).await {
                        return self.fail(context, err);
                    }
                }
                NodeType::AgentCall => {
                    if let Err(err) = self.run_agent_call_node(&mut context, &node.config).await {
                        return self.fail(context, err);
                    }
                }
                NodeType::HumanApproval => {
                    if let Err(err) = self.await_approval(&context).await {
                        return self.fail(context, err);
                    }
                }
                NodeType::Parallel => {
                    if let Err(err) = self.run_parallel_node(&mut context, &current_node_id).await {
                        return self.fail(context, err);
                    }
                }
            }

            match resolve_next_node(self.graph, &current_node_id, &context.variables) {
                Some(next) => current_node_id = next,
                None => {
                    context.lifecycle_state = LifecycleState::Completed;
                    self.publish("execution.completed", &context, json!({}));
                    return Ok(context);
                }
            }
        }
    }

    fn fail(&self, mut context: ExecutionContext, err: KernelError) -> Result<ExecutionContext, KernelError> {
        context.lifecycle_state = LifecycleState::Failed;
        emit_event(
            Level::ERROR,
            ProcessKind::Runtime,
            ObservabilityEvent {
                event: "execution.failed",
                component: "graph_executor",
                execution_id: Some(context.execution_id.as_str()),
                agent_id: Some(context.agent_id.as_str()),
                node_id: context.current_node_id.as_deref(),
                provider_id: None,
                model_id: None,
                status: None,
                error_code: Some(err.code()),
                detail: Some(&err.to_string()),
            },
        );
        self.publish("execution.failed", &context, json!({"error": err.to_failure_detail()}));
        Ok(context)
    }

    fn publish(&self, event_type: &str, context: &ExecutionContext, data: Value) {
        let mut payload = serde_json::to_value(context).unwrap_or(json!({}));
        if let Value::Object(ref mut map) = payload {
            if let Value::Object(extra) = data {
                map.extend(extra);
            }
        }
        emit_event(
            Level::INFO,
            ProcessKind::Runtime,
            ObservabilityEvent {
                event: event_type,
                component: "graph_executor",
                execution_id: Some(context.execution_id.as_str()),
                agent_id: Some(context.agent_id.as_str()),
                node_id: context.current_node_id.as_deref(),
                provider_id: None,
                model_id: None,
                status: None,
                error_code: None,
                detail: None,
            },
        );
        self.ctx.event_bus.publish(KernelEvent::for_execution(
            event_type,
            context.execution_id.clone(),
            context.agent_id.clone(),
            payload,
        ));
    }

    async fn run_llm_node(&self, context: &mut ExecutionContext, config: &Value) -> Result<(), KernelError> {
        let model_id = config.get("model").and_then(Value::as_str).unwrap_or("default").to_string();
        let provider_id = config.get("providerId").and_then(Value::as_str).unwrap_or("default").to_string();
        let system_prompt = config.get("systemPrompt").and_then(Value::as_str).map(str::to_string);
        let output_variable = config.get("outputVariable").and_then(Value::as_str).unwrap_or("response");

        let history = self.ctx.working_memory.get_conversation_history(&context.execution_id).await;
        let user_input = context.variables.get("input").and_then(Value::as_str).unwrap_or("").to_string();
        if !user_input.is_empty() {
            self.ctx
                .working_memory
                .append_message(&context.execution_id, ChatMessage { role: "user".to_string(), content: user_input })
                .await;
        }
        let messages = self.ctx.working_memory.get_conversation_history(&context.execution_id).await;
        let messages = if messages.is_empty() { history } else { messages };

        let message_values: Vec<Value> = messages.iter().map(|m| json!({"role": m.role, "content": m.content})).collect();
        let hooks = self.ctx.hooks.read().await;
        let (message_values, model_id) = hooks
            .run_before_llm_call(message_values, model_id)
            .await
            .ok_or_else(|| KernelError::PermissionDenied("LLM call cancelled by hook".to_string()))?;
        drop(hooks);
        let messages: Vec<ChatMessage> = message_values
            .into_iter()
            .map(|v| ChatMessage {
                role: v.get("role").and_then(Value::as_str).unwrap_or("user").to_string(),
                content: v.get("content").and_then(Value::as_str).unwrap_or_default().to_string(),
            })
            .collect();

        let request = CompletionRequest {
            model: ModelSpec { provider_id, model_id },
            system_prompt,
            messages,
            temperature: config.get("temperature").and_then(Value::as_f64).map(|v| v as f32),
            max_tokens: config.get("maxTokens").and_then(Value::as_u64).map(|v| v as u32),
            tools: None,
        };

        let scope = BudgetScope::Agent(context.agent_id.clone());
        let response = self.ctx.providers.route(&request, &scope).await?;
        context.token_usage.add(axon_types::TokenUsage {
            prompt_tokens: response.usage.prompt_tokens,
            completion_tokens: response.usage.completion_tokens,
            usd_spent: 0.0,
        });
        context.budget_remaining = context.budget_remaining.saturating_sub(
            response.usage.prompt_tokens + response.usage.completion_tokens,
        );
        let content = response.content.clone().unwrap_or_default();
        self.ctx
            .working_memory
            .append_message(
                &context.execution_id,
                ChatMessage { role: "assistant".to_string(), content: content.clone() },
            )
            .await;
        context.variables.insert(output_variable.to_string(), json!(content));
        Ok(())
    }

    async fn run_tool_node(&self, context: &mut ExecutionContext, config: &Value) -> Result<(), KernelError> {
        let tool_name = config
            .get("tool")
            .and_then(Value::as_str)
            .ok_or_else(|| KernelError::ValidationError("TOOL node missing `tool` in config".to_string()))?;
        let input = config.get("input").cloned().unwrap_or(json!({}));
        let output_variable = config.get("outputVariable").and_then(Value::as_str).unwrap_or("toolResult");

        if let Some(constraint) = self.ctx.capabilities.constraint_for(&context.agent_id).await {
            CapabilityVerifier::verify_tool(&constraint, tool_name)?;
        }
        let decision = self
            .ctx
            .policy
            .evaluate(&PolicyContext {
                agent_id: context.agent_id.clone(),
                action: format!("tool.{tool_name}"),
                context: input.clone(),
            })
            .await;
        match decision {
            PolicyDecision::Deny => {
                return Err(KernelError::PermissionDenied(format!("policy denied tool `{tool_name}`")));
            }
            PolicyDecision::Prompt => self.await_approval(context).await?,
            PolicyDecision::Allow => {}
        }

        let hooks = self.ctx.hooks.read().await;
        let (tool_name, input) = hooks
            .run_before_tool_call(tool_name.to_string(), input)
            .await
            .ok_or_else(|| KernelError::PermissionDenied(format!("tool call `{tool_name}` cancelled by hook")))?;
        drop(hooks);

        let result = self.ctx.tools.execute(&tool_name, input).await?;
        context.variables.insert(
            output_variable.to_string(),
            json!({
                "success": result.success,
                "output": result.output,
                "error": result.error,
                "durationMs": result.duration_ms,
            }),
        );
        Ok(())
    }

    async fn run_memory_read_node(&self, context: &mut ExecutionContext, config: &Value) -> Result<(), KernelError> {
        let output_variable = config.get("outputVariable").and_then(Value::as_str).unwrap_or("memoryResult");
        let tier = config.get("tier").and_then(Value::as_str).unwrap_or("session").to_string();
        {
            let hooks = self.ctx.hooks.read().await;
            hooks
                .run_before_memory_op(tier.clone(), "read".to_string())
                .await
                .ok_or_else(|| KernelError::PermissionDenied("memory read cancelled by hook".to_string()))?;
        }
        match tier.as_str() {
            "session" => {
                let key = config
                    .get("key")
                    .and_then(Value::as_str)
                    .ok_or_else(|| KernelError::ValidationError("MEMORY_READ session op missing `key`".to_string()))?;
                let value = self.ctx.session_memory.get(&context.session_id, key).await?;
                context.variables.insert(output_variable.to_string(), value.unwrap_or(Value::Null));
            }
            "semantic" => {
                let Some(long_term) = &self.ctx.long_term_memory else {
                    return Err(KernelError::ValidationError(
                        "semantic memory read requires a configured vector store/embedding provider".to_string(),
                    ));
                };
                let query = config.get("query").and_then(Value::as_str).unwrap_or("");
                let top_k = config.get("topK").and_then(Value::as_u64).unwrap_or(5) as usize;
                let results = long_term.search_semantic(&context.agent_id, query, top_k).await?;
                context.variables.insert(output_variable.to_string(), serde_json::to_value(&results).unwrap_or(json!([])));
            }
            other => return Err(KernelError::ValidationError(format!("unknown MEMORY_READ tier `{other}`"))),
        }
        Ok(())
    }

    async fn run_memory_write_node(&self, context: &mut ExecutionContext, config: &Value) -> Result<(), KernelError> {
        let tier = config.get("tier").and_then(Value::as_str).unwrap_or("session").to_string();
        {
            let hooks = self.ctx.hooks.read().await;
            hooks
                .run_before_memory_op(tier.clone(), "write".to_string())
                .await
                .ok_or_else(|| KernelError::PermissionDenied("memory write cancelled by hook".to_string()))?;
        }
        match tier.as_str() {
            "session" => {
                let key = config
                    .get("key")
                    .and_then(Value::as_str)
                    .ok_or_else(|| KernelError::ValidationError("MEMORY_WRITE session op missing `key`".to_string()))?;
                let value = config.get("value").cloned().unwrap_or(Value::Null);
                self.ctx.session_memory.set(&context.session_id, key, value).await?;
            }
            "longterm" => {
                let Some(long_term) = &self.ctx.long_term_memory else {
                    return Err(KernelError::ValidationError(
                        "long-term memory write requires a configured vector store/embedding provider".to_string(),
                    ));
                };
                let content = config.get("content").and_then(Value::as_str).unwrap_or("").to_string();
                let scope_alias = config.get("scope").and_then(Value::as_str).unwrap_or("private");
                let item = MemoryItem {
                    id: uuid::Uuid::new_v4().to_string(),
                    agent_id: context.agent_id.clone(),
                    scope: String::new(),
                    item_type: MemoryItemType::Episodic,
                    importance: config.get("importance").and_then(Value::as_f64).unwrap_or(0.5) as f32,
                    embedding: Vec::new(),
                    content,
                    created_at: chrono::Utc::now(),
                    updated_at: chrono::Utc::now(),
                    metadata: Some(json!({})),
                };
                long_term.upsert(&self.agent.id, scope_alias, item).await?;
            }
            other => return Err(KernelError::ValidationError(format!("unknown MEMORY_WRITE tier `{other}`"))),
        }
        Ok(())
    }

    async fn run_agent_call_node(&self, context: &mut ExecutionContext, config: &Value) -> Result<(), KernelError> {
        let target_agent_id = config
            .get("targetAgentId")
            .and_then(Value::as_str)
            .ok_or_else(|| KernelError::ValidationError("AGENT_CALL node missing `targetAgentId`".to_string()))?;
        let output_variable = config.get("outputVariable").and_then(Value::as_str).unwrap_or("agentCallResult");

        if let Some(constraint) = self.ctx.capabilities.constraint_for(&context.agent_id).await {
            CapabilityVerifier::verify_agent_target(&constraint, target_agent_id)?;
        }

        {
            let hooks = self.ctx.hooks.read().await;
            hooks
                .run_before_sub_agent_dispatch(target_agent_id.to_string())
                .await
                .ok_or_else(|| KernelError::PermissionDenied(format!("call to `{target_agent_id}` cancelled by hook")))?;
        }

        let child_agent = AgentDefinition {
            id: target_agent_id.to_string(),
            name: target_agent_id.to_string(),
            graph_id: config.get("graphId").and_then(Value::as_str).unwrap_or_default().to_string(),
            max_token_budget: self.agent.max_token_budget,
            required_capabilities: Default::default(),
            capability_propagation: self.agent.capability_propagation,
            budget_isolated: config.get("budgetIsolated").and_then(Value::as_bool).unwrap_or(true),
        };
        let input = config.get("input").cloned().unwrap_or(json!({}));
        let result = self.ctx.orchestrator.call_agent(context, &child_agent, input).await?;
        context.variables.insert(
            output_variable.to_string(),
            result.variables.get("response").cloned().unwrap_or(Value::Null),
        );
        Ok(())
    }

    async fn run_parallel_node(&self, context: &mut ExecutionContext, node_id: &str) -> Result<(), KernelError> {
        let branches = self.graph.outgoing(node_id);
        let mut handles = Vec::new();
        for edge in branches {
            let Some(node) = self.graph.node(&edge.to) else { continue };
            if node.node_type != NodeType::Tool {
                continue;
            }
            let ctx = self.ctx.clone();
            let config = node.config.clone();
            let agent_id = context.agent_id.clone();
            handles.push(tokio::spawn(async move {
                let tool_name = config.get("tool").and_then(Value::as_str).unwrap_or_default().to_string();
                let input = config.get("input").cloned().unwrap_or(json!({}));
                if let Some(constraint) = ctx.capabilities.constraint_for(&agent_id).await {
                    CapabilityVerifier::verify_tool(&constraint, &tool_name)?;
                }
                ctx.tools.execute(&tool_name, input).await
            }));
        }
        let mut outputs = Vec::new();
        for handle in handles {
            let result = handle.await.map_err(|err| KernelError::ToolExecutionError(err.to_string()))??;
            outputs.push(json!({
                "success": result.success,
                "output": result.output,
                "error": result.error,
                "durationMs": result.duration_ms,
            }));
        }
        context.variables.insert("parallelResults".to_string(), json!(outputs));
        Ok(())
    }

    async fn await_approval(&self, context: &ExecutionContext) -> Result<(), KernelError> {
        self.publish("graph.node_entered", context, json!({"nodeType": "human_approval"}));
        let execution_id = context.execution_id.clone();
        let mut rx = self.ctx.event_bus.subscribe();
        let wait = async {
            loop {
                let event = rx.recv().await.map_err(|err| KernelError::TransportError(err.to_string()))?;
                if event.execution_id.as_deref() == Some(execution_id.as_str())
                    && event.event_type == "execution.approve_checkpoint"
                {
                    return Ok(());
                }
            }
        };
        match tokio::time::timeout(DEFAULT_APPROVAL_TIMEOUT, wait).await {
            Ok(result) => result,
            Err(_) => Err(KernelError::Timeout("HUMAN_APPROVAL wait exceeded its deadline".to_string())),
        }
    }
}
