use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::broadcast;

use axon_budget::BudgetManager;
use axon_capabilities::CapabilityRegistry;
use axon_core::{AgentRegistry, EventBus, PermissionManager};
use axon_lifecycle::hooks::new_hook_pipeline;
use axon_memory::{LongTermMemory, SessionMemory, WorkingMemory};
use axon_orchestrator::Orchestrator;
use axon_policy::PolicyEngine;
use axon_providers::ProviderRouter;
use axon_scheduler::Scheduler;
use axon_tools::ToolExecutor;
use axon_types::{ExecutionContext, KernelError, KernelEvent};
use tracing::{info, instrument};

use crate::executor::ExecutorContext;
use crate::graphs::GraphRegistry;
use crate::ports::RuntimePorts;
use crate::workers::{PendingExecution, PendingStore, WorkerPool};

const DEFAULT_WORKER_COUNT: usize = 4;

/// Composition root. Wires the ports a caller hands in (`RuntimePorts`)
/// together with the kernel's internally-owned subsystems (scheduler,
/// permission engine, capability registry, policy engine, budget manager,
/// agent and graph registries) into one `execute`/`resume`/`abort`
/// surface. Holds no business logic of its own; every decision happens
/// inside `GraphExecutor` or the subsystem it delegates to. Grounded on
/// the reference engine binary's `build_state` composition function,
/// generalized from one IDE session's owned backends to a set of
/// injected trait-object ports plus kernel-internal subsystems this
/// crate split constructs itself.
pub struct Runtime {
    event_bus: EventBus,
    scheduler: Scheduler,
    agents: AgentRegistry,
    graphs: GraphRegistry,
    pending: PendingStore,
    pool: Option<WorkerPool>,
    snapshot_store: Option<Arc<axon_snapshot::SnapshotStore>>,
}

impl Runtime {
    pub async fn new(ports: RuntimePorts) -> Result<Self, KernelError> {
        Self::with_worker_count(ports, DEFAULT_WORKER_COUNT).await
    }

    pub async fn with_worker_count(ports: RuntimePorts, worker_count: usize) -> Result<Self, KernelError> {
        ports.validate()?;

        let event_bus = EventBus::new();
        let scheduler = Scheduler::new(event_bus.clone());
        let budget = BudgetManager::new(event_bus.clone());
        let capabilities = CapabilityRegistry::new();
        let policy = PolicyEngine::new();
        let permissions = PermissionManager::new(event_bus.clone());

        let providers = ProviderRouter::new(budget.clone(), event_bus.clone());
        for entry in ports.providers {
            providers.register(entry).await;
        }

        let tools = ToolExecutor::new(ports.tools, ports.sandbox);

        let agents = AgentRegistry::new(ports.workspace_root.clone())
            .await
            .map_err(|err| KernelError::ValidationError(err.to_string()))?;
        let graphs = GraphRegistry::new();

        let working_memory = Arc::new(WorkingMemory::new()?);
        let session_memory = Arc::new(SessionMemory::new(ports.storage.clone()));
        let long_term_memory = match (ports.vector_store.clone(), ports.embeddings.clone()) {
            (Some(vector_store), Some(embeddings)) => Some(Arc::new(LongTermMemory::new(
                ports.storage.clone(),
                vector_store,
                embeddings,
                permissions.clone(),
            ))),
            _ => None,
        };

        let orchestrator = Orchestrator::new(scheduler.clone(), event_bus.clone(), capabilities.clone());

        let executor_ctx = ExecutorContext {
            event_bus: event_bus.clone(),
            budget,
            capabilities,
            policy,
            providers,
            tools,
            working_memory,
            session_memory,
            long_term_memory,
            orchestrator,
            hooks: new_hook_pipeline(),
        };

        let pending = PendingStore::default();
        let pool = WorkerPool::spawn(
            scheduler.clone(),
            pending.clone(),
            executor_ctx,
            ports.snapshot_store.clone(),
            worker_count,
        );

        Ok(Self {
            event_bus,
            scheduler,
            agents,
            graphs,
            pending,
            pool: Some(pool),
            snapshot_store: ports.snapshot_store,
        })
    }

    /// Enqueues a fresh execution for `agent_id` and waits for it to
    /// reach a terminal lifecycle state.
    #[instrument(skip(self, input))]
    pub async fn execute(&self, agent_id: &str, input: Value) -> Result<ExecutionContext, KernelError> {
        let agent = self
            .agents
            .get(agent_id)
            .await
            .ok_or_else(|| KernelError::ModuleNotFound(format!("unknown agent `{agent_id}`")))?;
        let graph = self
            .graphs
            .get(&agent.graph_id)
            .await
            .ok_or_else(|| KernelError::GraphValidationError(format!("unknown graph `{}`", agent.graph_id)))?;

        let mut context = ExecutionContext::new(agent.id.clone(), agent.graph_id.clone(), agent.max_token_budget);
        context.variables.insert("input".to_string(), input);
        let execution_id = context.execution_id.clone();

        info!(execution_id, agent_id, "enqueueing new execution");
        let mut rx = self.event_bus.subscribe();
        self.pending.insert(execution_id.clone(), PendingExecution { context, agent, graph }).await;
        self.scheduler.enqueue(execution_id.clone(), Some(0)).await;

        await_terminal(&mut rx, &execution_id).await
    }

    /// Reloads an execution's latest snapshot and re-enqueues it from
    /// wherever it left off. Fails if the execution already reached a
    /// terminal state or no snapshot store is configured.
    #[instrument(skip(self))]
    pub async fn resume(&self, execution_id: &str) -> Result<ExecutionContext, KernelError> {
        let store = self
            .snapshot_store
            .as_ref()
            .ok_or_else(|| KernelError::ValidationError("resume requires a configured snapshot store".to_string()))?;
        let record = store
            .latest(execution_id)
            .await
            .map_err(|err| KernelError::SandboxError(err.to_string()))?
            .ok_or_else(|| KernelError::ModuleNotFound(format!("no snapshot for execution `{execution_id}`")))?;
        if record.lifecycle_state.is_terminal() {
            return Err(KernelError::ValidationError(format!(
                "execution `{execution_id}` already reached a terminal state"
            )));
        }

        let agent = self
            .agents
            .get(&record.agent_id)
            .await
            .ok_or_else(|| KernelError::ModuleNotFound(format!("unknown agent `{}`", record.agent_id)))?;
        let graph = self
            .graphs
            .get(&record.graph_id)
            .await
            .ok_or_else(|| KernelError::GraphValidationError(format!("unknown graph `{}`", record.graph_id)))?;

        let mut context = ExecutionContext::new(agent.id.clone(), agent.graph_id.clone(), agent.max_token_budget);
        context.execution_id = record.execution_id.clone();
        context.current_node_id = record.node_pointer.clone();
        context.variables = record.variables.clone();
        context.call_stack = record.call_stack.clone();
        context.token_usage = record.token_usage;
        context.lifecycle_state = record.lifecycle_state;

        info!(execution_id, agent_id = %record.agent_id, version = %record.version, "resuming execution from snapshot");
        let mut rx = self.event_bus.subscribe();
        self.pending
            .insert(execution_id.to_string(), PendingExecution { context, agent, graph })
            .await;
        self.scheduler.enqueue(execution_id.to_string(), Some(0)).await;

        await_terminal(&mut rx, execution_id).await
    }

    /// Cancels a queued or in-flight execution. Idempotent: aborting an
    /// execution that already reached a terminal state is a no-op.
    #[instrument(skip(self))]
    pub async fn abort(&self, execution_id: &str) {
        info!(execution_id, "abort requested");
        if let Some(pool) = &self.pool {
            pool.abort(execution_id).await;
        }
    }

    /// Drains in-flight executions, giving them `grace_period` to finish
    /// on their own before cancelling whatever remains.
    pub async fn shutdown(mut self, grace_period: Duration) {
        info!(grace_period_ms = grace_period.as_millis() as u64, "runtime shutting down");
        if let Some(pool) = self.pool.take() {
            pool.shutdown(grace_period).await;
        }
    }
}

async fn await_terminal(
    rx: &mut broadcast::Receiver<KernelEvent>,
    execution_id: &str,
) -> Result<ExecutionContext, KernelError> {
    loop {
        let event = rx.recv().await.map_err(|err| KernelError::TransportError(err.to_string()))?;
        if event.execution_id.as_deref() != Some(execution_id) {
            continue;
        }
        match event.event_type.as_str() {
            "execution.completed" | "execution.failed" | "execution.aborted" => {
                return serde_json::from_value::<ExecutionContext>(event.data)
                    .map_err(|err| KernelError::ValidationError(err.to_string()));
            }
            _ => continue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axon_tools::ToolRegistry;
    use axon_types::ports::Sandbox;
    use axon_types::{KernelError as Err, SandboxLimits, SandboxOutput};
    use serde_json::json;
    use tempfile::tempdir;

    struct NoopSandbox;

    #[async_trait::async_trait]
    impl Sandbox for NoopSandbox {
        async fn execute(&self, _code: &str, _context: Value, _limits: &SandboxLimits) -> Result<SandboxOutput, Err> {
            Ok(SandboxOutput { output: json!({}), error: None, duration_ms: 0, memory_used_bytes: 0 })
        }
    }

    #[derive(Default)]
    struct MemStorage(tokio::sync::RwLock<std::collections::HashMap<String, Value>>);

    #[async_trait::async_trait]
    impl axon_types::ports::Storage for MemStorage {
        async fn get(&self, key: &str) -> Result<Option<Value>, Err> {
            Ok(self.0.read().await.get(key).cloned())
        }
        async fn set(&self, key: &str, value: Value) -> Result<(), Err> {
            self.0.write().await.insert(key.to_string(), value);
            Ok(())
        }
        async fn delete(&self, key: &str) -> Result<(), Err> {
            self.0.write().await.remove(key);
            Ok(())
        }
        async fn has(&self, key: &str) -> Result<bool, Err> {
            Ok(self.0.read().await.contains_key(key))
        }
        async fn keys(&self, prefix: Option<&str>) -> Result<Vec<String>, Err> {
            Ok(self.0.read().await.keys().filter(|k| prefix.map(|p| k.starts_with(p)).unwrap_or(true)).cloned().collect())
        }
        async fn clear(&self) -> Result<(), Err> {
            self.0.write().await.clear();
            Ok(())
        }
    }

    async fn test_ports() -> RuntimePorts {
        let workspace_root = tempdir().expect("tempdir").into_path();
        RuntimePorts {
            storage: Arc::new(MemStorage::default()),
            sandbox: Arc::new(NoopSandbox),
            providers: Vec::new(),
            tools: ToolRegistry::new(),
            vector_store: None,
            embeddings: None,
            secret_vault: None,
            snapshot_store: None,
            workspace_root,
        }
    }

    #[tokio::test]
    async fn construction_fails_with_no_registered_provider() {
        let ports = test_ports().await;
        match Runtime::with_worker_count(ports, 1).await {
            Err(err) => assert!(matches!(err, KernelError::ValidationError(_))),
            Ok(_) => panic!("no providers"),
        }
    }

    #[tokio::test]
    async fn resume_without_a_snapshot_store_is_rejected() {
        let mut ports = test_ports().await;
        ports.providers.push(axon_providers::ProviderEntry {
            provider: Arc::new(EchoProvider),
            priority: 0,
            cost_per_1k_tokens: 0.0,
            avg_latency_ms: 1.0,
            supported_models: Vec::new(),
        });
        let runtime = Runtime::with_worker_count(ports, 1).await.expect("runtime");
        let err = runtime.resume("exec.missing").await.expect_err("no store");
        assert!(matches!(err, KernelError::ValidationError(_)));
        runtime.shutdown(Duration::from_millis(50)).await;
    }

    struct EchoProvider;

    #[async_trait::async_trait]
    impl axon_types::ports::LlmProvider for EchoProvider {
        fn id(&self) -> &str {
            "echo"
        }
        async fn generate(
            &self,
            _req: &axon_types::CompletionRequest,
        ) -> Result<axon_types::CompletionResponse, Err> {
            Ok(axon_types::CompletionResponse {
                content: Some("ok".to_string()),
                tool_calls: Vec::new(),
                usage: axon_types::UsageTokens { prompt_tokens: 1, completion_tokens: 1 },
            })
        }
        async fn generate_stream(
            &self,
            _req: &axon_types::CompletionRequest,
        ) -> Result<futures::stream::BoxStream<'static, Result<axon_types::ports::StreamChunk, Err>>, Err> {
            use futures::stream;
            Ok(Box::pin(stream::empty()))
        }
    }
}
