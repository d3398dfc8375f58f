use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use axon_scheduler::Scheduler;
use axon_snapshot::SnapshotStore;
use axon_types::{AgentDefinition, ExecutionContext, Graph, SnapshotRecord};
use tracing::{debug, warn};

use crate::executor::{ExecutorContext, GraphExecutor};

const DEFAULT_WORKER_COUNT: usize = 4;
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Everything a worker needs to run one queued execution: the context it
/// left off at, the agent definition that owns it and the graph it walks.
pub struct PendingExecution {
    pub context: ExecutionContext,
    pub agent: AgentDefinition,
    pub graph: Graph,
}

/// Execution ids the Scheduler knows about are opaque strings; this holds
/// the actual payload a worker needs once it pops one off the queue.
#[derive(Clone, Default)]
pub struct PendingStore {
    entries: Arc<RwLock<HashMap<String, PendingExecution>>>,
}

impl PendingStore {
    pub async fn insert(&self, execution_id: String, pending: PendingExecution) {
        self.entries.write().await.insert(execution_id, pending);
    }

    pub async fn take(&self, execution_id: &str) -> Option<PendingExecution> {
        self.entries.write().await.remove(execution_id)
    }
}

/// Bounded N-worker pool draining the Scheduler's priority queue. Each
/// worker pops one execution id, runs it to a terminal lifecycle state
/// through `GraphExecutor`, persists a snapshot and loops back for the
/// next id. Grounded on the reference runtime's `build_state`-wired
/// background task loop, generalized from one PTY-attached session loop
/// per client to N independent graph-execution workers pulling from a
/// shared queue.
pub struct WorkerPool {
    cancellations: Arc<RwLock<HashMap<String, CancellationToken>>>,
    scheduler: Scheduler,
    draining: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn spawn(
        scheduler: Scheduler,
        pending: PendingStore,
        executor_ctx: ExecutorContext,
        snapshot_store: Option<Arc<SnapshotStore>>,
        worker_count: usize,
    ) -> Self {
        let worker_count = if worker_count == 0 { DEFAULT_WORKER_COUNT } else { worker_count };
        let draining = Arc::new(AtomicBool::new(false));
        let cancellations: Arc<RwLock<HashMap<String, CancellationToken>>> = Arc::new(RwLock::new(HashMap::new()));
        let handles = (0..worker_count)
            .map(|_| {
                spawn_worker(
                    scheduler.clone(),
                    pending.clone(),
                    executor_ctx.clone(),
                    snapshot_store.clone(),
                    cancellations.clone(),
                    draining.clone(),
                )
            })
            .collect();
        Self { cancellations, scheduler, draining, handles }
    }

    /// Cancels a queued-but-not-yet-dequeued execution outright; cancels
    /// an in-flight one cooperatively via its `CancellationToken`, which
    /// the executor observes at its next suspension point. Idempotent.
    pub async fn abort(&self, execution_id: &str) {
        if self.scheduler.cancel(execution_id).await {
            return;
        }
        if let Some(token) = self.cancellations.read().await.get(execution_id) {
            token.cancel();
        }
    }

    /// Stops accepting new work, waits up to `grace_period` for in-flight
    /// executions to finish on their own, then cancels whatever remains.
    pub async fn shutdown(self, grace_period: Duration) {
        self.draining.store(true, Ordering::SeqCst);
        let WorkerPool { cancellations, handles, .. } = self;
        let drained = tokio::time::timeout(grace_period, join_all(handles)).await;
        if drained.is_err() {
            for token in cancellations.read().await.values() {
                token.cancel();
            }
        }
    }
}

async fn join_all(handles: Vec<JoinHandle<()>>) {
    for handle in handles {
        let _ = handle.await;
    }
}

fn spawn_worker(
    scheduler: Scheduler,
    pending: PendingStore,
    executor_ctx: ExecutorContext,
    snapshot_store: Option<Arc<SnapshotStore>>,
    cancellations: Arc<RwLock<HashMap<String, CancellationToken>>>,
    draining: Arc<AtomicBool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let Some(execution_id) = scheduler.dequeue().await else {
                if draining.load(Ordering::SeqCst) {
                    return;
                }
                tokio::time::sleep(IDLE_POLL_INTERVAL).await;
                continue;
            };

            let Some(PendingExecution { context, agent, graph }) = pending.take(&execution_id).await else {
                warn!(execution_id, "dequeued execution with no pending payload");
                continue;
            };

            debug!(execution_id, agent_id = %agent.id, "worker picked up execution");

            let token = CancellationToken::new();
            cancellations.write().await.insert(execution_id.clone(), token.clone());

            let executor = GraphExecutor::new(&executor_ctx, &agent, &graph, token);
            let result = executor.run(context).await;

            cancellations.write().await.remove(&execution_id);

            match &result {
                Ok(finished) => debug!(execution_id, state = ?finished.lifecycle_state, "execution reached a terminal state"),
                Err(err) => warn!(execution_id, error = %err, "execution loop returned an error"),
            }

            if let (Ok(finished), Some(store)) = (&result, &snapshot_store) {
                let existing = store.list(&finished.execution_id).await.len();
                let record = SnapshotRecord {
                    execution_id: finished.execution_id.clone(),
                    agent_id: finished.agent_id.clone(),
                    graph_id: finished.graph_id.clone(),
                    node_pointer: finished.current_node_id.clone(),
                    timestamp: chrono::Utc::now(),
                    variables: finished.variables.clone(),
                    call_stack: finished.call_stack.clone(),
                    lifecycle_state: finished.lifecycle_state,
                    token_usage: finished.token_usage,
                    memory_reference: None,
                    event_log_reference: None,
                    version: format!("v{}", existing + 1),
                };
                let _ = store.save(record).await;
            }
        }
    })
}
