use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use serde_json::json;
use tokio::sync::Mutex;

use axon_core::EventBus;
use axon_types::KernelEvent;

const DEFAULT_PRIORITY: i32 = 0;

#[derive(Debug, Clone, Eq, PartialEq)]
struct QueuedExecution {
    execution_id: String,
    priority: i32,
    sequence: u64,
}

/// `(priority desc, enqueue time asc)` — `BinaryHeap` is a max-heap, so a
/// higher priority or an earlier (lower) sequence number sorts greater.
impl Ord for QueuedExecution {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for QueuedExecution {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Priority queue of pending execution ids. Thread-safe under concurrent
/// producers and one consumer per worker (the queue itself serializes
/// access behind a single async mutex; workers race on `dequeue`, not on
/// heap mutation).
#[derive(Clone)]
pub struct Scheduler {
    heap: Arc<Mutex<BinaryHeap<QueuedExecution>>>,
    sequence: Arc<AtomicU64>,
    event_bus: EventBus,
}

impl Scheduler {
    pub fn new(event_bus: EventBus) -> Self {
        Self {
            heap: Arc::new(Mutex::new(BinaryHeap::new())),
            sequence: Arc::new(AtomicU64::new(0)),
            event_bus,
        }
    }

    pub async fn enqueue(&self, execution_id: impl Into<String>, priority: Option<i32>) {
        let sequence = self.sequence.fetch_add(1, AtomicOrdering::SeqCst);
        let entry = QueuedExecution {
            execution_id: execution_id.into(),
            priority: priority.unwrap_or(DEFAULT_PRIORITY),
            sequence,
        };
        self.heap.lock().await.push(entry);
    }

    pub async fn dequeue(&self) -> Option<String> {
        self.heap.lock().await.pop().map(|e| e.execution_id)
    }

    /// Removes a queued (not yet running) execution and emits
    /// `execution.aborted`. Returns `false` if it wasn't queued.
    pub async fn cancel(&self, execution_id: &str) -> bool {
        let mut heap = self.heap.lock().await;
        let before = heap.len();
        let remaining: BinaryHeap<QueuedExecution> =
            heap.drain().filter(|e| e.execution_id != execution_id).collect();
        let removed = remaining.len() < before;
        *heap = remaining;
        drop(heap);
        if removed {
            self.event_bus.publish(KernelEvent::new(
                "execution.aborted",
                json!({"executionId": execution_id}),
            ));
        }
        removed
    }

    pub async fn size(&self) -> usize {
        self.heap.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn higher_priority_dequeues_first() {
        let scheduler = Scheduler::new(EventBus::new());
        scheduler.enqueue("low", Some(1)).await;
        scheduler.enqueue("high", Some(10)).await;
        assert_eq!(scheduler.dequeue().await, Some("high".to_string()));
        assert_eq!(scheduler.dequeue().await, Some("low".to_string()));
    }

    #[tokio::test]
    async fn equal_priority_dequeues_in_enqueue_order() {
        let scheduler = Scheduler::new(EventBus::new());
        scheduler.enqueue("first", Some(5)).await;
        scheduler.enqueue("second", Some(5)).await;
        assert_eq!(scheduler.dequeue().await, Some("first".to_string()));
        assert_eq!(scheduler.dequeue().await, Some("second".to_string()));
    }

    #[tokio::test]
    async fn cancel_removes_a_queued_execution() {
        let scheduler = Scheduler::new(EventBus::new());
        scheduler.enqueue("a", None).await;
        scheduler.enqueue("b", None).await;
        assert!(scheduler.cancel("a").await);
        assert_eq!(scheduler.size().await, 1);
        assert_eq!(scheduler.dequeue().await, Some("b".to_string()));
    }

    #[tokio::test]
    async fn cancel_of_unknown_execution_returns_false() {
        let scheduler = Scheduler::new(EventBus::new());
        assert!(!scheduler.cancel("ghost").await);
    }

    #[tokio::test]
    async fn empty_queue_dequeues_none() {
        let scheduler = Scheduler::new(EventBus::new());
        assert_eq!(scheduler.dequeue().await, None);
    }
}
