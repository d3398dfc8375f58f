use tokio::sync::broadcast;

use axon_types::KernelEvent;

/// Broadcasts kernel events to every subscriber. Lagging subscribers drop
/// the oldest events rather than blocking publishers; `publish` is a
/// best-effort fire-and-forget with no subscribers required.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<KernelEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(2048);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<KernelEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: KernelEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.publish(KernelEvent::empty("execution.started"));
        let received = rx.recv().await.unwrap();
        assert_eq!(received.event_type, "execution.started");
    }

    #[tokio::test]
    async fn publish_without_subscribers_does_not_panic() {
        let bus = EventBus::new();
        bus.publish(KernelEvent::new("graph.validated", json!({"nodeCount": 3})));
    }
}
