use async_trait::async_trait;
use souk_core::{CoreResult, EventSink};
use souk_shared::DomainEvent;
use tokio::sync::broadcast;
use tracing::debug;

/// Fans domain events out to in-process subscribers (notifications, audit,
/// inventory restock).
#[derive(Clone)]
pub struct BroadcastEventSink {
    tx: broadcast::Sender<DomainEvent>,
}

impl BroadcastEventSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl EventSink for BroadcastEventSink {
    async fn publish(&self, event: DomainEvent) -> CoreResult<()> {
        let topic = event.topic();
        match self.tx.send(event) {
            Ok(receivers) => debug!("Sent {} to {} subscribers", topic, receivers),
            // Nobody listening is not a failure
            Err(_) => debug!("No subscribers for {}", topic),
        }
        Ok(())
    }
}
