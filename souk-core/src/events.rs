use crate::CoreResult;
use async_trait::async_trait;
use souk_shared::DomainEvent;
use tracing::{info, warn};

/// Outbound channel for domain events consumed by the notification and audit
/// collaborators.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: DomainEvent) -> CoreResult<()>;
}

/// Publish after state has been persisted. A failed publication is logged and
/// dropped; it never undoes the write that produced the event.
pub async fn publish_or_log(sink: &dyn EventSink, event: DomainEvent) {
    let topic = event.topic();
    let entity_id = event.entity_id();

    match sink.publish(event).await {
        Ok(()) => info!("Published {} for {}", topic, entity_id),
        Err(e) => warn!("Failed to publish {} for {}: {}", topic, entity_id, e),
    }
}
