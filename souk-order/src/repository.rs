use crate::models::Order;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use souk_core::CoreResult;
use uuid::Uuid;

/// Read side of the order store used by returns and payouts
#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn save_order(&self, order: &Order) -> CoreResult<()>;

    async fn get_order(&self, id: Uuid) -> CoreResult<Option<Order>>;

    /// Orders created at or before `end`
    async fn list_orders_until(&self, end: DateTime<Utc>) -> CoreResult<Vec<Order>>;

    /// Orders with a delivery assignment whose fee has not been paid out
    async fn list_unpaid_deliveries(&self) -> CoreResult<Vec<Order>>;

    async fn mark_delivery_fees_paid(&self, order_ids: &[Uuid]) -> CoreResult<()>;
}
