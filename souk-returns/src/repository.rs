use crate::models::{ReturnRequest, ReturnStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use souk_core::CoreResult;
use uuid::Uuid;

#[async_trait]
pub trait ReturnRepository: Send + Sync {
    /// Store a new return. Fails with `CoreError::Conflict` when the returns
    /// still holding quantity on the same line, plus this one, would exceed
    /// `line_quantity`. The check and the write happen atomically.
    async fn insert(&self, request: &ReturnRequest, line_quantity: u32) -> CoreResult<()>;

    async fn get(&self, id: Uuid) -> CoreResult<Option<ReturnRequest>>;

    /// Overwrite the stored return only if its status is still `expected`.
    /// Returns `false` when another writer got there first.
    async fn update_if_status(
        &self,
        request: &ReturnRequest,
        expected: ReturnStatus,
    ) -> CoreResult<bool>;

    async fn list_for_line(&self, order_line_id: Uuid) -> CoreResult<Vec<ReturnRequest>>;

    /// Completed refunds with `refunded_at` at or before `end`
    async fn list_refunded_until(&self, end: DateTime<Utc>) -> CoreResult<Vec<ReturnRequest>>;
}
