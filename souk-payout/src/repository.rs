use crate::models::{ClaimKind, Payout, PayoutPeriod, PayoutRecipient, PayoutStatus};
use async_trait::async_trait;
use souk_core::CoreResult;
use std::collections::HashSet;
use uuid::Uuid;

/// Payout storage. Implementations enforce, atomically with the write:
/// - at most one PENDING/PROCESSING payout per recipient
/// - each line, return and order claimed by at most one payout that still
///   holds claims (anything but CANCELLED/FAILED)
///
/// Violations surface as `CoreError::Conflict`.
#[async_trait]
pub trait PayoutRepository: Send + Sync {
    async fn insert(&self, payout: &Payout) -> CoreResult<()>;

    async fn get(&self, id: Uuid) -> CoreResult<Option<Payout>>;

    async fn find_open(&self, recipient: PayoutRecipient) -> CoreResult<Option<Payout>>;

    /// Payouts for the recipient whose period matches exactly, any status
    async fn list_for_period(
        &self,
        recipient: PayoutRecipient,
        period: PayoutPeriod,
    ) -> CoreResult<Vec<Payout>>;

    async fn list_by_status(&self, status: PayoutStatus) -> CoreResult<Vec<Payout>>;

    /// The subset of `ids` currently claimed by a live payout
    async fn claimed_item_ids(&self, kind: ClaimKind, ids: &[Uuid]) -> CoreResult<HashSet<Uuid>>;

    /// Compare-and-set on status. Moving to CANCELLED or FAILED releases the
    /// payout's claims in the same write.
    async fn update_if_status(&self, payout: &Payout, expected: PayoutStatus) -> CoreResult<bool>;
}
