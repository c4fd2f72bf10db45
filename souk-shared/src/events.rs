use crate::money::Money;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who receives a payout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecipientKind {
    Supplier,
    DeliveryAgent,
    DeliveryCompany,
}

impl RecipientKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecipientKind::Supplier => "SUPPLIER",
            RecipientKind::DeliveryAgent => "DELIVERY_AGENT",
            RecipientKind::DeliveryCompany => "DELIVERY_COMPANY",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnApprovedEvent {
    pub return_id: Uuid,
    pub order_id: Uuid,
    pub customer_id: Uuid,
    pub supplier_id: Uuid,
    pub customer_refund: Money,
    pub restocking_fee: Money,
    pub supplier_deduction: Money,
    pub platform_deduction: Money,
    pub timestamp: i64,
}

/// Raised when the returned goods arrive; the inventory collaborator restores
/// stock when `restock` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnItemReceivedEvent {
    pub return_id: Uuid,
    pub product_id: Uuid,
    pub quantity: u32,
    pub restock: bool,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefundCompletedEvent {
    pub return_id: Uuid,
    pub customer_id: Uuid,
    pub customer_refund: Money,
    pub refund_reference: Option<String>,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoutCreatedEvent {
    pub payout_id: Uuid,
    pub recipient_kind: RecipientKind,
    pub recipient_id: Uuid,
    pub gross_amount: Money,
    pub net_amount: Money,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoutCompletedEvent {
    pub payout_id: Uuid,
    pub recipient_kind: RecipientKind,
    pub recipient_id: Uuid,
    pub net_amount: Money,
    pub payment_reference: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoutFailedEvent {
    pub payout_id: Uuid,
    pub recipient_kind: RecipientKind,
    pub recipient_id: Uuid,
    pub net_amount: Money,
    pub reason: String,
    pub attempts: u32,
    /// false once retries are exhausted and the payout is marked failed
    pub retryable: bool,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DomainEvent {
    ReturnApproved(ReturnApprovedEvent),
    ReturnItemReceived(ReturnItemReceivedEvent),
    RefundCompleted(RefundCompletedEvent),
    PayoutCreated(PayoutCreatedEvent),
    PayoutCompleted(PayoutCompletedEvent),
    PayoutFailed(PayoutFailedEvent),
}

impl DomainEvent {
    pub fn topic(&self) -> &'static str {
        match self {
            DomainEvent::ReturnApproved(_) => "returns.approved",
            DomainEvent::ReturnItemReceived(_) => "returns.item_received",
            DomainEvent::RefundCompleted(_) => "returns.refund_completed",
            DomainEvent::PayoutCreated(_) => "payouts.created",
            DomainEvent::PayoutCompleted(_) => "payouts.completed",
            DomainEvent::PayoutFailed(_) => "payouts.failed",
        }
    }

    /// Id of the return or payout the event is about
    pub fn entity_id(&self) -> Uuid {
        match self {
            DomainEvent::ReturnApproved(e) => e.return_id,
            DomainEvent::ReturnItemReceived(e) => e.return_id,
            DomainEvent::RefundCompleted(e) => e.return_id,
            DomainEvent::PayoutCreated(e) => e.payout_id,
            DomainEvent::PayoutCompleted(e) => e.payout_id,
            DomainEvent::PayoutFailed(e) => e.payout_id,
        }
    }
}
