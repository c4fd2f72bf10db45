use crate::error::ReturnError;
use crate::policy::{self, RefundAllocation, RefundError, RefundPolicy};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use souk_order::{Order, OrderLineSnapshot};
use souk_shared::Money;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReturnReason {
    Defective,
    WrongItem,
    NotAsDescribed,
    ChangedMind,
    SizeIssue,
    QualityIssue,
    Fraud,
    Other,
}

impl ReturnReason {
    /// Policy applied until an admin decides otherwise
    pub fn default_policy(&self) -> RefundPolicy {
        match self {
            ReturnReason::Defective
            | ReturnReason::WrongItem
            | ReturnReason::NotAsDescribed
            | ReturnReason::QualityIssue => RefundPolicy::SupplierFault,
            ReturnReason::ChangedMind | ReturnReason::SizeIssue | ReturnReason::Other => {
                RefundPolicy::CustomerChangedMind
            }
            ReturnReason::Fraud => RefundPolicy::Fraud,
        }
    }

    /// Whether goods returned for this reason go back on the shelf
    pub fn restockable(&self) -> bool {
        matches!(
            self,
            ReturnReason::WrongItem
                | ReturnReason::NotAsDescribed
                | ReturnReason::ChangedMind
                | ReturnReason::SizeIssue
                | ReturnReason::Other
        )
    }
}

/// Return lifecycle.
///
/// ```text
/// REQUESTED -> PENDING_REVIEW -> APPROVED -> ITEM_RECEIVED -> REFUND_PROCESSING -> REFUND_COMPLETED
///                   |  \-> REJECTED
///                   \-> SUPPLIER_REVIEW -> APPROVED | DISPUTED -> APPROVED | REJECTED
/// ```
/// Anything before REFUND_PROCESSING that is not terminal may be CANCELLED.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReturnStatus {
    Requested,
    PendingReview,
    SupplierReview,
    Disputed,
    Approved,
    Rejected,
    ItemReceived,
    RefundProcessing,
    RefundCompleted,
    Cancelled,
}

impl ReturnStatus {
    pub fn can_transition_to(&self, next: ReturnStatus) -> bool {
        use ReturnStatus::*;
        match self {
            Requested => matches!(next, PendingReview | Cancelled),
            PendingReview => matches!(next, Approved | Rejected | SupplierReview | Cancelled),
            SupplierReview => matches!(next, Approved | Disputed | Cancelled),
            Disputed => matches!(next, Approved | Rejected | Cancelled),
            Approved => matches!(next, ItemReceived | Cancelled),
            ItemReceived => matches!(next, RefundProcessing | Cancelled),
            RefundProcessing => matches!(next, RefundCompleted),
            Rejected | RefundCompleted | Cancelled => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReturnStatus::Rejected | ReturnStatus::RefundCompleted | ReturnStatus::Cancelled
        )
    }

    /// Rejected and cancelled returns no longer hold any of the line's quantity
    pub fn holds_quantity(&self) -> bool {
        !matches!(self, ReturnStatus::Rejected | ReturnStatus::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReturnStatus::Requested => "REQUESTED",
            ReturnStatus::PendingReview => "PENDING_REVIEW",
            ReturnStatus::SupplierReview => "SUPPLIER_REVIEW",
            ReturnStatus::Disputed => "DISPUTED",
            ReturnStatus::Approved => "APPROVED",
            ReturnStatus::Rejected => "REJECTED",
            ReturnStatus::ItemReceived => "ITEM_RECEIVED",
            ReturnStatus::RefundProcessing => "REFUND_PROCESSING",
            ReturnStatus::RefundCompleted => "REFUND_COMPLETED",
            ReturnStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for ReturnStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefundMethod {
    OriginalPayment,
    MobileMoney,
    StoreCredit,
}

impl RefundMethod {
    /// Money leaving through a payment rail must carry the rail's reference
    pub fn requires_reference(&self) -> bool {
        !matches!(self, RefundMethod::StoreCredit)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SupplierAction {
    Accept,
    Dispute,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewerRole {
    Admin,
    OrderManager,
    Supplier,
    Customer,
}

impl ReviewerRole {
    pub fn can_review(&self) -> bool {
        matches!(self, ReviewerRole::Admin | ReviewerRole::OrderManager)
    }
}

impl fmt::Display for ReviewerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReviewerRole::Admin => "ADMIN",
            ReviewerRole::OrderManager => "ORDER_MANAGER",
            ReviewerRole::Supplier => "SUPPLIER",
            ReviewerRole::Customer => "CUSTOMER",
        };
        f.write_str(s)
    }
}

/// The user acting on a return
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Reviewer {
    pub id: Uuid,
    pub role: ReviewerRole,
}

/// Customer input for a new return or warranty claim
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateReturn {
    pub order_id: Uuid,
    pub order_line_id: Option<Uuid>,
    pub product_id: Option<Uuid>,
    pub customer_id: Uuid,
    pub reason: ReturnReason,
    pub quantity: u32,
    pub is_warranty_claim: bool,
    pub description: Option<String>,
    #[serde(default)]
    pub evidence: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReturnRequest {
    pub id: Uuid,
    pub order_id: Uuid,
    pub order_line_id: Uuid,
    pub customer_id: Uuid,
    pub product_id: Uuid,
    pub supplier_id: Uuid,
    pub reason: ReturnReason,
    pub description: Option<String>,
    pub evidence: Vec<String>,
    pub quantity: u32,
    pub is_warranty_claim: bool,
    pub status: ReturnStatus,
    pub refund_policy: RefundPolicy,
    /// Line unit price times the returned quantity
    pub item_total: Money,
    /// `None` until a refund split exists (calculated or entered manually)
    pub allocation: Option<RefundAllocation>,
    pub refund_method: Option<RefundMethod>,
    pub refund_reference: Option<String>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub supplier_acknowledged: bool,
    pub supplier_action: Option<SupplierAction>,
    pub supplier_dispute_reason: Option<String>,
    pub reviewed_by: Option<Uuid>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub admin_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReturnRequest {
    pub fn new(order: &Order, line: &OrderLineSnapshot, input: CreateReturn, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id: order.id,
            order_line_id: line.id(),
            customer_id: input.customer_id,
            product_id: line.product_id(),
            supplier_id: line.supplier_id(),
            reason: input.reason,
            description: input.description,
            evidence: input.evidence,
            quantity: input.quantity,
            is_warranty_claim: input.is_warranty_claim,
            status: ReturnStatus::Requested,
            refund_policy: input.reason.default_policy(),
            item_total: line.price_for(input.quantity),
            allocation: None,
            refund_method: None,
            refund_reference: None,
            refunded_at: None,
            supplier_acknowledged: false,
            supplier_action: None,
            supplier_dispute_reason: None,
            reviewed_by: None,
            reviewed_at: None,
            rejection_reason: None,
            admin_notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Run the calculator for `policy`. A non-positive item total leaves the
    /// allocation empty for manual figures; any other calculator failure is
    /// returned and nothing changes.
    pub fn apply_policy(&mut self, policy: RefundPolicy) -> Result<(), RefundError> {
        let allocation = match policy::calculate(self.item_total, policy) {
            Ok(allocation) => Some(allocation),
            Err(RefundError::NonPositiveTotal(_)) => None,
            Err(e) => return Err(e),
        };
        self.refund_policy = policy;
        self.allocation = allocation;
        Ok(())
    }

    /// Accept admin-entered figures; only allowed when nothing was calculated
    pub fn apply_manual_allocation(&mut self, allocation: RefundAllocation) -> Result<(), ReturnError> {
        if self.allocation.is_some() {
            return Err(ReturnError::ManualAllocationNotAllowed(self.id));
        }
        allocation.verify_manual()?;
        self.allocation = Some(allocation);
        Ok(())
    }

    pub fn ensure_transition(&self, next: ReturnStatus) -> Result<(), ReturnError> {
        if self.status.can_transition_to(next) {
            Ok(())
        } else {
            Err(ReturnError::InvalidTransition {
                from: self.status,
                to: next,
            })
        }
    }

    pub fn transition(&mut self, next: ReturnStatus, now: DateTime<Utc>) -> Result<(), ReturnError> {
        self.ensure_transition(next)?;
        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    pub fn record_review(&mut self, reviewer_id: Uuid, notes: Option<String>, now: DateTime<Utc>) {
        self.reviewed_by = Some(reviewer_id);
        self.reviewed_at = Some(now);
        if let Some(notes) = notes.filter(|n| !n.trim().is_empty()) {
            self.append_note(&notes);
        }
    }

    pub fn append_note(&mut self, note: &str) {
        self.admin_notes = Some(match self.admin_notes.take() {
            Some(existing) => format!("{}\n{}", existing, note),
            None => note.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ReturnStatus::*;

    const ALL: [ReturnStatus; 10] = [
        Requested,
        PendingReview,
        SupplierReview,
        Disputed,
        Approved,
        Rejected,
        ItemReceived,
        RefundProcessing,
        RefundCompleted,
        Cancelled,
    ];

    #[test]
    fn test_terminal_states_are_final() {
        for from in [Rejected, RefundCompleted, Cancelled] {
            for to in ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn test_cancel_only_before_refund_processing() {
        for from in [Requested, PendingReview, SupplierReview, Disputed, Approved, ItemReceived] {
            assert!(from.can_transition_to(Cancelled), "{from}");
        }
        assert!(!RefundProcessing.can_transition_to(Cancelled));
    }

    #[test]
    fn test_happy_path_is_allowed() {
        let path = [Requested, PendingReview, Approved, ItemReceived, RefundProcessing, RefundCompleted];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_supplier_branch() {
        assert!(PendingReview.can_transition_to(SupplierReview));
        assert!(SupplierReview.can_transition_to(Disputed));
        assert!(SupplierReview.can_transition_to(Approved));
        assert!(!SupplierReview.can_transition_to(Rejected));
        assert!(Disputed.can_transition_to(Rejected));
    }

    #[test]
    fn test_default_policy_by_reason() {
        assert_eq!(ReturnReason::Defective.default_policy(), RefundPolicy::SupplierFault);
        assert_eq!(ReturnReason::SizeIssue.default_policy(), RefundPolicy::CustomerChangedMind);
        assert_eq!(ReturnReason::Fraud.default_policy(), RefundPolicy::Fraud);
        assert!(!ReturnReason::Defective.restockable());
        assert!(ReturnReason::ChangedMind.restockable());
    }

    #[test]
    fn test_unknown_status_rejected_on_deserialize() {
        let ok: ReturnStatus = serde_json::from_str("\"PENDING_REVIEW\"").unwrap();
        assert_eq!(ok, PendingReview);
        assert!(serde_json::from_str::<ReturnStatus>("\"pending\"").is_err());
    }
}
