use crate::models::{ReturnStatus, ReviewerRole};
use crate::policy::RefundError;
use souk_core::CoreError;
use souk_order::OrderStatus;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum ReturnError {
    #[error("Order not found: {0}")]
    OrderNotFound(Uuid),

    #[error("Return not found: {0}")]
    NotFound(Uuid),

    #[error("Order {0} does not belong to this customer")]
    NotOrderOwner(Uuid),

    #[error("Order is not delivered (status {0})")]
    OrderNotDelivered(OrderStatus),

    #[error("Return window expired: returns are accepted within {days} days of delivery")]
    ReturnWindowExpired { days: i64 },

    #[error("Warranty expired for this item")]
    WarrantyExpired,

    #[error("Invalid quantity {requested}: between 1 and {available} may be returned")]
    InvalidQuantity { requested: u32, available: u32 },

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("{role} may not {action}")]
    NotAuthorized {
        role: ReviewerRole,
        action: &'static str,
    },

    #[error("Conflicting state: return is {from}, cannot move to {to}")]
    InvalidTransition { from: ReturnStatus, to: ReturnStatus },

    #[error("Unresolvable pricing: {0}")]
    UnresolvablePricing(String),

    #[error("Return {0} already has a calculated allocation")]
    ManualAllocationNotAllowed(Uuid),

    #[error(transparent)]
    Refund(#[from] RefundError),

    #[error(transparent)]
    Store(#[from] CoreError),
}

impl ReturnError {
    /// Problems with the request itself, reported back to the caller as-is
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ReturnError::NotOrderOwner(_)
                | ReturnError::OrderNotDelivered(_)
                | ReturnError::ReturnWindowExpired { .. }
                | ReturnError::WarrantyExpired
                | ReturnError::InvalidQuantity { .. }
                | ReturnError::MissingField(_)
        )
    }
}
