use crate::models::PayoutStatus;
use chrono::{DateTime, Utc};
use souk_core::CoreError;
use souk_shared::{Money, Rate};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum PayoutError {
    #[error("Invalid payout period: {start} is not before {end}")]
    InvalidPeriod {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("Payout not found: {0}")]
    NotFound(Uuid),

    #[error("Conflicting state: payout is {from}, cannot move to {to}")]
    InvalidTransition { from: PayoutStatus, to: PayoutStatus },

    #[error("Unknown payout status: {0}")]
    UnknownStatus(String),

    #[error("Payout would be negative: gross {gross} less deductions {deductions}")]
    NegativeNet { gross: Money, deductions: Money },

    #[error("Invalid fee rate: {0}")]
    InvalidFeeRate(Rate),

    #[error("Missing payment reference for payout {0}")]
    MissingReference(Uuid),

    #[error("Payment gateway failed for payout {payout_id}: {reason}")]
    Gateway {
        payout_id: Uuid,
        reason: String,
        /// false once the payout has been marked failed
        retryable: bool,
    },

    #[error(transparent)]
    Store(#[from] CoreError),
}
