pub mod events;
pub mod payment;

pub use events::EventSink;
pub use payment::{GatewayError, PayoutGateway, TransferReceipt, TransferRequest};

/// Failures raised by repositories and other collaborators.
///
/// `Conflict` is reserved for uniqueness violations (an open payout already
/// exists, a line is already claimed) so callers can tell a lost race from a
/// broken backend.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Internal service error: {0}")]
    InternalError(String),
}

impl CoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, CoreError::Conflict(_))
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
