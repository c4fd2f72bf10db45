use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use souk_shared::{Money, RecipientKind};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use uuid::Uuid;

/// A disbursement handed to the external payment rail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    /// The payout id; rails must treat repeats of the same key as one transfer
    pub idempotency_key: Uuid,
    pub recipient_kind: RecipientKind,
    pub recipient_id: Uuid,
    pub amount: Money,
    pub narration: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceipt {
    pub reference: String,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    #[error("Transfer rejected: {0}")]
    Rejected(String),
    #[error("Payment gateway unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait PayoutGateway: Send + Sync {
    /// Send money to a supplier or delivery partner
    async fn transfer(&self, request: &TransferRequest) -> Result<TransferReceipt, GatewayError>;

    /// Look up a transfer previously sent with this idempotency key
    async fn find_transfer(
        &self,
        idempotency_key: Uuid,
    ) -> Result<Option<TransferReceipt>, GatewayError>;
}

/// In-process gateway for tests and local runs.
///
/// Transfers to recipients registered with `fail_recipient` are rejected;
/// everything else succeeds once per idempotency key.
#[derive(Default)]
pub struct MockPayoutGateway {
    failing: Mutex<HashSet<Uuid>>,
    transfers: Mutex<HashMap<Uuid, TransferReceipt>>,
}

impl MockPayoutGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_recipient(&self, recipient_id: Uuid) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.insert(recipient_id);
        }
    }

    pub fn recover_recipient(&self, recipient_id: Uuid) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.remove(&recipient_id);
        }
    }

    pub fn transfer_count(&self) -> usize {
        self.transfers.lock().map(|t| t.len()).unwrap_or_default()
    }
}

#[async_trait]
impl PayoutGateway for MockPayoutGateway {
    async fn transfer(&self, request: &TransferRequest) -> Result<TransferReceipt, GatewayError> {
        let rejected = self
            .failing
            .lock()
            .map_err(|_| GatewayError::Unavailable("mock gateway lock poisoned".to_string()))?
            .contains(&request.recipient_id);
        if rejected {
            return Err(GatewayError::Rejected(format!(
                "recipient {} cannot receive funds",
                request.recipient_id
            )));
        }

        let mut transfers = self
            .transfers
            .lock()
            .map_err(|_| GatewayError::Unavailable("mock gateway lock poisoned".to_string()))?;
        let receipt = transfers
            .entry(request.idempotency_key)
            .or_insert_with(|| TransferReceipt {
                reference: format!("mock_tr_{}", request.idempotency_key.simple()),
                completed_at: Utc::now(),
            })
            .clone();
        Ok(receipt)
    }

    async fn find_transfer(
        &self,
        idempotency_key: Uuid,
    ) -> Result<Option<TransferReceipt>, GatewayError> {
        let transfers = self
            .transfers
            .lock()
            .map_err(|_| GatewayError::Unavailable("mock gateway lock poisoned".to_string()))?;
        Ok(transfers.get(&idempotency_key).cloned())
    }
}
