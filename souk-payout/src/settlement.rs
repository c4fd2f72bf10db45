use crate::error::PayoutError;
use crate::models::{Payout, PayoutDetail, PayoutStatus};
use crate::repository::PayoutRepository;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use souk_core::events::publish_or_log;
use souk_core::{EventSink, PayoutGateway, TransferRequest};
use souk_order::OrderRepository;
use souk_shared::events::{PayoutCompletedEvent, PayoutFailedEvent};
use souk_shared::DomainEvent;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// What happened to a payout on the way to the payment rail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SettlementOutcome {
    Initiate,
    Succeeded {
        payment_reference: String,
        paid_at: DateTime<Utc>,
    },
    Failed {
        reason: String,
    },
    Cancel {
        reason: Option<String>,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct SettlementRules {
    /// Failed transfers before a payout is given up on
    pub max_attempts: u32,
    /// How long a payout may sit in PROCESSING before reconciliation
    pub stale_after: Duration,
}

impl Default for SettlementRules {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            stale_after: Duration::minutes(30),
        }
    }
}

impl Payout {
    pub fn ensure_transition(&self, next: PayoutStatus) -> Result<(), PayoutError> {
        if !self.status.can_transition_to(next) {
            return Err(PayoutError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        Ok(())
    }

    fn transition(&mut self, next: PayoutStatus, now: DateTime<Utc>) -> Result<(), PayoutError> {
        self.ensure_transition(next)?;
        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    pub fn begin_processing(&mut self, now: DateTime<Utc>) -> Result<(), PayoutError> {
        self.transition(PayoutStatus::Processing, now)?;
        self.processing_started_at = Some(now);
        Ok(())
    }

    pub fn complete(
        &mut self,
        payment_reference: String,
        paid_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), PayoutError> {
        if payment_reference.trim().is_empty() {
            return Err(PayoutError::MissingReference(self.id));
        }
        self.transition(PayoutStatus::Completed, now)?;
        self.payment_reference = Some(payment_reference);
        self.paid_at = Some(paid_at);
        self.processing_started_at = None;
        Ok(())
    }

    /// Count a failed attempt. Back to PENDING while attempts remain, FAILED
    /// after the last one.
    pub fn record_failure(
        &mut self,
        reason: &str,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> Result<PayoutStatus, PayoutError> {
        let next = if self.attempts + 1 >= max_attempts {
            PayoutStatus::Failed
        } else {
            PayoutStatus::Pending
        };
        self.transition(next, now)?;
        self.attempts += 1;
        self.processing_started_at = None;
        self.append_note(&format!("attempt {} failed: {}", self.attempts, reason));
        Ok(next)
    }

    pub fn cancel(&mut self, reason: Option<&str>, now: DateTime<Utc>) -> Result<(), PayoutError> {
        self.transition(PayoutStatus::Cancelled, now)?;
        if let Some(reason) = reason {
            self.append_note(&format!("cancelled: {}", reason));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettlementReport {
    pub completed: Vec<Uuid>,
    /// Failed this round, back to PENDING for another try
    pub retrying: Vec<Uuid>,
    /// Retries exhausted
    pub failed: Vec<Uuid>,
    /// Payouts left untouched because of a store or state error
    pub errors: Vec<(Uuid, String)>,
}

impl SettlementReport {
    fn record(&mut self, payout_id: Uuid, result: Result<Payout, PayoutError>) {
        match result {
            Ok(payout) => match payout.status {
                PayoutStatus::Completed => self.completed.push(payout_id),
                PayoutStatus::Pending => self.retrying.push(payout_id),
                PayoutStatus::Failed => self.failed.push(payout_id),
                other => self
                    .errors
                    .push((payout_id, format!("unexpected status {}", other))),
            },
            Err(PayoutError::Gateway { retryable: true, .. }) => self.retrying.push(payout_id),
            Err(PayoutError::Gateway { retryable: false, .. }) => self.failed.push(payout_id),
            Err(e) => self.errors.push((payout_id, e.to_string())),
        }
    }
}

/// Drives payouts through the payment rail
pub struct SettlementProcessor {
    payouts: Arc<dyn PayoutRepository>,
    orders: Arc<dyn OrderRepository>,
    gateway: Arc<dyn PayoutGateway>,
    events: Arc<dyn EventSink>,
    rules: SettlementRules,
}

impl SettlementProcessor {
    pub fn new(
        payouts: Arc<dyn PayoutRepository>,
        orders: Arc<dyn OrderRepository>,
        gateway: Arc<dyn PayoutGateway>,
        events: Arc<dyn EventSink>,
        rules: SettlementRules,
    ) -> Self {
        Self {
            payouts,
            orders,
            gateway,
            events,
            rules,
        }
    }

    /// Apply one outcome to a payout and persist it with compare-and-set.
    pub async fn advance(
        &self,
        payout_id: Uuid,
        outcome: SettlementOutcome,
        now: DateTime<Utc>,
    ) -> Result<Payout, PayoutError> {
        let mut payout = self
            .payouts
            .get(payout_id)
            .await?
            .ok_or(PayoutError::NotFound(payout_id))?;

        if let SettlementOutcome::Succeeded {
            payment_reference, ..
        } = &outcome
        {
            if payout.status == PayoutStatus::Completed
                && payout.payment_reference.as_deref() == Some(payment_reference.as_str())
            {
                return Ok(payout);
            }
        }

        let expected = payout.status;
        let event = match outcome {
            SettlementOutcome::Initiate => {
                payout.begin_processing(now)?;
                None
            }
            SettlementOutcome::Succeeded {
                payment_reference,
                paid_at,
            } => {
                payout.complete(payment_reference.clone(), paid_at, now)?;
                Some(DomainEvent::PayoutCompleted(PayoutCompletedEvent {
                    payout_id,
                    recipient_kind: payout.recipient.kind,
                    recipient_id: payout.recipient.id,
                    net_amount: payout.net_amount,
                    payment_reference,
                    timestamp: now.timestamp(),
                }))
            }
            SettlementOutcome::Failed { reason } => {
                let next = payout.record_failure(&reason, self.rules.max_attempts, now)?;
                Some(DomainEvent::PayoutFailed(PayoutFailedEvent {
                    payout_id,
                    recipient_kind: payout.recipient.kind,
                    recipient_id: payout.recipient.id,
                    net_amount: payout.net_amount,
                    reason,
                    attempts: payout.attempts,
                    retryable: next == PayoutStatus::Pending,
                    timestamp: now.timestamp(),
                }))
            }
            SettlementOutcome::Cancel { reason } => {
                payout.cancel(reason.as_deref(), now)?;
                None
            }
        };

        if !self.payouts.update_if_status(&payout, expected).await? {
            let current = self
                .payouts
                .get(payout_id)
                .await?
                .map(|p| p.status)
                .unwrap_or(expected);
            return Err(PayoutError::InvalidTransition {
                from: current,
                to: payout.status,
            });
        }
        info!("Payout {} moved {} -> {}", payout_id, expected, payout.status);

        if payout.status == PayoutStatus::Completed {
            self.mark_fees_paid(&payout).await;
        }
        if let Some(event) = event {
            publish_or_log(self.events.as_ref(), event).await;
        }

        Ok(payout)
    }

    /// Send one pending payout. The payout id is the idempotency key, so a
    /// retry after a crash never pays twice.
    pub async fn settle(&self, payout_id: Uuid, now: DateTime<Utc>) -> Result<Payout, PayoutError> {
        let payout = self.advance(payout_id, SettlementOutcome::Initiate, now).await?;

        let request = TransferRequest {
            idempotency_key: payout.id,
            recipient_kind: payout.recipient.kind,
            recipient_id: payout.recipient.id,
            amount: payout.net_amount,
            narration: payout.narration(),
        };

        match self.gateway.transfer(&request).await {
            Ok(receipt) => {
                self.advance(
                    payout_id,
                    SettlementOutcome::Succeeded {
                        payment_reference: receipt.reference,
                        paid_at: receipt.completed_at,
                    },
                    now,
                )
                .await
            }
            Err(e) => {
                let reason = e.to_string();
                warn!("Transfer for payout {} failed: {}", payout_id, reason);
                let failed = self
                    .advance(payout_id, SettlementOutcome::Failed { reason: reason.clone() }, now)
                    .await?;
                Err(PayoutError::Gateway {
                    payout_id,
                    reason,
                    retryable: failed.status == PayoutStatus::Pending,
                })
            }
        }
    }

    /// Settle every pending payout. One payout failing does not stop the rest.
    pub async fn settle_pending(&self, now: DateTime<Utc>) -> Result<SettlementReport, PayoutError> {
        let pending = self.payouts.list_by_status(PayoutStatus::Pending).await?;
        let mut report = SettlementReport::default();

        for payout in pending {
            let result = self.settle(payout.id, now).await;
            report.record(payout.id, result);
        }

        info!(
            "Settlement run: {} completed, {} retrying, {} failed, {} errors",
            report.completed.len(),
            report.retrying.len(),
            report.failed.len(),
            report.errors.len()
        );
        Ok(report)
    }

    /// Resolve payouts stuck in PROCESSING, e.g. after a crash between the
    /// transfer and the write that records it.
    pub async fn reconcile_stalled(&self, now: DateTime<Utc>) -> Result<SettlementReport, PayoutError> {
        let stalled = self
            .payouts
            .list_by_status(PayoutStatus::Processing)
            .await?
            .into_iter()
            .filter(|p| {
                p.processing_started_at
                    .map_or(true, |started| started + self.rules.stale_after <= now)
            });

        let mut report = SettlementReport::default();
        for payout in stalled {
            let outcome = match self.gateway.find_transfer(payout.id).await {
                Ok(Some(receipt)) => SettlementOutcome::Succeeded {
                    payment_reference: receipt.reference,
                    paid_at: receipt.completed_at,
                },
                Ok(None) => SettlementOutcome::Failed {
                    reason: "no transfer found for stalled payout".to_string(),
                },
                Err(e) => {
                    warn!("Could not look up transfer for payout {}: {}", payout.id, e);
                    report.errors.push((payout.id, e.to_string()));
                    continue;
                }
            };
            let result = self.advance(payout.id, outcome, now).await;
            report.record(payout.id, result);
        }
        Ok(report)
    }

    async fn mark_fees_paid(&self, payout: &Payout) {
        let PayoutDetail::Delivery(delivery) = &payout.detail else {
            return;
        };
        let order_ids: Vec<Uuid> = delivery.order_ids.iter().copied().collect();
        if let Err(e) = self.orders.mark_delivery_fees_paid(&order_ids).await {
            error!(
                "Payout {} completed but delivery fees for {} orders were not marked paid: {}",
                payout.id,
                order_ids.len(),
                e
            );
        }
    }
}
