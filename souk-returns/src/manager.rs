use crate::error::ReturnError;
use crate::models::{
    CreateReturn, RefundMethod, ReturnRequest, ReturnStatus, Reviewer, ReviewerRole, SupplierAction,
};
use crate::policy::{RefundAllocation, RefundPolicy};
use crate::repository::ReturnRepository;
use chrono::{DateTime, Duration, Utc};
use souk_core::events::publish_or_log;
use souk_core::{CoreError, EventSink};
use souk_order::{OrderRepository, OrderStatus};
use souk_shared::events::{RefundCompletedEvent, ReturnApprovedEvent, ReturnItemReceivedEvent};
use souk_shared::DomainEvent;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Rules for accepting returns
#[derive(Debug, Clone)]
pub struct ReturnRules {
    pub return_window: Duration,
}

impl Default for ReturnRules {
    fn default() -> Self {
        Self {
            return_window: Duration::days(14),
        }
    }
}

/// Admin decision on a return under review
#[derive(Debug, Clone)]
pub enum ReviewAction {
    Approve {
        refund_method: RefundMethod,
        /// Recalculate under a different policy before approving
        policy: Option<RefundPolicy>,
        /// Figures for returns whose item total could not be priced
        manual_allocation: Option<RefundAllocation>,
    },
    Reject {
        reason: String,
    },
    EscalateToSupplier,
}

#[derive(Debug, Clone)]
pub enum SupplierResponse {
    Accept,
    Dispute { reason: String },
}

/// Drives a return from request to refund. Every write is a compare-and-set
/// on the status read at the start of the call.
pub struct ReturnService {
    orders: Arc<dyn OrderRepository>,
    returns: Arc<dyn ReturnRepository>,
    events: Arc<dyn EventSink>,
    rules: ReturnRules,
}

impl ReturnService {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        returns: Arc<dyn ReturnRepository>,
        events: Arc<dyn EventSink>,
        rules: ReturnRules,
    ) -> Self {
        Self {
            orders,
            returns,
            events,
            rules,
        }
    }

    pub async fn get(&self, return_id: Uuid) -> Result<ReturnRequest, ReturnError> {
        self.returns
            .get(return_id)
            .await?
            .ok_or(ReturnError::NotFound(return_id))
    }

    /// Open a return (or warranty claim) against a delivered order
    pub async fn create(&self, input: CreateReturn, now: DateTime<Utc>) -> Result<ReturnRequest, ReturnError> {
        let order = self
            .orders
            .get_order(input.order_id)
            .await?
            .ok_or(ReturnError::OrderNotFound(input.order_id))?;

        if order.customer_id != input.customer_id {
            return Err(ReturnError::NotOrderOwner(order.id));
        }
        if order.status != OrderStatus::Delivered {
            return Err(ReturnError::OrderNotDelivered(order.status));
        }

        let line = order
            .resolve_line(input.order_line_id, input.product_id)
            .map_err(|e| ReturnError::UnresolvablePricing(e.to_string()))?;

        if input.is_warranty_claim {
            if !line.warranty_active_at(now) {
                return Err(ReturnError::WarrantyExpired);
            }
        } else {
            let delivered_at = order.delivered_at.unwrap_or(order.created_at);
            if now - delivered_at > self.rules.return_window {
                return Err(ReturnError::ReturnWindowExpired {
                    days: self.rules.return_window.num_days(),
                });
            }
        }

        let available = self.available_quantity(line.id(), line.quantity()).await?;
        if input.quantity == 0 || input.quantity > available {
            return Err(ReturnError::InvalidQuantity {
                requested: input.quantity,
                available,
            });
        }

        let mut request = ReturnRequest::new(&order, line, input, now);
        request.apply_policy(request.refund_policy)?;
        request.transition(ReturnStatus::PendingReview, now)?;

        match self.returns.insert(&request, line.quantity()).await {
            Ok(()) => {}
            Err(CoreError::Conflict(reason)) => {
                warn!("Return for line {} not stored: {}", request.order_line_id, reason);
                return Err(ReturnError::InvalidQuantity {
                    requested: request.quantity,
                    available: self.available_quantity(line.id(), line.quantity()).await?,
                });
            }
            Err(e) => return Err(e.into()),
        }
        info!(
            "Return {} opened for order {} ({} x {}, total {})",
            request.id, request.order_id, request.quantity, request.product_id, request.item_total
        );
        Ok(request)
    }

    pub async fn review(
        &self,
        return_id: Uuid,
        action: ReviewAction,
        reviewer: &Reviewer,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<ReturnRequest, ReturnError> {
        if !reviewer.role.can_review() {
            return Err(ReturnError::NotAuthorized {
                role: reviewer.role,
                action: "review returns",
            });
        }

        let mut request = self.get(return_id).await?;
        let expected = request.status;

        match action {
            ReviewAction::Approve {
                refund_method,
                policy,
                manual_allocation,
            } => {
                request.ensure_transition(ReturnStatus::Approved)?;
                if let Some(policy) = policy {
                    request.apply_policy(policy)?;
                }
                if let Some(manual) = manual_allocation {
                    request.apply_manual_allocation(manual)?;
                }
                if request.allocation.is_none() {
                    return Err(ReturnError::UnresolvablePricing(format!(
                        "item total {} cannot be priced; manual figures are required",
                        request.item_total
                    )));
                }

                request.refund_method = Some(refund_method);
                request.record_review(reviewer.id, notes, now);
                request.transition(ReturnStatus::Approved, now)?;
                self.save(&request, expected).await?;
                self.announce_approval(&request, now).await;
            }
            ReviewAction::Reject { reason } => {
                if reason.trim().is_empty() {
                    return Err(ReturnError::MissingField("rejection_reason"));
                }
                request.rejection_reason = Some(reason);
                request.record_review(reviewer.id, notes, now);
                request.transition(ReturnStatus::Rejected, now)?;
                self.save(&request, expected).await?;
                info!("Return {} rejected by {}", request.id, reviewer.id);
            }
            ReviewAction::EscalateToSupplier => {
                request.record_review(reviewer.id, notes, now);
                request.transition(ReturnStatus::SupplierReview, now)?;
                self.save(&request, expected).await?;
                info!("Return {} sent to supplier {}", request.id, request.supplier_id);
            }
        }

        Ok(request)
    }

    pub async fn supplier_respond(
        &self,
        return_id: Uuid,
        supplier_id: Uuid,
        response: SupplierResponse,
        now: DateTime<Utc>,
    ) -> Result<ReturnRequest, ReturnError> {
        let mut request = self.get(return_id).await?;
        if request.supplier_id != supplier_id {
            return Err(ReturnError::NotAuthorized {
                role: ReviewerRole::Supplier,
                action: "respond to another supplier's return",
            });
        }
        let expected = request.status;

        match response {
            SupplierResponse::Accept => {
                request.ensure_transition(ReturnStatus::Approved)?;
                if request.allocation.is_none() {
                    return Err(ReturnError::UnresolvablePricing(format!(
                        "item total {} cannot be priced; an admin must enter the figures",
                        request.item_total
                    )));
                }
                request.supplier_acknowledged = true;
                request.supplier_action = Some(SupplierAction::Accept);
                request.refund_method.get_or_insert(RefundMethod::OriginalPayment);
                request.transition(ReturnStatus::Approved, now)?;
                self.save(&request, expected).await?;
                self.announce_approval(&request, now).await;
            }
            SupplierResponse::Dispute { reason } => {
                if reason.trim().is_empty() {
                    return Err(ReturnError::MissingField("supplier_dispute_reason"));
                }
                request.supplier_acknowledged = true;
                request.supplier_action = Some(SupplierAction::Dispute);
                request.supplier_dispute_reason = Some(reason);
                request.transition(ReturnStatus::Disputed, now)?;
                self.save(&request, expected).await?;
                info!("Return {} disputed by supplier {}", request.id, supplier_id);
            }
        }

        Ok(request)
    }

    pub async fn mark_item_received(&self, return_id: Uuid, now: DateTime<Utc>) -> Result<ReturnRequest, ReturnError> {
        let mut request = self.get(return_id).await?;
        let expected = request.status;

        request.transition(ReturnStatus::ItemReceived, now)?;
        self.save(&request, expected).await?;

        let event = DomainEvent::ReturnItemReceived(ReturnItemReceivedEvent {
            return_id: request.id,
            product_id: request.product_id,
            quantity: request.quantity,
            restock: request.reason.restockable(),
            timestamp: now.timestamp(),
        });
        publish_or_log(self.events.as_ref(), event).await;
        Ok(request)
    }

    /// Hand the refund to the disbursement collaborator. The allocation is
    /// already persisted, so a crash after this point resumes from
    /// REFUND_PROCESSING.
    pub async fn begin_refund(&self, return_id: Uuid, now: DateTime<Utc>) -> Result<ReturnRequest, ReturnError> {
        let mut request = self.get(return_id).await?;
        let expected = request.status;

        if request.allocation.is_none() {
            return Err(ReturnError::UnresolvablePricing(format!(
                "return {} has no refund allocation",
                request.id
            )));
        }
        request.transition(ReturnStatus::RefundProcessing, now)?;
        self.save(&request, expected).await?;
        Ok(request)
    }

    /// Record the disbursement. Completing an already completed return
    /// returns it unchanged.
    pub async fn complete_refund(
        &self,
        return_id: Uuid,
        refund_reference: Option<String>,
        refunded_at: DateTime<Utc>,
    ) -> Result<ReturnRequest, ReturnError> {
        let mut request = self.get(return_id).await?;
        if request.status == ReturnStatus::RefundCompleted {
            return Ok(request);
        }
        request.ensure_transition(ReturnStatus::RefundCompleted)?;

        let refund_reference = refund_reference.filter(|r| !r.trim().is_empty());
        let requires_reference = request
            .refund_method
            .map_or(true, |method| method.requires_reference());
        if requires_reference && refund_reference.is_none() {
            return Err(ReturnError::MissingField("refund_reference"));
        }

        let expected = request.status;
        request.refund_reference = refund_reference;
        request.refunded_at = Some(refunded_at);
        request.transition(ReturnStatus::RefundCompleted, refunded_at)?;
        self.save(&request, expected).await?;

        let customer_refund = request
            .allocation
            .map(|a| a.customer_refund)
            .unwrap_or_default();
        info!("Refund of {} completed for return {}", customer_refund, request.id);

        let event = DomainEvent::RefundCompleted(RefundCompletedEvent {
            return_id: request.id,
            customer_id: request.customer_id,
            customer_refund,
            refund_reference: request.refund_reference.clone(),
            timestamp: refunded_at.timestamp(),
        });
        publish_or_log(self.events.as_ref(), event).await;
        Ok(request)
    }

    /// Withdraw a return. Customers may cancel their own; staff may cancel any.
    pub async fn cancel(
        &self,
        return_id: Uuid,
        actor: &Reviewer,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<ReturnRequest, ReturnError> {
        let mut request = self.get(return_id).await?;
        let allowed = actor.role.can_review()
            || (actor.role == ReviewerRole::Customer && actor.id == request.customer_id);
        if !allowed {
            return Err(ReturnError::NotAuthorized {
                role: actor.role,
                action: "cancel this return",
            });
        }

        let expected = request.status;
        request.transition(ReturnStatus::Cancelled, now)?;
        if let Some(reason) = reason.filter(|r| !r.trim().is_empty()) {
            request.append_note(&format!("Cancelled by {}: {}", actor.role, reason));
        }
        self.save(&request, expected).await?;
        info!("Return {} cancelled by {}", request.id, actor.id);
        Ok(request)
    }

    async fn available_quantity(&self, line_id: Uuid, line_quantity: u32) -> Result<u32, ReturnError> {
        let already_returned: u32 = self
            .returns
            .list_for_line(line_id)
            .await?
            .iter()
            .filter(|r| r.status.holds_quantity())
            .map(|r| r.quantity)
            .sum();
        Ok(line_quantity.saturating_sub(already_returned))
    }

    async fn save(&self, request: &ReturnRequest, expected: ReturnStatus) -> Result<(), ReturnError> {
        if self.returns.update_if_status(request, expected).await? {
            return Ok(());
        }

        let current = self.get(request.id).await?;
        Err(ReturnError::InvalidTransition {
            from: current.status,
            to: request.status,
        })
    }

    async fn announce_approval(&self, request: &ReturnRequest, now: DateTime<Utc>) {
        let Some(allocation) = request.allocation else {
            return;
        };
        info!(
            "Return {} approved: refund {}, supplier {}, platform {}",
            request.id, allocation.customer_refund, allocation.supplier_deduction, allocation.platform_deduction
        );

        let event = DomainEvent::ReturnApproved(ReturnApprovedEvent {
            return_id: request.id,
            order_id: request.order_id,
            customer_id: request.customer_id,
            supplier_id: request.supplier_id,
            customer_refund: allocation.customer_refund,
            restocking_fee: allocation.restocking_fee,
            supplier_deduction: allocation.supplier_deduction,
            platform_deduction: allocation.platform_deduction,
            timestamp: now.timestamp(),
        });
        publish_or_log(self.events.as_ref(), event).await;
    }
}
