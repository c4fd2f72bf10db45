use async_trait::async_trait;
use chrono::{DateTime, Utc};
use souk_core::{CoreError, CoreResult};
use souk_order::{Order, OrderRepository};
use souk_payout::{ClaimKind, Payout, PayoutPeriod, PayoutRecipient, PayoutRepository, PayoutStatus};
use souk_returns::{ReturnRepository, ReturnRequest, ReturnStatus};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct State {
    orders: HashMap<Uuid, Order>,
    returns: HashMap<Uuid, ReturnRequest>,
    payouts: HashMap<Uuid, Payout>,
    /// item -> payout holding it
    claims: HashMap<(ClaimKind, Uuid), Uuid>,
}

/// In-memory backing for every repository. Each call takes the lock once, so
/// the uniqueness checks and the write they guard happen together.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn sorted_by_creation(mut payouts: Vec<Payout>) -> Vec<Payout> {
    payouts.sort_by_key(|p| (p.created_at, p.id));
    payouts
}

#[async_trait]
impl OrderRepository for MemoryStore {
    async fn save_order(&self, order: &Order) -> CoreResult<()> {
        let mut state = self.state.write().await;
        state.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn get_order(&self, id: Uuid) -> CoreResult<Option<Order>> {
        Ok(self.state.read().await.orders.get(&id).cloned())
    }

    async fn list_orders_until(&self, end: DateTime<Utc>) -> CoreResult<Vec<Order>> {
        let state = self.state.read().await;
        let mut orders: Vec<Order> = state
            .orders
            .values()
            .filter(|o| o.created_at <= end)
            .cloned()
            .collect();
        orders.sort_by_key(|o| (o.created_at, o.id));
        Ok(orders)
    }

    async fn list_unpaid_deliveries(&self) -> CoreResult<Vec<Order>> {
        let state = self.state.read().await;
        Ok(state
            .orders
            .values()
            .filter(|o| o.delivery.as_ref().map_or(false, |d| !d.fee_paid))
            .cloned()
            .collect())
    }

    async fn mark_delivery_fees_paid(&self, order_ids: &[Uuid]) -> CoreResult<()> {
        let mut state = self.state.write().await;
        if let Some(missing) = order_ids.iter().find(|id| {
            state
                .orders
                .get(*id)
                .map_or(true, |o| o.delivery.is_none())
        }) {
            return Err(CoreError::NotFound(format!("delivery for order {}", missing)));
        }

        for id in order_ids {
            if let Some(delivery) = state.orders.get_mut(id).and_then(|o| o.delivery.as_mut()) {
                delivery.fee_paid = true;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ReturnRepository for MemoryStore {
    async fn insert(&self, request: &ReturnRequest, line_quantity: u32) -> CoreResult<()> {
        let mut state = self.state.write().await;
        if state.returns.contains_key(&request.id) {
            return Err(CoreError::Conflict(format!("return {} already exists", request.id)));
        }
        let held: u32 = state
            .returns
            .values()
            .filter(|r| r.order_line_id == request.order_line_id && r.status.holds_quantity())
            .map(|r| r.quantity)
            .sum();
        if held + request.quantity > line_quantity {
            return Err(CoreError::Conflict(format!(
                "line {} has {} of {} already under return",
                request.order_line_id, held, line_quantity
            )));
        }
        state.returns.insert(request.id, request.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> CoreResult<Option<ReturnRequest>> {
        Ok(self.state.read().await.returns.get(&id).cloned())
    }

    async fn update_if_status(
        &self,
        request: &ReturnRequest,
        expected: ReturnStatus,
    ) -> CoreResult<bool> {
        let mut state = self.state.write().await;
        let stored = state
            .returns
            .get_mut(&request.id)
            .ok_or_else(|| CoreError::NotFound(format!("return {}", request.id)))?;

        if stored.status != expected {
            return Ok(false);
        }
        *stored = request.clone();
        Ok(true)
    }

    async fn list_for_line(&self, order_line_id: Uuid) -> CoreResult<Vec<ReturnRequest>> {
        let state = self.state.read().await;
        Ok(state
            .returns
            .values()
            .filter(|r| r.order_line_id == order_line_id)
            .cloned()
            .collect())
    }

    async fn list_refunded_until(&self, end: DateTime<Utc>) -> CoreResult<Vec<ReturnRequest>> {
        let state = self.state.read().await;
        Ok(state
            .returns
            .values()
            .filter(|r| r.status == ReturnStatus::RefundCompleted)
            .filter(|r| r.refunded_at.map_or(false, |at| at <= end))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl PayoutRepository for MemoryStore {
    async fn insert(&self, payout: &Payout) -> CoreResult<()> {
        let mut state = self.state.write().await;

        if state.payouts.contains_key(&payout.id) {
            return Err(CoreError::Conflict(format!("payout {} already exists", payout.id)));
        }
        if payout.status.is_open()
            && state
                .payouts
                .values()
                .any(|p| p.recipient == payout.recipient && p.status.is_open())
        {
            return Err(CoreError::Conflict(format!(
                "open payout already exists for {}",
                payout.recipient
            )));
        }

        let claims = if payout.status.holds_claims() {
            payout.claims()
        } else {
            Vec::new()
        };
        if let Some((kind, id)) = claims.iter().find(|claim| state.claims.contains_key(*claim)) {
            return Err(CoreError::Conflict(format!(
                "{} {} already belongs to a payout",
                kind.as_str(),
                id
            )));
        }

        for claim in claims {
            state.claims.insert(claim, payout.id);
        }
        state.payouts.insert(payout.id, payout.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> CoreResult<Option<Payout>> {
        Ok(self.state.read().await.payouts.get(&id).cloned())
    }

    async fn find_open(&self, recipient: PayoutRecipient) -> CoreResult<Option<Payout>> {
        let state = self.state.read().await;
        Ok(state
            .payouts
            .values()
            .find(|p| p.recipient == recipient && p.status.is_open())
            .cloned())
    }

    async fn list_for_period(
        &self,
        recipient: PayoutRecipient,
        period: PayoutPeriod,
    ) -> CoreResult<Vec<Payout>> {
        let state = self.state.read().await;
        let payouts = state
            .payouts
            .values()
            .filter(|p| {
                p.recipient == recipient && p.period_start == period.start && p.period_end == period.end
            })
            .cloned()
            .collect();
        Ok(sorted_by_creation(payouts))
    }

    async fn list_by_status(&self, status: PayoutStatus) -> CoreResult<Vec<Payout>> {
        let state = self.state.read().await;
        let payouts = state
            .payouts
            .values()
            .filter(|p| p.status == status)
            .cloned()
            .collect();
        Ok(sorted_by_creation(payouts))
    }

    async fn claimed_item_ids(&self, kind: ClaimKind, ids: &[Uuid]) -> CoreResult<HashSet<Uuid>> {
        let state = self.state.read().await;
        Ok(ids
            .iter()
            .filter(|id| state.claims.contains_key(&(kind, **id)))
            .copied()
            .collect())
    }

    async fn update_if_status(&self, payout: &Payout, expected: PayoutStatus) -> CoreResult<bool> {
        let mut state = self.state.write().await;
        let stored_status = state
            .payouts
            .get(&payout.id)
            .map(|p| p.status)
            .ok_or_else(|| CoreError::NotFound(format!("payout {}", payout.id)))?;

        if stored_status != expected {
            return Ok(false);
        }
        if !payout.status.holds_claims() {
            state.claims.retain(|_, holder| *holder != payout.id);
        }
        state.payouts.insert(payout.id, payout.clone());
        Ok(true)
    }
}
