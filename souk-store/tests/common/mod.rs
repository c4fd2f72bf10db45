#![allow(dead_code)]

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use souk_core::payment::MockPayoutGateway;
use souk_order::{DeliveryAssignment, NewOrderLine, Order, OrderRepository, OrderStatus, PaymentStatus};
use souk_payout::{PayoutAggregator, PayoutRepository, SettlementProcessor};
use souk_returns::{ReturnRepository, ReturnService};
use souk_store::{BroadcastEventSink, BusinessRules, MemoryStore};
use souk_shared::Money;
use std::sync::Arc;
use uuid::Uuid;

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub events: Arc<BroadcastEventSink>,
    pub gateway: Arc<MockPayoutGateway>,
    pub rules: BusinessRules,
    pub returns: ReturnService,
    pub aggregator: PayoutAggregator,
    pub settlement: SettlementProcessor,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_rules(BusinessRules::default())
    }

    pub fn with_rules(rules: BusinessRules) -> Self {
        let store = Arc::new(MemoryStore::new());
        let events = Arc::new(BroadcastEventSink::new(64));
        let gateway = Arc::new(MockPayoutGateway::new());

        let orders: Arc<dyn OrderRepository> = store.clone();
        let return_repo: Arc<dyn ReturnRepository> = store.clone();
        let payouts: Arc<dyn PayoutRepository> = store.clone();

        let returns = ReturnService::new(orders.clone(), return_repo.clone(), events.clone(), rules.return_rules());
        let aggregator = PayoutAggregator::new(
            orders.clone(),
            return_repo,
            payouts.clone(),
            events.clone(),
            rules.payout_rules(),
        );
        let settlement = SettlementProcessor::new(
            payouts,
            orders,
            gateway.clone(),
            events.clone(),
            rules.settlement_rules(),
        );

        Self {
            store,
            events,
            gateway,
            rules,
            returns,
            aggregator,
            settlement,
        }
    }

    /// Place, pay and deliver a single-line order
    pub async fn delivered_order(
        &self,
        customer_id: Uuid,
        supplier_id: Uuid,
        unit_price: Decimal,
        quantity: u32,
        created_at: DateTime<Utc>,
        delivered_at: DateTime<Utc>,
    ) -> Order {
        let mut order = Order::new(customer_id, created_at);
        order
            .add_line(line(supplier_id, unit_price, quantity), self.rules.commission_rate())
            .unwrap();
        advance_to_delivered(&mut order, created_at, delivered_at);
        order.set_payment_status(PaymentStatus::Completed, created_at);
        self.store.save_order(&order).await.unwrap();
        order
    }

    /// A paid order carried by `delivery`, confirmed by the agent at `confirmed_at`
    pub async fn delivered_by(
        &self,
        mut delivery: DeliveryAssignment,
        created_at: DateTime<Utc>,
        confirmed_at: DateTime<Utc>,
    ) -> Order {
        let mut order = Order::new(Uuid::new_v4(), created_at);
        order
            .add_line(
                line(Uuid::new_v4(), Decimal::from(200), 1),
                self.rules.commission_rate(),
            )
            .unwrap();
        advance_to_delivered(&mut order, created_at, confirmed_at);
        order.set_payment_status(PaymentStatus::Completed, created_at);
        delivery.confirm_by_agent(confirmed_at);
        order.delivery = Some(delivery);
        self.store.save_order(&order).await.unwrap();
        order
    }
}

pub fn line(supplier_id: Uuid, unit_price: Decimal, quantity: u32) -> NewOrderLine {
    NewOrderLine {
        product_id: Uuid::new_v4(),
        product_name: "Kente scarf".to_string(),
        supplier_id,
        unit_price: Money::new(unit_price),
        quantity,
        warranty_expires_at: None,
    }
}

pub fn advance_to_delivered(order: &mut Order, created_at: DateTime<Utc>, delivered_at: DateTime<Utc>) {
    order.update_status(OrderStatus::Confirmed, created_at).unwrap();
    order.update_status(OrderStatus::Processing, created_at).unwrap();
    order
        .update_status(OrderStatus::Shipped, created_at + Duration::hours(1))
        .unwrap();
    order.update_status(OrderStatus::Delivered, delivered_at).unwrap();
}
