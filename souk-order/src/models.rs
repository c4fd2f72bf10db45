use crate::delivery::DeliveryAssignment;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use souk_shared::{Money, Rate};
use std::fmt;
use uuid::Uuid;

/// Order status in the lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed)
                | (Pending, Cancelled)
                | (Confirmed, Processing)
                | (Confirmed, Cancelled)
                | (Processing, Shipped)
                | (Processing, Cancelled)
                | (Shipped, Delivered)
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Shipped => "SHIPPED",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

/// Input for capturing a line at order placement
#[derive(Debug, Clone)]
pub struct NewOrderLine {
    pub product_id: Uuid,
    pub product_name: String,
    pub supplier_id: Uuid,
    pub unit_price: Money,
    pub quantity: u32,
    pub warranty_expires_at: Option<DateTime<Utc>>,
}

/// Price, quantity and commission split of one line, frozen when the order is
/// placed. There are no setters; deserialized records are re-validated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "OrderLineRecord")]
pub struct OrderLineSnapshot {
    id: Uuid,
    order_id: Uuid,
    product_id: Uuid,
    product_name: String,
    supplier_id: Uuid,
    unit_price: Money,
    quantity: u32,
    line_total: Money,
    supplier_earnings: Money,
    platform_commission: Money,
    warranty_expires_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl OrderLineSnapshot {
    /// Split the line total between supplier and platform. The supplier share
    /// is rounded to the cent and the platform takes the remainder, so the two
    /// always add back to the line total.
    pub fn capture(
        order_id: Uuid,
        line: NewOrderLine,
        commission: Rate,
        created_at: DateTime<Utc>,
    ) -> Result<Self, OrderError> {
        if line.quantity == 0 {
            return Err(OrderError::InvalidQuantity(line.quantity));
        }
        if line.unit_price.is_negative() {
            return Err(OrderError::InvalidPrice(line.unit_price));
        }
        if !commission.is_valid_share() {
            return Err(OrderError::InvalidCommission(commission));
        }

        let line_total = line.unit_price.times(line.quantity);
        let supplier_earnings = line_total.apply(commission.complement());
        let platform_commission = line_total - supplier_earnings;

        Ok(Self {
            id: Uuid::new_v4(),
            order_id,
            product_id: line.product_id,
            product_name: line.product_name,
            supplier_id: line.supplier_id,
            unit_price: line.unit_price,
            quantity: line.quantity,
            line_total,
            supplier_earnings,
            platform_commission,
            warranty_expires_at: line.warranty_expires_at,
            created_at,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn order_id(&self) -> Uuid {
        self.order_id
    }

    pub fn product_id(&self) -> Uuid {
        self.product_id
    }

    pub fn product_name(&self) -> &str {
        &self.product_name
    }

    pub fn supplier_id(&self) -> Uuid {
        self.supplier_id
    }

    pub fn unit_price(&self) -> Money {
        self.unit_price
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    pub fn line_total(&self) -> Money {
        self.line_total
    }

    pub fn supplier_earnings(&self) -> Money {
        self.supplier_earnings
    }

    pub fn platform_commission(&self) -> Money {
        self.platform_commission
    }

    pub fn warranty_expires_at(&self) -> Option<DateTime<Utc>> {
        self.warranty_expires_at
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Price of `quantity` units of this line
    pub fn price_for(&self, quantity: u32) -> Money {
        self.unit_price.times(quantity)
    }

    pub fn warranty_active_at(&self, at: DateTime<Utc>) -> bool {
        self.warranty_expires_at.map_or(false, |expires| at <= expires)
    }
}

/// Wire shape of a snapshot, checked before it becomes an `OrderLineSnapshot`
#[derive(Debug, Deserialize)]
struct OrderLineRecord {
    id: Uuid,
    order_id: Uuid,
    product_id: Uuid,
    product_name: String,
    supplier_id: Uuid,
    unit_price: Money,
    quantity: u32,
    line_total: Money,
    supplier_earnings: Money,
    platform_commission: Money,
    warranty_expires_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<OrderLineRecord> for OrderLineSnapshot {
    type Error = OrderError;

    fn try_from(r: OrderLineRecord) -> Result<Self, Self::Error> {
        if r.quantity == 0 {
            return Err(OrderError::InvalidQuantity(r.quantity));
        }
        if r.line_total != r.unit_price.times(r.quantity) {
            return Err(OrderError::InconsistentSnapshot(format!(
                "line {} total {} is not {} x {}",
                r.id, r.line_total, r.unit_price, r.quantity
            )));
        }
        if r.supplier_earnings + r.platform_commission != r.line_total
            || r.supplier_earnings.is_negative()
            || r.platform_commission.is_negative()
        {
            return Err(OrderError::InconsistentSnapshot(format!(
                "line {} split {} + {} does not make {}",
                r.id, r.supplier_earnings, r.platform_commission, r.line_total
            )));
        }

        Ok(Self {
            id: r.id,
            order_id: r.order_id,
            product_id: r.product_id,
            product_name: r.product_name,
            supplier_id: r.supplier_id,
            unit_price: r.unit_price,
            quantity: r.quantity,
            line_total: r.line_total,
            supplier_earnings: r.supplier_earnings,
            platform_commission: r.platform_commission,
            warranty_expires_at: r.warranty_expires_at,
            created_at: r.created_at,
        })
    }
}

/// A customer's purchase, possibly spanning several suppliers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub lines: Vec<OrderLineSnapshot>,
    pub delivery: Option<DeliveryAssignment>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl Order {
    pub fn new(customer_id: Uuid, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            customer_id,
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            lines: Vec::new(),
            delivery: None,
            created_at,
            updated_at: created_at,
            delivered_at: None,
        }
    }

    /// Capture a line; only allowed before the order is confirmed
    pub fn add_line(
        &mut self,
        line: NewOrderLine,
        commission: Rate,
    ) -> Result<&OrderLineSnapshot, OrderError> {
        if self.status != OrderStatus::Pending {
            return Err(OrderError::NotModifiable(self.status));
        }

        let snapshot = OrderLineSnapshot::capture(self.id, line, commission, self.created_at)?;
        self.lines.push(snapshot);
        Ok(&self.lines[self.lines.len() - 1])
    }

    pub fn total(&self) -> Money {
        self.lines.iter().map(|l| l.line_total()).sum()
    }

    pub fn update_status(&mut self, next: OrderStatus, now: DateTime<Utc>) -> Result<(), OrderError> {
        if !self.status.can_transition_to(next) {
            return Err(OrderError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }

        self.status = next;
        if next == OrderStatus::Delivered {
            self.delivered_at = Some(now);
        }
        self.updated_at = now;
        Ok(())
    }

    pub fn set_payment_status(&mut self, status: PaymentStatus, now: DateTime<Utc>) {
        self.payment_status = status;
        self.updated_at = now;
    }

    /// Delivered and paid for: the only orders whose lines earn supplier payouts
    pub fn is_settled(&self) -> bool {
        self.status == OrderStatus::Delivered && self.payment_status == PaymentStatus::Completed
    }

    /// Find the line a return refers to: by explicit id, else by product,
    /// else the order's only line.
    pub fn resolve_line(
        &self,
        line_id: Option<Uuid>,
        product_id: Option<Uuid>,
    ) -> Result<&OrderLineSnapshot, OrderError> {
        if let Some(line_id) = line_id {
            return self
                .lines
                .iter()
                .find(|l| l.id() == line_id)
                .ok_or_else(|| OrderError::LineNotFound(format!("line {} on order {}", line_id, self.id)));
        }

        if let Some(product_id) = product_id {
            let mut matches = self.lines.iter().filter(|l| l.product_id() == product_id);
            if let Some(line) = matches.next() {
                if matches.next().is_some() {
                    return Err(OrderError::AmbiguousLine(product_id));
                }
                return Ok(line);
            }
        }

        match self.lines.as_slice() {
            [only] => Ok(only),
            _ => Err(OrderError::LineNotFound(format!("no matching line on order {}", self.id))),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(u32),

    #[error("Invalid unit price: {0}")]
    InvalidPrice(Money),

    #[error("Invalid commission rate: {0}")]
    InvalidCommission(Rate),

    #[error("Order not modifiable in status {0}")]
    NotModifiable(OrderStatus),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("Order line not found: {0}")]
    LineNotFound(String),

    #[error("Several lines match product {0}; an explicit line id is required")]
    AmbiguousLine(Uuid),

    #[error("Inconsistent line snapshot: {0}")]
    InconsistentSnapshot(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn line(price: Money, quantity: u32) -> NewOrderLine {
        NewOrderLine {
            product_id: Uuid::new_v4(),
            product_name: "Kikoi Beach Towel".to_string(),
            supplier_id: Uuid::new_v4(),
            unit_price: price,
            quantity,
            warranty_expires_at: None,
        }
    }

    fn commission() -> Rate {
        Rate::from_percent(dec!(25))
    }

    #[test]
    fn test_commission_split() {
        let snapshot =
            OrderLineSnapshot::capture(Uuid::new_v4(), line(Money::new(dec!(250)), 4), commission(), Utc::now())
                .unwrap();

        assert_eq!(snapshot.line_total(), Money::new(dec!(1000)));
        assert_eq!(snapshot.supplier_earnings(), Money::new(dec!(750)));
        assert_eq!(snapshot.platform_commission(), Money::new(dec!(250)));
    }

    #[test]
    fn test_split_remainder_goes_to_platform() {
        // 0.33 * 0.75 = 0.2475 -> supplier 0.25, platform 0.08
        let snapshot =
            OrderLineSnapshot::capture(Uuid::new_v4(), line(Money::new(dec!(0.11)), 3), commission(), Utc::now())
                .unwrap();

        assert_eq!(snapshot.supplier_earnings(), Money::new(dec!(0.25)));
        assert_eq!(snapshot.platform_commission(), Money::new(dec!(0.08)));
        assert_eq!(
            snapshot.supplier_earnings() + snapshot.platform_commission(),
            snapshot.line_total()
        );
    }

    #[test]
    fn test_zero_quantity_rejected() {
        let result =
            OrderLineSnapshot::capture(Uuid::new_v4(), line(Money::new(dec!(10)), 0), commission(), Utc::now());
        assert!(matches!(result, Err(OrderError::InvalidQuantity(0))));
    }

    #[test]
    fn test_tampered_snapshot_rejected_on_deserialize() {
        let snapshot =
            OrderLineSnapshot::capture(Uuid::new_v4(), line(Money::new(dec!(100)), 1), commission(), Utc::now())
                .unwrap();

        let mut json = serde_json::to_value(&snapshot).unwrap();
        let back: OrderLineSnapshot = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(back, snapshot);

        json["supplier_earnings"] = serde_json::json!("90.00");
        assert!(serde_json::from_value::<OrderLineSnapshot>(json).is_err());
    }

    #[test]
    fn test_order_lifecycle() {
        let now = Utc::now();
        let mut order = Order::new(Uuid::new_v4(), now);
        order.add_line(line(Money::new(dec!(40)), 2), commission()).unwrap();

        order.update_status(OrderStatus::Confirmed, now).unwrap();
        assert!(matches!(
            order.add_line(line(Money::new(dec!(5)), 1), commission()),
            Err(OrderError::NotModifiable(OrderStatus::Confirmed))
        ));

        order.update_status(OrderStatus::Processing, now).unwrap();
        order.update_status(OrderStatus::Shipped, now).unwrap();
        order.update_status(OrderStatus::Delivered, now).unwrap();
        assert_eq!(order.delivered_at, Some(now));

        order.set_payment_status(PaymentStatus::Completed, now);
        assert!(order.is_settled());
        assert_eq!(order.total(), Money::new(dec!(80)));
    }

    #[test]
    fn test_invalid_transition() {
        let mut order = Order::new(Uuid::new_v4(), Utc::now());
        let result = order.update_status(OrderStatus::Delivered, Utc::now());
        assert!(matches!(
            result,
            Err(OrderError::InvalidTransition {
                from: OrderStatus::Pending,
                to: OrderStatus::Delivered
            })
        ));
    }

    #[test]
    fn test_resolve_line() {
        let mut order = Order::new(Uuid::new_v4(), Utc::now());
        let first = order.add_line(line(Money::new(dec!(10)), 1), commission()).unwrap().clone();
        let second = order.add_line(line(Money::new(dec!(20)), 1), commission()).unwrap().clone();

        assert_eq!(order.resolve_line(Some(second.id()), None).unwrap().id(), second.id());
        assert_eq!(order.resolve_line(None, Some(first.product_id())).unwrap().id(), first.id());
        assert!(order.resolve_line(None, None).is_err());
        assert!(order.resolve_line(Some(Uuid::new_v4()), None).is_err());
    }

    #[test]
    fn test_resolve_sole_line_fallback() {
        let mut order = Order::new(Uuid::new_v4(), Utc::now());
        let only = order.add_line(line(Money::new(dec!(10)), 1), commission()).unwrap().clone();

        let resolved = order.resolve_line(None, Some(Uuid::new_v4())).unwrap();
        assert_eq!(resolved.id(), only.id());
    }
}
