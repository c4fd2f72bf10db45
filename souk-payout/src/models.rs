use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use souk_order::DeliveryPayoutType;
use souk_shared::{Money, Rate, RecipientKind};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::PayoutError;

/// Payout lifecycle.
///
/// PENDING -> PROCESSING -> COMPLETED; a failed transfer sends PROCESSING back
/// to PENDING, or to FAILED once retries run out. Only PENDING may be
/// cancelled.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PayoutStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl PayoutStatus {
    pub fn can_transition_to(&self, next: PayoutStatus) -> bool {
        use PayoutStatus::*;
        match self {
            Pending => matches!(next, Processing | Cancelled),
            Processing => matches!(next, Completed | Pending | Failed),
            Completed | Failed | Cancelled => false,
        }
    }

    /// At most one open payout per recipient
    pub fn is_open(&self) -> bool {
        matches!(self, PayoutStatus::Pending | PayoutStatus::Processing)
    }

    /// Cancelled and failed payouts give their lines and orders back
    pub fn holds_claims(&self) -> bool {
        !matches!(self, PayoutStatus::Cancelled | PayoutStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PayoutStatus::Pending => "PENDING",
            PayoutStatus::Processing => "PROCESSING",
            PayoutStatus::Completed => "COMPLETED",
            PayoutStatus::Failed => "FAILED",
            PayoutStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for PayoutStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PayoutStatus {
    type Err = PayoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(PayoutStatus::Pending),
            "PROCESSING" => Ok(PayoutStatus::Processing),
            "COMPLETED" => Ok(PayoutStatus::Completed),
            "FAILED" => Ok(PayoutStatus::Failed),
            "CANCELLED" => Ok(PayoutStatus::Cancelled),
            other => Err(PayoutError::UnknownStatus(other.to_string())),
        }
    }
}

/// Which payouts a generation run produces
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecipientType {
    Supplier,
    Delivery,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PayoutRecipient {
    pub kind: RecipientKind,
    pub id: Uuid,
}

impl PayoutRecipient {
    pub fn supplier(id: Uuid) -> Self {
        Self {
            kind: RecipientKind::Supplier,
            id,
        }
    }

    pub fn delivery(payout_type: DeliveryPayoutType, id: Uuid) -> Self {
        let kind = match payout_type {
            DeliveryPayoutType::Agent => RecipientKind::DeliveryAgent,
            DeliveryPayoutType::Company => RecipientKind::DeliveryCompany,
        };
        Self { kind, id }
    }
}

impl fmt::Display for PayoutRecipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind.as_str(), self.id)
    }
}

/// Inclusive settlement window
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PayoutPeriod {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl PayoutPeriod {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, PayoutError> {
        if start >= end {
            return Err(PayoutError::InvalidPeriod { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at <= self.end
    }
}

/// Kinds of items a payout can hold exclusively
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClaimKind {
    OrderLine,
    Return,
    Order,
}

impl ClaimKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimKind::OrderLine => "ORDER_LINE",
            ClaimKind::Return => "RETURN",
            ClaimKind::Order => "ORDER",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SupplierPayout {
    pub line_ids: BTreeSet<Uuid>,
    /// Refunded returns whose supplier deduction is taken from this payout
    pub return_ids: BTreeSet<Uuid>,
    pub return_deductions: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeliveryPayout {
    pub payout_type: DeliveryPayoutType,
    pub order_ids: BTreeSet<Uuid>,
    pub platform_fee: Money,
    /// Share of the delivery fees that goes to the recipient
    pub fee_rate: Rate,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PayoutDetail {
    Supplier(SupplierPayout),
    Delivery(DeliveryPayout),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Payout {
    pub id: Uuid,
    pub recipient: PayoutRecipient,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub gross_amount: Money,
    pub net_amount: Money,
    pub detail: PayoutDetail,
    pub status: PayoutStatus,
    pub payment_reference: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub attempts: u32,
    pub notes: Option<String>,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payout {
    /// `net = gross - return deductions`, refused when negative
    pub fn supplier(
        supplier_id: Uuid,
        period: PayoutPeriod,
        line_ids: BTreeSet<Uuid>,
        gross_amount: Money,
        return_ids: BTreeSet<Uuid>,
        return_deductions: Money,
        now: DateTime<Utc>,
    ) -> Result<Self, PayoutError> {
        let net_amount = gross_amount - return_deductions;
        if net_amount.is_negative() {
            return Err(PayoutError::NegativeNet {
                gross: gross_amount,
                deductions: return_deductions,
            });
        }

        let detail = PayoutDetail::Supplier(SupplierPayout {
            line_ids,
            return_ids,
            return_deductions,
        });
        Ok(Self::open(PayoutRecipient::supplier(supplier_id), period, gross_amount, net_amount, detail, now))
    }

    /// `net = gross × fee_rate`; the platform keeps the rest
    pub fn delivery(
        payout_type: DeliveryPayoutType,
        recipient_id: Uuid,
        period: PayoutPeriod,
        order_ids: BTreeSet<Uuid>,
        gross_amount: Money,
        fee_rate: Rate,
        now: DateTime<Utc>,
    ) -> Result<Self, PayoutError> {
        if !fee_rate.is_valid_share() {
            return Err(PayoutError::InvalidFeeRate(fee_rate));
        }
        let net_amount = gross_amount.apply(fee_rate);
        let platform_fee = gross_amount - net_amount;
        if net_amount.is_negative() {
            return Err(PayoutError::NegativeNet {
                gross: gross_amount,
                deductions: platform_fee,
            });
        }

        let detail = PayoutDetail::Delivery(DeliveryPayout {
            payout_type,
            order_ids,
            platform_fee,
            fee_rate,
        });
        let recipient = PayoutRecipient::delivery(payout_type, recipient_id);
        Ok(Self::open(recipient, period, gross_amount, net_amount, detail, now))
    }

    fn open(
        recipient: PayoutRecipient,
        period: PayoutPeriod,
        gross_amount: Money,
        net_amount: Money,
        detail: PayoutDetail,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            recipient,
            period_start: period.start,
            period_end: period.end,
            gross_amount,
            net_amount,
            detail,
            status: PayoutStatus::Pending,
            payment_reference: None,
            paid_at: None,
            attempts: 0,
            notes: None,
            processing_started_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Return deductions or the platform's delivery fee share
    pub fn deductions(&self) -> Money {
        match &self.detail {
            PayoutDetail::Supplier(s) => s.return_deductions,
            PayoutDetail::Delivery(d) => d.platform_fee,
        }
    }

    /// Everything this payout holds exclusively while it is live
    pub fn claims(&self) -> Vec<(ClaimKind, Uuid)> {
        match &self.detail {
            PayoutDetail::Supplier(s) => s
                .line_ids
                .iter()
                .map(|id| (ClaimKind::OrderLine, *id))
                .chain(s.return_ids.iter().map(|id| (ClaimKind::Return, *id)))
                .collect(),
            PayoutDetail::Delivery(d) => d.order_ids.iter().map(|id| (ClaimKind::Order, *id)).collect(),
        }
    }

    pub fn narration(&self) -> String {
        format!(
            "Payout {} to {} for {} - {}",
            self.id,
            self.recipient,
            self.period_start.format("%Y-%m-%d"),
            self.period_end.format("%Y-%m-%d")
        )
    }

    pub fn append_note(&mut self, note: &str) {
        self.notes = Some(match self.notes.take() {
            Some(existing) => format!("{}\n{}", existing, note),
            None => note.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn period() -> PayoutPeriod {
        let end = Utc::now();
        PayoutPeriod::new(end - Duration::days(7), end).unwrap()
    }

    #[test]
    fn test_supplier_net_after_deductions() {
        let payout = Payout::supplier(
            Uuid::new_v4(),
            period(),
            BTreeSet::from([Uuid::new_v4()]),
            Money::new(dec!(3000)),
            BTreeSet::from([Uuid::new_v4()]),
            Money::new(dec!(637.50)),
            Utc::now(),
        )
        .unwrap();

        assert_eq!(payout.net_amount, Money::new(dec!(2362.50)));
        assert_eq!(payout.status, PayoutStatus::Pending);
        assert_eq!(payout.claims().len(), 2);
    }

    #[test]
    fn test_negative_net_refused() {
        let result = Payout::supplier(
            Uuid::new_v4(),
            period(),
            BTreeSet::new(),
            Money::new(dec!(100)),
            BTreeSet::new(),
            Money::new(dec!(1100)),
            Utc::now(),
        );
        assert!(matches!(result, Err(PayoutError::NegativeNet { .. })));
    }

    #[test]
    fn test_delivery_fee_share() {
        let payout = Payout::delivery(
            DeliveryPayoutType::Agent,
            Uuid::new_v4(),
            period(),
            BTreeSet::from([Uuid::new_v4(), Uuid::new_v4()]),
            Money::new(dec!(600)),
            Rate::from_percent(dec!(80)),
            Utc::now(),
        )
        .unwrap();

        assert_eq!(payout.net_amount, Money::new(dec!(480)));
        assert_eq!(payout.deductions(), Money::new(dec!(120)));
        assert_eq!(payout.recipient.kind, RecipientKind::DeliveryAgent);
        assert!(payout.claims().iter().all(|(kind, _)| *kind == ClaimKind::Order));
    }

    #[test]
    fn test_status_table() {
        use PayoutStatus::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Pending));
        assert!(!Processing.can_transition_to(Cancelled));
        assert!(!Completed.can_transition_to(Cancelled));
        assert!(!Completed.can_transition_to(Pending));
        assert!(!Pending.can_transition_to(Completed));
    }

    #[test]
    fn test_status_parse_rejects_unknown() {
        assert_eq!("PROCESSING".parse::<PayoutStatus>().unwrap(), PayoutStatus::Processing);
        assert!("paid".parse::<PayoutStatus>().is_err());
    }

    #[test]
    fn test_period_must_be_ordered() {
        let now = Utc::now();
        assert!(PayoutPeriod::new(now, now).is_err());
        assert!(PayoutPeriod::new(now, now - Duration::days(1)).is_err());
        assert!(period().contains(now - Duration::days(1)));
    }
}
