//! Refund split calculator.
//!
//! Percentages apply to the returned item total (line unit price times the
//! returned quantity), never to the whole order:
//!
//! | policy                | customer refund | restocking fee | supplier deduction     | platform deduction |
//! |-----------------------|-----------------|----------------|------------------------|--------------------|
//! | supplier fault        | 100%            | 0              | 100%                   | 0                  |
//! | customer changed mind | 85%             | 15%            | 75% of customer refund | 0                  |
//! | shipping damage       | 100%            | 0              | 0                      | 100%               |
//! | fraud                 | 100%            | 0              | 110%                   | -10%               |

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use souk_shared::{Money, Rate};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefundPolicy {
    SupplierFault,
    CustomerChangedMind,
    ShippingDamage,
    Fraud,
}

impl fmt::Display for RefundPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RefundPolicy::SupplierFault => "SUPPLIER_FAULT",
            RefundPolicy::CustomerChangedMind => "CUSTOMER_CHANGED_MIND",
            RefundPolicy::ShippingDamage => "SHIPPING_DAMAGE",
            RefundPolicy::Fraud => "FRAUD",
        };
        f.write_str(s)
    }
}

/// Who pays for a refund, and how much the customer gets back
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RefundAllocation {
    /// Value of the returned goods before any fee
    pub refund_amount: Money,
    pub restocking_fee: Money,
    pub customer_refund: Money,
    pub supplier_deduction: Money,
    /// Negative when the platform receives a penalty
    pub platform_deduction: Money,
}

fn restocking_rate() -> Rate {
    Rate::from_percent(Decimal::from(15))
}

fn changed_mind_supplier_rate() -> Rate {
    Rate::from_percent(Decimal::from(75))
}

fn fraud_penalty_rate() -> Rate {
    Rate::from_percent(Decimal::from(10))
}

/// Split a refund of `item_total` according to `policy`.
///
/// Rounding is half-up to the cent on each percentage; whatever remains
/// after rounding lands on the platform side, the customer figure is always
/// `item_total - restocking_fee`.
pub fn calculate(item_total: Money, policy: RefundPolicy) -> Result<RefundAllocation, RefundError> {
    if !item_total.is_positive() {
        return Err(RefundError::NonPositiveTotal(item_total));
    }

    let allocation = match policy {
        RefundPolicy::SupplierFault => RefundAllocation {
            refund_amount: item_total,
            restocking_fee: Money::zero(),
            customer_refund: item_total,
            supplier_deduction: item_total,
            platform_deduction: Money::zero(),
        },
        RefundPolicy::CustomerChangedMind => {
            let restocking_fee = item_total.apply(restocking_rate());
            let customer_refund = item_total - restocking_fee;
            // 75% of what the customer actually gets back, not of the item total
            let supplier_deduction = customer_refund.apply(changed_mind_supplier_rate());
            RefundAllocation {
                refund_amount: item_total,
                restocking_fee,
                customer_refund,
                supplier_deduction,
                platform_deduction: Money::zero(),
            }
        }
        RefundPolicy::ShippingDamage => RefundAllocation {
            refund_amount: item_total,
            restocking_fee: Money::zero(),
            customer_refund: item_total,
            supplier_deduction: Money::zero(),
            platform_deduction: item_total,
        },
        RefundPolicy::Fraud => {
            let penalty = item_total.apply(fraud_penalty_rate());
            RefundAllocation {
                refund_amount: item_total,
                restocking_fee: Money::zero(),
                customer_refund: item_total,
                supplier_deduction: item_total + penalty,
                platform_deduction: -penalty,
            }
        }
    };

    allocation.verify(policy)?;
    Ok(allocation)
}

impl RefundAllocation {
    /// Checks every calculated allocation must pass
    pub fn verify(&self, policy: RefundPolicy) -> Result<(), RefundError> {
        self.verify_totals()?;

        let deductions = self.supplier_deduction + self.platform_deduction;
        let balanced = match policy {
            RefundPolicy::SupplierFault | RefundPolicy::ShippingDamage | RefundPolicy::Fraud => {
                deductions == self.customer_refund
            }
            RefundPolicy::CustomerChangedMind => {
                self.platform_deduction.is_zero()
                    && self.supplier_deduction
                        == self.customer_refund.apply(changed_mind_supplier_rate())
            }
        };
        if !balanced {
            return Err(RefundError::InvariantViolated(format!(
                "{} deductions {} + {} do not reconcile with refund {}",
                policy, self.supplier_deduction, self.platform_deduction, self.customer_refund
            )));
        }

        if policy != RefundPolicy::Fraud && self.supplier_deduction > self.refund_amount {
            return Err(RefundError::InvariantViolated(format!(
                "supplier deduction {} exceeds refund amount {} outside fraud",
                self.supplier_deduction, self.refund_amount
            )));
        }

        Ok(())
    }

    /// Checks for figures entered by an admin when no allocation could be
    /// calculated: totals must add up and the deductions may not exceed what
    /// the customer is refunded.
    pub fn verify_manual(&self) -> Result<(), RefundError> {
        self.verify_totals()?;

        if self.supplier_deduction.is_negative() {
            return Err(RefundError::InvariantViolated(format!(
                "supplier deduction {} is negative",
                self.supplier_deduction
            )));
        }
        if self.supplier_deduction + self.platform_deduction > self.customer_refund {
            return Err(RefundError::InvariantViolated(format!(
                "deductions {} + {} exceed refund {}",
                self.supplier_deduction, self.platform_deduction, self.customer_refund
            )));
        }
        Ok(())
    }

    fn verify_totals(&self) -> Result<(), RefundError> {
        if self.customer_refund.is_negative() || self.restocking_fee.is_negative() {
            return Err(RefundError::InvariantViolated(format!(
                "negative refund {} or restocking fee {}",
                self.customer_refund, self.restocking_fee
            )));
        }
        if self.customer_refund > self.refund_amount {
            return Err(RefundError::InvariantViolated(format!(
                "customer refund {} exceeds amount paid {}",
                self.customer_refund, self.refund_amount
            )));
        }
        if self.customer_refund + self.restocking_fee != self.refund_amount {
            return Err(RefundError::InvariantViolated(format!(
                "refund {} + fee {} != amount {}",
                self.customer_refund, self.restocking_fee, self.refund_amount
            )));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RefundError {
    #[error("Item total must be positive to calculate a refund, got {0}")]
    NonPositiveTotal(Money),

    #[error("Refund invariant violated: {0}")]
    InvariantViolated(String),
}
