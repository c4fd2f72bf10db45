use crate::error::PayoutError;
use crate::models::{ClaimKind, Payout, PayoutPeriod, PayoutRecipient, RecipientType};
use crate::repository::PayoutRepository;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use souk_core::events::publish_or_log;
use souk_core::{CoreError, EventSink};
use souk_order::{DeliveryPayoutType, OrderRepository, OrderStatus};
use souk_returns::ReturnRepository;
use souk_shared::events::PayoutCreatedEvent;
use souk_shared::{DomainEvent, Money, Rate};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
pub struct PayoutRules {
    pub min_supplier_payout: Money,
    pub min_delivery_payout: Money,
    pub agent_fee_rate: Rate,
    pub company_fee_rate: Rate,
    pub delivery_auto_confirm: Duration,
}

impl Default for PayoutRules {
    fn default() -> Self {
        Self {
            min_supplier_payout: Money::new(Decimal::from(500)),
            min_delivery_payout: Money::new(Decimal::from(100)),
            agent_fee_rate: Rate::from_percent(Decimal::from(80)),
            company_fee_rate: Rate::from_percent(Decimal::from(85)),
            delivery_auto_confirm: Duration::hours(24),
        }
    }
}

impl PayoutRules {
    fn fee_rate(&self, payout_type: DeliveryPayoutType) -> Rate {
        match payout_type {
            DeliveryPayoutType::Agent => self.agent_fee_rate,
            DeliveryPayoutType::Company => self.company_fee_rate,
        }
    }
}

/// A recipient whose earnings stayed under the threshold. Nothing is claimed,
/// so the same items are picked up by a later run.
#[derive(Debug, Clone, PartialEq)]
pub struct DeferredPayout {
    pub recipient: PayoutRecipient,
    pub gross_amount: Money,
    pub deductions: Money,
    pub net_amount: Money,
    pub threshold: Money,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationReport {
    pub created: Vec<Payout>,
    /// Payouts that already cover this run's items
    pub existing: Vec<Payout>,
    pub deferred: Vec<DeferredPayout>,
}

#[derive(Default)]
struct SupplierTally {
    line_ids: BTreeSet<Uuid>,
    gross: Money,
    return_ids: BTreeSet<Uuid>,
    deductions: Money,
}

#[derive(Default)]
struct DeliveryTally {
    order_ids: BTreeSet<Uuid>,
    gross: Money,
}

pub struct PayoutAggregator {
    orders: Arc<dyn OrderRepository>,
    returns: Arc<dyn ReturnRepository>,
    payouts: Arc<dyn PayoutRepository>,
    events: Arc<dyn EventSink>,
    rules: PayoutRules,
}

impl PayoutAggregator {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        returns: Arc<dyn ReturnRepository>,
        payouts: Arc<dyn PayoutRepository>,
        events: Arc<dyn EventSink>,
        rules: PayoutRules,
    ) -> Self {
        Self {
            orders,
            returns,
            payouts,
            events,
            rules,
        }
    }

    /// Build payouts for everything earned up to the end of `period` that no
    /// live payout holds yet, including earnings deferred by earlier runs. Running it twice over the same period creates nothing new.
    pub async fn generate(
        &self,
        period: PayoutPeriod,
        recipient_type: RecipientType,
        now: DateTime<Utc>,
    ) -> Result<GenerationReport, PayoutError> {
        let report = match recipient_type {
            RecipientType::Supplier => self.generate_supplier(period, now).await?,
            RecipientType::Delivery => self.generate_delivery(period, now).await?,
        };

        info!(
            "Generated {:?} payouts for {} - {}: {} created, {} existing, {} deferred",
            recipient_type,
            period.start,
            period.end,
            report.created.len(),
            report.existing.len(),
            report.deferred.len()
        );
        Ok(report)
    }

    async fn generate_supplier(
        &self,
        period: PayoutPeriod,
        now: DateTime<Utc>,
    ) -> Result<GenerationReport, PayoutError> {
        // Earlier periods count too: deferred lines stay unclaimed until a run pays them.
        let orders = self.orders.list_orders_until(period.end).await?;
        let lines: Vec<_> = orders
            .iter()
            .filter(|o| o.is_settled())
            .flat_map(|o| o.lines.iter())
            .collect();

        let line_ids: Vec<Uuid> = lines.iter().map(|l| l.id()).collect();
        let claimed_lines = self
            .payouts
            .claimed_item_ids(ClaimKind::OrderLine, &line_ids)
            .await?;

        let mut tallies: BTreeMap<Uuid, SupplierTally> = BTreeMap::new();
        let mut fully_claimed: BTreeSet<Uuid> = BTreeSet::new();
        for line in &lines {
            if claimed_lines.contains(&line.id()) {
                fully_claimed.insert(line.supplier_id());
                continue;
            }
            let tally = tallies.entry(line.supplier_id()).or_default();
            tally.line_ids.insert(line.id());
            tally.gross += line.supplier_earnings();
        }

        let refunded: Vec<_> = self
            .returns
            .list_refunded_until(period.end)
            .await?
            .into_iter()
            .filter(|r| r.allocation.map_or(false, |a| a.supplier_deduction.is_positive()))
            .collect();
        let return_ids: Vec<Uuid> = refunded.iter().map(|r| r.id).collect();
        let claimed_returns = self.payouts.claimed_item_ids(ClaimKind::Return, &return_ids).await?;

        for request in &refunded {
            if claimed_returns.contains(&request.id) {
                continue;
            }
            let Some(allocation) = request.allocation else {
                continue;
            };
            let tally = tallies.entry(request.supplier_id).or_default();
            tally.return_ids.insert(request.id);
            tally.deductions += allocation.supplier_deduction;
        }

        let mut report = GenerationReport::default();
        for (supplier_id, tally) in tallies {
            fully_claimed.remove(&supplier_id);
            let recipient = PayoutRecipient::supplier(supplier_id);
            let net = tally.gross - tally.deductions;

            if net < self.rules.min_supplier_payout || !net.is_positive() {
                info!(
                    "Deferring payout for {}: net {} below threshold {}",
                    recipient, net, self.rules.min_supplier_payout
                );
                report.deferred.push(DeferredPayout {
                    recipient,
                    gross_amount: tally.gross,
                    deductions: tally.deductions,
                    net_amount: net,
                    threshold: self.rules.min_supplier_payout,
                });
                continue;
            }

            let payout = Payout::supplier(
                supplier_id,
                period,
                tally.line_ids,
                tally.gross,
                tally.return_ids,
                tally.deductions,
                now,
            )?;
            self.store(payout, period, &mut report).await?;
        }

        for supplier_id in fully_claimed {
            let existing = self
                .payouts
                .list_for_period(PayoutRecipient::supplier(supplier_id), period)
                .await?;
            report.existing.extend(existing);
        }

        Ok(report)
    }

    async fn generate_delivery(
        &self,
        period: PayoutPeriod,
        now: DateTime<Utc>,
    ) -> Result<GenerationReport, PayoutError> {
        let auto_confirm = self.rules.delivery_auto_confirm;
        let candidates: Vec<_> = self
            .orders
            .list_unpaid_deliveries()
            .await?
            .into_iter()
            .filter(|o| o.status != OrderStatus::Cancelled)
            .filter_map(|o| {
                let delivery = o.delivery.as_ref()?;
                let confirmed_at = delivery.confirmed_at(auto_confirm)?;
                if delivery.fee_paid || confirmed_at > now || confirmed_at > period.end {
                    return None;
                }
                let (payout_type, recipient_id) = delivery.recipient()?;
                Some((o.id, payout_type, recipient_id, delivery.delivery_fee))
            })
            .collect();

        let order_ids: Vec<Uuid> = candidates.iter().map(|(id, ..)| *id).collect();
        let claimed = self.payouts.claimed_item_ids(ClaimKind::Order, &order_ids).await?;

        let mut tallies: BTreeMap<(DeliveryPayoutType, Uuid), DeliveryTally> = BTreeMap::new();
        let mut fully_claimed: BTreeSet<(DeliveryPayoutType, Uuid)> = BTreeSet::new();
        for (order_id, payout_type, recipient_id, fee) in candidates {
            if claimed.contains(&order_id) {
                fully_claimed.insert((payout_type, recipient_id));
                continue;
            }
            let tally = tallies.entry((payout_type, recipient_id)).or_default();
            tally.order_ids.insert(order_id);
            tally.gross += fee;
        }

        let mut report = GenerationReport::default();
        for ((payout_type, recipient_id), tally) in tallies {
            fully_claimed.remove(&(payout_type, recipient_id));
            let recipient = PayoutRecipient::delivery(payout_type, recipient_id);
            let rate = self.rules.fee_rate(payout_type);
            let net = tally.gross.apply(rate);

            if net < self.rules.min_delivery_payout || !net.is_positive() {
                info!(
                    "Deferring payout for {}: net {} below threshold {}",
                    recipient, net, self.rules.min_delivery_payout
                );
                report.deferred.push(DeferredPayout {
                    recipient,
                    gross_amount: tally.gross,
                    deductions: tally.gross - net,
                    net_amount: net,
                    threshold: self.rules.min_delivery_payout,
                });
                continue;
            }

            let payout = Payout::delivery(
                payout_type,
                recipient_id,
                period,
                tally.order_ids,
                tally.gross,
                rate,
                now,
            )?;
            self.store(payout, period, &mut report).await?;
        }

        for (payout_type, recipient_id) in fully_claimed {
            let existing = self
                .payouts
                .list_for_period(PayoutRecipient::delivery(payout_type, recipient_id), period)
                .await?;
            report.existing.extend(existing);
        }

        Ok(report)
    }

    async fn store(
        &self,
        payout: Payout,
        period: PayoutPeriod,
        report: &mut GenerationReport,
    ) -> Result<(), PayoutError> {
        match self.payouts.insert(&payout).await {
            Ok(()) => {
                info!(
                    "Created payout {} for {}: gross {}, net {}",
                    payout.id, payout.recipient, payout.gross_amount, payout.net_amount
                );
                let event = DomainEvent::PayoutCreated(PayoutCreatedEvent {
                    payout_id: payout.id,
                    recipient_kind: payout.recipient.kind,
                    recipient_id: payout.recipient.id,
                    gross_amount: payout.gross_amount,
                    net_amount: payout.net_amount,
                    timestamp: payout.created_at.timestamp(),
                });
                publish_or_log(self.events.as_ref(), event).await;
                report.created.push(payout);
                Ok(())
            }
            Err(CoreError::Conflict(reason)) => {
                warn!("Payout for {} not created: {}", payout.recipient, reason);
                match self.payouts.find_open(payout.recipient).await? {
                    Some(open) => report.existing.push(open),
                    None => report
                        .existing
                        .extend(self.payouts.list_for_period(payout.recipient, period).await?),
                }
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
