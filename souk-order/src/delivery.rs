use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use souk_shared::Money;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryPayoutType {
    Agent,
    Company,
}

/// Who carries an order and what they are owed for it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeliveryAssignment {
    pub agent_id: Option<Uuid>,
    pub company_id: Option<Uuid>,
    pub delivery_fee: Money,
    pub agent_confirmed_at: Option<DateTime<Utc>>,
    pub customer_confirmed_at: Option<DateTime<Utc>>,
    pub fee_paid: bool,
}

impl DeliveryAssignment {
    pub fn to_agent(agent_id: Uuid, delivery_fee: Money) -> Self {
        Self {
            agent_id: Some(agent_id),
            company_id: None,
            delivery_fee,
            agent_confirmed_at: None,
            customer_confirmed_at: None,
            fee_paid: false,
        }
    }

    pub fn to_company(company_id: Uuid, agent_id: Option<Uuid>, delivery_fee: Money) -> Self {
        Self {
            agent_id,
            company_id: Some(company_id),
            delivery_fee,
            agent_confirmed_at: None,
            customer_confirmed_at: None,
            fee_paid: false,
        }
    }

    pub fn confirm_by_agent(&mut self, at: DateTime<Utc>) {
        self.agent_confirmed_at.get_or_insert(at);
    }

    pub fn confirm_by_customer(&mut self, at: DateTime<Utc>) {
        self.customer_confirmed_at.get_or_insert(at);
    }

    /// When the delivery counts as confirmed: once both sides confirm, or once
    /// `auto_confirm` has passed since the agent's confirmation without the
    /// customer responding.
    pub fn confirmed_at(&self, auto_confirm: Duration) -> Option<DateTime<Utc>> {
        let agent = self.agent_confirmed_at?;
        match self.customer_confirmed_at {
            Some(customer) => Some(agent.max(customer).min(agent + auto_confirm)),
            None => Some(agent + auto_confirm),
        }
    }

    pub fn is_confirmed(&self, now: DateTime<Utc>, auto_confirm: Duration) -> bool {
        self.confirmed_at(auto_confirm).map_or(false, |at| at <= now)
    }

    /// Companies are paid for their agents' deliveries
    pub fn recipient(&self) -> Option<(DeliveryPayoutType, Uuid)> {
        match (self.company_id, self.agent_id) {
            (Some(company), _) => Some((DeliveryPayoutType::Company, company)),
            (None, Some(agent)) => Some((DeliveryPayoutType::Agent, agent)),
            (None, None) => None,
        }
    }
}
