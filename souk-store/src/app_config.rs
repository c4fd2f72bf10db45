use chrono::Duration;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use souk_payout::{PayoutRules, SettlementRules};
use souk_returns::ReturnRules;
use souk_shared::{Money, Rate};
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub events: EventsConfig,
    #[serde(default)]
    pub business_rules: BusinessRules,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EventsConfig {
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// Tunable marketplace rules. Percentages are whole numbers (25 = 25%),
/// amounts are in the store currency.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct BusinessRules {
    #[serde(default = "default_return_window_days")]
    pub return_window_days: u32,
    #[serde(default = "default_platform_commission_percent")]
    pub platform_commission_percent: Decimal,
    #[serde(default = "default_delivery_auto_confirm_hours")]
    pub delivery_auto_confirm_hours: u32,
    #[serde(default = "default_min_supplier_payout")]
    pub min_supplier_payout: Decimal,
    #[serde(default = "default_min_delivery_payout")]
    pub min_delivery_payout: Decimal,
    #[serde(default = "default_agent_fee_percent")]
    pub agent_fee_percent: Decimal,
    #[serde(default = "default_company_fee_percent")]
    pub company_fee_percent: Decimal,
    #[serde(default = "default_settlement_max_attempts")]
    pub settlement_max_attempts: u32,
    #[serde(default = "default_settlement_stale_after_minutes")]
    pub settlement_stale_after_minutes: u32,
}

fn default_max_connections() -> u32 { 5 }
fn default_channel_capacity() -> usize { 256 }
fn default_return_window_days() -> u32 { 14 }
fn default_platform_commission_percent() -> Decimal { Decimal::from(25) }
fn default_delivery_auto_confirm_hours() -> u32 { 24 }
fn default_min_supplier_payout() -> Decimal { Decimal::from(500) }
fn default_min_delivery_payout() -> Decimal { Decimal::from(100) }
fn default_agent_fee_percent() -> Decimal { Decimal::from(80) }
fn default_company_fee_percent() -> Decimal { Decimal::from(85) }
fn default_settlement_max_attempts() -> u32 { 3 }
fn default_settlement_stale_after_minutes() -> u32 { 30 }

impl Default for BusinessRules {
    fn default() -> Self {
        Self {
            return_window_days: default_return_window_days(),
            platform_commission_percent: default_platform_commission_percent(),
            delivery_auto_confirm_hours: default_delivery_auto_confirm_hours(),
            min_supplier_payout: default_min_supplier_payout(),
            min_delivery_payout: default_min_delivery_payout(),
            agent_fee_percent: default_agent_fee_percent(),
            company_fee_percent: default_company_fee_percent(),
            settlement_max_attempts: default_settlement_max_attempts(),
            settlement_stale_after_minutes: default_settlement_stale_after_minutes(),
        }
    }
}

impl BusinessRules {
    /// Platform share of each order line, captured at order time
    pub fn commission_rate(&self) -> Rate {
        Rate::from_percent(self.platform_commission_percent)
    }

    pub fn return_rules(&self) -> ReturnRules {
        ReturnRules {
            return_window: Duration::days(i64::from(self.return_window_days)),
        }
    }

    pub fn payout_rules(&self) -> PayoutRules {
        PayoutRules {
            min_supplier_payout: Money::new(self.min_supplier_payout),
            min_delivery_payout: Money::new(self.min_delivery_payout),
            agent_fee_rate: Rate::from_percent(self.agent_fee_percent),
            company_fee_rate: Rate::from_percent(self.company_fee_percent),
            delivery_auto_confirm: Duration::hours(i64::from(self.delivery_auto_confirm_hours)),
        }
    }

    pub fn settlement_rules(&self) -> SettlementRules {
        SettlementRules {
            max_attempts: self.settlement_max_attempts.max(1),
            stale_after: Duration::minutes(i64::from(self.settlement_stale_after_minutes)),
        }
    }

    /// Apply one override stored as `{"value": ...}`. Unknown keys and values
    /// of the wrong type are ignored; returns whether anything changed.
    pub fn apply_override(&mut self, key: &str, value: &Value) -> bool {
        let Some(v) = value.get("value") else {
            return false;
        };

        match key {
            "return_window_days" => set_u32(&mut self.return_window_days, v),
            "delivery_auto_confirm_hours" => set_u32(&mut self.delivery_auto_confirm_hours, v),
            "settlement_max_attempts" => set_u32(&mut self.settlement_max_attempts, v),
            "settlement_stale_after_minutes" => set_u32(&mut self.settlement_stale_after_minutes, v),
            "platform_commission_percent" => set_decimal(&mut self.platform_commission_percent, v),
            "min_supplier_payout" => set_decimal(&mut self.min_supplier_payout, v),
            "min_delivery_payout" => set_decimal(&mut self.min_delivery_payout, v),
            "agent_fee_percent" => set_decimal(&mut self.agent_fee_percent, v),
            "company_fee_percent" => set_decimal(&mut self.company_fee_percent, v),
            _ => false,
        }
    }
}

fn set_u32(target: &mut u32, v: &Value) -> bool {
    match v.as_u64().and_then(|n| u32::try_from(n).ok()) {
        Some(n) => {
            *target = n;
            true
        }
        None => false,
    }
}

fn set_decimal(target: &mut Decimal, v: &Value) -> bool {
    let parsed = match v {
        Value::String(s) => s.parse::<Decimal>().ok(),
        Value::Number(n) => n.to_string().parse::<Decimal>().ok(),
        _ => None,
    };
    match parsed {
        Some(d) => {
            *target = d;
            true
        }
        None => false,
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. `SOUK__BUSINESS_RULES__RETURN_WINDOW_DAYS=7`
            .add_source(config::Environment::with_prefix("SOUK").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
