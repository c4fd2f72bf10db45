pub mod aggregator;
pub mod error;
pub mod models;
pub mod repository;
pub mod settlement;

pub use aggregator::{DeferredPayout, GenerationReport, PayoutAggregator, PayoutRules};
pub use error::PayoutError;
pub use models::{
    ClaimKind, DeliveryPayout, Payout, PayoutDetail, PayoutPeriod, PayoutRecipient, PayoutStatus,
    RecipientType, SupplierPayout,
};
pub use repository::PayoutRepository;
pub use settlement::{SettlementOutcome, SettlementProcessor, SettlementReport, SettlementRules};
