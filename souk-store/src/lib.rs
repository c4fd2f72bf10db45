pub mod app_config;
pub mod database;
pub mod events;
pub mod memory;
pub mod payout_repo;

pub use app_config::{BusinessRules, Config};
pub use database::DbClient;
pub use events::BroadcastEventSink;
pub use memory::MemoryStore;
pub use payout_repo::PgPayoutRepository;
