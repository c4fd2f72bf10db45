pub mod models;
pub mod delivery;
pub mod repository;

pub use models::{NewOrderLine, Order, OrderError, OrderLineSnapshot, OrderStatus, PaymentStatus};
pub use delivery::{DeliveryAssignment, DeliveryPayoutType};
pub use repository::OrderRepository;
