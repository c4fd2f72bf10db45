pub mod money;
pub mod events;

pub use money::{Money, Rate};
pub use events::{DomainEvent, RecipientKind};
