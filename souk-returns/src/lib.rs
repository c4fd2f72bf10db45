pub mod policy;
pub mod models;
pub mod error;
pub mod repository;
pub mod manager;

pub use policy::{calculate, RefundAllocation, RefundError, RefundPolicy};
pub use models::{
    CreateReturn, RefundMethod, ReturnReason, ReturnRequest, ReturnStatus, Reviewer, ReviewerRole,
    SupplierAction,
};
pub use error::ReturnError;
pub use repository::ReturnRepository;
pub use manager::{ReturnRules, ReturnService, ReviewAction, SupplierResponse};
