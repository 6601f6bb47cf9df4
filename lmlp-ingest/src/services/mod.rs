//! Pipeline services
//!
//! The exposed operations of the crate:
//! - [`SummaryResolver::resolve_summary`] — extraction + resolution + cache upsert
//! - [`ValidationCache`] — review queues and human validation
//! - [`PromotionCoordinator`] — verified → mongo promotion into the canonical store

pub mod promotion;
pub mod summary_resolver;
pub mod validation;

pub use promotion::{PromotionCoordinator, PromotionError, PromotionReport};
pub use summary_resolver::SummaryResolver;
pub use validation::ValidationCache;
