//! Order read side: one denormalized query, folded into nested views.

pub mod aggregator;

pub use aggregator::{ItemView, OrderQueryService, OrderView, fold_rows};
