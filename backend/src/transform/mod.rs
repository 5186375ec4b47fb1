//! Transformation module.
//!
//! - DSL: cleaning operations, named transformers and the rule executor
//! - Grouper: validated rows to destination-shaped records

pub mod dsl;
pub mod grouper;

pub use dsl::*;
pub use grouper::{derived_id, split_enrollments, split_payments, split_reference, SplitOutput};
