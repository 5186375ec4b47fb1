//! Declarative rules applied to rows.
//!
//! This module provides:
//! - `operations`: named cleaning operations, applied per column in Clean
//! - `transformers`: named value transformers, applied per rule in Transform
//! - `executor`: runs a table's rules over its rows
//!
//! ## Usage Flow
//!
//! ```text
//! raw row → executor::clean_row (ColumnRule ops) → cleaned row
//! valid row → executor::apply_transformations (TransformationRule) → transformed row
//! ```

pub mod executor;
pub mod operations;
pub mod transformers;

// Re-exports for convenience
pub use executor::{apply_ops, apply_transformations, clean_row, CleanedRow};
pub use operations::{parse_date, CleanContext, CleaningOp};
pub use transformers::Transformer;
