//! # Legacymig - staged migration of legacy CSV exports
//!
//! Legacymig moves the all-text CSV snapshots of a retired student records
//! system into validated, typed records for a new destination model.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────┐   ┌───────┐   ┌──────────┐   ┌───────────┐   ┌───────┐
//! │  Import  │──▶│ Profile │──▶│ Clean │──▶│ Validate │──▶│ Transform │──▶│ Split │
//! │ (as text)│   │ (stats) │   │ (ops) │   │ (schema) │   │ (rules)   │   │ (ids) │
//! └──────────┘   └─────────┘   └───────┘   └──────────┘   └───────────┘   └───────┘
//! ```
//!
//! Tables run in dependency order; a table that provides a shared field is
//! fully cleaned before any table consuming it.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use legacymig::{FsStore, Pipeline, PipelineRegistry, PipelineSettings};
//!
//! let settings = PipelineSettings::with_dirs("data/source", "data/output");
//! let registry = PipelineRegistry::with_builtin_tables(&settings)?;
//! let store = FsStore::new(&settings.output_dir)?;
//! let mut pipeline = Pipeline::new(registry, store, settings)?;
//! for summary in pipeline.run_all() {
//!     println!("{}: {:?}", summary.table, summary.run.status);
//! }
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`models`] - Stage tables, runs, row errors
//! - [`config`] - Table configurations and settings
//! - [`registry`] - Processing order and named validators/transformers
//! - [`parser`] - Source file reading with encoding detection
//! - [`identifier`] - Composite class-code parser
//! - [`transliterate`] - Legacy font text to Unicode Khmer
//! - [`allocation`] - Payment apportionment
//! - [`cache`] - Run-scoped cross-table cache
//! - [`store`] - Stage output persistence
//! - [`validation`] - Column schemas, business rules, destination contracts
//! - [`transform`] - Cleaning DSL and record splitting
//! - [`pipeline`] - The six-stage engine
//! - [`logging`] - Subscriber setup for the binary

// Core modules
pub mod error;
pub mod models;

// Configuration
pub mod config;
pub mod registry;

// Parsing
pub mod parser;

// Algorithms
pub mod allocation;
pub mod identifier;
pub mod transliterate;

// Validation
pub mod validation;

// Transformation
pub mod transform;

// Runtime state and persistence
pub mod cache;
pub mod store;

// Engine
pub mod pipeline;

pub mod logging;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    ConfigError, ConfigResult, PipelineError, PipelineResult, RunError, SourceError, SourceResult,
    StoreError, StoreResult,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{
    ErrorKind, PipelineRun, Record, RowCounts, RowError, RunLogEntry, RunStatus, Stage,
    StageRunRecord, StageTable,
};

// =============================================================================
// Re-exports - Configuration
// =============================================================================

pub use config::{
    ColumnRule, ColumnType, PipelineSettings, TableConfiguration, TableKind, TransformationRule,
    ValidationPriority,
};
pub use registry::PipelineRegistry;

// =============================================================================
// Re-exports - Parsing
// =============================================================================

pub use parser::{
    decode_content, detect_delimiter, detect_encoding, read_source, resolve_source_file,
    SourceTable,
};

// =============================================================================
// Re-exports - Algorithms
// =============================================================================

pub use allocation::{
    allocate_direct, allocate_equal, AllocationEngine, AllocationMethod, AllocationResult,
    EnrollmentIndex, Money,
};
pub use identifier::{parse_identifier, CourseCatalog, NoCatalog, ParseQuality, ParsedIdentifier, StaticCatalog};
pub use transliterate::{
    contains_legacy_glyphs, contains_non_ascii_legacy_glyphs, contains_target_script, transliterate,
};

// =============================================================================
// Re-exports - Engine
// =============================================================================

pub use cache::CrossTableCache;
pub use pipeline::{Pipeline, RunSummary};
pub use store::{output_table_name, FsStore, MemoryStore, OutputKind, TableStore};
