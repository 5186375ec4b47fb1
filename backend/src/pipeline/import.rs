//! Stage 1: Import.
//!
//! Reads the flat source file and keeps every value as the exact text found,
//! plus the audit columns.

use chrono::Utc;
use serde_json::Value;
use tracing::{info, warn};

use crate::config::{PipelineSettings, TableConfiguration};
use crate::error::SourceResult;
use crate::models::{audit, mark_stage, PipelineRun, Record, Stage, StageTable};
use crate::parser::{read_source, resolve_source_file, SourceTable};

/// Build the raw stage table from a decoded source file.
pub fn raw_table(name: &str, source: &SourceTable, run: &PipelineRun) -> StageTable {
    let mut columns = source.headers.clone();
    columns.extend(audit::ALL.iter().map(|c| c.to_string()));
    let mut table = StageTable::new(name, columns);

    let imported_at = Value::String(Utc::now().to_rfc3339());
    let run_id = Value::String(run.id.to_string());
    let file = Value::String(source.file_name());

    for row in &source.rows {
        let mut record = Record::new();
        for (header, value) in source.headers.iter().zip(&row.values) {
            record.insert(header.clone(), Value::String(value.clone()));
        }
        record.insert(audit::RUN_ID.into(), run_id.clone());
        record.insert(audit::IMPORTED_AT.into(), imported_at.clone());
        record.insert(audit::SOURCE_ROW.into(), Value::from(row.number));
        record.insert(audit::SOURCE_FILE.into(), file.clone());
        mark_stage(&mut record, Stage::Import);
        table.records.push(record);
    }
    table
}

/// Locate, read and stamp the source file of `config`.
///
/// Missing or unreadable sources are errors; a configured column absent
/// from the file is only a warning.
pub fn run(
    config: &TableConfiguration,
    settings: &PipelineSettings,
    run: &mut PipelineRun,
) -> SourceResult<StageTable> {
    let path = resolve_source_file(&settings.source_dir, &config.source_pattern)?;
    let source = read_source(&path)?;

    info!(
        table = %config.name,
        run_id = %run.id,
        file = %source.file_name(),
        encoding = %source.encoding,
        rows = source.rows.len(),
        "imported source"
    );
    run.log_info(format!(
        "read {} rows from {} ({}, delimiter {:?})",
        source.rows.len(),
        source.file_name(),
        source.encoding,
        source.delimiter
    ));

    for rule in &config.columns {
        if !source.headers.iter().any(|h| *h == rule.source) {
            warn!(table = %config.name, column = %rule.source, "configured column missing from source");
            run.log_warning(format!("configured column '{}' is missing from the source", rule.source));
        }
    }

    Ok(raw_table(&config.name, &source, run))
}
