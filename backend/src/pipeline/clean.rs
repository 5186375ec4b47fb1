//! Stage 3: Clean.
//!
//! Applies each column's cleaning operations, parses composite identifiers
//! and flags payments that need allocation. Rows are processed in chunks to
//! bound memory; nothing here drops a row.

use serde_json::Value;
use tracing::debug;

use crate::cache::CrossTableCache;
use crate::config::{CleanContext, TableConfiguration, TableKind};
use crate::identifier::{fields, parse_identifier, CourseCatalog, ParseQuality};
use crate::models::{audit, mark_stage, source_row, PipelineRun, Record, Stage, StageTable};
use crate::transform::dsl::clean_row;

/// Column set on payments without an explicit target.
pub const NEEDS_ALLOCATION: &str = "needs_allocation";

/// Output of the Clean stage.
#[derive(Debug, Clone)]
pub struct CleanOutput {
    pub cleaned: StageTable,
    /// One record per component of a multi-component class identifier.
    pub components: StageTable,
}

fn component_record(record: &Record, identifier_column: &str) -> Option<Record> {
    if record.get(fields::IS_LANGUAGE).and_then(Value::as_bool) != Some(true) {
        return None;
    }
    let component = record.get(fields::COMPONENT).and_then(Value::as_str)?;
    let mut out = Record::new();
    for column in [audit::RUN_ID, audit::SOURCE_ROW, audit::SOURCE_FILE] {
        if let Some(value) = record.get(column) {
            out.insert(column.to_string(), value.clone());
        }
    }
    out.insert(
        identifier_column.to_string(),
        record.get(identifier_column).cloned().unwrap_or(Value::Null),
    );
    for field in [fields::TERM, fields::STANDARDIZED_CODE, fields::LEVEL, fields::SECTION] {
        out.insert(field.to_string(), record.get(field).cloned().unwrap_or(Value::Null));
    }
    out.insert(fields::COMPONENT.to_string(), Value::String(component.to_string()));
    Some(out)
}

fn parse_identifier_column(
    record: &mut Record,
    column: &str,
    catalog: &dyn CourseCatalog,
    run: &mut PipelineRun,
) {
    let raw = StageTable::text(record, column)
        .map(|t| t.into_owned())
        .unwrap_or_default();
    let parsed = parse_identifier(&raw, catalog);
    if parsed.quality != ParseQuality::Complete {
        run.log_row_warning(
            source_row(record),
            column,
            format!("'{}': {}", raw, parsed.warnings.join("; ")),
        );
    }
    parsed.write_to(record);
}

/// Clean every raw row of `config`'s table.
pub fn run(
    raw: &StageTable,
    config: &TableConfiguration,
    ctx: &CleanContext,
    catalog: &dyn CourseCatalog,
    cache: &mut CrossTableCache,
    chunk_size: usize,
    run: &mut PipelineRun,
) -> CleanOutput {
    let mut columns: Vec<String> = audit::ALL.iter().map(|c| c.to_string()).collect();
    columns.extend(config.columns.iter().map(|c| c.target.clone()));
    if config.identifier_column.is_some() {
        columns.extend(fields::ALL.iter().map(|c| c.to_string()));
    }
    if config.kind == TableKind::Financial {
        columns.push(NEEDS_ALLOCATION.to_string());
    }

    let mut cleaned = StageTable::new(raw.name.clone(), columns);
    let mut components = StageTable::new(raw.name.clone(), Vec::new());
    if let Some(id_column) = &config.identifier_column {
        components.columns = vec![
            audit::RUN_ID.to_string(),
            audit::SOURCE_ROW.to_string(),
            audit::SOURCE_FILE.to_string(),
            id_column.clone(),
            fields::TERM.to_string(),
            fields::STANDARDIZED_CODE.to_string(),
            fields::LEVEL.to_string(),
            fields::SECTION.to_string(),
            fields::COMPONENT.to_string(),
        ];
    }

    for (index, chunk) in raw.records.chunks(chunk_size.max(1)).enumerate() {
        debug!(table = %config.name, chunk = index, rows = chunk.len(), "cleaning chunk");
        for raw_record in chunk {
            let row = clean_row(raw_record, config, ctx, cache);
            for issue in &row.issues {
                run.log_row_warning(issue.row, &issue.field, issue.message.clone());
            }
            let mut record = row.record;

            if let Some(id_column) = &config.identifier_column {
                parse_identifier_column(&mut record, id_column, catalog, run);
                if let Some(component) = component_record(&record, id_column) {
                    components.records.push(component);
                }
            }
            if config.kind == TableKind::Financial {
                let untargeted = StageTable::text(&record, "class_code").map_or(true, |t| t.trim().is_empty());
                record.insert(NEEDS_ALLOCATION.to_string(), Value::Bool(untargeted));
            }

            mark_stage(&mut record, Stage::Clean);
            cleaned.records.push(record);
        }
    }
    CleanOutput { cleaned, components }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tables;
    use crate::identifier::NoCatalog;
    use serde_json::json;

    fn raw_enrollment(row: usize, code: &str) -> Record {
        let mut record = Record::new();
        record.insert(audit::SOURCE_ROW.into(), json!(row));
        record.insert(audit::TRANSFORM_PATH.into(), json!("import"));
        record.insert("StudentID".into(), json!(" s001"));
        record.insert("TermID".into(), json!("2010t1e"));
        record.insert("ClassCode".into(), json!(code));
        record.insert("Credits".into(), json!("3"));
        record
    }

    #[test]
    fn test_clean_parses_identifiers() {
        let config = tables::class_enrollments();
        let mut raw = StageTable::new("class_enrollments", vec![]);
        raw.records = vec![
            raw_enrollment(1, "2010T1E-582-A-A1A"),
            raw_enrollment(2, "2010t1e-582-a-zzzz"),
        ];
        let mut cache = CrossTableCache::new();
        let mut pipeline_run = PipelineRun::new("class_enrollments");
        let out = run(
            &raw,
            &config,
            &CleanContext::default(),
            &NoCatalog,
            &mut cache,
            1,
            &mut pipeline_run,
        );

        assert_eq!(out.cleaned.len(), 2);
        let first = &out.cleaned.records[0];
        assert_eq!(first["student_id"], json!("S001"));
        assert_eq!(first[fields::LEVEL], json!("01"));
        assert_eq!(first[fields::SECTION], json!("A"));
        assert_eq!(first[audit::TRANSFORM_PATH], json!("import>clean"));

        let second = &out.cleaned.records[1];
        assert_eq!(second[fields::SECTION], json!("unknown"));
        assert!(pipeline_run.warnings().any(|w| w.row == Some(2)));
    }

    #[test]
    fn test_payments_flag_allocation() {
        let config = tables::payments();
        let mut raw = StageTable::new("payments", vec![]);
        let mut targeted = Record::new();
        targeted.insert("ClassCode".into(), json!("GESL-01"));
        raw.records = vec![targeted, Record::new()];

        let out = run(
            &raw,
            &config,
            &CleanContext::default(),
            &NoCatalog,
            &mut CrossTableCache::new(),
            100,
            &mut PipelineRun::new("payments"),
        );
        assert_eq!(out.cleaned.records[0][NEEDS_ALLOCATION], json!(false));
        assert_eq!(out.cleaned.records[1][NEEDS_ALLOCATION], json!(true));
        assert!(out.components.is_empty());
    }
}
