//! Stage 6: Split.
//!
//! Expands transformed rows into destination records, then checks each
//! derived record against its contract. A record that fails is excluded
//! together with everything that refers to it.

use serde_json::Value;
use std::collections::HashSet;
use tracing::warn;

use crate::allocation::{AllocationEngine, EnrollmentLookup};
use crate::config::{TableConfiguration, TableKind};
use crate::models::{ErrorKind, PipelineRun, Record, RowCounts, RowError, StageTable};
use crate::transform::grouper::{split_enrollments, split_payments, split_reference, SplitOutput};
use crate::validation::contracts::Contract;

/// Output tables of the Split stage. Absent tables are not written.
#[derive(Debug, Clone, Default)]
pub struct SplitTables {
    pub headers: StageTable,
    pub sessions: Option<StageTable>,
    pub lines: Option<StageTable>,
    pub mapping: StageTable,
    pub allocation_log: Option<StageTable>,
    pub counts: RowCounts,
}

/// Column order of a derived table: the keys of its first record.
fn to_table(name: &str, records: Vec<Record>) -> StageTable {
    let columns = records
        .first()
        .map(|r| r.keys().cloned().collect())
        .unwrap_or_default();
    StageTable {
        name: name.to_string(),
        columns,
        records,
    }
}

fn id_of(record: &Record, field: &str) -> Option<String> {
    record.get(field).and_then(Value::as_str).map(str::to_string)
}

fn row_of(mapping: &[Record], id: &str) -> usize {
    mapping
        .iter()
        .find(|m| m.get("derived_id").and_then(Value::as_str) == Some(id))
        .and_then(|m| m.get("source_row"))
        .and_then(Value::as_u64)
        .unwrap_or(0) as usize
}

/// Source row of a derived record: its own `source_row` when it carries one,
/// else the first mapping entry for its id.
fn derived_row(record: &Record, id: &str, mapping: &[Record]) -> usize {
    record
        .get("source_row")
        .and_then(Value::as_u64)
        .map(|r| r as usize)
        .unwrap_or_else(|| row_of(mapping, id))
}

/// Drop records that break `contract`, or whose parent was dropped. Each
/// dropped record is reported against its own source row.
fn enforce(
    records: Vec<Record>,
    contract: Option<Contract>,
    parents: &[&str],
    excluded: &mut HashSet<String>,
    mapping: &[Record],
    errors: &mut Vec<RowError>,
) -> Vec<Record> {
    let mut kept = Vec::with_capacity(records.len());
    for record in records {
        let id = id_of(&record, "id").unwrap_or_default();
        let orphaned_by = parents.iter().find_map(|p| {
            id_of(&record, p)
                .filter(|parent| excluded.contains(parent))
                .map(|parent| (*p, parent))
        });
        if let Some((field, parent)) = orphaned_by {
            errors.push(RowError::new(
                derived_row(&record, &id, mapping),
                field,
                ErrorKind::Contract,
                format!("parent {} excluded", parent),
            ));
            excluded.insert(id);
            continue;
        }
        if let Some(contract) = contract {
            if let Err(violations) = contract.check(&Value::Object(record.clone())) {
                errors.push(RowError::new(
                    derived_row(&record, &id, mapping),
                    contract.name(),
                    ErrorKind::Contract,
                    violations.join("; "),
                ));
                excluded.insert(id);
                continue;
            }
        }
        kept.push(record);
    }
    kept
}

/// Split `transformed` according to the table kind.
pub fn run(
    transformed: &StageTable,
    config: &TableConfiguration,
    engine: &AllocationEngine,
    enrollments: &dyn EnrollmentLookup,
    run: &mut PipelineRun,
) -> SplitTables {
    let name = config.name.as_str();
    let SplitOutput {
        headers,
        sessions,
        lines,
        mapping,
        allocation_log,
        mut errors,
        warnings,
    } = match config.kind {
        TableKind::Reference => {
            split_reference(name, config.provides.first().map(String::as_str), &transformed.records)
        }
        TableKind::Enrollment => split_enrollments(name, &transformed.records),
        TableKind::Financial => split_payments(name, &transformed.records, engine, enrollments),
    };

    let (header_contract, session_contract, line_contract) = match config.kind {
        TableKind::Reference => (
            config.validator.as_deref().and_then(Contract::for_reference),
            None,
            None,
        ),
        TableKind::Enrollment => (
            Some(Contract::EnrollmentHeader),
            Some(Contract::EnrollmentSession),
            Some(Contract::EnrollmentLine),
        ),
        TableKind::Financial => (Some(Contract::PaymentHeader), None, Some(Contract::PaymentLine)),
    };

    let mut excluded = HashSet::new();
    let headers = enforce(headers, header_contract, &[], &mut excluded, &mapping, &mut errors);
    let sessions = enforce(sessions, session_contract, &["header_id"], &mut excluded, &mapping, &mut errors);
    let lines = enforce(
        lines,
        line_contract,
        &["header_id", "session_id"],
        &mut excluded,
        &mapping,
        &mut errors,
    );
    let mapping: Vec<Record> = mapping
        .into_iter()
        .filter(|m| id_of(m, "derived_id").map_or(true, |id| !excluded.contains(&id)))
        .collect();
    let allocation_log: Vec<Record> = allocation_log
        .into_iter()
        .filter(|r| id_of(r, "header_id").map_or(true, |id| !excluded.contains(&id)))
        .collect();

    for warning in &warnings {
        run.log_row_warning(warning.row, &warning.field, warning.message.clone());
    }
    for error in &errors {
        run.log_row_error(error);
    }
    if !errors.is_empty() {
        warn!(table = %name, run_id = %run.id, excluded = excluded.len(), "derived records excluded");
    }

    let failed_rows: HashSet<usize> = errors.iter().map(|e| e.row).collect();
    let counts = RowCounts {
        processed: transformed.len(),
        valid: transformed.len().saturating_sub(failed_rows.len()),
        invalid: failed_rows.len(),
    };

    let (sessions, lines, allocation_log) = match config.kind {
        TableKind::Reference => (None, None, None),
        TableKind::Enrollment => (Some(sessions), Some(lines), None),
        TableKind::Financial => (None, Some(lines), Some(allocation_log)),
    };

    SplitTables {
        headers: to_table(name, headers),
        sessions: sessions.map(|s| to_table(name, s)),
        lines: lines.map(|l| to_table(name, l)),
        mapping: to_table(name, mapping),
        allocation_log: allocation_log.map(|a| to_table(name, a)),
        counts,
    }
}
