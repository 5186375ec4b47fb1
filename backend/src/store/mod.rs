//! Destination store for stage output tables and run metadata.
//!
//! Every write fully replaces the previous version of a table, which is what
//! makes reruns idempotent.

use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::models::{Stage, StageRunRecord, StageTable};

// =============================================================================
// Output table names
// =============================================================================

/// Purpose of a stage output table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputKind {
    Raw,
    Profile,
    Cleaned,
    CleanedComponents,
    ValidatedValid,
    ValidatedInvalid,
    Transformed,
    SplitHeaders,
    SplitSessions,
    SplitLines,
    SplitMapping,
    AllocationLog,
}

impl OutputKind {
    pub fn suffix(self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Profile => "profile",
            Self::Cleaned => "cleaned",
            Self::CleanedComponents => "cleaned_components",
            Self::ValidatedValid => "validated_valid",
            Self::ValidatedInvalid => "validated_invalid",
            Self::Transformed => "transformed",
            Self::SplitHeaders => "split_headers",
            Self::SplitSessions => "split_sessions",
            Self::SplitLines => "split_lines",
            Self::SplitMapping => "split_mapping",
            Self::AllocationLog => "allocation_log",
        }
    }
}

/// Deterministic output table name, e.g. `students_validated_valid`.
pub fn output_table_name(table: &str, kind: OutputKind) -> String {
    format!("{}_{}", table, kind.suffix())
}

// =============================================================================
// Store trait
// =============================================================================

/// Persistence for stage tables and per (table, stage) run records.
pub trait TableStore {
    /// Write `table` under `name`, replacing any previous version.
    fn replace_table(&mut self, name: &str, table: &StageTable) -> StoreResult<()>;

    /// Read back a table written by [`TableStore::replace_table`].
    fn read_table(&self, name: &str) -> StoreResult<StageTable>;

    /// Persist the record for one (table, stage), replacing the previous one.
    fn write_run_record(&mut self, record: &StageRunRecord) -> StoreResult<()>;

    /// Latest record for one (table, stage), if any.
    fn read_run_record(&self, table: &str, stage: Stage) -> StoreResult<Option<StageRunRecord>>;

    fn has_table(&self, name: &str) -> bool {
        self.read_table(name).is_ok()
    }
}

// =============================================================================
// In-memory store
// =============================================================================

/// Store kept in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: HashMap<String, StageTable>,
    runs: HashMap<(String, Stage), StageRunRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of every stored table, sorted.
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.keys().cloned().collect();
        names.sort();
        names
    }

    /// Every run record, ordered by table then stage.
    pub fn run_records(&self) -> Vec<&StageRunRecord> {
        let mut records: Vec<&StageRunRecord> = self.runs.values().collect();
        records.sort_by(|a, b| (&a.table, a.stage).cmp(&(&b.table, b.stage)));
        records
    }
}

impl TableStore for MemoryStore {
    fn replace_table(&mut self, name: &str, table: &StageTable) -> StoreResult<()> {
        let mut stored = table.clone();
        stored.name = name.to_string();
        self.tables.insert(name.to_string(), stored);
        Ok(())
    }

    fn read_table(&self, name: &str) -> StoreResult<StageTable> {
        self.tables
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::TableNotFound(name.to_string()))
    }

    fn write_run_record(&mut self, record: &StageRunRecord) -> StoreResult<()> {
        self.runs
            .insert((record.table.clone(), record.stage), record.clone());
        Ok(())
    }

    fn read_run_record(&self, table: &str, stage: Stage) -> StoreResult<Option<StageRunRecord>> {
        Ok(self.runs.get(&(table.to_string(), stage)).cloned())
    }

    fn has_table(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }
}

// =============================================================================
// File-system store
// =============================================================================

/// Directory under the output dir holding the typed copy of each table.
const TYPED_DIR: &str = ".tables";

/// Directory under the output dir holding run records.
const RUNS_DIR: &str = "_runs";

/// Store writing one CSV per table under an output directory.
///
/// CSV is the destination-facing format. A typed JSON copy is written next
/// to it so a later stage can be re-run from stored output without losing
/// coerced types.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(root.join(TYPED_DIR))?;
        fs::create_dir_all(root.join(RUNS_DIR))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn csv_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.csv", name))
    }

    fn typed_path(&self, name: &str) -> PathBuf {
        self.root.join(TYPED_DIR).join(format!("{}.json", name))
    }

    fn run_path(&self, table: &str, stage: Stage) -> PathBuf {
        self.root
            .join(RUNS_DIR)
            .join(format!("{}_{}_{}.json", table, stage.number(), stage))
    }

    fn write_csv(&self, path: &Path, table: &StageTable) -> StoreResult<()> {
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(&table.columns)?;
        for record in &table.records {
            let row: Vec<String> = table
                .columns
                .iter()
                .map(|column| cell_text(record.get(column)))
                .collect();
            writer.write_record(&row)?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// CSV cell text: strings verbatim, null and missing empty, others as JSON.
fn cell_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Write through a temporary file so a failed write never leaves a
/// half-written table behind.
fn write_atomic(path: &Path, content: &[u8]) -> StoreResult<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, content)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

impl TableStore for FsStore {
    fn replace_table(&mut self, name: &str, table: &StageTable) -> StoreResult<()> {
        let mut stored = table.clone();
        stored.name = name.to_string();

        let csv_path = self.csv_path(name);
        let csv_tmp = csv_path.with_extension("csv.tmp");
        self.write_csv(&csv_tmp, &stored)?;
        fs::rename(&csv_tmp, &csv_path)?;

        write_atomic(&self.typed_path(name), &serde_json::to_vec(&stored)?)?;
        debug!(table = name, rows = stored.len(), "replaced table");
        Ok(())
    }

    fn read_table(&self, name: &str) -> StoreResult<StageTable> {
        let path = self.typed_path(name);
        if !path.exists() {
            return Err(StoreError::TableNotFound(name.to_string()));
        }
        let content = fs::read(&path)?;
        Ok(serde_json::from_slice(&content)?)
    }

    fn write_run_record(&mut self, record: &StageRunRecord) -> StoreResult<()> {
        let content = serde_json::to_vec_pretty(record)?;
        write_atomic(&self.run_path(&record.table, record.stage), &content)
    }

    fn read_run_record(&self, table: &str, stage: Stage) -> StoreResult<Option<StageRunRecord>> {
        let path = self.run_path(table, stage);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read(&path)?;
        Ok(Some(serde_json::from_slice(&content)?))
    }

    fn has_table(&self, name: &str) -> bool {
        self.typed_path(name).exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Record, RowCounts, RunStatus};
    use chrono::Utc;
    use serde_json::json;
    use tempfile::tempdir;
    use uuid::Uuid;

    fn sample_table() -> StageTable {
        let mut table = StageTable::new("t", vec!["id".into(), "credits".into(), "note".into()]);
        let mut record = Record::new();
        record.insert("id".into(), json!("S001"));
        record.insert("credits".into(), json!(3));
        record.insert("note".into(), Value::Null);
        table.records.push(record);
        table
    }

    fn sample_run(stage: Stage, processed: usize) -> StageRunRecord {
        StageRunRecord {
            run_id: Uuid::new_v4(),
            table: "students".into(),
            stage,
            status: RunStatus::Completed,
            started_at: Utc::now(),
            finished_at: Utc::now(),
            counts: RowCounts {
                processed,
                valid: processed,
                invalid: 0,
            },
            config_snapshot: json!({"name": "students"}),
            log: Vec::new(),
        }
    }

    #[test]
    fn test_output_names() {
        assert_eq!(output_table_name("students", OutputKind::Raw), "students_raw");
        assert_eq!(
            output_table_name("payments", OutputKind::AllocationLog),
            "payments_allocation_log"
        );
        assert_eq!(
            output_table_name("class_enrollments", OutputKind::ValidatedInvalid),
            "class_enrollments_validated_invalid"
        );
    }

    #[test]
    fn test_memory_store_replaces() {
        let mut store = MemoryStore::new();
        store.replace_table("a", &sample_table()).unwrap();
        store.replace_table("a", &StageTable::new("a", vec![])).unwrap();
        assert!(store.read_table("a").unwrap().is_empty());
        assert!(matches!(store.read_table("b"), Err(StoreError::TableNotFound(_))));
    }

    #[test]
    fn test_fs_store_roundtrip_keeps_types() {
        let dir = tempdir().unwrap();
        let mut store = FsStore::new(dir.path()).unwrap();
        store.replace_table("students_cleaned", &sample_table()).unwrap();

        let back = store.read_table("students_cleaned").unwrap();
        assert_eq!(back.name, "students_cleaned");
        assert_eq!(back.records[0]["credits"], json!(3));
        assert_eq!(back.records[0]["note"], Value::Null);

        let csv = fs::read_to_string(store.csv_path("students_cleaned")).unwrap();
        assert_eq!(csv, "id,credits,note\nS001,3,\n");
    }

    #[test]
    fn test_fs_store_run_record_replaced_per_stage() {
        let dir = tempdir().unwrap();
        let mut store = FsStore::new(dir.path()).unwrap();
        store.write_run_record(&sample_run(Stage::Clean, 5)).unwrap();
        store.write_run_record(&sample_run(Stage::Clean, 7)).unwrap();

        let record = store.read_run_record("students", Stage::Clean).unwrap().unwrap();
        assert_eq!(record.counts.processed, 7);
        assert!(store.read_run_record("students", Stage::Split).unwrap().is_none());
    }
}
