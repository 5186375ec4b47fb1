//! End-to-end runs over small CSV snapshots.

use legacymig::allocation::UNALLOCATED;
use legacymig::models::audit;
use legacymig::{
    FsStore, MemoryStore, Money, Pipeline, PipelineRegistry, PipelineSettings, RunStatus, Stage,
    StageTable, TableStore,
};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write_sources(dir: &Path) {
    fs::write(
        dir.join("students_2011.csv"),
        "StudentID,Name,KhmerName,BirthDate,Gender,Email,Active\n\
         s0001,dara sok,ek,01/02/2001,M,dara@example.org,Y\n\
         s0002,vanna chea,,15/07/2002,F,,N\n\
         bad id,,,,,,\n",
    )
    .unwrap();
    fs::write(
        dir.join("terms.csv"),
        "TermID,TermName,StartDate,EndDate\n\
         2010t1e,Term 1 2010,04/01/2010,31/03/2010\n",
    )
    .unwrap();
    fs::write(
        dir.join("class_enrollments.csv"),
        "StudentID,TermID,ClassCode,Grade,Credits,Attendance,Teacher\n\
         s0001,2010T1E,2010T1E-582-A-A1A,A,3,95.5,\n\
         s0001,2010T1E,2010T1E-583-M-M3B-Grammar,B,3,,\n",
    )
    .unwrap();
    fs::write(
        dir.join("payments.csv"),
        "ReceiptNo,StudentID,TermID,Amount,PaymentDate,ClassCode,Notes\n\
         r001,s0001,2010T1E,100.00,05/01/2010,,\n\
         r002,s0002,2010T1E,90,06/01/2010,,\n\
         r003,s0001,2010T1E,\"1,000.00\",07/01/2010,IEAP-01,\n",
    )
    .unwrap();
}

fn settings(source: &Path, output: &Path) -> PipelineSettings {
    PipelineSettings::with_dirs(source, output)
}

fn text<'a>(record: &'a serde_json::Map<String, Value>, field: &str) -> &'a str {
    record.get(field).and_then(Value::as_str).unwrap_or("")
}

#[test]
fn test_full_run_on_disk() {
    let source = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    write_sources(source.path());

    let settings = settings(source.path(), output.path());
    let registry = PipelineRegistry::with_builtin_tables(&settings).unwrap();
    assert_eq!(
        registry.processing_order(),
        ["students", "terms", "class_enrollments", "payments"]
    );

    let store = FsStore::new(output.path()).unwrap();
    let mut pipeline = Pipeline::new(registry, store, settings).unwrap();
    let summaries = pipeline.run_all();

    assert_eq!(summaries.len(), 4);
    for summary in &summaries {
        assert_eq!(summary.run.status, RunStatus::Completed, "{}: {:?}", summary.table, summary.error);
        assert!(summary.failed_dependencies.is_empty());
    }

    let store = pipeline.into_store();
    assert!(output.path().join("students_raw.csv").exists());
    assert!(output.path().join("payments_allocation_log.csv").exists());

    // Students: the malformed row is routed, not dropped
    let valid = store.read_table("students_validated_valid").unwrap();
    let invalid = store.read_table("students_validated_invalid").unwrap();
    assert_eq!(valid.len() + invalid.len(), 3);
    assert_eq!(invalid.len(), 1);
    assert!(invalid.records[0]["_errors"].as_array().is_some_and(|e| !e.is_empty()));

    let record = store.read_run_record("students", Stage::Validate).unwrap().unwrap();
    assert_eq!(record.counts.invalid, 1);
    assert_eq!(record.config_snapshot["name"], "students");

    // Enrollments: two language classes, one session each
    let headers = store.read_table("class_enrollments_split_headers").unwrap();
    let sessions = store.read_table("class_enrollments_split_sessions").unwrap();
    let lines = store.read_table("class_enrollments_split_lines").unwrap();
    assert_eq!(headers.len(), 2);
    assert_eq!(sessions.len(), 2);
    assert_eq!(lines.len(), 2);
    let components: Vec<&str> = sessions.records.iter().map(|s| text(s, "component")).collect();
    assert!(components.contains(&"GRAMMAR"));

    // Payments: every header is fully allocated
    check_payments(&store);
}

fn check_payments(store: &dyn TableStore) {
    let headers = store.read_table("payments_split_headers").unwrap();
    let lines = store.read_table("payments_split_lines").unwrap();
    assert_eq!(headers.len(), 3);

    let mut allocated: BTreeMap<String, i64> = BTreeMap::new();
    for line in &lines.records {
        let amount = Money::parse(text(line, "amount")).unwrap();
        *allocated.entry(text(line, "header_id").to_string()).or_default() += amount.cents();
    }
    let mut methods = BTreeMap::new();
    for header in &headers.records {
        let total = Money::parse(text(header, "amount")).unwrap();
        assert_eq!(allocated[text(header, "id")], total.cents());
        methods.insert(text(header, "receipt_no").to_string(), text(header, "method").to_string());
    }
    assert_eq!(methods["R001"], "calculated");
    assert_eq!(methods["R002"], "imputed");
    assert_eq!(methods["R003"], "direct");

    let log = store.read_table("payments_allocation_log").unwrap();
    assert!(log
        .records
        .iter()
        .any(|r| text(r, "receipt_no") == "R002" && text(r, "target") == UNALLOCATED));
}

#[test]
fn test_reruns_are_reproducible() {
    let source = TempDir::new().unwrap();
    write_sources(source.path());

    let run = |dir: &Path| -> (StageTable, StageTable) {
        let settings = settings(source.path(), dir);
        let registry = PipelineRegistry::with_builtin_tables(&settings).unwrap();
        let mut pipeline = Pipeline::new(registry, MemoryStore::new(), settings).unwrap();
        pipeline.run_all();
        let store = pipeline.into_store();
        // Each run gets a fresh run id
        let read = |name: &str| {
            let mut table = store.read_table(name).unwrap();
            for record in &mut table.records {
                record.remove(audit::RUN_ID);
            }
            table
        };
        (
            read("class_enrollments_split_headers"),
            read("payments_split_lines"),
        )
    };

    let first = run(Path::new("unused-a"));
    let second = run(Path::new("unused-b"));
    assert_eq!(first.0.records, second.0.records);
    assert_eq!(first.1.records, second.1.records);
}

#[test]
fn test_table_filter_and_missing_dependency() {
    let source = TempDir::new().unwrap();
    write_sources(source.path());

    let mut settings = settings(source.path(), Path::new("unused"));
    settings.tables = vec!["payments".to_string()];
    let registry = PipelineRegistry::with_builtin_tables(&settings).unwrap();
    let mut pipeline = Pipeline::new(registry, MemoryStore::new(), settings).unwrap();

    let summaries = pipeline.run_all();
    assert_eq!(summaries.len(), 1);
    assert!(summaries[0].is_success());
    // No enrollment output in the store: every bulk payment is imputed
    assert!(summaries[0]
        .run
        .warnings()
        .any(|w| w.message.contains("class_enrollments_validated_valid")));

    let headers = pipeline.store().read_table("payments_split_headers").unwrap();
    let imputed = headers
        .records
        .iter()
        .filter(|h| text(h, "method") == "imputed")
        .count();
    assert_eq!(imputed, 2);
}

#[test]
fn test_failed_source_does_not_stop_siblings() {
    let source = TempDir::new().unwrap();
    write_sources(source.path());
    fs::remove_file(source.path().join("terms.csv")).unwrap();

    let settings = settings(source.path(), Path::new("unused"));
    let registry = PipelineRegistry::with_builtin_tables(&settings).unwrap();
    let mut pipeline = Pipeline::new(registry, MemoryStore::new(), settings).unwrap();
    let summaries = pipeline.run_all();

    let by_table: BTreeMap<&str, _> = summaries.iter().map(|s| (s.table.as_str(), s)).collect();
    assert_eq!(by_table["terms"].failed_stage, Some(Stage::Import));
    assert!(by_table["students"].is_success());
    assert!(by_table["class_enrollments"].is_success());
    assert_eq!(by_table["class_enrollments"].failed_dependencies, vec!["terms"]);
    assert_eq!(by_table["payments"].failed_dependencies, vec!["terms"]);
}

#[test]
fn test_failed_enrollments_are_not_reused_for_allocation() {
    let source = TempDir::new().unwrap();
    write_sources(source.path());

    let settings = settings(source.path(), Path::new("unused"));
    let registry = PipelineRegistry::with_builtin_tables(&settings).unwrap();
    let mut pipeline = Pipeline::new(registry, MemoryStore::new(), settings).unwrap();
    assert!(pipeline.run_all().iter().all(|s| s.is_success()));

    // The store still holds the first run's enrollments
    fs::remove_file(source.path().join("class_enrollments.csv")).unwrap();
    let summaries = pipeline.run_all();
    let by_table: BTreeMap<&str, _> = summaries.iter().map(|s| (s.table.as_str(), s)).collect();
    assert_eq!(by_table["class_enrollments"].failed_stage, Some(Stage::Import));

    let payments = by_table["payments"];
    assert!(payments.is_success());
    assert_eq!(payments.failed_dependencies, vec!["class_enrollments"]);
    assert!(payments
        .run
        .warnings()
        .any(|w| w.message.contains("class_enrollments failed in this run")));

    let headers = pipeline.store().read_table("payments_split_headers").unwrap();
    let methods: BTreeMap<&str, &str> = headers
        .records
        .iter()
        .map(|h| (text(h, "receipt_no"), text(h, "method")))
        .collect();
    assert_eq!(methods["R001"], "imputed");
    assert_eq!(methods["R003"], "direct");
}
