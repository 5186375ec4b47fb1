//! Stage 5: Transform.

use crate::config::TableConfiguration;
use crate::models::{mark_stage, PipelineRun, Stage, StageTable};
use crate::registry::PipelineRegistry;
use crate::transform::dsl::apply_transformations;

/// Apply the table's transformation rules to every valid row.
pub fn run(
    valid: &StageTable,
    config: &TableConfiguration,
    registry: &PipelineRegistry,
    run: &mut PipelineRun,
) -> StageTable {
    let mut columns = valid.columns.clone();
    for rule in &config.transformations {
        if !rule.preserve_original && rule.target != rule.source {
            columns.retain(|c| *c != rule.source);
        }
    }
    let mut table = StageTable::new(valid.name.clone(), columns);
    for rule in &config.transformations {
        table.ensure_column(&rule.target);
    }

    for record in &valid.records {
        let mut record = record.clone();
        let errors = apply_transformations(
            &mut record,
            &config.name,
            run.id,
            &config.transformations,
            |name| registry.transformer(name),
        );
        for error in &errors {
            run.log_row_warning(error.row, &error.field, error.message.clone());
        }
        mark_stage(&mut record, Stage::Transform);
        table.records.push(record);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{tables, PipelineSettings};
    use crate::models::{audit, Record};
    use serde_json::json;

    #[test]
    fn test_transform_students() {
        let registry = PipelineRegistry::with_builtin_tables(&PipelineSettings::default()).unwrap();
        let config = tables::students();
        let mut valid = StageTable::new("students", vec!["student_id".into(), "khmer_name_legacy".into()]);
        let mut record = Record::new();
        record.insert(audit::SOURCE_ROW.into(), json!(1));
        record.insert("student_id".into(), json!("S001"));
        record.insert("khmer_name_legacy".into(), json!("ek"));
        valid.records.push(record);

        let out = run(&valid, &config, &registry, &mut PipelineRun::new("students"));
        assert_eq!(out.columns, vec!["student_id", "khmer_name_legacy", "khmer_name"]);
        assert_eq!(out.records[0]["khmer_name"], json!("\u{1780}\u{17C1}"));
        assert_eq!(out.records[0]["khmer_name_legacy"], json!("ek"));
    }

    #[test]
    fn test_non_preserved_source_column_dropped() {
        let registry = PipelineRegistry::with_builtin_tables(&PipelineSettings::default()).unwrap();
        let config = tables::class_enrollments();
        let mut valid = StageTable::new("class_enrollments", vec!["teacher_legacy".into()]);
        let mut record = Record::new();
        record.insert("teacher_legacy".into(), serde_json::Value::Null);
        valid.records.push(record);

        let out = run(&valid, &config, &registry, &mut PipelineRun::new("class_enrollments"));
        assert_eq!(out.columns, vec!["teacher"]);
        assert!(out.records[0]["teacher"].is_null());
    }
}
