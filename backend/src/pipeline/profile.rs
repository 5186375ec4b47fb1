//! Stage 2: Profile.
//!
//! One profile record per source column: counts, lengths, most frequent
//! values and plain-language recommendations.

use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

use crate::config::{CleanContext, TableConfiguration, ValidationPriority};
use crate::models::{audit, PipelineRun, Record, StageTable};

/// Statistics of one column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnProfile {
    pub column: String,
    pub row_count: usize,
    pub distinct_count: usize,
    pub null_count: usize,
    /// Populated share, 0-100
    pub populated_pct: f64,
    pub min_length: usize,
    pub max_length: usize,
    /// `(value, count)`, most frequent first, ties alphabetical
    pub top_values: Vec<(String, usize)>,
    pub recommendations: Vec<String>,
}

impl ColumnProfile {
    fn to_record(&self) -> Record {
        let top = self
            .top_values
            .iter()
            .map(|(v, n)| format!("{} ({})", v, n))
            .collect::<Vec<_>>()
            .join("; ");
        let mut record = Record::new();
        record.insert("column".into(), Value::String(self.column.clone()));
        record.insert("row_count".into(), Value::from(self.row_count));
        record.insert("distinct_count".into(), Value::from(self.distinct_count));
        record.insert("null_count".into(), Value::from(self.null_count));
        record.insert("populated_pct".into(), Value::from(self.populated_pct));
        record.insert("min_length".into(), Value::from(self.min_length));
        record.insert("max_length".into(), Value::from(self.max_length));
        record.insert("top_values".into(), Value::String(top));
        record.insert(
            "recommendations".into(),
            Value::String(self.recommendations.join(" ")),
        );
        record
    }
}

/// Profile one column of `records`.
pub fn profile_column(records: &[Record], column: &str, top_n: usize, nulls: &CleanContext) -> ColumnProfile {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut null_count = 0;
    let mut min_length = usize::MAX;
    let mut max_length = 0;

    for record in records {
        let text = record.get(column).and_then(Value::as_str).unwrap_or("");
        if nulls.is_null_literal(text) {
            null_count += 1;
            continue;
        }
        let length = text.chars().count();
        min_length = min_length.min(length);
        max_length = max_length.max(length);
        *counts.entry(text).or_default() += 1;
    }

    let mut top: Vec<(String, usize)> = counts.iter().map(|(v, n)| (v.to_string(), *n)).collect();
    top.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    top.truncate(top_n);

    let row_count = records.len();
    let populated_pct = if row_count == 0 {
        0.0
    } else {
        ((row_count - null_count) as f64 * 1000.0 / row_count as f64).round() / 10.0
    };

    ColumnProfile {
        column: column.to_string(),
        row_count,
        distinct_count: counts.len(),
        null_count,
        populated_pct,
        min_length: if min_length == usize::MAX { 0 } else { min_length },
        max_length,
        top_values: top,
        recommendations: Vec::new(),
    }
}

fn recommend(profile: &mut ColumnProfile, config: &TableConfiguration) {
    let rule = config.columns.iter().find(|c| c.source == profile.column);
    let Some(rule) = rule else {
        profile
            .recommendations
            .push(format!("column {} is not configured and will be dropped", profile.column));
        return;
    };

    let min_population = config.thresholds.min_population * 100.0;
    if profile.row_count > 0 && profile.populated_pct < min_population {
        let note = format!(
            "column {} is only {:.0}% populated",
            profile.column, profile.populated_pct
        );
        if rule.priority == ValidationPriority::Optional || rule.nullable {
            profile.recommendations.push(note);
        } else {
            profile
                .recommendations
                .push(format!("{}; required values will fail validation", note));
        }
    }
    if profile.row_count > 1 && profile.distinct_count == 1 && profile.null_count == 0 {
        profile
            .recommendations
            .push(format!("column {} holds a single value", profile.column));
    }
    if let Some(max) = rule.constraints.max_length {
        if profile.max_length > max {
            profile.recommendations.push(format!(
                "column {} has values up to {} characters (limit {})",
                profile.column, profile.max_length, max
            ));
        }
    }
}

/// Profile every non-audit column of the raw table.
pub fn run(
    raw: &StageTable,
    config: &TableConfiguration,
    top_n: usize,
    nulls: &CleanContext,
    run: &mut PipelineRun,
) -> StageTable {
    let mut table = StageTable::new(
        raw.name.clone(),
        [
            "column",
            "row_count",
            "distinct_count",
            "null_count",
            "populated_pct",
            "min_length",
            "max_length",
            "top_values",
            "recommendations",
        ]
        .iter()
        .map(|c| c.to_string())
        .collect(),
    );

    let columns = raw.columns.iter().filter(|c| !audit::ALL.contains(&c.as_str()));
    for column in columns {
        let mut profile = profile_column(&raw.records, column, top_n, nulls);
        recommend(&mut profile, config);
        for note in &profile.recommendations {
            run.log_warning(note.clone());
        }
        table.records.push(profile.to_record());
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ColumnRule, ColumnType, TableKind};
    use serde_json::json;

    fn rows(values: &[&str]) -> Vec<Record> {
        values
            .iter()
            .map(|v| {
                let mut r = Record::new();
                r.insert("Grade".into(), json!(v));
                r
            })
            .collect()
    }

    #[test]
    fn test_profile_counts() {
        let records = rows(&["A", "B", "A", "", "N/A", "Ab"]);
        let profile = profile_column(&records, "Grade", 2, &CleanContext::default());
        assert_eq!(profile.row_count, 6);
        assert_eq!(profile.null_count, 2);
        assert_eq!(profile.distinct_count, 3);
        assert_eq!(profile.min_length, 1);
        assert_eq!(profile.max_length, 2);
        assert_eq!(
            profile.top_values,
            vec![("A".to_string(), 2), ("Ab".to_string(), 1)]
        );
        assert!((profile.populated_pct - 66.7).abs() < 1e-9);
    }

    #[test]
    fn test_low_population_recommendation() {
        let config = TableConfiguration::new("t", "t*.csv", TableKind::Reference)
            .column(ColumnRule::new("Grade", "grade", ColumnType::Text));
        let mut raw = StageTable::new("t_raw", vec!["Grade".into(), "Other".into()]);
        raw.records = rows(&["A", "", "", ""]);

        let mut pipeline_run = PipelineRun::new("t");
        let table = run(&raw, &config, 3, &CleanContext::default(), &mut pipeline_run);
        assert_eq!(table.len(), 2);
        let grade = &table.records[0]["recommendations"];
        assert!(grade.as_str().unwrap().contains("only 25% populated"));
        let other = &table.records[1]["recommendations"];
        assert!(other.as_str().unwrap().contains("not configured"));
        assert_eq!(pipeline_run.warnings().count(), 2);
    }
}
