//! Stage 4: Validate.
//!
//! Every cleaned row lands in exactly one of the valid or invalid outputs.
//! Invalid rows carry their structured errors in the `_errors` column.

use serde_json::Value;
use tracing::{debug, warn};

use crate::config::TableConfiguration;
use crate::error::ConfigResult;
use crate::models::{mark_stage, PipelineRun, RowCounts, Stage, StageTable};
use crate::validation::business::BusinessValidator;
use crate::validation::TableValidator;

/// Column of the invalid output holding the row's errors.
pub const ERRORS_COLUMN: &str = "_errors";

/// Output of the Validate stage.
#[derive(Debug, Clone)]
pub struct ValidateOutput {
    pub valid: StageTable,
    pub invalid: StageTable,
    pub counts: RowCounts,
}

pub fn run(
    cleaned: &StageTable,
    config: &TableConfiguration,
    business: Option<BusinessValidator>,
    chunk_size: usize,
    run: &mut PipelineRun,
) -> ConfigResult<ValidateOutput> {
    let validator = TableValidator::new(config, business)?;

    let mut valid = StageTable::new(cleaned.name.clone(), cleaned.columns.clone());
    let mut invalid = StageTable::new(cleaned.name.clone(), cleaned.columns.clone());
    invalid.ensure_column(ERRORS_COLUMN);

    for (index, chunk) in cleaned.records.chunks(chunk_size.max(1)).enumerate() {
        debug!(table = %config.name, chunk = index, rows = chunk.len(), "validating chunk");
        for record in chunk {
            let outcome = validator.check(record);
            for warning in &outcome.warnings {
                run.log_row_warning(warning.row, &warning.field, warning.message.clone());
            }

            let mut record = record.clone();
            mark_stage(&mut record, Stage::Validate);
            if outcome.is_valid() {
                valid.records.push(record);
            } else {
                for error in &outcome.errors {
                    run.log_row_error(error);
                }
                let errors = serde_json::to_value(&outcome.errors).unwrap_or(Value::Null);
                record.insert(ERRORS_COLUMN.to_string(), errors);
                invalid.records.push(record);
            }
        }
    }

    let counts = RowCounts {
        processed: cleaned.len(),
        valid: valid.len(),
        invalid: invalid.len(),
    };

    if counts.processed > 0 {
        let rate = counts.valid as f64 / counts.processed as f64;
        if rate < config.thresholds.min_success_rate {
            warn!(
                table = %config.name,
                run_id = %run.id,
                success_rate = rate,
                target = config.thresholds.min_success_rate,
                "success rate below target"
            );
            run.log_warning(format!(
                "success rate {:.1}% is below the {:.1}% target",
                rate * 100.0,
                config.thresholds.min_success_rate * 100.0
            ));
        }
    }

    Ok(ValidateOutput {
        valid,
        invalid,
        counts,
    })
}
