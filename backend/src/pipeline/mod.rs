//! Six-stage pipeline engine.
//!
//! ```text
//! Import -> Profile -> Clean -> Validate -> Transform -> Split
//! ```
//!
//! Each stage reads the previous stage's table from the store and fully
//! replaces its own output tables, so any stage can be re-run on its own.
//! Every stage invocation persists a [`StageRunRecord`] carrying the
//! configuration it ran with.

pub mod clean;
pub mod import;
pub mod profile;
pub mod split;
pub mod transform;
pub mod validate;

use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, error, info, warn};

use crate::allocation::{AllocationEngine, EnrollmentIndex};
use crate::cache::CrossTableCache;
use crate::config::{CleanContext, PipelineSettings, TableConfiguration, TableKind};
use crate::error::{PipelineError, PipelineResult, SourceError, StoreError};
use crate::identifier::{CourseCatalog, NoCatalog, StaticCatalog};
use crate::models::{PipelineRun, RowCounts, RunStatus, Stage, StageRunRecord, StageTable};
use crate::registry::PipelineRegistry;
use crate::store::{output_table_name, OutputKind, TableStore};

// =============================================================================
// Run summary
// =============================================================================

/// Outcome of one table's run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub table: String,
    pub run: PipelineRun,
    /// Stage that aborted the run, if any
    pub failed_stage: Option<Stage>,
    pub error: Option<String>,
    /// Dependencies whose own run failed in the same invocation
    pub failed_dependencies: Vec<String>,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.run.status == RunStatus::Completed
    }

    pub fn counts(&self) -> RowCounts {
        self.run.counts
    }
}

fn all_valid(rows: usize) -> RowCounts {
    RowCounts {
        processed: rows,
        valid: rows,
        invalid: 0,
    }
}

// =============================================================================
// Pipeline
// =============================================================================

/// Runs registered tables through the six stages against a [`TableStore`].
pub struct Pipeline<S: TableStore> {
    registry: PipelineRegistry,
    store: S,
    settings: PipelineSettings,
    catalog: Box<dyn CourseCatalog>,
    clean_ctx: CleanContext,
    allocation: AllocationEngine,
    /// Table outcomes while `run_all` is in progress (true on success)
    outcomes: Option<BTreeMap<String, bool>>,
}

impl<S: TableStore> Pipeline<S> {
    /// Build a pipeline. Loads the course catalog when one is configured.
    pub fn new(registry: PipelineRegistry, store: S, settings: PipelineSettings) -> PipelineResult<Self> {
        let catalog: Box<dyn CourseCatalog> = match &settings.catalog_path {
            Some(path) => {
                let catalog = StaticCatalog::from_file(path).map_err(|source| SourceError::Unreadable {
                    path: path.clone(),
                    source,
                })?;
                info!(path = %path.display(), codes = catalog.len(), "loaded course catalog");
                Box::new(catalog)
            }
            None => Box::new(NoCatalog),
        };

        Ok(Self {
            clean_ctx: CleanContext::new(&settings.null_literals),
            allocation: AllocationEngine::new(settings.default_targets.clone()),
            registry,
            store,
            settings,
            catalog,
            outcomes: None,
        })
    }

    pub fn registry(&self) -> &PipelineRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    // -------------------------------------------------------------------------
    // Multi-table runs
    // -------------------------------------------------------------------------

    /// Run every selected table in processing order with one run-scoped
    /// cache. A failed table never stops the tables after it.
    pub fn run_all(&mut self) -> Vec<RunSummary> {
        let mut cache = CrossTableCache::new();
        self.outcomes = Some(BTreeMap::new());
        let order: Vec<String> = self
            .registry
            .processing_order()
            .iter()
            .filter(|name| self.settings.selects(name))
            .cloned()
            .collect();

        let mut failed: BTreeSet<String> = BTreeSet::new();
        let mut summaries = Vec::with_capacity(order.len());

        for name in order {
            let failed_dependencies: Vec<String> = self
                .registry
                .dependencies_of(&name)
                .into_iter()
                .filter(|dep| failed.contains(dep))
                .collect();
            if !failed_dependencies.is_empty() {
                warn!(table = %name, dependencies = ?failed_dependencies, "running despite failed dependencies");
            }

            let mut summary = match self.run_table(&name, &mut cache) {
                Ok(summary) => summary,
                Err(e) => {
                    let mut run = PipelineRun::new(name.clone());
                    run.fail(&e);
                    RunSummary {
                        table: name.clone(),
                        run,
                        failed_stage: None,
                        error: Some(e.to_string()),
                        failed_dependencies: Vec::new(),
                    }
                }
            };
            summary.failed_dependencies = failed_dependencies;
            if let Some(outcomes) = self.outcomes.as_mut() {
                outcomes.insert(name.clone(), summary.is_success());
            }
            if !summary.is_success() {
                failed.insert(name);
            }
            summaries.push(summary);
        }

        self.outcomes = None;
        for (field, stats) in cache.stats() {
            debug!(field = %field, hits = stats.hits, misses = stats.misses, "shared field cache");
        }
        summaries
    }

    /// Run all six stages of one table.
    ///
    /// An unknown table is an `Err`; a failing stage is not: it ends the run
    /// as failed and is reported in the summary.
    pub fn run_table(&mut self, name: &str, cache: &mut CrossTableCache) -> PipelineResult<RunSummary> {
        self.registry.get(name)?;
        let mut run = PipelineRun::new(name);
        info!(table = %name, run_id = %run.id, "starting table run");

        let mut failed_stage = None;
        let mut failure = None;
        for stage in Stage::ALL {
            let result = match stage {
                Stage::Import => self.import(name, &mut run),
                Stage::Profile => self.profile(name, &mut run),
                Stage::Clean => self.clean(name, &mut run, cache),
                Stage::Validate => self.validate(name, &mut run),
                Stage::Transform => self.transform(name, &mut run),
                Stage::Split => self.split(name, &mut run),
            };
            if let Err(e) = result {
                run.fail(&e);
                failed_stage = Some(stage);
                failure = Some(e.to_string());
                break;
            }
        }

        if failed_stage.is_none() {
            run.complete()?;
            info!(
                table = %name,
                run_id = %run.id,
                processed = run.counts.processed,
                valid = run.counts.valid,
                invalid = run.counts.invalid,
                "table run completed"
            );
        }

        Ok(RunSummary {
            table: name.to_string(),
            run,
            failed_stage,
            error: failure,
            failed_dependencies: Vec::new(),
        })
    }

    // -------------------------------------------------------------------------
    // Stages
    // -------------------------------------------------------------------------

    /// Enter `stage`, run `body` and persist the stage's run record.
    fn execute<F>(&mut self, name: &str, stage: Stage, run: &mut PipelineRun, body: F) -> PipelineResult<RowCounts>
    where
        F: FnOnce(&mut Self, &TableConfiguration, &mut PipelineRun) -> PipelineResult<RowCounts>,
    {
        let config = self.registry.get(name)?.clone();
        run.enter_stage(stage)?;
        let started_at = Utc::now();
        let log_start = run.log.len();
        debug!(table = %name, stage = %stage, run_id = %run.id, "stage started");

        let result = body(self, &config, run);
        let (status, counts) = match &result {
            Ok(counts) => {
                run.record_counts(*counts)?;
                (RunStatus::Completed, *counts)
            }
            Err(e) => {
                error!(table = %name, stage = %stage, run_id = %run.id, error = %e, "stage failed");
                run.fail(e);
                (RunStatus::Failed, RowCounts::default())
            }
        };

        let record = StageRunRecord {
            run_id: run.id,
            table: name.to_string(),
            stage,
            status,
            started_at,
            finished_at: Utc::now(),
            counts,
            config_snapshot: config.snapshot(),
            log: run.log[log_start..].to_vec(),
        };
        self.store.write_run_record(&record)?;

        if status == RunStatus::Completed {
            info!(
                table = %name,
                stage = %stage,
                run_id = %run.id,
                processed = counts.processed,
                valid = counts.valid,
                invalid = counts.invalid,
                "stage completed"
            );
        }
        result
    }

    fn read_output(&self, table: &str, kind: OutputKind) -> PipelineResult<StageTable> {
        Ok(self.store.read_table(&output_table_name(table, kind))?)
    }

    fn write_output(&mut self, table: &str, kind: OutputKind, data: &StageTable) -> PipelineResult<()> {
        Ok(self.store.replace_table(&output_table_name(table, kind), data)?)
    }

    /// Stage 1: read the source file into `{table}_raw`.
    pub fn import(&mut self, name: &str, run: &mut PipelineRun) -> PipelineResult<RowCounts> {
        self.execute(name, Stage::Import, run, |this, config, run| {
            let raw = import::run(config, &this.settings, run)?;
            this.write_output(name, OutputKind::Raw, &raw)?;
            Ok(all_valid(raw.len()))
        })
    }

    /// Stage 2: profile `{table}_raw` into `{table}_profile`.
    pub fn profile(&mut self, name: &str, run: &mut PipelineRun) -> PipelineResult<RowCounts> {
        self.execute(name, Stage::Profile, run, |this, config, run| {
            let raw = this.read_output(name, OutputKind::Raw)?;
            let profile = profile::run(&raw, config, this.settings.profile_top_n, &this.clean_ctx, run);
            this.write_output(name, OutputKind::Profile, &profile)?;
            Ok(all_valid(raw.len()))
        })
    }

    /// Stage 3: clean `{table}_raw` into `{table}_cleaned`, filling and
    /// reading `cache` for shared fields.
    pub fn clean(&mut self, name: &str, run: &mut PipelineRun, cache: &mut CrossTableCache) -> PipelineResult<RowCounts> {
        self.execute(name, Stage::Clean, run, |this, config, run| {
            let raw = this.read_output(name, OutputKind::Raw)?;
            let chunk_size = config.effective_chunk_size(this.settings.chunk_size);
            let out = clean::run(
                &raw,
                config,
                &this.clean_ctx,
                this.catalog.as_ref(),
                cache,
                chunk_size,
                run,
            );
            this.write_output(name, OutputKind::Cleaned, &out.cleaned)?;
            if config.identifier_column.is_some() {
                this.write_output(name, OutputKind::CleanedComponents, &out.components)?;
            }
            Ok(all_valid(out.cleaned.len()))
        })
    }

    /// Stage 4: split `{table}_cleaned` into valid and invalid rows.
    pub fn validate(&mut self, name: &str, run: &mut PipelineRun) -> PipelineResult<RowCounts> {
        self.execute(name, Stage::Validate, run, |this, config, run| {
            let cleaned = this.read_output(name, OutputKind::Cleaned)?;
            let business = config
                .validator
                .as_deref()
                .and_then(|v| this.registry.validator(v));
            let chunk_size = config.effective_chunk_size(this.settings.chunk_size);
            let out = validate::run(&cleaned, config, business, chunk_size, run)?;
            this.write_output(name, OutputKind::ValidatedValid, &out.valid)?;
            this.write_output(name, OutputKind::ValidatedInvalid, &out.invalid)?;
            Ok(out.counts)
        })
    }

    /// Stage 5: apply transformation rules to `{table}_validated_valid`.
    pub fn transform(&mut self, name: &str, run: &mut PipelineRun) -> PipelineResult<RowCounts> {
        self.execute(name, Stage::Transform, run, |this, config, run| {
            let valid = this.read_output(name, OutputKind::ValidatedValid)?;
            let transformed = transform::run(&valid, config, &this.registry, run);
            this.write_output(name, OutputKind::Transformed, &transformed)?;
            Ok(all_valid(transformed.len()))
        })
    }

    /// Stage 6: derive destination records from `{table}_transformed`.
    pub fn split(&mut self, name: &str, run: &mut PipelineRun) -> PipelineResult<RowCounts> {
        self.execute(name, Stage::Split, run, |this, config, run| {
            let transformed = this.read_output(name, OutputKind::Transformed)?;
            let enrollments = this.enrollment_index(config, run)?;
            let out = split::run(&transformed, config, &this.allocation, &enrollments, run);

            this.write_output(name, OutputKind::SplitHeaders, &out.headers)?;
            if let Some(sessions) = &out.sessions {
                this.write_output(name, OutputKind::SplitSessions, sessions)?;
            }
            if let Some(lines) = &out.lines {
                this.write_output(name, OutputKind::SplitLines, lines)?;
            }
            this.write_output(name, OutputKind::SplitMapping, &out.mapping)?;
            if let Some(log) = &out.allocation_log {
                this.write_output(name, OutputKind::AllocationLog, log)?;
            }
            Ok(out.counts)
        })
    }

    /// Enrollments a financial table allocates against: the valid rows of its
    /// enrollment dependencies. A dependency that failed earlier in the same
    /// `run_all` is skipped; one not run in it is read from the store as an
    /// earlier run left it. Both only warn.
    fn enrollment_index(&self, config: &TableConfiguration, run: &mut PipelineRun) -> PipelineResult<EnrollmentIndex> {
        if config.kind != TableKind::Financial {
            return Ok(EnrollmentIndex::new());
        }

        let mut combined = StageTable::new(config.name.clone(), Vec::new());
        for dep in self.registry.dependencies_of(&config.name) {
            if self.registry.get(&dep)?.kind != TableKind::Enrollment {
                continue;
            }
            let outcome = self.outcomes.as_ref().map(|o| o.get(&dep).copied());
            match outcome {
                Some(Some(false)) => {
                    warn!(table = %config.name, dependency = %dep, "enrollment dependency failed, not used");
                    run.log_warning(format!(
                        "{} failed in this run; payments without a class code will be imputed",
                        dep
                    ));
                    continue;
                }
                Some(None) => {
                    run.log_warning(format!("{} was not run; using its output from an earlier run", dep));
                }
                _ => {}
            }
            match self.read_output(&dep, OutputKind::ValidatedValid) {
                Ok(table) => combined.records.extend(table.records),
                Err(PipelineError::Store(StoreError::TableNotFound(missing))) => {
                    warn!(table = %config.name, dependency = %dep, "enrollment table not available");
                    run.log_warning(format!(
                        "{} not found; payments without a class code will be imputed",
                        missing
                    ));
                }
                Err(e) => return Err(e),
            }
        }
        let index = EnrollmentIndex::from_table(&combined);
        debug!(table = %config.name, pairs = index.len(), "enrollment index built");
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigError;
    use crate::store::MemoryStore;
    use std::fs;
    use tempfile::TempDir;

    fn pipeline(dir: &TempDir) -> Pipeline<MemoryStore> {
        let settings = PipelineSettings::with_dirs(dir.path(), dir.path().join("out"));
        let registry = PipelineRegistry::with_builtin_tables(&settings).unwrap();
        Pipeline::new(registry, MemoryStore::new(), settings).unwrap()
    }

    fn write_students(dir: &TempDir) {
        fs::write(
            dir.path().join("students.csv"),
            "StudentID,Name,KhmerName,BirthDate,Gender,Email,Active\n\
             s0001,dara sok,ek,01/02/2001,M,,yes\n\
             bad id,,,,,,\n",
        )
        .unwrap();
    }

    #[test]
    fn test_unknown_table_is_an_error() {
        let dir = TempDir::new().unwrap();
        let mut pipeline = pipeline(&dir);
        let err = pipeline
            .run_table("nope", &mut CrossTableCache::new())
            .unwrap_err();
        assert!(matches!(err, PipelineError::Config(ConfigError::UnknownTable(_))));
    }

    #[test]
    fn test_missing_source_fails_only_that_run() {
        let dir = TempDir::new().unwrap();
        let mut pipeline = pipeline(&dir);
        let summary = pipeline
            .run_table("terms", &mut CrossTableCache::new())
            .unwrap();
        assert!(!summary.is_success());
        assert_eq!(summary.failed_stage, Some(Stage::Import));
        assert_eq!(summary.run.status, RunStatus::Failed);

        let record = pipeline
            .store()
            .read_run_record("terms", Stage::Import)
            .unwrap()
            .unwrap();
        assert_eq!(record.status, RunStatus::Failed);
    }

    #[test]
    fn test_students_run_writes_every_stage() {
        let dir = TempDir::new().unwrap();
        write_students(&dir);
        let mut pipeline = pipeline(&dir);
        let summary = pipeline
            .run_table("students", &mut CrossTableCache::new())
            .unwrap();
        assert!(summary.is_success(), "{:?}", summary.error);

        let store = pipeline.store();
        for kind in [
            OutputKind::Raw,
            OutputKind::Profile,
            OutputKind::Cleaned,
            OutputKind::ValidatedValid,
            OutputKind::ValidatedInvalid,
            OutputKind::Transformed,
            OutputKind::SplitHeaders,
            OutputKind::SplitMapping,
        ] {
            assert!(store.has_table(&output_table_name("students", kind)), "{:?}", kind);
        }
        let valid = store.read_table("students_validated_valid").unwrap();
        let invalid = store.read_table("students_validated_invalid").unwrap();
        assert_eq!(valid.len(), 1);
        assert_eq!(invalid.len(), 1);
        assert_eq!(store.run_records().len(), 6);
    }

    #[test]
    fn test_single_stage_rerun_replaces_output() {
        let dir = TempDir::new().unwrap();
        write_students(&dir);
        let mut pipeline = pipeline(&dir);
        let mut cache = CrossTableCache::new();
        pipeline.run_table("students", &mut cache).unwrap();
        let before = pipeline.store().read_table("students_transformed").unwrap();

        let mut rerun = PipelineRun::starting_at("students", Stage::Transform);
        pipeline.transform("students", &mut rerun).unwrap();
        let after = pipeline.store().read_table("students_transformed").unwrap();
        assert_eq!(before.len(), after.len());
        assert_eq!(before.columns, after.columns);

        // Split is the only stage allowed next
        assert!(pipeline.validate("students", &mut rerun).is_err());
    }
}
