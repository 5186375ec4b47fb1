//! Legacymig CLI - run the migration pipeline over legacy CSV snapshots
//!
//! # Main Commands
//!
//! ```bash
//! legacymig run                        # Run every table in dependency order
//! legacymig run --table students       # Run selected tables only
//! legacymig order                      # Print the processing order
//! ```
//!
//! # Debug Commands
//!
//! ```bash
//! legacymig parse-id 2010T1E-582-A-A1A  # Decompose one class code
//! legacymig transliterate "ek"          # Convert legacy font text
//! legacymig allocate 100.00 A B C       # Split an amount equally
//! ```

use clap::{Args, Parser, Subcommand};
use legacymig::logging::init_logging;
use legacymig::{
    allocate_equal, parse_identifier, transliterate, FsStore, Money, NoCatalog, Pipeline,
    PipelineRegistry, PipelineSettings, StaticCatalog,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "legacymig")]
#[command(about = "Migrate legacy CSV snapshots into validated destination records", long_about = None)]
struct Cli {
    #[command(flatten)]
    settings: SettingsArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct SettingsArgs {
    /// Directory holding the legacy CSV files
    #[arg(long, global = true, env = "LEGACYMIG_SOURCE_DIR", default_value = "data/source")]
    source_dir: PathBuf,

    /// Directory receiving stage tables and run records
    #[arg(long, global = true, env = "LEGACYMIG_OUTPUT_DIR", default_value = "data/output")]
    output_dir: PathBuf,

    /// Course catalog file, one code per line
    #[arg(long, global = true, env = "LEGACYMIG_CATALOG")]
    catalog: Option<PathBuf>,

    /// Rows per chunk for tables without their own chunk size
    #[arg(long, global = true, env = "LEGACYMIG_CHUNK_SIZE")]
    chunk_size: Option<usize>,

    /// Comma-separated targets for imputed payment allocation
    #[arg(long, global = true, env = "LEGACYMIG_DEFAULT_TARGETS", value_delimiter = ',')]
    default_targets: Vec<String>,
}

impl SettingsArgs {
    fn into_settings(self, tables: Vec<String>) -> PipelineSettings {
        let mut settings = PipelineSettings::with_dirs(self.source_dir, self.output_dir);
        settings.catalog_path = self.catalog;
        if let Some(size) = self.chunk_size {
            settings.chunk_size = size;
        }
        settings.default_targets = self
            .default_targets
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        settings.tables = tables;
        settings
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the six-stage pipeline
    Run {
        /// Only run these tables (repeatable)
        #[arg(short, long = "table")]
        tables: Vec<String>,
    },

    /// Print the table processing order
    Order,

    /// Parse one composite class identifier and print the result as JSON
    ParseId {
        /// Identifier, e.g. 2010T1E-582-A-A1A
        code: String,
    },

    /// Transliterate legacy font text to Unicode Khmer
    Transliterate {
        text: String,
    },

    /// Allocate an amount equally over targets
    Allocate {
        /// Amount, e.g. 1,234.56
        amount: String,

        /// Targets, in order; the last one takes the remainder
        #[arg(required = true)]
        targets: Vec<String>,
    },
}

fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();
    init_logging();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run { tables } => cmd_run(cli.settings.into_settings(tables)),
        Commands::Order => cmd_order(cli.settings.into_settings(Vec::new())),
        Commands::ParseId { code } => cmd_parse_id(&code, cli.settings.catalog),
        Commands::Transliterate { text } => {
            println!("{}", transliterate(&text));
            Ok(())
        }
        Commands::Allocate { amount, targets } => cmd_allocate(&amount, &targets),
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

fn cmd_run(settings: PipelineSettings) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Source: {}", settings.source_dir.display());
    eprintln!("   Output: {}", settings.output_dir.display());

    let registry = PipelineRegistry::with_builtin_tables(&settings)?;
    let store = FsStore::new(&settings.output_dir)?;
    let mut pipeline = Pipeline::new(registry, store, settings)?;

    let summaries = pipeline.run_all();
    let mut failed = 0;

    for summary in &summaries {
        let counts = summary.counts();
        if summary.is_success() {
            eprintln!(
                "✅ {}: {} processed, {} valid, {} invalid, {} warnings",
                summary.table,
                counts.processed,
                counts.valid,
                counts.invalid,
                summary.run.warnings().count()
            );
        } else {
            failed += 1;
            eprintln!(
                "❌ {}: failed at {}: {}",
                summary.table,
                summary
                    .failed_stage
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "startup".to_string()),
                summary.error.as_deref().unwrap_or("unknown error")
            );
        }
        if !summary.failed_dependencies.is_empty() {
            eprintln!("   ran despite failed dependencies: {}", summary.failed_dependencies.join(", "));
        }
    }

    eprintln!("\n📊 {} table(s), {} failed", summaries.len(), failed);
    if failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_order(settings: PipelineSettings) -> Result<(), Box<dyn std::error::Error>> {
    let registry = PipelineRegistry::with_builtin_tables(&settings)?;
    for (position, name) in registry.processing_order().iter().enumerate() {
        let deps: Vec<String> = registry.dependencies_of(name).into_iter().collect();
        if deps.is_empty() {
            println!("{}. {}", position + 1, name);
        } else {
            println!("{}. {} (after {})", position + 1, name, deps.join(", "));
        }
    }
    Ok(())
}

fn cmd_parse_id(code: &str, catalog: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let parsed = match catalog {
        Some(path) => parse_identifier(code, &StaticCatalog::from_file(path)?),
        None => parse_identifier(code, &NoCatalog),
    };
    println!("{}", serde_json::to_string_pretty(&parsed)?);
    Ok(())
}

fn cmd_allocate(amount: &str, targets: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let total = Money::parse(amount)?;
    let result = allocate_equal(total, targets);
    for line in &result.lines {
        println!("{}\t{}\t{:.2}%", line.target, line.amount, line.percentage);
    }
    eprintln!("{}", result.log);
    Ok(())
}
