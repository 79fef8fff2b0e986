//! bundleval - white-matter bundle reconstruction evaluation
//!
//! A CLI tool that compares candidate bundles against gold-standard bundles
//! voxel-wise and aggregates the per-subject measures into a dataset report.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Any error (missing input, existing output, invalid file, etc.)

mod analysis;
mod cli;
mod comparison;
mod config;
mod error;
mod evaluation;
mod models;
mod report;
mod scanner;
mod tractogram;

use anyhow::{Context, Result};
use chrono::Utc;
use cli::{AggregateArgs, Args, Command, CompareArgs, EvaluateArgs};
use config::{Config, CONFIG_FILE_NAME};
use error::EvalError;
use std::time::Instant;
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle init-config early (no logging needed)
    if matches!(args.command, Command::InitConfig) {
        return handle_init_config();
    }

    // Load configuration before logging so `[general] verbose` applies
    let mut config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };
    config.merge_with_args(&args);

    // Initialize logging
    init_logging(args.log_level_with(config.general.verbose));

    info!("bundleval v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);
    debug!("Configuration: {:?}", config);

    if let Err(e) = run(&args, &config).await {
        error!("Evaluation failed: {:#}", e);
        eprintln!("\n❌ Error: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Handle init-config: generate a default .bundleval.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(CONFIG_FILE_NAME);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            CONFIG_FILE_NAME
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", CONFIG_FILE_NAME))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE_NAME);
    Ok(())
}

/// Initialize logging at `level`.
///
/// `RUST_LOG` takes precedence over `--verbose` / `--quiet` and the config.
fn init_logging(level: tracing::Level) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Dispatch the selected subcommand.
async fn run(args: &Args, config: &Config) -> Result<()> {
    match &args.command {
        Command::Compare(cmp) => run_compare(cmp, config, args.quiet),
        Command::Aggregate(agg) => run_aggregate(agg, config, args.quiet),
        Command::Evaluate(eval) => run_evaluate(eval, config, args.quiet).await,
        Command::InitConfig => handle_init_config(),
    }
}

/// Compare one candidate against its gold standard and write the measures.
fn run_compare(cmp: &CompareArgs, config: &Config, quiet: bool) -> Result<()> {
    EvalError::require_exists(&cmp.candidate)?;
    EvalError::require_exists(&cmp.gold_standard)?;
    EvalError::require_absent(&cmp.out)?;

    let measures = comparison::compare_files(&cmp.candidate, &cmp.gold_standard)
        .with_context(|| {
            format!(
                "Failed to compare {} against {}",
                cmp.candidate.display(),
                cmp.gold_standard.display()
            )
        })?;

    report::write_json(&measures, &cmp.out, config.report.pretty_json)?;

    if !quiet {
        let overreach = measures
            .overreach
            .map_or_else(|| "n/a".to_string(), |v| format!("{:.4}", v));
        println!(
            "📊 Dice: {:.4} | Overlap: {:.4} | Overreach: {}",
            measures.dice, measures.overlap, overreach
        );
        println!("✅ Measures saved to: {}", cmp.out.display());
    }
    Ok(())
}

/// Aggregate measure files into one report.
fn run_aggregate(agg: &AggregateArgs, config: &Config, quiet: bool) -> Result<()> {
    for input in &agg.inputs {
        EvalError::require_exists(input)?;
    }
    EvalError::require_absent(&agg.out)?;
    if let Some(ref markdown) = agg.markdown {
        EvalError::require_absent(markdown)?;
    }

    let report = if config.report.expected_bundles.is_empty() {
        analysis::aggregate(&agg.inputs)?
    } else {
        info!(
            "Aggregating over {} expected bundles",
            config.report.expected_bundles.len()
        );
        analysis::Aggregator::new()
            .with_bundles(config.report.expected_bundles.iter().cloned())
            .aggregate(&agg.inputs)?
    };

    report::write_json(&report, &agg.out, config.report.pretty_json)?;

    if let Some(ref markdown) = agg.markdown {
        let metadata = report::ReportMetadata {
            generated_at: Utc::now(),
            input_files: agg.inputs.len(),
        };
        report::write_new(markdown, &report::render_markdown(&report, &metadata))?;
        info!("Markdown summary saved to {}", markdown.display());
    }

    if !quiet {
        let fmt = |v: Option<f64>| v.map_or_else(|| "n/a".to_string(), |v| format!("{:.4}", v));
        println!("📊 Aggregate Scores:");
        println!(
            "   Subjects: {} | Bundle summaries: {}",
            report.subjects.len(),
            report.bundle_count()
        );
        println!(
            "   Dice: {} | Overlap: {} | Overreach: {}",
            fmt(report.scores.dice),
            fmt(report.scores.overlap),
            fmt(report.scores.overreach)
        );
        println!("   Total streamlines: {}", report.scores.total_streamlines);
        println!("\n✅ Report saved to: {}", agg.out.display());
    }
    Ok(())
}

/// Evaluate every bundle of one subject.
async fn run_evaluate(eval: &EvaluateArgs, config: &Config, quiet: bool) -> Result<()> {
    let start_time = Instant::now();

    let request = evaluation::EvaluationRequest {
        subject_id: eval.subject.clone(),
        candidates_dir: eval.candidates.clone(),
        references_dir: eval.references.clone(),
        out_dir: eval.out_dir.clone(),
        concurrency: config.general.concurrency,
        scan: scanner::ScanConfig::from(&config.scanner),
        pretty_json: config.report.pretty_json,
        show_progress: !quiet,
    };

    if !quiet {
        println!("🔬 Evaluating subject {}...", eval.subject);
    }

    let summary = evaluation::evaluate_subject(request).await?;

    if !quiet {
        println!("\n📊 Evaluation Summary:");
        println!("   Bundles compared: {}", summary.evaluated.len());
        if !summary.missing.is_empty() {
            println!("   Missing candidates: {}", summary.missing.join(", "));
        }
        if !summary.ignored.is_empty() {
            println!("   Ignored candidates: {}", summary.ignored.join(", "));
        }
        println!("   Files written: {}", summary.files_written.len());
        println!("   Duration: {:.1}s", start_time.elapsed().as_secs_f64());
        println!("\n✅ Measures saved to: {}", eval.out_dir.display());
    }
    Ok(())
}

/// Load configuration from file or use defaults.
///
/// Runs before logging is initialized, so problems go to stderr directly.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => Ok(config),
        Ok(None) => Ok(Config::default()),
        Err(e) => {
            eprintln!("⚠️  Ignoring {}: {:#}", CONFIG_FILE_NAME, e);
            Ok(Config::default())
        }
    }
}
