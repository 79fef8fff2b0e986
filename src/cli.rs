//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// bundleval - evaluate white-matter bundle reconstructions
///
/// Compare candidate bundles against gold-standard bundles voxel-wise
/// (Dice, overlap, overreach) and aggregate the per-subject measures into
/// one dataset report.
///
/// Examples:
///   bundleval compare --in cand/CST_L.trk --gs gs/CST_L.trk --out sub-01__CST_L_pairwise_measures.json
///   bundleval evaluate --subject sub-01 --in cand/ --ref gs/ --out measures/
///   bundleval aggregate --in measures/*.json --out report.json --markdown report.md
///   bundleval init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Path to configuration file
    ///
    /// If not specified, looks for .bundleval.toml in the current directory
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Compare one candidate bundle against its gold standard
    Compare(CompareArgs),

    /// Aggregate measure files into a dataset report
    Aggregate(AggregateArgs),

    /// Evaluate every bundle of one subject
    Evaluate(EvaluateArgs),

    /// Generate a default .bundleval.toml configuration file
    InitConfig,
}

#[derive(clap::Args, Debug, Clone)]
pub struct CompareArgs {
    /// Candidate tractogram (.trk)
    #[arg(long = "in", value_name = "TRK")]
    pub candidate: PathBuf,

    /// Gold standard tractogram (.trk)
    #[arg(long = "gs", value_name = "TRK")]
    pub gold_standard: PathBuf,

    /// Output JSON file for the pairwise measures (must not exist)
    #[arg(long, value_name = "FILE")]
    pub out: PathBuf,

    /// Pretty-print the JSON output
    #[arg(long)]
    pub pretty: bool,
}

#[derive(clap::Args, Debug, Clone)]
pub struct AggregateArgs {
    /// Measure files named {subject}__{bundle}_{individual|pairwise}_measures.json
    #[arg(long = "in", value_name = "FILE", num_args = 1.., required = true)]
    pub inputs: Vec<PathBuf>,

    /// Output JSON report (must not exist)
    #[arg(long, value_name = "FILE")]
    pub out: PathBuf,

    /// Bundles every subject is expected to have (comma-separated)
    ///
    /// Expected bundles with no measure file get default (failed) scores.
    #[arg(long, value_name = "NAMES", value_delimiter = ',')]
    pub bundles: Option<Vec<String>>,

    /// Also write a Markdown summary (must not exist)
    #[arg(long, value_name = "FILE")]
    pub markdown: Option<PathBuf>,

    /// Pretty-print the JSON output
    #[arg(long)]
    pub pretty: bool,
}

#[derive(clap::Args, Debug, Clone)]
pub struct EvaluateArgs {
    /// Subject id used in the measure file names
    #[arg(long, value_name = "ID")]
    pub subject: String,

    /// Directory of candidate bundles
    #[arg(long = "in", value_name = "DIR")]
    pub candidates: PathBuf,

    /// Directory of gold standard bundles
    #[arg(long = "ref", value_name = "DIR")]
    pub references: PathBuf,

    /// Output directory for measure files
    #[arg(long = "out", value_name = "DIR")]
    pub out_dir: PathBuf,

    /// Number of bundles compared in parallel
    #[arg(long, value_name = "NUM")]
    pub concurrency: Option<usize>,

    /// Tractogram extensions to include (comma-separated)
    #[arg(long, value_name = "EXTS", value_delimiter = ',')]
    pub extensions: Option<Vec<String>>,

    /// Pretty-print the JSON outputs
    #[arg(long)]
    pub pretty: bool,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        match &self.command {
            Command::Evaluate(eval) => {
                if eval.subject.is_empty() || eval.subject.contains("__") {
                    return Err("Subject id must be non-empty and must not contain '__'".to_string());
                }
                if eval.concurrency == Some(0) {
                    return Err("Concurrency must be at least 1".to_string());
                }
            }
            Command::Aggregate(agg) => {
                if agg.markdown.as_ref() == Some(&agg.out) {
                    return Err("--markdown and --out must be different files".to_string());
                }
            }
            Command::Compare(_) | Command::InitConfig => {}
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }

    /// Log level once the configuration file is taken into account.
    ///
    /// `verbose = true` in `[general]` acts like `--verbose` unless `--quiet`
    /// is given.
    pub fn log_level_with(&self, verbose_by_default: bool) -> tracing::Level {
        if verbose_by_default && !self.quiet {
            tracing::Level::DEBUG
        } else {
            self.log_level()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_args(command: Command) -> Args {
        Args {
            command,
            config: None,
            verbose: false,
            quiet: false,
        }
    }

    #[test]
    fn test_parse_aggregate() {
        let args = Args::try_parse_from([
            "bundleval",
            "aggregate",
            "--in",
            "A__b_individual_measures.json",
            "A__b_pairwise_measures.json",
            "--out",
            "report.json",
            "--bundles",
            "CST_L,CST_R",
        ])
        .unwrap();

        match args.command {
            Command::Aggregate(agg) => {
                assert_eq!(agg.inputs.len(), 2);
                assert_eq!(agg.out, PathBuf::from("report.json"));
                assert_eq!(
                    agg.bundles,
                    Some(vec!["CST_L".to_string(), "CST_R".to_string()])
                );
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_compare() {
        let args = Args::try_parse_from([
            "bundleval", "compare", "--in", "a.trk", "--gs", "b.trk", "--out", "m.json", "-v",
        ])
        .unwrap();

        assert!(args.verbose);
        assert!(matches!(args.command, Command::Compare(ref c) if c.gold_standard == PathBuf::from("b.trk")));
    }

    #[test]
    fn test_aggregate_requires_inputs() {
        let result = Args::try_parse_from(["bundleval", "aggregate", "--out", "report.json"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args(Command::InitConfig);
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_subject_id() {
        let eval = EvaluateArgs {
            subject: "sub__01".to_string(),
            candidates: PathBuf::from("in"),
            references: PathBuf::from("ref"),
            out_dir: PathBuf::from("out"),
            concurrency: None,
            extensions: None,
            pretty: false,
        };
        assert!(make_args(Command::Evaluate(eval.clone())).validate().is_err());

        let valid = EvaluateArgs {
            subject: "sub-01".to_string(),
            ..eval
        };
        assert!(make_args(Command::Evaluate(valid)).validate().is_ok());
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args(Command::InitConfig);
        assert_eq!(args.log_level(), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(), tracing::Level::ERROR);
    }

    #[test]
    fn test_log_level_with_config_verbose() {
        let mut args = make_args(Command::InitConfig);
        assert_eq!(args.log_level_with(false), tracing::Level::INFO);
        assert_eq!(args.log_level_with(true), tracing::Level::DEBUG);

        args.quiet = true;
        assert_eq!(args.log_level_with(true), tracing::Level::ERROR);
    }
}
