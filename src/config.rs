//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.bundleval.toml` files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default configuration file name.
pub const CONFIG_FILE_NAME: &str = ".bundleval.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Bundle discovery settings.
    #[serde(default)]
    pub scanner: ScannerConfig,

    /// Report settings.
    #[serde(default)]
    pub report: ReportConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,

    /// Number of bundles compared in parallel by `evaluate`.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            concurrency: default_concurrency(),
        }
    }
}

fn default_concurrency() -> usize {
    4
}

/// Bundle discovery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Tractogram extensions to include.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// File names to exclude.
    #[serde(default)]
    pub excludes: Vec<String>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            excludes: Vec::new(),
        }
    }
}

fn default_extensions() -> Vec<String> {
    vec!["trk".to_string()]
}

/// Report generation settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Pretty-print JSON outputs.
    #[serde(default)]
    pub pretty_json: bool,

    /// Bundles every subject is expected to have in aggregate reports.
    #[serde(default)]
    pub expected_bundles: Vec<String>,
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE_NAME);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    /// This method only overrides config when CLI provides explicit values.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        use crate::cli::Command;

        if args.verbose {
            self.general.verbose = true;
        }

        match &args.command {
            Command::Aggregate(agg) => {
                if agg.pretty {
                    self.report.pretty_json = true;
                }
                if let Some(ref bundles) = agg.bundles {
                    self.report.expected_bundles = bundles.clone();
                }
            }
            Command::Evaluate(eval) => {
                if let Some(concurrency) = eval.concurrency {
                    self.general.concurrency = concurrency;
                }
                if let Some(ref extensions) = eval.extensions {
                    self.scanner.extensions = extensions.clone();
                }
                if eval.pretty {
                    self.report.pretty_json = true;
                }
            }
            Command::Compare(cmp) => {
                if cmp.pretty {
                    self.report.pretty_json = true;
                }
            }
            Command::InitConfig => {}
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
