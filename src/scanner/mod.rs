//! Bundle file discovery.
//!
//! This module lists the tractogram files of a bundle directory, respecting
//! configuration for extensions and excludes.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Configuration for bundle discovery.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Tractogram extensions to include (e.g., ["trk"])
    pub extensions: Vec<String>,
    /// File names to exclude
    pub excludes: Vec<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            extensions: vec!["trk".to_string()],
            excludes: Vec::new(),
        }
    }
}

impl From<&crate::config::ScannerConfig> for ScanConfig {
    fn from(config: &crate::config::ScannerConfig) -> Self {
        Self {
            extensions: config.extensions.clone(),
            excludes: config.excludes.clone(),
        }
    }
}

/// Bundle scanner for one directory of tractograms.
pub struct BundleScanner {
    config: ScanConfig,
    root: PathBuf,
}

impl BundleScanner {
    /// Create a new bundle scanner.
    pub fn new(root: PathBuf, config: ScanConfig) -> Self {
        Self { config, root }
    }

    /// Map bundle name (file stem) to tractogram path.
    ///
    /// Only the top level of the directory is scanned.
    pub fn scan(&self) -> Result<BTreeMap<String, PathBuf>> {
        if !self.root.is_dir() {
            anyhow::bail!("Not a directory: {}", self.root.display());
        }

        let mut bundles = BTreeMap::new();
        let walker = WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(1)
            .follow_links(true)
            .sort_by_file_name();

        for entry in walker {
            let entry = entry
                .with_context(|| format!("Failed to read directory {}", self.root.display()))?;
            let path = entry.path();

            if !entry.file_type().is_file() || !self.matches(path) {
                continue;
            }

            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                warn!("Skipping non UTF-8 file name: {}", path.display());
                continue;
            };

            if bundles.contains_key(name) {
                warn!(
                    "Bundle '{}' found twice in {}, keeping the first",
                    name,
                    self.root.display()
                );
                continue;
            }

            debug!("Found bundle {} at {}", name, path.display());
            bundles.insert(name.to_string(), path.to_path_buf());
        }

        Ok(bundles)
    }

    /// Check if a file matches scan criteria.
    pub fn matches(&self, path: &Path) -> bool {
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if self.is_excluded(name) {
                return false;
            }
        }

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        self.config
            .extensions
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(&ext))
    }

    /// Check if a name matches exclusion patterns.
    fn is_excluded(&self, name: &str) -> bool {
        // Hidden files
        if name.starts_with('.') {
            return true;
        }

        self.config.excludes.iter().any(|pattern| name == pattern)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), b"").unwrap();
    }

    #[test]
    fn test_scan_bundles() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "CST_L.trk");
        touch(dir.path(), "AF_R.trk");
        touch(dir.path(), "notes.txt");
        touch(dir.path(), ".hidden.trk");
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        touch(&dir.path().join("nested"), "UF_L.trk");

        let scanner = BundleScanner::new(dir.path().to_path_buf(), ScanConfig::default());
        let bundles = scanner.scan().unwrap();

        assert_eq!(
            bundles.keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["AF_R", "CST_L"]
        );
        assert_eq!(bundles["CST_L"], dir.path().join("CST_L.trk"));
    }

    #[test]
    fn test_excludes() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "CST_L.trk");
        touch(dir.path(), "whole_brain.trk");

        let config = ScanConfig {
            extensions: vec!["trk".to_string()],
            excludes: vec!["whole_brain.trk".to_string()],
        };
        let bundles = BundleScanner::new(dir.path().to_path_buf(), config)
            .scan()
            .unwrap();

        assert_eq!(bundles.len(), 1);
        assert!(bundles.contains_key("CST_L"));
    }

    #[test]
    fn test_extension_case_insensitive() {
        let scanner = BundleScanner::new(PathBuf::from("."), ScanConfig::default());
        assert!(scanner.matches(Path::new("a/CC.TRK")));
        assert!(!scanner.matches(Path::new("a/CC.tck")));
    }

    #[test]
    fn test_scan_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let scanner =
            BundleScanner::new(dir.path().join("missing"), ScanConfig::default());
        assert!(scanner.scan().is_err());
    }
}
