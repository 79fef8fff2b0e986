//! Error types for bundle evaluation.
//!
//! Precondition failures (missing inputs, existing outputs) are raised
//! before any computation so that a run either completes or writes nothing.

use std::path::PathBuf;

/// Result type alias using [`EvalError`].
pub type Result<T> = std::result::Result<T, EvalError>;

/// Errors raised by the comparator, the aggregator and their loaders.
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    /// A required input path does not exist.
    #[error("Input not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The declared output path already exists.
    #[error("Output already exists: {}", .0.display())]
    AlreadyExists(PathBuf),

    /// A measure file name does not follow
    /// `{subject}__{bundle}_{individual|pairwise}_measures.json`.
    #[error("Malformed measure file name '{name}': {reason}")]
    MalformedName { name: String, reason: String },

    /// A measure file could not be decoded into its record type.
    #[error("Invalid measure record {}: {reason}", .path.display())]
    InvalidRecord { path: PathBuf, reason: String },

    /// Two input files resolve to the same (subject, bundle, kind).
    #[error("Duplicate {kind} record for subject '{subject}', bundle '{bundle}'")]
    DuplicateRecord {
        subject: String,
        bundle: String,
        kind: String,
    },

    /// Tractogram file format is not supported.
    #[error("Unsupported tractogram format: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    /// Tractogram header is not a valid TrackVis header.
    #[error("Invalid tractogram header: {0}")]
    InvalidHeader(String),

    /// Tractogram body ended in the middle of a streamline.
    #[error("Truncated tractogram: {0}")]
    Truncated(String),

    /// Candidate and reference are rasterized on different voxel grids.
    #[error("Voxel grid mismatch: candidate {candidate:?}, reference {reference:?}")]
    GridMismatch {
        candidate: [usize; 3],
        reference: [usize; 3],
    },

    /// File I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EvalError {
    /// Fail with `NotFound` unless `path` exists.
    pub fn require_exists(path: &std::path::Path) -> Result<()> {
        if path.exists() {
            Ok(())
        } else {
            Err(EvalError::NotFound(path.to_path_buf()))
        }
    }

    /// Fail with `AlreadyExists` if `path` exists.
    pub fn require_absent(path: &std::path::Path) -> Result<()> {
        if path.exists() {
            Err(EvalError::AlreadyExists(path.to_path_buf()))
        } else {
            Ok(())
        }
    }
}
