//! Measure file naming convention.
//!
//! Measure files are named
//! `{subject_id}__{bundle_name}_{individual|pairwise}_measures.json`.
//! The subject id ends at the first `__`.

use crate::error::{EvalError, Result};
use crate::models::MeasureKind;
use std::fmt;
use std::path::Path;

const SUBJECT_SEPARATOR: &str = "__";

/// Structured join key carried by a measure file name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MeasureFileKey {
    pub subject_id: String,
    pub bundle_name: String,
    pub kind: MeasureKind,
}

impl MeasureFileKey {
    pub fn new(subject_id: impl Into<String>, bundle_name: impl Into<String>, kind: MeasureKind) -> Self {
        Self {
            subject_id: subject_id.into(),
            bundle_name: bundle_name.into(),
            kind,
        }
    }

    /// Parse the final component of `path`.
    ///
    /// Fails with `MalformedName` when the name has no `__`, an empty
    /// subject or bundle, an unknown suffix, or is not valid UTF-8.
    pub fn parse(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| malformed(&path.to_string_lossy(), "not a valid UTF-8 file name"))?;
        Self::parse_name(name)
    }

    /// Parse a bare file name.
    pub fn parse_name(name: &str) -> Result<Self> {
        let (subject_id, remainder) = name
            .split_once(SUBJECT_SEPARATOR)
            .ok_or_else(|| malformed(name, "missing '__' between subject and bundle"))?;

        if subject_id.is_empty() {
            return Err(malformed(name, "empty subject id"));
        }

        let (bundle_name, kind) = [MeasureKind::Individual, MeasureKind::Pairwise]
            .into_iter()
            .find_map(|kind| remainder.strip_suffix(kind.suffix()).map(|b| (b, kind)))
            .ok_or_else(|| {
                malformed(
                    name,
                    "expected suffix '_individual_measures.json' or '_pairwise_measures.json'",
                )
            })?;

        if bundle_name.is_empty() {
            return Err(malformed(name, "empty bundle name"));
        }

        Ok(Self::new(subject_id, bundle_name, kind))
    }

    /// Render the key back into a file name.
    pub fn file_name(&self) -> String {
        format!(
            "{}{}{}{}",
            self.subject_id,
            SUBJECT_SEPARATOR,
            self.bundle_name,
            self.kind.suffix()
        )
    }
}

impl fmt::Display for MeasureFileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} ({})", self.subject_id, self.bundle_name, self.kind)
    }
}

fn malformed(name: &str, reason: &str) -> EvalError {
    EvalError::MalformedName {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}
