//! Report rendering and writing.
//!
//! This module renders aggregate reports as JSON or Markdown and writes
//! output files without ever replacing an existing one.

use crate::analysis::scores_by_bundle;
use crate::error::{EvalError, Result};
use crate::models::{AggregateReport, BundleSummary, Scores};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use tracing::debug;

/// Context shown in the Markdown rendering.
#[derive(Debug, Clone)]
pub struct ReportMetadata {
    /// When the report was generated.
    pub generated_at: DateTime<Utc>,
    /// Number of measure files aggregated.
    pub input_files: usize,
}

/// Serialize any record or report as JSON.
pub fn render_json<T: Serialize>(value: &T, pretty: bool) -> Result<String> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    Ok(json)
}

/// Write `content` to `path`, failing with `AlreadyExists` if it exists.
///
/// The content goes to a temporary file in the destination directory first
/// and is moved into place without clobbering, so readers never see a
/// partial file.
pub fn write_new(path: &Path, content: &str) -> Result<()> {
    EvalError::require_absent(path)?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    file.write_all(content.as_bytes())?;
    file.flush()?;

    file.persist_noclobber(path).map_err(|e| {
        if e.error.kind() == std::io::ErrorKind::AlreadyExists {
            EvalError::AlreadyExists(path.to_path_buf())
        } else {
            EvalError::Io(e.error)
        }
    })?;

    debug!("Wrote {} ({} bytes)", path.display(), content.len());
    Ok(())
}

/// Serialize `value` as JSON into a new file.
pub fn write_json<T: Serialize>(value: &T, path: &Path, pretty: bool) -> Result<()> {
    write_new(path, &render_json(value, pretty)?)
}

/// Generate a Markdown summary of an aggregate report.
pub fn render_markdown(report: &AggregateReport, metadata: &ReportMetadata) -> String {
    let mut output = String::new();

    output.push_str("# Bundle Evaluation Report\n\n");
    output.push_str(&generate_metadata_section(report, metadata));
    output.push_str(&generate_scores_section(&report.scores));
    output.push_str(&generate_bundles_section(report));
    output.push_str(&generate_subjects_section(report));

    output
}

fn generate_metadata_section(report: &AggregateReport, metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!(
        "- **Generated:** {}\n",
        metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Measure Files:** {}\n", metadata.input_files));
    section.push_str(&format!("- **Subjects:** {}\n", report.subjects.len()));
    section.push_str(&format!(
        "- **Bundle Summaries:** {}\n\n",
        report.bundle_count()
    ));

    section
}

fn generate_scores_section(scores: &Scores) -> String {
    let mut section = String::new();

    section.push_str("## Scores\n\n");
    section.push_str("| Dice | Overlap | Overreach | Total Streamlines |\n");
    section.push_str("|:---:|:---:|:---:|:---:|\n");
    section.push_str(&format!(
        "| {} | {} | {} | {} |\n\n",
        format_score(scores.dice),
        format_score(scores.overlap),
        format_score(scores.overreach),
        scores.total_streamlines
    ));

    section
}

fn generate_bundles_section(report: &AggregateReport) -> String {
    let by_bundle = scores_by_bundle(&report.subjects);
    if by_bundle.is_empty() {
        return String::new();
    }

    let mut section = String::new();
    section.push_str("## Scores by Bundle\n\n");
    section.push_str("| Bundle | Dice | Overlap | Overreach | Streamlines |\n");
    section.push_str("|:---|:---:|:---:|:---:|:---:|\n");

    for (bundle, scores) in &by_bundle {
        section.push_str(&format!(
            "| {} | {} | {} | {} | {} |\n",
            bundle,
            format_score(scores.dice),
            format_score(scores.overlap),
            format_score(scores.overreach),
            scores.total_streamlines
        ));
    }
    section.push('\n');

    section
}

fn generate_subjects_section(report: &AggregateReport) -> String {
    let mut section = String::new();

    section.push_str("## Subjects\n\n");

    if report.subjects.is_empty() {
        section.push_str("No measure files were aggregated.\n\n");
        return section;
    }

    for (subject, bundles) in &report.subjects {
        section.push_str(&format!("### {}\n\n", subject));
        section.push_str("| Bundle | Dice | Overlap | Overreach | Streamlines |\n");
        section.push_str("|:---|:---:|:---:|:---:|:---:|\n");
        for (bundle, summary) in bundles {
            section.push_str(&generate_bundle_row(bundle, summary));
        }
        section.push('\n');
    }

    section
}

fn generate_bundle_row(bundle: &str, summary: &BundleSummary) -> String {
    format!(
        "| {} | {} | {} | {} | {} |\n",
        bundle,
        format_score(Some(summary.dice)),
        format_score(Some(summary.overlap)),
        format_score(summary.overreach),
        summary.streamlines_count
    )
}

fn format_score(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.4}", v),
        None => "n/a".to_string(),
    }
}
