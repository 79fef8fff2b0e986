//! Subject-level evaluation.
//!
//! Matches candidate bundles to gold standard bundles by file name, compares
//! each pair on a blocking worker, and writes one individual and one
//! pairwise measure file per reference bundle.
//!
//! A reference bundle with no candidate counts as a failed reconstruction.
//! A candidate bundle with no reference is ignored.

use crate::analysis::MeasureFileKey;
use crate::comparison::compare_tractograms;
use crate::error::EvalError;
use crate::models::{IndividualMeasures, MeasureKind, PairwiseMeasures};
use crate::report::write_json;
use crate::scanner::{BundleScanner, ScanConfig};
use crate::tractogram::load_tractogram;
use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Inputs of one subject evaluation.
#[derive(Debug, Clone)]
pub struct EvaluationRequest {
    pub subject_id: String,
    pub candidates_dir: PathBuf,
    pub references_dir: PathBuf,
    pub out_dir: PathBuf,
    /// Maximum number of bundles compared at once.
    pub concurrency: usize,
    pub scan: ScanConfig,
    pub pretty_json: bool,
    pub show_progress: bool,
}

/// What an evaluation did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluationSummary {
    /// Bundles compared against their reference.
    pub evaluated: Vec<String>,
    /// Reference bundles with no candidate.
    pub missing: Vec<String>,
    /// Candidate bundles with no reference.
    pub ignored: Vec<String>,
    /// Measure files written, in bundle order.
    pub files_written: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
enum BundleTask {
    Compare {
        bundle: String,
        candidate: PathBuf,
        reference: PathBuf,
    },
    Missing {
        bundle: String,
    },
}

#[derive(Debug, Clone)]
struct BundleOutcome {
    bundle: String,
    individual: IndividualMeasures,
    pairwise: PairwiseMeasures,
}

impl BundleTask {
    fn bundle(&self) -> &str {
        match self {
            BundleTask::Compare { bundle, .. } | BundleTask::Missing { bundle } => bundle,
        }
    }

    fn run(self) -> crate::error::Result<BundleOutcome> {
        match self {
            BundleTask::Compare {
                bundle,
                candidate,
                reference,
            } => {
                let candidate = load_tractogram(&candidate)?;
                let reference = load_tractogram(&reference)?;
                let pairwise = compare_tractograms(&candidate, &reference)?;
                debug!("{}: {:?}", bundle, pairwise);
                Ok(BundleOutcome {
                    bundle,
                    individual: IndividualMeasures::with_count(candidate.len() as u64),
                    pairwise,
                })
            }
            BundleTask::Missing { bundle } => Ok(BundleOutcome {
                bundle,
                individual: IndividualMeasures::with_count(0),
                pairwise: PairwiseMeasures::failed(),
            }),
        }
    }
}

/// Evaluate every reference bundle of one subject.
///
/// All output paths are checked before any comparison runs, and files are
/// only written once every comparison has succeeded. If a write still fails,
/// the files already written by this call are removed again.
pub async fn evaluate_subject(request: EvaluationRequest) -> Result<EvaluationSummary> {
    EvalError::require_exists(&request.candidates_dir)?;
    EvalError::require_exists(&request.references_dir)?;

    let candidates =
        BundleScanner::new(request.candidates_dir.clone(), request.scan.clone()).scan()?;
    let references =
        BundleScanner::new(request.references_dir.clone(), request.scan.clone()).scan()?;

    let mut summary = EvaluationSummary::default();
    let mut tasks = Vec::with_capacity(references.len());

    for (bundle, reference) in &references {
        match candidates.get(bundle) {
            Some(candidate) => {
                summary.evaluated.push(bundle.clone());
                tasks.push(BundleTask::Compare {
                    bundle: bundle.clone(),
                    candidate: candidate.clone(),
                    reference: reference.clone(),
                });
            }
            None => {
                warn!(
                    "No candidate for bundle '{}', scoring it as a failed reconstruction",
                    bundle
                );
                summary.missing.push(bundle.clone());
                tasks.push(BundleTask::Missing {
                    bundle: bundle.clone(),
                });
            }
        }
    }

    for bundle in candidates.keys().filter(|b| !references.contains_key(*b)) {
        warn!("No reference for candidate bundle '{}', ignoring it", bundle);
        summary.ignored.push(bundle.clone());
    }

    for task in &tasks {
        for kind in [MeasureKind::Individual, MeasureKind::Pairwise] {
            EvalError::require_absent(&output_path(&request, task.bundle(), kind))?;
        }
    }

    info!(
        "Evaluating {} bundles of subject {} ({} missing, {} ignored)",
        tasks.len(),
        request.subject_id,
        summary.missing.len(),
        summary.ignored.len()
    );

    let mut outcomes = run_tasks(tasks, request.concurrency, request.show_progress).await?;
    outcomes.sort_by(|a, b| a.bundle.cmp(&b.bundle));

    std::fs::create_dir_all(&request.out_dir).with_context(|| {
        format!(
            "Failed to create output directory {}",
            request.out_dir.display()
        )
    })?;

    summary.files_written = write_outcomes(&request, &outcomes)?;

    Ok(summary)
}

/// Write the measure files of every outcome, all or nothing.
fn write_outcomes(request: &EvaluationRequest, outcomes: &[BundleOutcome]) -> Result<Vec<PathBuf>> {
    let mut written = Vec::with_capacity(outcomes.len() * 2);

    for outcome in outcomes {
        let individual = output_path(request, &outcome.bundle, MeasureKind::Individual);
        let pairwise = output_path(request, &outcome.bundle, MeasureKind::Pairwise);

        let result = write_json(&outcome.individual, &individual, request.pretty_json)
            .map(|()| written.push(individual))
            .and_then(|()| write_json(&outcome.pairwise, &pairwise, request.pretty_json))
            .map(|()| written.push(pairwise));

        if let Err(e) = result {
            for path in &written {
                if let Err(remove_err) = std::fs::remove_file(path) {
                    warn!("Failed to remove {}: {}", path.display(), remove_err);
                }
            }
            return Err(e).with_context(|| {
                format!("Failed to write measures of bundle '{}'", outcome.bundle)
            });
        }
    }

    Ok(written)
}

async fn run_tasks(
    tasks: Vec<BundleTask>,
    concurrency: usize,
    show_progress: bool,
) -> Result<Vec<BundleOutcome>> {
    let progress = show_progress.then(|| {
        let pb = ProgressBar::new(tasks.len() as u64);
        let style = ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
        )
        .map(|style| style.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
        pb.set_style(style);
        pb
    });

    let results: Vec<Result<BundleOutcome>> = stream::iter(tasks)
        .map(|task| {
            let progress = progress.clone();
            async move {
                let bundle = task.bundle().to_string();
                let outcome = tokio::task::spawn_blocking(move || task.run())
                    .await
                    .with_context(|| format!("Evaluation task for bundle '{}' failed", bundle))?
                    .with_context(|| format!("Failed to evaluate bundle '{}'", bundle))?;
                if let Some(pb) = &progress {
                    pb.set_message(bundle);
                    pb.inc(1);
                }
                Ok::<_, anyhow::Error>(outcome)
            }
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    if let Some(pb) = progress {
        pb.finish_with_message("done");
    }

    results.into_iter().collect()
}

fn output_path(request: &EvaluationRequest, bundle: &str, kind: MeasureKind) -> PathBuf {
    let key = MeasureFileKey::new(request.subject_id.as_str(), bundle, kind);
    request.out_dir.join(key.file_name())
}
