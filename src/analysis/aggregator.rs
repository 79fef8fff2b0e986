//! Measure aggregation and dataset statistics.
//!
//! This module merges per-subject, per-bundle measure files into a single
//! report and computes dataset-wide scores.

use super::naming::MeasureFileKey;
use crate::error::{EvalError, Result};
use crate::models::{
    AggregateReport, BundleSummary, IndividualMeasures, MeasureKind, PairwiseMeasures, Scores,
    SubjectMap,
};
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Merges measure files into an [`AggregateReport`].
#[derive(Debug, Clone, Default)]
pub struct Aggregator {
    /// Bundles every subject is expected to have.
    expected_bundles: BTreeSet<String>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed every observed subject with these bundles, so bundles with no
    /// measure file at all still appear with default (failed) scores.
    pub fn with_bundles<I, S>(mut self, bundles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.expected_bundles
            .extend(bundles.into_iter().map(Into::into));
        self
    }

    /// Aggregate the given measure files.
    ///
    /// Every path is checked and every name parsed before any file is read.
    pub fn aggregate<P: AsRef<Path>>(&self, paths: &[P]) -> Result<AggregateReport> {
        for path in paths {
            EvalError::require_exists(path.as_ref())?;
        }

        let keyed = parse_keys(paths)?;
        let mut subjects = self.bundle_universe(&keyed);

        for (key, path) in &keyed {
            let summary = subjects
                .entry(key.subject_id.clone())
                .or_default()
                .entry(key.bundle_name.clone())
                .or_default();

            match key.kind {
                MeasureKind::Individual => {
                    summary.apply_individual(&load_record::<IndividualMeasures>(path)?)
                }
                MeasureKind::Pairwise => {
                    summary.apply_pairwise(&load_record::<PairwiseMeasures>(path)?)
                }
            }
            debug!("Merged {}", key);
        }

        let scores = compute_scores(&subjects);
        let report = AggregateReport { subjects, scores };
        info!(
            "Aggregated {} files into {} subjects, {} bundle summaries",
            keyed.len(),
            report.subjects.len(),
            report.bundle_count()
        );

        Ok(report)
    }

    /// All (subject, bundle) pairs seeded with the not-reconstructed default.
    fn bundle_universe(&self, keyed: &[(MeasureFileKey, PathBuf)]) -> SubjectMap {
        let mut subjects = SubjectMap::new();

        for (key, _) in keyed {
            subjects
                .entry(key.subject_id.clone())
                .or_default()
                .entry(key.bundle_name.clone())
                .or_insert_with(BundleSummary::default);
        }

        for bundles in subjects.values_mut() {
            for name in &self.expected_bundles {
                bundles.entry(name.clone()).or_insert_with(BundleSummary::default);
            }
        }

        subjects
    }
}

/// Aggregate measure files using only the bundles observed in their names.
pub fn aggregate<P: AsRef<Path>>(paths: &[P]) -> Result<AggregateReport> {
    Aggregator::new().aggregate(paths)
}

fn parse_keys<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<(MeasureFileKey, PathBuf)>> {
    let mut seen = BTreeSet::new();
    let mut keyed = Vec::with_capacity(paths.len());

    for path in paths {
        let path = path.as_ref();
        let key = MeasureFileKey::parse(path)?;
        if !seen.insert(key.clone()) {
            return Err(EvalError::DuplicateRecord {
                subject: key.subject_id,
                bundle: key.bundle_name,
                kind: key.kind.to_string(),
            });
        }
        keyed.push((key, path.to_path_buf()));
    }

    Ok(keyed)
}

fn load_record<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|e| EvalError::InvalidRecord {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Compute dataset-wide scores over all bundle summaries.
///
/// Means skip undefined values; a mean over no values is `None`.
pub fn compute_scores(subjects: &SubjectMap) -> Scores {
    let summaries = || subjects.values().flat_map(|bundles| bundles.values());

    Scores {
        dice: mean(summaries().map(|s| Some(s.dice))),
        overlap: mean(summaries().map(|s| Some(s.overlap))),
        overreach: mean(summaries().map(|s| s.overreach)),
        total_streamlines: summaries().map(|s| s.streamlines_count).sum(),
    }
}

/// Scores of each bundle across all subjects.
pub fn scores_by_bundle(subjects: &SubjectMap) -> BTreeMap<String, Scores> {
    let mut grouped: BTreeMap<String, SubjectMap> = BTreeMap::new();

    for (subject, bundles) in subjects {
        for (bundle, summary) in bundles {
            grouped
                .entry(bundle.clone())
                .or_default()
                .entry(subject.clone())
                .or_default()
                .insert(bundle.clone(), summary.clone());
        }
    }

    grouped
        .into_iter()
        .map(|(bundle, per_subject)| (bundle, compute_scores(&per_subject)))
        .collect()
}

fn mean(values: impl Iterator<Item = Option<f64>>) -> Option<f64> {
    let (sum, count) = values
        .flatten()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));

    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_record(dir: &Path, name: &str, json: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, json).unwrap();
        path
    }

    #[test]
    fn test_merge_individual_and_pairwise() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![
            write_record(
                dir.path(),
                "A__bundle1_individual_measures.json",
                r#"{"streamlines_count": [42]}"#,
            ),
            write_record(
                dir.path(),
                "A__bundle1_pairwise_measures.json",
                r#"{"dice": 0.8, "overlap": 0.75, "overreach": 0.1}"#,
            ),
        ];

        let report = aggregate(&files).unwrap();
        let summary = &report.subjects["A"]["bundle1"];
        assert_eq!(
            serde_json::to_string(&summary).unwrap(),
            r#"{"dice":0.8,"overlap":0.75,"overreach":0.1,"streamlines_count":42}"#
        );
        assert_eq!(report.scores.dice, Some(0.8));
        assert_eq!(report.scores.total_streamlines, 42);
    }

    #[test]
    fn test_missing_individual_defaults_to_zero_streamlines() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![write_record(
            dir.path(),
            "sub-01__CST_L_pairwise_measures.json",
            r#"{"dice": 0.5, "overlap": 0.6, "overreach": 0.2}"#,
        )];

        let report = aggregate(&files).unwrap();
        assert_eq!(report.subjects["sub-01"]["CST_L"].streamlines_count, 0);
        assert_eq!(report.scores.total_streamlines, 0);
    }

    #[test]
    fn test_missing_pairwise_keeps_failed_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![write_record(
            dir.path(),
            "sub-01__OR_R_individual_measures.json",
            r#"{"streamlines_count": 7}"#,
        )];

        let report = aggregate(&files).unwrap();
        let summary = &report.subjects["sub-01"]["OR_R"];
        assert_eq!(summary.dice, 0.0);
        assert_eq!(summary.overlap, 0.0);
        assert_eq!(summary.overreach, None);
        assert_eq!(summary.streamlines_count, 7);
        assert_eq!(report.scores.overreach, None);
    }

    #[test]
    fn test_individual_extra_measures_reach_summary() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![
            write_record(
                dir.path(),
                "sub-01__AF_L_individual_measures.json",
                r#"{"streamlines_count": [12], "volume": [1234.5], "avg_length": 87.2}"#,
            ),
            write_record(
                dir.path(),
                "sub-01__AF_L_pairwise_measures.json",
                r#"{"dice": 0.5, "overlap": 0.5, "overreach": 0.5}"#,
            ),
        ];

        let report = aggregate(&files).unwrap();
        let value = serde_json::to_value(&report).unwrap();
        let summary = &value["subjects"]["sub-01"]["AF_L"];
        assert_eq!(summary["volume"], serde_json::json!(1234.5));
        assert_eq!(summary["avg_length"], serde_json::json!(87.2));
        assert_eq!(summary["streamlines_count"], 12);
        assert_eq!(summary["dice"], serde_json::json!(0.5));
        assert_eq!(report.scores.total_streamlines, 12);
    }

    #[test]
    fn test_mean_excludes_null_overreach() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![
            write_record(
                dir.path(),
                "s1__AF_L_pairwise_measures.json",
                r#"{"dice": 0.6, "overlap": 0.5, "overreach": 0.4}"#,
            ),
            write_record(
                dir.path(),
                "s1__AF_R_pairwise_measures.json",
                r#"{"dice": 0.0, "overlap": 0.0, "overreach": null}"#,
            ),
        ];

        let report = aggregate(&files).unwrap();
        assert_eq!(report.scores.overreach, Some(0.4));
        assert_eq!(report.scores.dice, Some(0.3));
        assert_eq!(report.scores.overlap, Some(0.25));
    }

    #[test]
    fn test_order_independent() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![
            write_record(
                dir.path(),
                "s2__UF_L_pairwise_measures.json",
                r#"{"dice": 0.1, "overlap": 0.2, "overreach": 0.7}"#,
            ),
            write_record(
                dir.path(),
                "s1__UF_L_individual_measures.json",
                r#"{"streamlines_count": [100]}"#,
            ),
            write_record(
                dir.path(),
                "s1__UF_L_pairwise_measures.json",
                r#"{"dice": [0.3], "overlap": [0.4], "overreach": [1.3]}"#,
            ),
            write_record(
                dir.path(),
                "s2__CC_individual_measures.json",
                r#"{"streamlines_count": 55}"#,
            ),
        ];

        let forward = aggregate(&files).unwrap();
        let mut reversed_files = files.clone();
        reversed_files.reverse();
        let reversed = aggregate(&reversed_files).unwrap();
        let rotated_files: Vec<_> = files[2..].iter().chain(&files[..2]).cloned().collect();
        let rotated = aggregate(&rotated_files).unwrap();

        assert_eq!(forward, reversed);
        assert_eq!(forward, rotated);
        assert_eq!(
            serde_json::to_string(&forward).unwrap(),
            serde_json::to_string(&reversed).unwrap()
        );
        assert_eq!(forward.scores.total_streamlines, 155);
    }

    #[test]
    fn test_expected_bundles_seed_every_subject() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![
            write_record(
                dir.path(),
                "s1__CST_L_individual_measures.json",
                r#"{"streamlines_count": 10}"#,
            ),
            write_record(
                dir.path(),
                "s2__CST_R_individual_measures.json",
                r#"{"streamlines_count": 20}"#,
            ),
        ];

        let report = Aggregator::new()
            .with_bundles(["CST_L", "CST_R"])
            .aggregate(&files)
            .unwrap();

        let names: BTreeMap<_, Vec<_>> = report
            .subjects
            .iter()
            .map(|(s, b)| (s.as_str(), b.keys().map(String::as_str).collect()))
            .collect();
        assert_eq!(names["s1"], vec!["CST_L", "CST_R"]);
        assert_eq!(names["s2"], vec!["CST_L", "CST_R"]);
        assert_eq!(report.bundle_count(), 4);
        assert_eq!(report.scores.total_streamlines, 30);
        assert_eq!(report.scores.dice, Some(0.0));
    }

    #[test]
    fn test_missing_input_fails_before_reading() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![
            write_record(dir.path(), "bad_name.json", "not json"),
            dir.path().join("A__x_pairwise_measures.json"),
        ];

        assert!(matches!(aggregate(&files), Err(EvalError::NotFound(_))));
    }

    #[test]
    fn test_malformed_name_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![write_record(dir.path(), "A_bundle1_measures.json", "{}")];

        assert!(matches!(
            aggregate(&files),
            Err(EvalError::MalformedName { .. })
        ));
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("copy");
        std::fs::create_dir(&sub).unwrap();
        let json = r#"{"streamlines_count": 1}"#;
        let files = vec![
            write_record(dir.path(), "A__b_individual_measures.json", json),
            write_record(&sub, "A__b_individual_measures.json", json),
        ];

        assert!(matches!(
            aggregate(&files),
            Err(EvalError::DuplicateRecord { .. })
        ));
    }

    #[test]
    fn test_invalid_record_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![write_record(
            dir.path(),
            "A__b_pairwise_measures.json",
            r#"{"dice": [0.1, 0.2], "overlap": 0.3}"#,
        )];

        assert!(matches!(
            aggregate(&files),
            Err(EvalError::InvalidRecord { .. })
        ));
    }

    #[test]
    fn test_scores_by_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![
            write_record(
                dir.path(),
                "s1__CST_L_pairwise_measures.json",
                r#"{"dice": 0.5, "overlap": 0.5, "overreach": 0.5}"#,
            ),
            write_record(
                dir.path(),
                "s2__CST_L_pairwise_measures.json",
                r#"{"dice": 1.0, "overlap": 1.0, "overreach": 0.0}"#,
            ),
            write_record(
                dir.path(),
                "s2__CC_individual_measures.json",
                r#"{"streamlines_count": 9}"#,
            ),
        ];

        let report = aggregate(&files).unwrap();
        let by_bundle = scores_by_bundle(&report.subjects);
        assert_eq!(by_bundle.len(), 2);
        assert_eq!(by_bundle["CST_L"].dice, Some(0.75));
        assert_eq!(by_bundle["CST_L"].overreach, Some(0.25));
        assert_eq!(by_bundle["CC"].overreach, None);
        assert_eq!(by_bundle["CC"].total_streamlines, 9);
    }

    #[test]
    fn test_empty_input_has_no_scores() {
        let files: Vec<PathBuf> = Vec::new();
        let report = aggregate(&files).unwrap();
        assert!(report.subjects.is_empty());
        assert_eq!(report.scores, Scores::default());
    }
}
