//! Data models for bundle evaluation.
//!
//! This module contains the measurement records exchanged between the
//! comparator and the aggregator, and the aggregate report itself.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Kind of measurement stored in a measure file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MeasureKind {
    /// Measures of a reconstruction on its own (e.g. streamline count).
    Individual,
    /// Measures of a reconstruction against its gold standard.
    Pairwise,
}

impl MeasureKind {
    /// File name suffix following the bundle name.
    pub fn suffix(&self) -> &'static str {
        match self {
            MeasureKind::Individual => "_individual_measures.json",
            MeasureKind::Pairwise => "_pairwise_measures.json",
        }
    }
}

impl fmt::Display for MeasureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MeasureKind::Individual => write!(f, "individual"),
            MeasureKind::Pairwise => write!(f, "pairwise"),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrList<T> {
    One(T),
    List(Vec<T>),
}

/// Accept `value` or `[value]`; reject empty and multi-element lists.
fn scalar<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    match OneOrList::<T>::deserialize(deserializer)? {
        OneOrList::One(value) => Ok(value),
        OneOrList::List(mut values) if values.len() == 1 => Ok(values.remove(0)),
        OneOrList::List(values) => Err(D::Error::custom(format!(
            "expected a scalar or a single-element list, found a list of {} values",
            values.len()
        ))),
    }
}

/// Voxel-wise comparison of a candidate bundle against its gold standard.
///
/// `overlap` and `dice` lie in `[0, 1]`. `overreach` is the false-positive
/// volume divided by the reference volume, so it is unbounded above and
/// regularly exceeds 1 for bundles that spill far outside the reference.
/// It is `None` when the candidate shares no voxel with the reference.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PairwiseMeasures {
    #[serde(deserialize_with = "scalar")]
    pub dice: f64,
    #[serde(deserialize_with = "scalar")]
    pub overlap: f64,
    #[serde(default, deserialize_with = "scalar")]
    pub overreach: Option<f64>,
}

impl PairwiseMeasures {
    /// Measures of a reconstruction sharing no voxel with the reference.
    pub fn failed() -> Self {
        Self {
            dice: 0.0,
            overlap: 0.0,
            overreach: None,
        }
    }

    /// Compute the measures from voxel set counts.
    pub fn from_counts(true_positive: usize, false_positive: usize, false_negative: usize) -> Self {
        if true_positive == 0 {
            return Self::failed();
        }

        let tp = true_positive as f64;
        let fp = false_positive as f64;
        let fn_ = false_negative as f64;

        Self {
            dice: 2.0 * tp / (2.0 * tp + fp + fn_),
            overlap: tp / (tp + fn_),
            overreach: Some(fp / (tp + fn_)),
        }
    }
}

/// A measure value carried through aggregation without interpretation.
///
/// A single-element list is unwrapped to its element; anything else is kept
/// as written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct MeasureValue(pub serde_json::Value);

impl<'de> Deserialize<'de> for MeasureValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match serde_json::Value::deserialize(deserializer)? {
            serde_json::Value::Array(mut items) if items.len() == 1 => {
                Ok(MeasureValue(items.remove(0)))
            }
            value => Ok(MeasureValue(value)),
        }
    }
}

/// Keys owned by [`BundleSummary`]; extra measures never shadow them.
const SUMMARY_KEYS: [&str; 4] = ["dice", "overlap", "overreach", "streamlines_count"];

/// Measures of a reconstruction independent of any reference.
///
/// Keys other than the streamline count (volume, length statistics, ...)
/// are kept in `extra` and carried into the bundle summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndividualMeasures {
    #[serde(deserialize_with = "scalar")]
    pub streamlines_count: u64,
    #[serde(flatten)]
    pub extra: BTreeMap<String, MeasureValue>,
}

impl IndividualMeasures {
    /// Measures holding only a streamline count.
    pub fn with_count(streamlines_count: u64) -> Self {
        Self {
            streamlines_count,
            extra: BTreeMap::new(),
        }
    }
}

/// Merged measures of one bundle of one subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleSummary {
    pub dice: f64,
    pub overlap: f64,
    pub overreach: Option<f64>,
    pub streamlines_count: u64,
    /// Further individual measures, merged key by key.
    #[serde(flatten)]
    pub extra: BTreeMap<String, MeasureValue>,
}

impl Default for BundleSummary {
    /// Summary of a bundle that was never reconstructed.
    fn default() -> Self {
        Self {
            dice: 0.0,
            overlap: 0.0,
            overreach: None,
            streamlines_count: 0,
            extra: BTreeMap::new(),
        }
    }
}

impl BundleSummary {
    /// Overwrite the reference-independent fields present in `measures`.
    pub fn apply_individual(&mut self, measures: &IndividualMeasures) {
        self.streamlines_count = measures.streamlines_count;
        for (key, value) in &measures.extra {
            if SUMMARY_KEYS.contains(&key.as_str()) {
                continue;
            }
            self.extra.insert(key.clone(), value.clone());
        }
    }

    /// Overwrite the comparison fields.
    pub fn apply_pairwise(&mut self, measures: &PairwiseMeasures) {
        self.dice = measures.dice;
        self.overlap = measures.overlap;
        self.overreach = measures.overreach;
    }
}

/// Dataset-wide scores.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Scores {
    /// Mean Dice over all bundle summaries.
    pub dice: Option<f64>,
    /// Mean overlap over all bundle summaries.
    pub overlap: Option<f64>,
    /// Mean overreach over the summaries where it is defined.
    pub overreach: Option<f64>,
    /// Sum of streamline counts, defaulted bundles included.
    pub total_streamlines: u64,
}

/// Subject id -> bundle name -> summary.
pub type SubjectMap = BTreeMap<String, BTreeMap<String, BundleSummary>>;

/// The complete aggregate report.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AggregateReport {
    pub subjects: SubjectMap,
    pub scores: Scores,
}

impl AggregateReport {
    /// Number of (subject, bundle) summaries.
    pub fn bundle_count(&self) -> usize {
        self.subjects.values().map(BTreeMap::len).sum()
    }
}
