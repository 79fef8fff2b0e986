//! Voxel-wise comparison of a candidate bundle against a gold standard.
//!
//! Both tractograms are rasterized into binary occupancy volumes on their
//! own grids, then compared as sets of flat voxel indices.

pub mod occupancy;

pub use occupancy::OccupancyVolume;

use crate::error::{EvalError, Result};
use crate::models::PairwiseMeasures;
use crate::tractogram::{load_tractogram, Tractogram};
use std::cmp::Ordering;
use std::path::Path;
use tracing::debug;

/// Voxel set cardinalities of a candidate against a reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VoxelCounts {
    /// Voxels occupied by both.
    pub true_positive: usize,
    /// Voxels occupied by the candidate only.
    pub false_positive: usize,
    /// Voxels occupied by the reference only.
    pub false_negative: usize,
}

impl VoxelCounts {
    /// Count set intersections and differences of two sorted index lists.
    pub fn from_sorted(candidate: &[usize], reference: &[usize]) -> Self {
        let mut counts = Self::default();
        let (mut i, mut j) = (0, 0);

        while i < candidate.len() && j < reference.len() {
            match candidate[i].cmp(&reference[j]) {
                Ordering::Less => {
                    counts.false_positive += 1;
                    i += 1;
                }
                Ordering::Greater => {
                    counts.false_negative += 1;
                    j += 1;
                }
                Ordering::Equal => {
                    counts.true_positive += 1;
                    i += 1;
                    j += 1;
                }
            }
        }
        counts.false_positive += candidate.len() - i;
        counts.false_negative += reference.len() - j;

        counts
    }

    pub fn measures(&self) -> PairwiseMeasures {
        PairwiseMeasures::from_counts(
            self.true_positive,
            self.false_positive,
            self.false_negative,
        )
    }
}

/// Compare two occupancy volumes defined on the same grid.
pub fn compare_occupancy(
    candidate: &OccupancyVolume,
    reference: &OccupancyVolume,
) -> Result<PairwiseMeasures> {
    if candidate.dimensions() != reference.dimensions() {
        return Err(EvalError::GridMismatch {
            candidate: candidate.dimensions(),
            reference: reference.dimensions(),
        });
    }

    let counts = VoxelCounts::from_sorted(
        &candidate.occupied_indices(),
        &reference.occupied_indices(),
    );
    debug!(
        "tp={} fp={} fn={}",
        counts.true_positive, counts.false_positive, counts.false_negative
    );

    Ok(counts.measures())
}

/// Compare a candidate tractogram against a reference tractogram.
pub fn compare_tractograms(
    candidate: &Tractogram,
    reference: &Tractogram,
) -> Result<PairwiseMeasures> {
    let candidate = OccupancyVolume::from_tractogram(candidate);
    let reference = OccupancyVolume::from_tractogram(reference);
    debug!(
        "Occupied voxels: candidate={} reference={}",
        candidate.occupied_count(),
        reference.occupied_count()
    );
    compare_occupancy(&candidate, &reference)
}

/// Load and compare two tractogram files.
///
/// Both paths are checked before either file is read.
pub fn compare_files(candidate: &Path, reference: &Path) -> Result<PairwiseMeasures> {
    EvalError::require_exists(candidate)?;
    EvalError::require_exists(reference)?;

    let candidate = load_tractogram(candidate)?;
    let reference = load_tractogram(reference)?;
    compare_tractograms(&candidate, &reference)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tractogram::trk::write_trk;
    use crate::tractogram::Streamline;

    fn volume(indices: &[usize]) -> OccupancyVolume {
        // 1 x 1 x n grid: flat index == z
        let streamlines = indices
            .iter()
            .map(|i| vec![[0.5, 0.5, *i as f64 + 0.5]])
            .collect::<Vec<_>>();
        OccupancyVolume::from_voxel_streamlines([1, 1, 8], streamlines)
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-4,
            "expected {expected}, got {actual}"
        );
    }

    fn bundle(x: f32, y: f32) -> Vec<Streamline> {
        vec![
            vec![[x, y, 0.5], [x, y, 9.5]],
            vec![[x + 1.0, y, 0.5], [x + 1.0, y, 5.5]],
        ]
    }

    #[test]
    fn test_voxel_counts() {
        let counts = VoxelCounts::from_sorted(&[1, 2, 3], &[2, 3, 4]);
        assert_eq!(
            counts,
            VoxelCounts {
                true_positive: 2,
                false_positive: 1,
                false_negative: 1,
            }
        );
        assert_eq!(
            VoxelCounts::from_sorted(&[], &[1, 2]).false_negative,
            2
        );
        assert_eq!(
            VoxelCounts::from_sorted(&[5, 6, 7], &[]).false_positive,
            3
        );
    }

    #[test]
    fn test_partial_overlap_scenario() {
        let measures = compare_occupancy(&volume(&[1, 2, 3]), &volume(&[2, 3, 4])).unwrap();
        assert_close(measures.dice, 0.6667);
        assert_close(measures.overlap, 0.6667);
        assert_close(measures.overreach.unwrap(), 0.3333);
    }

    #[test]
    fn test_identical_volumes() {
        let a = volume(&[0, 3, 5]);
        let measures = compare_occupancy(&a, &a).unwrap();
        assert_eq!(measures.dice, 1.0);
        assert_eq!(measures.overlap, 1.0);
        assert_eq!(measures.overreach, Some(0.0));
    }

    #[test]
    fn test_disjoint_volumes() {
        let measures = compare_occupancy(&volume(&[0, 1]), &volume(&[5, 6, 7])).unwrap();
        assert_eq!(measures.dice, 0.0);
        assert_eq!(measures.overlap, 0.0);
        assert_eq!(measures.overreach, None);
    }

    #[test]
    fn test_symmetry() {
        let a = volume(&[0, 1, 2, 3, 4]);
        let b = volume(&[3, 4, 5]);
        let ab = compare_occupancy(&a, &b).unwrap();
        let ba = compare_occupancy(&b, &a).unwrap();

        assert_eq!(ab.dice, ba.dice);
        // tp=2, fp=3, fn=1 vs tp=2, fp=1, fn=3
        assert_close(ab.overlap, 2.0 / 3.0);
        assert_close(ba.overlap, 2.0 / 5.0);
        assert_close(ab.overreach.unwrap(), 1.0);
        assert_close(ba.overreach.unwrap(), 0.2);
        assert_ne!(ab.overlap, ba.overlap);
        assert_ne!(Some(ab.overlap), ba.overreach);
    }

    #[test]
    fn test_grid_mismatch() {
        let a = OccupancyVolume::empty([2, 2, 2]);
        let b = OccupancyVolume::empty([2, 2, 3]);
        assert!(matches!(
            compare_occupancy(&a, &b),
            Err(EvalError::GridMismatch { .. })
        ));
    }

    #[test]
    fn test_compare_identical_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cst.trk");
        write_trk(&path, [10, 10, 10], [1.0, 1.0, 1.0], &bundle(2.5, 2.5));

        let measures = compare_files(&path, &path).unwrap();
        assert_eq!(measures.dice, 1.0);
        assert_eq!(measures.overlap, 1.0);
        assert_eq!(measures.overreach, Some(0.0));
    }

    #[test]
    fn test_compare_files_partial() {
        let dir = tempfile::tempdir().unwrap();
        let candidate = dir.path().join("candidate.trk");
        let reference = dir.path().join("reference.trk");
        // candidate: column (2,2) z0..9 and (3,2) z0..5 -> 16 voxels
        // reference: column (3,2) z0..9 and (4,2) z0..5 -> 16 voxels
        write_trk(&candidate, [10, 10, 10], [1.0, 1.0, 1.0], &bundle(2.5, 2.5));
        write_trk(&reference, [10, 10, 10], [1.0, 1.0, 1.0], &bundle(3.5, 2.5));

        let measures = compare_files(&candidate, &reference).unwrap();
        // tp = 6, fp = 10, fn = 10
        assert_close(measures.overlap, 6.0 / 16.0);
        assert_close(measures.overreach.unwrap(), 10.0 / 16.0);
        assert_close(measures.dice, 12.0 / 32.0);
    }

    #[test]
    fn test_compare_empty_tractogram() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("empty.trk");
        let reference = dir.path().join("reference.trk");
        write_trk(&empty, [10, 10, 10], [1.0, 1.0, 1.0], &[]);
        write_trk(&reference, [10, 10, 10], [1.0, 1.0, 1.0], &bundle(2.5, 2.5));

        let measures = compare_files(&empty, &reference).unwrap();
        assert_eq!(measures, PairwiseMeasures::failed());
    }

    #[test]
    fn test_compare_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let reference = dir.path().join("reference.trk");
        write_trk(&reference, [10, 10, 10], [1.0, 1.0, 1.0], &bundle(2.5, 2.5));

        let result = compare_files(&dir.path().join("missing.trk"), &reference);
        assert!(matches!(result, Err(EvalError::NotFound(_))));
    }
}
