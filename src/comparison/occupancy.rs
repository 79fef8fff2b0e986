//! Rasterization of streamlines into voxel occupancy.

use crate::tractogram::Tractogram;
use std::collections::HashSet;

/// Per-voxel streamline visit counts over a 3D grid.
///
/// Voxels are stored row-major with `x` varying slowest and `z` fastest.
#[derive(Debug, Clone, PartialEq)]
pub struct OccupancyVolume {
    dimensions: [usize; 3],
    counts: Vec<u32>,
}

impl OccupancyVolume {
    /// An all-zero volume.
    pub fn empty(dimensions: [usize; 3]) -> Self {
        let len = dimensions.iter().product();
        Self {
            dimensions,
            counts: vec![0; len],
        }
    }

    /// Rasterize a tractogram on its own grid.
    pub fn from_tractogram(tractogram: &Tractogram) -> Self {
        Self::from_voxel_streamlines(tractogram.dimensions(), tractogram.voxel_streamlines())
    }

    /// Rasterize streamlines given in voxel-corner coordinates.
    ///
    /// Each voxel crossed by a streamline segment is counted once per
    /// streamline. Segments are clipped to the grid first, and points or
    /// segments with non-finite coordinates are skipped.
    pub fn from_voxel_streamlines<I>(dimensions: [usize; 3], streamlines: I) -> Self
    where
        I: IntoIterator<Item = Vec<[f64; 3]>>,
    {
        let mut volume = Self::empty(dimensions);
        let mut visited = HashSet::new();

        for streamline in streamlines {
            visited.clear();
            match streamline.as_slice() {
                [] => continue,
                [point] => {
                    if is_finite(point) {
                        visited.insert(voxel_of(point));
                    }
                }
                points => {
                    for segment in points.windows(2) {
                        let Some((start, end)) =
                            clip_to_grid(&segment[0], &segment[1], dimensions)
                        else {
                            continue;
                        };
                        traverse_segment(&start, &end, |voxel| {
                            visited.insert(voxel);
                        });
                    }
                }
            }

            for voxel in visited.iter() {
                if let Some(index) = volume.flat_index(*voxel) {
                    volume.counts[index] += 1;
                }
            }
        }

        volume
    }

    /// Grid dimensions.
    pub fn dimensions(&self) -> [usize; 3] {
        self.dimensions
    }

    /// Visit count of a voxel, 0 outside the grid.
    #[allow(dead_code)] // Inspection helper
    pub fn count(&self, voxel: [i64; 3]) -> u32 {
        self.flat_index(voxel).map_or(0, |i| self.counts[i])
    }

    /// Sorted flat indices of voxels with a non-zero count.
    pub fn occupied_indices(&self) -> Vec<usize> {
        self.counts
            .iter()
            .enumerate()
            .filter(|(_, count)| **count > 0)
            .map(|(index, _)| index)
            .collect()
    }

    /// Number of occupied voxels.
    pub fn occupied_count(&self) -> usize {
        self.counts.iter().filter(|count| **count > 0).count()
    }

    fn flat_index(&self, voxel: [i64; 3]) -> Option<usize> {
        let [nx, ny, nz] = self.dimensions;
        let in_bounds = voxel
            .iter()
            .zip(self.dimensions.iter())
            .all(|(v, n)| *v >= 0 && (*v as usize) < *n);
        if !in_bounds || nx == 0 {
            return None;
        }
        let [x, y, z] = voxel.map(|v| v as usize);
        Some((x * ny + y) * nz + z)
    }
}

fn voxel_of(point: &[f64; 3]) -> [i64; 3] {
    point.map(|c| c.floor() as i64)
}

fn is_finite(point: &[f64; 3]) -> bool {
    point.iter().all(|c| c.is_finite())
}

/// Clip the segment `start -> end` to the box `[0, dim]` on every axis
/// (Liang-Barsky). Returns `None` when nothing of it lies in the box.
fn clip_to_grid(
    start: &[f64; 3],
    end: &[f64; 3],
    dimensions: [usize; 3],
) -> Option<([f64; 3], [f64; 3])> {
    if !is_finite(start) || !is_finite(end) {
        return None;
    }

    let delta = [0, 1, 2].map(|axis| end[axis] - start[axis]);
    if !is_finite(&delta) {
        return None;
    }

    let (mut t_enter, mut t_exit) = (0.0f64, 1.0f64);
    for axis in 0..3 {
        let upper = dimensions[axis] as f64;
        if delta[axis] == 0.0 {
            if start[axis] < 0.0 || start[axis] > upper {
                return None;
            }
            continue;
        }

        let t_low = -start[axis] / delta[axis];
        let t_high = (upper - start[axis]) / delta[axis];
        t_enter = t_enter.max(t_low.min(t_high));
        t_exit = t_exit.min(t_low.max(t_high));
        if t_enter > t_exit {
            return None;
        }
    }

    let at = |t: f64| [0, 1, 2].map(|axis| start[axis] + delta[axis] * t);
    Some((at(t_enter), at(t_exit)))
}

/// Visit every voxel the segment `start -> end` passes through, in order
/// (Amanatides & Woo grid traversal).
fn traverse_segment(start: &[f64; 3], end: &[f64; 3], mut visit: impl FnMut([i64; 3])) {
    let mut voxel = voxel_of(start);
    let last = voxel_of(end);

    let mut step = [0i64; 3];
    let mut t_max = [f64::INFINITY; 3];
    let mut t_delta = [f64::INFINITY; 3];

    for axis in 0..3 {
        let delta = end[axis] - start[axis];
        if delta > 0.0 {
            step[axis] = 1;
            t_max[axis] = ((voxel[axis] + 1) as f64 - start[axis]) / delta;
            t_delta[axis] = 1.0 / delta;
        } else if delta < 0.0 {
            step[axis] = -1;
            t_max[axis] = (voxel[axis] as f64 - start[axis]) / delta;
            t_delta[axis] = -1.0 / delta;
        }
    }

    visit(voxel);

    // One voxel step per unit of Manhattan distance between the end voxels.
    let steps: i64 = (0..3).map(|axis| (last[axis] - voxel[axis]).abs()).sum();
    for _ in 0..steps {
        let axis = (0..3)
            .filter(|axis| voxel[*axis] != last[*axis])
            .min_by(|a, b| t_max[*a].total_cmp(&t_max[*b]));
        let Some(axis) = axis else {
            break;
        };
        voxel[axis] += step[axis];
        t_max[axis] += t_delta[axis];
        visit(voxel);
    }
}
