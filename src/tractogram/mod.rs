//! Streamline tractograms and their loader.

pub mod trk;

pub use trk::TrkHeader;

use crate::error::{EvalError, Result};
use std::path::Path;
use tracing::{debug, warn};

/// A single streamline: an ordered sequence of points in voxmm space.
pub type Streamline = Vec<[f32; 3]>;

/// A collection of streamlines plus the voxel grid they live on.
#[derive(Debug, Clone, PartialEq)]
pub struct Tractogram {
    /// Spatial header.
    pub header: TrkHeader,
    /// Streamlines in voxmm space (millimetres, voxel-corner origin).
    pub streamlines: Vec<Streamline>,
}

impl Tractogram {
    /// Grid dimensions in voxels.
    pub fn dimensions(&self) -> [usize; 3] {
        self.header.dimensions
    }

    /// Number of streamlines.
    pub fn len(&self) -> usize {
        self.streamlines.len()
    }

    /// Whether the tractogram holds no streamlines.
    pub fn is_empty(&self) -> bool {
        self.streamlines.is_empty()
    }

    /// Streamlines converted to voxel-corner coordinates, so that
    /// `floor(coordinate)` is the voxel index.
    pub fn voxel_streamlines(&self) -> impl Iterator<Item = Vec<[f64; 3]>> + '_ {
        let sizes = self.header.voxel_sizes;
        self.streamlines.iter().map(move |streamline| {
            streamline
                .iter()
                .map(|p| {
                    [
                        f64::from(p[0]) / f64::from(sizes[0]),
                        f64::from(p[1]) / f64::from(sizes[1]),
                        f64::from(p[2]) / f64::from(sizes[2]),
                    ]
                })
                .collect()
        })
    }
}

/// Load a tractogram from disk, dispatching on the file extension.
pub fn load_tractogram(path: &Path) -> Result<Tractogram> {
    EvalError::require_exists(path)?;

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match ext.as_deref() {
        Some("trk") => {
            let bytes = std::fs::read(path)?;
            let tractogram = trk::parse(&bytes)?;
            if tractogram.is_empty() {
                warn!("{} contains no streamlines", path.display());
            }
            debug!(
                "Loaded {} streamlines from {} (grid {:?}, voxel order {}, version {})",
                tractogram.len(),
                path.display(),
                tractogram.dimensions(),
                tractogram.header.voxel_order,
                tractogram.header.version
            );
            Ok(tractogram)
        }
        _ => Err(EvalError::UnsupportedFormat(path.to_path_buf())),
    }
}
