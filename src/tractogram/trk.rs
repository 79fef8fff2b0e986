//! TrackVis `.trk` reader.
//!
//! The format is a fixed 1000-byte header followed by streamline records:
//! `n_points: i32`, then `n_points * (3 + n_scalars)` floats, then
//! `n_properties` floats. Endianness is detected from `hdr_size`.

use super::{Streamline, Tractogram};
use crate::error::{EvalError, Result};
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use tracing::debug;

/// Size of a TrackVis header in bytes.
pub const HEADER_SIZE: usize = 1000;

/// Header field byte offsets.
mod offsets {
    pub const ID_STRING: usize = 0;
    pub const DIM: usize = 6;
    pub const VOXEL_SIZE: usize = 12;
    pub const N_SCALARS: usize = 36;
    pub const N_PROPERTIES: usize = 238;
    pub const VOX_TO_RAS: usize = 440;
    pub const VOXEL_ORDER: usize = 948;
    pub const N_COUNT: usize = 988;
    pub const VERSION: usize = 992;
    pub const HDR_SIZE: usize = 996;
}

const MAGIC: &[u8; 5] = b"TRACK";

/// Spatial metadata of a tractogram.
#[derive(Debug, Clone, PartialEq)]
pub struct TrkHeader {
    /// Grid dimensions in voxels.
    pub dimensions: [usize; 3],
    /// Voxel sizes in millimetres.
    pub voxel_sizes: [f32; 3],
    /// Voxel-to-RAS affine, row-major.
    pub vox_to_ras: [[f32; 4]; 4],
    /// Voxel order code, e.g. `LAS` or `RAS`.
    pub voxel_order: String,
    /// Number of per-point scalars stored after each coordinate triplet.
    pub n_scalars: usize,
    /// Number of per-streamline properties.
    pub n_properties: usize,
    /// Declared streamline count (0 when unknown).
    pub n_count: usize,
    /// Format version.
    pub version: i32,
}

/// Parse a complete `.trk` file.
pub fn parse(bytes: &[u8]) -> Result<Tractogram> {
    if bytes.len() < HEADER_SIZE {
        return Err(EvalError::InvalidHeader(format!(
            "file is {} bytes, shorter than the {} byte header",
            bytes.len(),
            HEADER_SIZE
        )));
    }

    if &bytes[offsets::ID_STRING..offsets::ID_STRING + MAGIC.len()] != MAGIC {
        return Err(EvalError::InvalidHeader("missing TRACK magic".to_string()));
    }

    let hdr_range = offsets::HDR_SIZE..offsets::HDR_SIZE + 4;
    if LittleEndian::read_i32(&bytes[hdr_range.clone()]) == HEADER_SIZE as i32 {
        parse_with::<LittleEndian>(bytes)
    } else if BigEndian::read_i32(&bytes[hdr_range]) == HEADER_SIZE as i32 {
        debug!("Reading big-endian tractogram");
        parse_with::<BigEndian>(bytes)
    } else {
        Err(EvalError::InvalidHeader("hdr_size is not 1000".to_string()))
    }
}

fn parse_with<B: ByteOrder>(bytes: &[u8]) -> Result<Tractogram> {
    let header = parse_header::<B>(bytes)?;
    debug!(
        "TrackVis header: dim={:?} voxel_size={:?} vox_to_ras={:?}",
        header.dimensions, header.voxel_sizes, header.vox_to_ras
    );
    let streamlines = parse_body::<B>(&bytes[HEADER_SIZE..], &header)?;

    if header.n_count > 0 && header.n_count != streamlines.len() {
        return Err(EvalError::Truncated(format!(
            "header declares {} streamlines, found {}",
            header.n_count,
            streamlines.len()
        )));
    }

    Ok(Tractogram {
        header,
        streamlines,
    })
}

fn parse_header<B: ByteOrder>(bytes: &[u8]) -> Result<TrkHeader> {
    let mut dimensions = [0usize; 3];
    let mut voxel_sizes = [0f32; 3];
    for axis in 0..3 {
        let dim_off = offsets::DIM + axis * 2;
        let dim = B::read_i16(&bytes[dim_off..dim_off + 2]);
        if dim <= 0 {
            return Err(EvalError::InvalidHeader(format!(
                "dimension {} is {}",
                axis, dim
            )));
        }
        dimensions[axis] = dim as usize;

        let size_off = offsets::VOXEL_SIZE + axis * 4;
        let size = B::read_f32(&bytes[size_off..size_off + 4]);
        if !(size.is_finite() && size > 0.0) {
            return Err(EvalError::InvalidHeader(format!(
                "voxel size {} is {}",
                axis, size
            )));
        }
        voxel_sizes[axis] = size;
    }

    let mut vox_to_ras = [[0f32; 4]; 4];
    for (row, values) in vox_to_ras.iter_mut().enumerate() {
        for (col, value) in values.iter_mut().enumerate() {
            let off = offsets::VOX_TO_RAS + (row * 4 + col) * 4;
            *value = B::read_f32(&bytes[off..off + 4]);
        }
    }

    let voxel_order = bytes[offsets::VOXEL_ORDER..offsets::VOXEL_ORDER + 4]
        .iter()
        .take_while(|b| **b != 0)
        .map(|b| *b as char)
        .collect();

    let n_scalars = read_count::<B>(bytes, offsets::N_SCALARS, "n_scalars")?;
    let n_properties = read_count::<B>(bytes, offsets::N_PROPERTIES, "n_properties")?;

    let n_count = B::read_i32(&bytes[offsets::N_COUNT..offsets::N_COUNT + 4]);
    if n_count < 0 {
        return Err(EvalError::InvalidHeader(format!("n_count is {}", n_count)));
    }

    Ok(TrkHeader {
        dimensions,
        voxel_sizes,
        vox_to_ras,
        voxel_order,
        n_scalars,
        n_properties,
        n_count: n_count as usize,
        version: B::read_i32(&bytes[offsets::VERSION..offsets::VERSION + 4]),
    })
}

fn read_count<B: ByteOrder>(bytes: &[u8], offset: usize, field: &str) -> Result<usize> {
    let value = B::read_i16(&bytes[offset..offset + 2]);
    if value < 0 {
        return Err(EvalError::InvalidHeader(format!("{} is {}", field, value)));
    }
    Ok(value as usize)
}

fn parse_body<B: ByteOrder>(body: &[u8], header: &TrkHeader) -> Result<Vec<Streamline>> {
    let point_stride = (3 + header.n_scalars) * 4;
    let properties_len = header.n_properties * 4;

    // n_count is untrusted; every record takes at least 4 bytes.
    let mut streamlines = Vec::with_capacity(header.n_count.min(body.len() / 4));
    let mut pos = 0;

    while pos < body.len() {
        if body.len() - pos < 4 {
            return Err(EvalError::Truncated(format!(
                "{} trailing bytes after streamline {}",
                body.len() - pos,
                streamlines.len()
            )));
        }
        let n_points = B::read_i32(&body[pos..pos + 4]);
        pos += 4;
        if n_points < 0 {
            return Err(EvalError::Truncated(format!(
                "streamline {} has negative point count {}",
                streamlines.len(),
                n_points
            )));
        }

        let n_points = n_points as usize;
        let record_len = n_points * point_stride + properties_len;
        if body.len() - pos < record_len {
            return Err(EvalError::Truncated(format!(
                "streamline {} needs {} bytes, {} left",
                streamlines.len(),
                record_len,
                body.len() - pos
            )));
        }

        let mut points = Vec::with_capacity(n_points);
        for chunk in body[pos..pos + n_points * point_stride].chunks_exact(point_stride) {
            points.push([
                B::read_f32(&chunk[0..4]),
                B::read_f32(&chunk[4..8]),
                B::read_f32(&chunk[8..12]),
            ]);
        }
        streamlines.push(points);
        pos += record_len;
    }

    Ok(streamlines)
}

/// Write a little-endian `.trk` file without scalars or properties.
#[cfg(test)]
pub(crate) fn write_trk(
    path: &std::path::Path,
    dimensions: [i16; 3],
    voxel_sizes: [f32; 3],
    streamlines: &[Streamline],
) {
    let mut buf = vec![0u8; HEADER_SIZE];
    buf[..MAGIC.len()].copy_from_slice(MAGIC);
    for axis in 0..3 {
        let off = offsets::DIM + axis * 2;
        LittleEndian::write_i16(&mut buf[off..off + 2], dimensions[axis]);
        let off = offsets::VOXEL_SIZE + axis * 4;
        LittleEndian::write_f32(&mut buf[off..off + 4], voxel_sizes[axis]);
    }
    for diag in 0..4 {
        let off = offsets::VOX_TO_RAS + (diag * 4 + diag) * 4;
        let value = if diag < 3 { voxel_sizes[diag] } else { 1.0 };
        LittleEndian::write_f32(&mut buf[off..off + 4], value);
    }
    buf[offsets::VOXEL_ORDER..offsets::VOXEL_ORDER + 3].copy_from_slice(b"RAS");
    LittleEndian::write_i32(
        &mut buf[offsets::N_COUNT..offsets::N_COUNT + 4],
        streamlines.len() as i32,
    );
    LittleEndian::write_i32(&mut buf[offsets::VERSION..offsets::VERSION + 4], 2);
    LittleEndian::write_i32(
        &mut buf[offsets::HDR_SIZE..offsets::HDR_SIZE + 4],
        HEADER_SIZE as i32,
    );

    for streamline in streamlines {
        let mut word = [0u8; 4];
        LittleEndian::write_i32(&mut word, streamline.len() as i32);
        buf.extend_from_slice(&word);
        for point in streamline {
            for coord in point {
                LittleEndian::write_f32(&mut word, *coord);
                buf.extend_from_slice(&word);
            }
        }
    }

    std::fs::write(path, buf).unwrap();
}
