//! Voxel payloads and the files they are read from

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::core::types::{DMat4, UVec3};
use crate::math::BoundingVolume;

/// Suffix of an uncompressed channel file, after the channel number
pub const RAW_SUFFIX: &str = "raw";
/// Suffix of an LZ4-compressed channel file, after the channel number
pub const COMPRESSED_SUFFIX: &str = "raw.lz4";

/// Failure to produce a brick's voxel payload
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("no such tile folder {}", path.display())]
    MissingFolder { path: PathBuf },

    #[error("no file for channel {channel} in {}", folder.display())]
    NoChannelFile { folder: PathBuf, channel: usize },

    #[error("channel {channel} out of range, brick has {channel_count} channels")]
    ChannelOutOfRange { channel: usize, channel_count: usize },

    #[error("{} is truncated: expected {expected} bytes, found {actual}", path.display())]
    Truncated { path: PathBuf, expected: usize, actual: usize },

    #[error("decompressing {} failed: {message}", path.display())]
    Decompress { path: PathBuf, message: String },

    #[error("reading {} failed: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Decoded intensity samples, x fastest then y then z
#[derive(Clone, Debug, PartialEq)]
pub enum VoxelData {
    U8(Vec<u8>),
    U16(Vec<u16>),
}

impl VoxelData {
    /// Decode little-endian samples from the front of `bytes`.
    ///
    /// `None` when `bytes` holds fewer than `sample_count` samples.
    pub fn from_le_bytes(bytes: &[u8], sample_count: usize, bytes_per_intensity: usize) -> Option<Self> {
        if bytes_per_intensity == 2 {
            let src = bytes.get(..sample_count.checked_mul(2)?)?;
            let mut samples = vec![0u16; sample_count];
            bytemuck::cast_slice_mut::<u16, u8>(&mut samples).copy_from_slice(src);
            for s in &mut samples {
                *s = u16::from_le(*s);
            }
            Some(VoxelData::U16(samples))
        } else {
            Some(VoxelData::U8(bytes.get(..sample_count)?.to_vec()))
        }
    }

    pub fn len(&self) -> usize {
        match self {
            VoxelData::U8(v) => v.len(),
            VoxelData::U16(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw sample bytes in native order
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            VoxelData::U8(v) => v,
            VoxelData::U16(v) => bytemuck::cast_slice(v),
        }
    }
}

/// One channel of a brick's voxels, ready to hand to a renderer
#[derive(Clone, Debug)]
pub struct VoxelBuffer {
    /// Size of the raster in voxels
    pub dims: UVec3,
    pub channel: usize,
    pub bytes_per_intensity: usize,
    pub data: VoxelData,
    /// Voxels of neighbor overlap at each edge, capped by the requested pad width
    pub edge_padding: UVec3,
    /// Normalized texture coordinates to stage micrometers
    pub local_to_world: DMat4,
}

impl VoxelBuffer {
    /// Number of voxels in the raster
    pub fn voxel_count(&self) -> usize {
        self.dims.x as usize * self.dims.y as usize * self.dims.z as usize
    }

    /// Sample at voxel (x, y, z) widened to u16
    pub fn sample(&self, x: u32, y: u32, z: u32) -> Option<u16> {
        if x >= self.dims.x || y >= self.dims.y || z >= self.dims.z {
            return None;
        }
        let idx = (z as usize * self.dims.y as usize + y as usize) * self.dims.x as usize + x as usize;
        match &self.data {
            VoxelData::U8(v) => v.get(idx).map(|s| *s as u16),
            VoxelData::U16(v) => v.get(idx).copied(),
        }
    }

    /// 16-bit samples, if that is the payload type
    pub fn as_u16(&self) -> Option<&[u16]> {
        match &self.data {
            VoxelData::U16(v) => Some(v),
            VoxelData::U8(_) => None,
        }
    }
}

/// Overlap, in voxels, between a raster's extent and its tiling subset.
///
/// Per axis: half the extent difference divided by the voxel spacing, rounded
/// down and clamped to `max_edge_pad_width`.
pub fn edge_padding(raster: &BoundingVolume, subset: &BoundingVolume, dims: UVec3, max_edge_pad_width: f64) -> UVec3 {
    let raster_size = raster.size();
    let subset_size = subset.size();
    let cap = max_edge_pad_width.max(0.0).floor();
    let pad = |axis: usize| -> u32 {
        let voxels = dims[axis] as f64;
        if raster_size[axis] <= 0.0 || voxels <= 0.0 {
            return 0;
        }
        let spacing = raster_size[axis] / voxels;
        let overlap = ((raster_size[axis] - subset_size[axis]) * 0.5 / spacing).max(0.0);
        overlap.floor().min(cap) as u32
    };
    UVec3::new(pad(0), pad(1), pad(2))
}

/// Locate the file holding `channel` inside a tile folder.
///
/// Files are named `<anything>.<channel>.raw`, optionally LZ4 compressed as
/// `<anything>.<channel>.raw.lz4`. Returns the path and whether it is
/// compressed; the compressed file wins when both exist and
/// `leverage_compressed` is set.
pub fn find_channel_file(folder: &Path, channel: usize, leverage_compressed: bool) -> Result<(PathBuf, bool), LoadError> {
    if !folder.is_dir() {
        return Err(LoadError::MissingFolder { path: folder.to_path_buf() });
    }

    let io_err = |source| LoadError::Io { path: folder.to_path_buf(), source };
    let mut names: Vec<String> = fs::read_dir(folder)
        .map_err(io_err)?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .collect();
    names.sort();

    let raw_suffix = format!(".{}.{}", channel, RAW_SUFFIX);
    let compressed_suffix = format!(".{}.{}", channel, COMPRESSED_SUFFIX);

    let raw = names.iter().find(|n| n.ends_with(&raw_suffix));
    let compressed = names.iter().find(|n| n.ends_with(&compressed_suffix));

    let chosen = match (raw, compressed) {
        (_, Some(name)) if leverage_compressed => Some((name, true)),
        (Some(name), _) => Some((name, false)),
        _ => None,
    };

    match chosen {
        Some((name, is_compressed)) => {
            log::trace!("Channel {} of {} -> {}", channel, folder.display(), name);
            Ok((folder.join(name), is_compressed))
        }
        None => Err(LoadError::NoChannelFile { folder: folder.to_path_buf(), channel }),
    }
}

/// Read a channel file, decompressing it when needed
pub fn read_channel_bytes(path: &Path, compressed: bool) -> Result<Vec<u8>, LoadError> {
    let bytes = fs::read(path).map_err(|source| LoadError::Io { path: path.to_path_buf(), source })?;
    if !compressed {
        return Ok(bytes);
    }
    lz4_flex::decompress_size_prepended(&bytes).map_err(|e| LoadError::Decompress {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Decode a dense raster of `dims` samples from a channel file
pub fn read_raster(path: &Path, compressed: bool, dims: UVec3, bytes_per_intensity: usize) -> Result<VoxelData, LoadError> {
    let bytes = read_channel_bytes(path, compressed)?;
    let sample_count = dims.x as usize * dims.y as usize * dims.z as usize;
    let expected = sample_count * bytes_per_intensity;
    if bytes.len() > expected {
        log::warn!("{} has {} trailing bytes", path.display(), bytes.len() - expected);
    }
    VoxelData::from_le_bytes(&bytes, sample_count, bytes_per_intensity).ok_or_else(|| LoadError::Truncated {
        path: path.to_path_buf(),
        expected,
        actual: bytes.len(),
    })
}
