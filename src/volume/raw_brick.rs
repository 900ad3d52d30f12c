//! Single-file raw volume brick
//!
//! One file holds every channel back to back. Within a channel, voxel rows
//! (along x) are padded to a multiple of 4 bytes, so the allocated raster can
//! be wider than the valid one.

use std::fs;
use std::path::{Path, PathBuf};

use crate::core::types::{DMat4, DQuat, DVec3, UVec3};
use crate::math::{box_corners, BoundingVolume};
use super::brick::BrickDescriptor;
use super::payload::{LoadError, VoxelBuffer, VoxelData};

/// Row alignment of raw volume files, in bytes
pub const ROW_ALIGNMENT: usize = 4;

/// A whole raw volume file treated as one brick
#[derive(Clone, Debug)]
pub struct RawVolumeBrick {
    key: String,
    path: PathBuf,
    /// Valid voxels along each axis
    dims: UVec3,
    channel_count: usize,
    bytes_per_intensity: usize,
    origin_um: DVec3,
    voxel_size_um: DVec3,
}

impl RawVolumeBrick {
    pub fn new(
        path: impl Into<PathBuf>,
        dims: UVec3,
        channel_count: usize,
        bytes_per_intensity: usize,
        origin_um: DVec3,
        voxel_size_um: DVec3,
    ) -> Self {
        let path = path.into();
        Self {
            key: path.display().to_string(),
            path,
            dims,
            channel_count,
            bytes_per_intensity,
            origin_um,
            voxel_size_um,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes per stored row, including alignment padding
    pub fn row_stride(&self) -> usize {
        let row = self.dims.x as usize * self.bytes_per_intensity;
        row.div_ceil(ROW_ALIGNMENT) * ROW_ALIGNMENT
    }

    /// Bytes per stored channel
    pub fn channel_stride(&self) -> usize {
        self.row_stride() * self.dims.y as usize * self.dims.z as usize
    }

    /// Allocated raster size, padding columns included
    fn allocated_dims(&self) -> UVec3 {
        let x = (self.row_stride() / self.bytes_per_intensity.max(1)) as u32;
        UVec3::new(x, self.dims.y, self.dims.z)
    }

    fn extent_corners(&self, dims: UVec3) -> [DVec3; 8] {
        box_corners(self.origin_um, self.origin_um + dims.as_dvec3() * self.voxel_size_um)
    }
}

impl BrickDescriptor for RawVolumeBrick {
    fn key(&self) -> &str {
        &self.key
    }

    fn corner_locations(&self) -> [DVec3; 8] {
        self.extent_corners(self.allocated_dims())
    }

    fn valid_corner_locations(&self) -> [DVec3; 8] {
        self.extent_corners(self.dims)
    }

    fn tiling_subset_locations(&self) -> [DVec3; 8] {
        // A standalone volume has no neighbors to overlap
        self.valid_corner_locations()
    }

    fn raster_dimensions(&self) -> UVec3 {
        self.allocated_dims()
    }

    fn channel_count(&self) -> usize {
        self.channel_count
    }

    fn bytes_per_intensity(&self) -> usize {
        self.bytes_per_intensity
    }

    fn resolution_micrometers(&self) -> Option<f64> {
        Some(self.voxel_size_um.min_element()).filter(|r| r.is_finite() && *r > 0.0)
    }

    fn bounding_volume(&self) -> BoundingVolume {
        BoundingVolume::from_points(&self.corner_locations())
    }

    /// Maps texture coordinates over the valid raster, which is what payloads hold
    fn local_to_world(&self) -> DMat4 {
        DMat4::from_scale_rotation_translation(
            self.dims.as_dvec3() * self.voxel_size_um,
            DQuat::IDENTITY,
            self.origin_um,
        )
    }

    fn load_payload(&self, _max_edge_pad_width: f64, channel: usize) -> Result<VoxelBuffer, LoadError> {
        if channel >= self.channel_count {
            return Err(LoadError::ChannelOutOfRange {
                channel,
                channel_count: self.channel_count,
            });
        }

        let bytes = fs::read(&self.path).map_err(|source| LoadError::Io {
            path: self.path.clone(),
            source,
        })?;
        let expected = self.channel_stride() * self.channel_count;
        if bytes.len() < expected {
            return Err(LoadError::Truncated {
                path: self.path.clone(),
                expected,
                actual: bytes.len(),
            });
        }

        // Strip row padding from the requested channel
        let row = self.dims.x as usize * self.bytes_per_intensity;
        let start = channel * self.channel_stride();
        let rows = self.dims.y as usize * self.dims.z as usize;
        let mut packed = Vec::with_capacity(row * rows);
        for r in 0..rows {
            let offset = start + r * self.row_stride();
            packed.extend_from_slice(&bytes[offset..offset + row]);
        }

        let sample_count = self.dims.x as usize * rows;
        let data = VoxelData::from_le_bytes(&packed, sample_count, self.bytes_per_intensity).ok_or_else(|| {
            LoadError::Truncated {
                path: self.path.clone(),
                expected: row * rows,
                actual: packed.len(),
            }
        })?;
        Ok(VoxelBuffer {
            dims: self.dims,
            channel,
            bytes_per_intensity: self.bytes_per_intensity,
            data,
            edge_padding: UVec3::ZERO,
            local_to_world: self.local_to_world(),
        })
    }
}
