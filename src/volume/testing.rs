//! Lightweight descriptors for index and source tests

use std::sync::Arc;

use crate::core::types::{DMat4, DQuat, DVec3, UVec3};
use crate::math::{box_corners, BoundingVolume};
use super::brick::{BrickDescriptor, SharedBrick};
use super::payload::{LoadError, VoxelBuffer};

/// Axis-aligned cube brick with no backing file
#[derive(Debug)]
pub(crate) struct CubeBrick {
    pub key: String,
    pub volume: BoundingVolume,
    pub resolution: Option<f64>,
}

impl BrickDescriptor for CubeBrick {
    fn key(&self) -> &str {
        &self.key
    }

    fn corner_locations(&self) -> [DVec3; 8] {
        box_corners(self.volume.min, self.volume.max)
    }

    fn valid_corner_locations(&self) -> [DVec3; 8] {
        self.corner_locations()
    }

    fn tiling_subset_locations(&self) -> [DVec3; 8] {
        self.corner_locations()
    }

    fn raster_dimensions(&self) -> UVec3 {
        UVec3::splat(8)
    }

    fn channel_count(&self) -> usize {
        1
    }

    fn bytes_per_intensity(&self) -> usize {
        1
    }

    fn resolution_micrometers(&self) -> Option<f64> {
        self.resolution
    }

    fn bounding_volume(&self) -> BoundingVolume {
        self.volume
    }

    fn local_to_world(&self) -> DMat4 {
        DMat4::from_scale_rotation_translation(
            self.volume.size(),
            DQuat::IDENTITY,
            self.volume.min,
        )
    }

    fn load_payload(&self, _max_edge_pad_width: f64, channel: usize) -> Result<VoxelBuffer, LoadError> {
        Err(LoadError::ChannelOutOfRange { channel, channel_count: 0 })
    }
}

/// Cube of edge `size` centered at `center`
pub(crate) fn cube(key: &str, center: DVec3, size: f64, resolution: f64) -> SharedBrick {
    Arc::new(CubeBrick {
        key: key.to_string(),
        volume: BoundingVolume::new(center - size * 0.5, center + size * 0.5),
        resolution: Some(resolution),
    })
}
