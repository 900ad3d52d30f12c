//! Brick descriptor contract shared by every storage backend

use std::fmt;
use std::sync::Arc;

use crate::core::types::{DMat4, DVec3, UVec3};
use crate::math::BoundingVolume;
use super::payload::{LoadError, VoxelBuffer};

/// Shared handle to an immutable brick descriptor
pub type SharedBrick = Arc<dyn BrickDescriptor>;

/// Metadata for one rectangular region of a raster volume at one resolution.
///
/// Descriptors are immutable. Voxel data is only produced by
/// [`load_payload`](BrickDescriptor::load_payload) and is owned by the caller.
///
/// Corner lists always hold eight stage-micrometer points ordered x fastest,
/// then y, then z (see [`box_corners`](crate::math::box_corners)).
pub trait BrickDescriptor: fmt::Debug + Send + Sync {
    /// Identity of the brick; two descriptors with the same key are the same brick
    fn key(&self) -> &str;

    /// Corners of the full allocated raster
    fn corner_locations(&self) -> [DVec3; 8];

    /// Corners of the raster excluding allocation padding
    fn valid_corner_locations(&self) -> [DVec3; 8];

    /// Corners of the region this brick should render, without neighbor overlap
    fn tiling_subset_locations(&self) -> [DVec3; 8];

    /// Raster size in voxels
    fn raster_dimensions(&self) -> UVec3;

    fn channel_count(&self) -> usize;

    fn bytes_per_intensity(&self) -> usize;

    /// Finest voxel spacing in micrometers, `None` when metadata is missing.
    ///
    /// Bricks without a resolution cannot be bucketed.
    fn resolution_micrometers(&self) -> Option<f64>;

    /// Union of the raster corners
    fn bounding_volume(&self) -> BoundingVolume;

    /// Maps normalized texture coordinates [0,1]^3 to stage micrometers
    fn local_to_world(&self) -> DMat4;

    /// Read and decode one channel of voxel data.
    ///
    /// Blocking file I/O. Failures leave the descriptor untouched, so the call
    /// may simply be retried later.
    fn load_payload(&self, max_edge_pad_width: f64, channel: usize) -> Result<VoxelBuffer, LoadError>;

    /// Centroid of the bounding volume, the brick's spatial index key
    fn centroid(&self) -> DVec3 {
        self.bounding_volume().centroid()
    }

    /// Whether `other` describes the same brick
    fn is_same_brick(&self, other: &dyn BrickDescriptor) -> bool {
        self.key() == other.key()
    }
}
