//! Per-dataset catalogs of brick indexes by resolution

use crate::math::BoundingVolume;
use super::brick::SharedBrick;
use super::brick_index::BrickIndex;
use super::resolution::{ResolutionBuckets, DEFAULT_RESOLUTION_TOLERANCE};

/// A loaded multi-resolution volume
pub trait VolumeBrickSource: Send + Sync {
    /// Resolution bucket keys in micrometers per voxel, finest first
    fn available_resolutions(&self) -> Vec<f64>;

    /// Index for the bucket matching `resolution` within tolerance, if any
    fn brick_index_for_resolution(&self, resolution: f64) -> Option<&BrickIndex>;

    /// Union of every brick's bounding volume across all resolutions
    fn bounding_volume(&self) -> BoundingVolume;
}

/// In-memory source assembled from descriptors, one brick at a time.
///
/// Every bucket holds at least one brick. Once built, share it behind an
/// `Arc`; mutation requires exclusive access.
#[derive(Clone, Debug)]
pub struct StaticVolumeBrickSource {
    buckets: ResolutionBuckets<BrickIndex>,
    bounding_volume: BoundingVolume,
}

impl Default for StaticVolumeBrickSource {
    fn default() -> Self {
        Self::new(DEFAULT_RESOLUTION_TOLERANCE)
    }
}

impl StaticVolumeBrickSource {
    /// Create an empty source bucketing with `tolerance`
    pub fn new(tolerance: f64) -> Self {
        Self {
            buckets: ResolutionBuckets::new(tolerance),
            bounding_volume: BoundingVolume::empty(),
        }
    }

    /// Add a brick to the bucket matching its resolution.
    ///
    /// Returns the bucket key, or `None` when the brick was skipped: it has
    /// no usable resolution, or its bucket already holds a brick with the
    /// same key. Skipped bricks do not grow the bounding volume.
    pub fn add_brick(&mut self, brick: SharedBrick) -> Option<f64> {
        let Some(resolution) = brick.resolution_micrometers() else {
            log::warn!("Skipping brick {} with unknown resolution", brick.key());
            return None;
        };
        let volume = brick.bounding_volume();
        let key = brick.key().to_string();

        let Some((bucket, index)) = self.buckets.get_or_insert_with(resolution, BrickIndex::new) else {
            log::warn!("Skipping brick {} with invalid resolution {}", key, resolution);
            return None;
        };
        if !index.add(brick) {
            log::warn!("Skipping duplicate brick {} in {:.4} um level", key, bucket);
            return None;
        }
        self.bounding_volume.include(&volume);
        Some(bucket)
    }

    /// Number of distinct bricks over all buckets
    pub fn brick_count(&self) -> usize {
        self.buckets.iter().map(|(_, index)| index.member_count()).sum()
    }

    /// Iterate (bucket key, index) pairs in bucket creation order
    pub fn levels(&self) -> impl Iterator<Item = (f64, &BrickIndex)> {
        self.buckets.iter()
    }

    pub fn tolerance(&self) -> f64 {
        self.buckets.tolerance()
    }
}

impl VolumeBrickSource for StaticVolumeBrickSource {
    fn available_resolutions(&self) -> Vec<f64> {
        let mut keys: Vec<f64> = self.buckets.keys().collect();
        keys.sort_by(f64::total_cmp);
        keys
    }

    fn brick_index_for_resolution(&self, resolution: f64) -> Option<&BrickIndex> {
        self.buckets.get(resolution)
    }

    fn bounding_volume(&self) -> BoundingVolume {
        self.bounding_volume
    }
}
