//! Brick descriptor for one tile of a tilebase manifest

use std::path::{Path, PathBuf};

use crate::core::types::{DMat4, DVec3, UVec3};
use crate::math::{box_corners, BoundingVolume, TileTransform};
use crate::math::transform::NANOMETERS_PER_MICROMETER;
use super::brick::BrickDescriptor;
use super::manifest::{SampleType, TileEntry};
use super::payload::{self, LoadError, VoxelBuffer};

/// A manifest tile: a folder of per-channel raster files plus placement metadata.
///
/// All geometry is derived once at construction.
#[derive(Clone, Debug)]
pub struct ManifestTile {
    key: String,
    folder: PathBuf,
    relative_path: String,
    dims: UVec3,
    channel_count: usize,
    sample_type: SampleType,
    /// Nominal footprint in micrometers
    footprint: BoundingVolume,
    transform: TileTransform,
    corners: [DVec3; 8],
    tiling_subset: [DVec3; 8],
    bounding_volume: BoundingVolume,
    local_to_world: DMat4,
    resolution: Option<f64>,
    leverage_compressed_files: bool,
}

impl ManifestTile {
    /// Build from a validated manifest entry.
    ///
    /// `base` is the already remapped manifest base folder. No file I/O happens
    /// here.
    pub fn from_entry(entry: &TileEntry, base: &Path, leverage_compressed_files: bool) -> Option<Self> {
        let transform = TileTransform::from_row_major(&entry.transform)?;
        let [nx, ny, nz, channels] = entry.shape.dims;
        let dims = UVec3::new(nx, ny, nz);

        let origin_nm = DVec3::new(entry.aabb.ori[0] as f64, entry.aabb.ori[1] as f64, entry.aabb.ori[2] as f64);
        let shape_nm = DVec3::new(entry.aabb.shape[0] as f64, entry.aabb.shape[1] as f64, entry.aabb.shape[2] as f64);
        let footprint = BoundingVolume::new(
            origin_nm / NANOMETERS_PER_MICROMETER,
            (origin_nm + shape_nm) / NANOMETERS_PER_MICROMETER,
        );

        let corners = transform.raster_corners_um(dims);
        let bounding_volume = BoundingVolume::from_points(&corners);

        // Footprint clipped to the raster; fall back to the raster when they disagree
        let subset = footprint.intersection(&bounding_volume);
        let subset = if subset.is_empty() { bounding_volume } else { subset };

        let spacing_nm = shape_nm / dims.as_dvec3();
        let resolution = Some(spacing_nm.min_element() / NANOMETERS_PER_MICROMETER)
            .filter(|r| r.is_finite() && *r > 0.0);

        Some(Self {
            key: join_key(base, &entry.path),
            folder: join_relative(base, &entry.path),
            relative_path: entry.path.clone(),
            dims,
            channel_count: channels as usize,
            sample_type: entry.shape.sample_type,
            footprint,
            transform,
            corners,
            tiling_subset: box_corners(subset.min, subset.max),
            bounding_volume,
            local_to_world: transform.world_from_texcoord(dims),
            resolution,
            leverage_compressed_files,
        })
    }

    /// Folder holding this tile's channel files
    pub fn folder(&self) -> &Path {
        &self.folder
    }

    /// Tile path as written in the manifest
    pub fn relative_path(&self) -> &str {
        &self.relative_path
    }

    pub fn sample_type(&self) -> SampleType {
        self.sample_type
    }

    /// Nominal footprint from the manifest's aabb, in micrometers
    pub fn footprint(&self) -> BoundingVolume {
        self.footprint
    }

    pub fn transform(&self) -> &TileTransform {
        &self.transform
    }

    /// Inverse of [`local_to_world`](BrickDescriptor::local_to_world), for ray casting
    pub fn texcoord_from_world(&self) -> DMat4 {
        self.local_to_world.inverse()
    }

    /// Whether the tile folder is currently reachable
    pub fn folder_exists(&self) -> bool {
        self.folder.is_dir()
    }
}

impl BrickDescriptor for ManifestTile {
    fn key(&self) -> &str {
        &self.key
    }

    fn corner_locations(&self) -> [DVec3; 8] {
        self.corners
    }

    fn valid_corner_locations(&self) -> [DVec3; 8] {
        // Tiles are stored without allocation padding
        self.corners
    }

    fn tiling_subset_locations(&self) -> [DVec3; 8] {
        self.tiling_subset
    }

    fn raster_dimensions(&self) -> UVec3 {
        self.dims
    }

    fn channel_count(&self) -> usize {
        self.channel_count
    }

    fn bytes_per_intensity(&self) -> usize {
        self.sample_type.bytes_per_intensity()
    }

    fn resolution_micrometers(&self) -> Option<f64> {
        self.resolution
    }

    fn bounding_volume(&self) -> BoundingVolume {
        self.bounding_volume
    }

    fn local_to_world(&self) -> DMat4 {
        self.local_to_world
    }

    fn load_payload(&self, max_edge_pad_width: f64, channel: usize) -> Result<VoxelBuffer, LoadError> {
        if channel >= self.channel_count {
            return Err(LoadError::ChannelOutOfRange {
                channel,
                channel_count: self.channel_count,
            });
        }

        let (path, compressed) = payload::find_channel_file(&self.folder, channel, self.leverage_compressed_files)?;
        log::debug!("Loading tile {} channel {} from {}", self.relative_path, channel, path.display());
        let bytes_per_intensity = self.bytes_per_intensity();
        let data = payload::read_raster(&path, compressed, self.dims, bytes_per_intensity)?;

        let subset = BoundingVolume::from_points(&self.tiling_subset);
        Ok(VoxelBuffer {
            dims: self.dims,
            channel,
            bytes_per_intensity,
            data,
            edge_padding: payload::edge_padding(&self.bounding_volume, &subset, self.dims, max_edge_pad_width),
            local_to_world: self.local_to_world,
        })
    }
}

/// Tile folder path: manifest tile paths start with a separator but are relative
fn join_relative(base: &Path, relative: &str) -> PathBuf {
    let trimmed = relative.trim_start_matches(['/', '\\']);
    trimmed
        .split(['/', '\\'])
        .filter(|part| !part.is_empty())
        .fold(base.to_path_buf(), |path, part| path.join(part))
}

fn join_key(base: &Path, relative: &str) -> String {
    format!("{}/{}", base.display(), relative.trim_start_matches(['/', '\\']))
}
