//! Multi-resolution volume brick sources and their spatial indexes

pub mod brick;
pub mod brick_index;
pub mod manifest;
pub mod manifest_source;
pub mod path_remap;
pub mod payload;
pub mod progress;
pub mod raw_brick;
pub mod resolution;
pub mod source;
pub mod tile;

#[cfg(test)]
pub(crate) mod testing;

pub use brick::{BrickDescriptor, SharedBrick};
pub use brick_index::BrickIndex;
pub use manifest::{Manifest, SampleType, TileEntry};
pub use manifest_source::ManifestVolumeSource;
pub use path_remap::PathRemapper;
pub use payload::{LoadError, VoxelBuffer, VoxelData};
pub use progress::ProgressSink;
pub use raw_brick::RawVolumeBrick;
pub use resolution::{ResolutionBuckets, DEFAULT_RESOLUTION_TOLERANCE};
pub use source::{StaticVolumeBrickSource, VolumeBrickSource};
pub use tile::ManifestTile;
