//! Volbrick - out-of-core multi-resolution volume brick index
//!
//! Tiled microscopy volumes are described by a manifest of bricks. Bricks are
//! grouped into resolution levels, and each level answers nearest-brick
//! queries through a k-d tree over brick centroids. Voxel payloads stay on
//! disk until a brick is asked to load one.

pub mod core;
pub mod math;
pub mod volume;
pub mod streaming;
