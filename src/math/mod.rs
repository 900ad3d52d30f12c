//! Mathematical utilities and data structures

pub mod aabb;
pub mod kdtree;
pub mod transform;

pub use aabb::BoundingVolume;
pub use kdtree::{KdTree, InsertError, Nearest};
pub use transform::{box_corners, TileTransform};
