//! Axis-aligned bounding volume in stage micrometers

use crate::core::types::DVec3;

/// Axis-aligned bounding box defined by min and max corners
///
/// A freshly created volume is empty (min = +inf, max = -inf); the first
/// inclusion defines it exactly.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingVolume {
    pub min: DVec3,
    pub max: DVec3,
}

impl Default for BoundingVolume {
    fn default() -> Self {
        Self::empty()
    }
}

impl BoundingVolume {
    /// Create a volume from min and max corners
    pub fn new(min: DVec3, max: DVec3) -> Self {
        Self {
            min: min.min(max),
            max: max.max(min),
        }
    }

    /// Volume containing nothing
    pub const fn empty() -> Self {
        Self {
            min: DVec3::INFINITY,
            max: DVec3::NEG_INFINITY,
        }
    }

    /// Smallest volume containing every point
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a DVec3>) -> Self {
        let mut volume = Self::empty();
        for p in points {
            volume.include_point(*p);
        }
        volume
    }

    /// True until something has been included
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Grow to include a point
    pub fn include_point(&mut self, point: DVec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    /// Grow to include another volume; including an empty volume is a no-op
    pub fn include(&mut self, other: &BoundingVolume) {
        if other.is_empty() {
            return;
        }
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    /// Return merged volume containing both
    pub fn merged(&self, other: &BoundingVolume) -> BoundingVolume {
        let mut result = *self;
        result.include(other);
        result
    }

    /// Midpoint of the min and max corners.
    ///
    /// Not meaningful on an empty volume: every component is NaN there.
    pub fn centroid(&self) -> DVec3 {
        (self.min + self.max) * 0.5
    }

    /// Get size (max - min), zero when empty
    pub fn size(&self) -> DVec3 {
        if self.is_empty() {
            DVec3::ZERO
        } else {
            self.max - self.min
        }
    }

    /// Check if point is inside, boundaries included
    pub fn contains_point(&self, p: DVec3) -> bool {
        p.x >= self.min.x && p.x <= self.max.x &&
        p.y >= self.min.y && p.y <= self.max.y &&
        p.z >= self.min.z && p.z <= self.max.z
    }

    /// Check if `other` lies entirely inside this volume
    pub fn contains(&self, other: &BoundingVolume) -> bool {
        other.is_empty() || (self.contains_point(other.min) && self.contains_point(other.max))
    }

    /// Check if two volumes intersect
    pub fn intersects(&self, other: &BoundingVolume) -> bool {
        self.min.x <= other.max.x && self.max.x >= other.min.x &&
        self.min.y <= other.max.y && self.max.y >= other.min.y &&
        self.min.z <= other.max.z && self.max.z >= other.min.z
    }

    /// Overlap of two volumes, empty when they are disjoint
    pub fn intersection(&self, other: &BoundingVolume) -> BoundingVolume {
        if !self.intersects(other) {
            return BoundingVolume::empty();
        }
        BoundingVolume {
            min: self.min.max(other.min),
            max: self.max.min(other.max),
        }
    }
}
