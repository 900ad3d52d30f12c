//! Tolerance-based grouping of bricks into resolution levels
//!
//! Reported voxel spacings drift slightly between tiles of the same level, so
//! a resolution joins the first existing bucket whose key lies within a ratio
//! tolerance of it. Buckets keep the first resolution seen as their key, which
//! makes the grouping depend on insertion order near the tolerance boundary.

/// Ratio within which two resolutions count as the same level
pub const DEFAULT_RESOLUTION_TOLERANCE: f64 = 1.30;

/// True when `key / resolution` lies strictly inside (1/tolerance, tolerance)
pub fn within_tolerance(key: f64, resolution: f64, tolerance: f64) -> bool {
    let ratio = key / resolution;
    ratio > 1.0 / tolerance && ratio < tolerance
}

/// Values grouped under approximate resolution keys, in creation order
#[derive(Clone, Debug)]
pub struct ResolutionBuckets<T> {
    buckets: Vec<(f64, T)>,
    tolerance: f64,
}

impl<T> Default for ResolutionBuckets<T> {
    fn default() -> Self {
        Self::new(DEFAULT_RESOLUTION_TOLERANCE)
    }
}

impl<T> ResolutionBuckets<T> {
    pub fn new(tolerance: f64) -> Self {
        Self {
            buckets: Vec::new(),
            tolerance,
        }
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Key of the first bucket matching `resolution`
    pub fn find_key(&self, resolution: f64) -> Option<f64> {
        self.position(resolution).map(|i| self.buckets[i].0)
    }

    /// Value of the first bucket matching `resolution`
    pub fn get(&self, resolution: f64) -> Option<&T> {
        self.position(resolution).map(|i| &self.buckets[i].1)
    }

    pub fn get_mut(&mut self, resolution: f64) -> Option<&mut T> {
        self.position(resolution).map(|i| &mut self.buckets[i].1)
    }

    /// Bucket for `resolution`, created with `resolution` as its key when none matches.
    ///
    /// Returns the bucket key alongside the value. Non-positive or non-finite
    /// resolutions cannot be bucketed and yield `None`.
    pub fn get_or_insert_with(&mut self, resolution: f64, create: impl FnOnce() -> T) -> Option<(f64, &mut T)> {
        if !(resolution.is_finite() && resolution > 0.0) {
            return None;
        }
        let idx = match self.position(resolution) {
            Some(idx) => idx,
            None => {
                log::debug!("New resolution bucket {:.4} um", resolution);
                self.buckets.push((resolution, create()));
                self.buckets.len() - 1
            }
        };
        let (key, value) = &mut self.buckets[idx];
        Some((*key, value))
    }

    /// Keys in creation order
    pub fn keys(&self) -> impl Iterator<Item = f64> + '_ {
        self.buckets.iter().map(|(key, _)| *key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, &T)> {
        self.buckets.iter().map(|(key, value)| (*key, value))
    }

    fn position(&self, resolution: f64) -> Option<usize> {
        if !(resolution.is_finite() && resolution > 0.0) {
            return None;
        }
        self.buckets
            .iter()
            .position(|(key, _)| within_tolerance(*key, resolution, self.tolerance))
    }
}
