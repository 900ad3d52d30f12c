//! BrickIndex - the bricks of one resolution level, with nearest-brick lookup.
//!
//! Membership is a set keyed by [`BrickDescriptor::key`], iterated in insertion
//! order. A k-d tree over bounding-volume centroids mirrors the set. Every
//! mutation goes through this type and updates both, so the two never diverge.

use std::collections::HashMap;
use std::collections::HashSet;

use crate::core::types::DVec3;
use crate::math::{BoundingVolume, KdTree};
use super::brick::SharedBrick;

/// Set of bricks at one resolution with a centroid spatial index
#[derive(Clone, Debug, Default)]
pub struct BrickIndex {
    /// Members in insertion order
    bricks: Vec<SharedBrick>,
    /// Brick key -> position in `bricks`
    slots: HashMap<String, usize>,
    /// Centroid -> position in `bricks`
    spatial: KdTree<usize>,
}

impl BrickIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a brick.
    ///
    /// Returns false, changing nothing, if a brick with the same key is
    /// already present. A brick whose centroid cannot be indexed (empty or
    /// non-finite bounding volume) is still a member but is logged and will
    /// never be returned by nearest-brick queries.
    pub fn add(&mut self, brick: SharedBrick) -> bool {
        if self.slots.contains_key(brick.key()) {
            return false;
        }

        let slot = self.bricks.len();
        if let Err(e) = self.spatial.insert(brick.centroid(), slot) {
            log::warn!("Brick {} not spatially indexed: {}", brick.key(), e);
        }
        self.slots.insert(brick.key().to_string(), slot);
        self.bricks.push(brick);
        true
    }

    /// Number of spatially indexed bricks.
    ///
    /// Equals [`member_count`](Self::member_count) unless some brick had an
    /// unindexable centroid.
    pub fn len(&self) -> usize {
        self.spatial.len()
    }

    /// True when no brick is spatially indexed
    pub fn is_empty(&self) -> bool {
        self.spatial.is_empty()
    }

    /// Number of bricks in the set
    pub fn member_count(&self) -> usize {
        self.bricks.len()
    }

    /// Check membership by key
    pub fn contains_key(&self, key: &str) -> bool {
        self.slots.contains_key(key)
    }

    /// Check membership of a brick
    pub fn contains(&self, brick: &SharedBrick) -> bool {
        self.contains_key(brick.key())
    }

    /// Check membership of every brick
    pub fn contains_all<'a>(&self, bricks: impl IntoIterator<Item = &'a SharedBrick>) -> bool {
        bricks.into_iter().all(|b| self.contains(b))
    }

    /// Look a brick up by key
    pub fn get(&self, key: &str) -> Option<&SharedBrick> {
        self.slots.get(key).map(|&slot| &self.bricks[slot])
    }

    /// Iterate members in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &SharedBrick> {
        self.bricks.iter()
    }

    /// Members in insertion order
    pub fn to_vec(&self) -> Vec<SharedBrick> {
        self.bricks.clone()
    }

    /// Brick whose centroid is closest to `point`.
    ///
    /// `None` when the index is empty or `point` is not finite. Bricks sharing
    /// an exact centroid resolve to the one added first.
    pub fn nearest_brick(&self, point: DVec3) -> Option<&SharedBrick> {
        self.spatial
            .nearest(point)
            .map(|hit| &self.bricks[*hit.value])
    }

    /// Closest-centroid brick among those whose bounding volume contains `point`
    pub fn nearest_containing(&self, point: DVec3) -> Option<&SharedBrick> {
        self.spatial
            .nearest_by(point, |&slot| self.bricks[slot].bounding_volume().contains_point(point))
            .map(|hit| &self.bricks[*hit.value])
    }

    /// Union of all member bounding volumes
    pub fn bounding_volume(&self) -> BoundingVolume {
        let mut volume = BoundingVolume::empty();
        for brick in &self.bricks {
            volume.include(&brick.bounding_volume());
        }
        volume
    }

    /// Remove a brick by key, returning it
    pub fn remove(&mut self, key: &str) -> Option<SharedBrick> {
        let slot = self.slots.get(key).copied()?;
        let removed = self.bricks.remove(slot);
        self.reindex();
        Some(removed)
    }

    /// Remove every listed key; true if anything was removed
    pub fn remove_all<'a>(&mut self, keys: impl IntoIterator<Item = &'a str>) -> bool {
        let doomed: HashSet<&str> = keys.into_iter().collect();
        self.retain(|brick| !doomed.contains(brick.key()))
    }

    /// Keep only bricks accepted by `keep`; true if anything was removed
    pub fn retain(&mut self, mut keep: impl FnMut(&SharedBrick) -> bool) -> bool {
        let before = self.bricks.len();
        self.bricks.retain(|b| keep(b));
        if self.bricks.len() == before {
            return false;
        }
        self.reindex();
        true
    }

    /// Remove everything
    pub fn clear(&mut self) {
        self.bricks.clear();
        self.slots.clear();
        self.spatial.clear();
    }

    /// Rebuild key slots and the spatial index from `bricks`
    fn reindex(&mut self) {
        self.slots = self
            .bricks
            .iter()
            .enumerate()
            .map(|(slot, b)| (b.key().to_string(), slot))
            .collect();
        self.spatial = KdTree::build(
            self.bricks
                .iter()
                .enumerate()
                .map(|(slot, b)| (b.centroid(), slot)),
        );
    }
}

impl FromIterator<SharedBrick> for BrickIndex {
    fn from_iter<I: IntoIterator<Item = SharedBrick>>(iter: I) -> Self {
        let mut index = BrickIndex::new();
        index.extend(iter);
        index
    }
}

impl Extend<SharedBrick> for BrickIndex {
    fn extend<I: IntoIterator<Item = SharedBrick>>(&mut self, iter: I) {
        for brick in iter {
            self.add(brick);
        }
    }
}

impl<'a> IntoIterator for &'a BrickIndex {
    type Item = &'a SharedBrick;
    type IntoIter = std::slice::Iter<'a, SharedBrick>;

    fn into_iter(self) -> Self::IntoIter {
        self.bricks.iter()
    }
}
