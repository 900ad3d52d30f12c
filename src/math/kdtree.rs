//! Incremental 3-D k-d tree for nearest-neighbor search.
//!
//! Nodes live in a flat array and are inserted one at a time. Insertion keeps
//! the tree balanced scapegoat-style: when a new node lands deeper than the
//! alpha-height bound, the highest unbalanced ancestor's subtree is rebuilt
//! around per-axis medians. Values whose keys are exactly equal share a node.

use std::mem;

use thiserror::Error;

use crate::core::types::DVec3;

/// Weight-balance factor for scapegoat rebuilds.
const ALPHA: f64 = 0.7;

/// Rejected insertion
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum InsertError {
    /// Key has a NaN or infinite component
    #[error("k-d tree key {0:?} is not finite")]
    NonFiniteKey(DVec3),
}

/// Result of a nearest-neighbor query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Nearest<'a, T> {
    pub key: DVec3,
    pub value: &'a T,
    pub dist_sq: f64,
}

#[derive(Debug, Clone)]
struct Node<T> {
    key: DVec3,
    /// Values inserted under this exact key, oldest first
    values: Vec<T>,
    dim: usize,
    left: Option<usize>,
    right: Option<usize>,
    /// Number of nodes in this subtree, self included
    size: usize,
}

impl<T> Node<T> {
    fn new(key: DVec3, values: Vec<T>, dim: usize) -> Self {
        Self { key, values, dim, left: None, right: None, size: 1 }
    }
}

/// A k-d tree keyed by 3-D points
///
/// Invariant for every node: keys in the left subtree are strictly below the
/// node's key along its split dimension, keys in the right subtree are at or
/// above it.
#[derive(Debug, Clone)]
pub struct KdTree<T> {
    nodes: Vec<Node<T>>,
    root: Option<usize>,
    len: usize,
}

impl<T> Default for KdTree<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> KdTree<T> {
    /// Create an empty tree
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            root: None,
            len: 0,
        }
    }

    /// Build a balanced tree in one pass.
    ///
    /// Entries with non-finite keys are dropped. Values sharing a key keep
    /// their input order.
    pub fn build(entries: impl IntoIterator<Item = (DVec3, T)>) -> Self {
        let mut finite: Vec<(DVec3, T)> = entries
            .into_iter()
            .filter(|(key, _)| key.is_finite())
            .collect();
        let len = finite.len();

        // Stable sort so duplicates stay in insertion order
        finite.sort_by(|a, b| {
            a.0.x.total_cmp(&b.0.x)
                .then(a.0.y.total_cmp(&b.0.y))
                .then(a.0.z.total_cmp(&b.0.z))
        });

        let mut grouped: Vec<(DVec3, Vec<T>)> = Vec::new();
        for (key, value) in finite {
            match grouped.last_mut() {
                Some((last, values)) if *last == key => values.push(value),
                _ => grouped.push((key, vec![value])),
            }
        }

        let mut tree = Self {
            nodes: grouped.iter().map(|(key, _)| Node::new(*key, Vec::new(), 0)).collect(),
            root: None,
            len,
        };
        let mut slots = 0..grouped.len();
        tree.root = tree.build_into(&mut grouped, &mut slots);
        tree
    }

    /// Number of values stored
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when no values are stored
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of distinct keys
    pub fn key_count(&self) -> usize {
        self.nodes.len()
    }

    /// Remove everything
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.root = None;
        self.len = 0;
    }

    /// Longest root-to-leaf path, counted in nodes
    pub fn depth(&self) -> usize {
        let Some(root) = self.root else {
            return 0;
        };
        let mut deepest = 0;
        let mut stack = vec![(root, 1usize)];
        while let Some((idx, depth)) = stack.pop() {
            deepest = deepest.max(depth);
            let node = &self.nodes[idx];
            stack.extend(node.left.map(|c| (c, depth + 1)));
            stack.extend(node.right.map(|c| (c, depth + 1)));
        }
        deepest
    }

    /// Insert a value under `key`
    pub fn insert(&mut self, key: DVec3, value: T) -> Result<(), InsertError> {
        if !key.is_finite() {
            return Err(InsertError::NonFiniteKey(key));
        }

        let Some(root) = self.root else {
            self.nodes.push(Node::new(key, vec![value], 0));
            self.root = Some(0);
            self.len = 1;
            return Ok(());
        };

        let new_idx = self.nodes.len();
        let mut path = Vec::new();
        let mut current = root;
        loop {
            let node = &mut self.nodes[current];
            if node.key == key {
                node.values.push(value);
                self.len += 1;
                return Ok(());
            }
            path.push(current);

            let go_left = key[node.dim] < node.key[node.dim];
            let next = if go_left { node.left } else { node.right };
            match next {
                Some(child) => current = child,
                None => {
                    let dim = (node.dim + 1) % 3;
                    if go_left {
                        node.left = Some(new_idx);
                    } else {
                        node.right = Some(new_idx);
                    }
                    self.nodes.push(Node::new(key, vec![value], dim));
                    break;
                }
            }
        }

        self.len += 1;
        for &idx in &path {
            self.nodes[idx].size += 1;
        }

        let alpha_height = (self.nodes.len() as f64).ln() / (1.0 / ALPHA).ln();
        if path.len() as f64 > alpha_height.floor() + 1.0 {
            let scapegoat = path.iter().rev().copied().find(|&idx| {
                let node = &self.nodes[idx];
                let heavier = self.subtree_size(node.left).max(self.subtree_size(node.right));
                heavier as f64 > ALPHA * node.size as f64
            });
            if let Some(idx) = scapegoat {
                self.rebuild_subtree(idx);
            }
        }

        Ok(())
    }

    /// Closest key to `query`, returning the oldest value stored under it
    pub fn nearest(&self, query: DVec3) -> Option<Nearest<'_, T>> {
        self.nearest_by(query, |_| true)
    }

    /// Closest key holding a value accepted by `accept`.
    ///
    /// Among values sharing that key, the oldest accepted one is returned.
    /// Returns `None` for an empty tree, a non-finite query, or when nothing
    /// is accepted.
    pub fn nearest_by(&self, query: DVec3, mut accept: impl FnMut(&T) -> bool) -> Option<Nearest<'_, T>> {
        if !query.is_finite() {
            return None;
        }
        let root = self.root?;

        // (node, value index, squared distance)
        let mut best: Option<(usize, usize, f64)> = None;
        let mut stack = vec![(root, 0.0f64)];

        while let Some((idx, bound)) = stack.pop() {
            if let Some((_, _, best_dsq)) = best {
                if bound >= best_dsq {
                    continue;
                }
            }

            let node = &self.nodes[idx];
            let dsq = node.key.distance_squared(query);
            if best.is_none_or(|(_, _, best_dsq)| dsq < best_dsq) {
                if let Some(vi) = node.values.iter().position(|v| accept(v)) {
                    best = Some((idx, vi, dsq));
                }
            }

            let diff = query[node.dim] - node.key[node.dim];
            let (near, far) = if diff < 0.0 {
                (node.left, node.right)
            } else {
                (node.right, node.left)
            };
            // Push far first so the near side is searched first
            if let Some(far) = far {
                stack.push((far, bound.max(diff * diff)));
            }
            if let Some(near) = near {
                stack.push((near, bound));
            }
        }

        best.map(|(idx, vi, dist_sq)| {
            let node = &self.nodes[idx];
            Nearest {
                key: node.key,
                value: &node.values[vi],
                dist_sq,
            }
        })
    }

    /// Iterate over every (key, value) pair in storage order
    pub fn iter(&self) -> impl Iterator<Item = (DVec3, &T)> {
        self.nodes
            .iter()
            .flat_map(|node| node.values.iter().map(move |v| (node.key, v)))
    }

    fn subtree_size(&self, idx: Option<usize>) -> usize {
        idx.map_or(0, |i| self.nodes[i].size)
    }

    fn rebuild_subtree(&mut self, top: usize) {
        // Pre-order slot list so the subtree root keeps slot `top`
        let mut slots = Vec::with_capacity(self.nodes[top].size);
        let mut stack = vec![top];
        while let Some(idx) = stack.pop() {
            slots.push(idx);
            let node = &self.nodes[idx];
            stack.extend(node.right);
            stack.extend(node.left);
        }

        let mut entries: Vec<(DVec3, Vec<T>)> = slots
            .iter()
            .map(|&idx| {
                let node = &mut self.nodes[idx];
                (node.key, mem::take(&mut node.values))
            })
            .collect();

        let mut free = slots.into_iter();
        self.build_into(&mut entries, &mut free);
    }

    /// Lay `entries` out as a balanced subtree in the given slots, root first.
    fn build_into(
        &mut self,
        entries: &mut [(DVec3, Vec<T>)],
        slots: &mut impl Iterator<Item = usize>,
    ) -> Option<usize> {
        if entries.is_empty() {
            return None;
        }

        let dim = widest_dim(entries);
        entries.sort_by(|a, b| a.0[dim].total_cmp(&b.0[dim]));

        // Keys equal to the split value must go right
        let mut median = entries.len() / 2;
        while median > 0 && entries[median - 1].0[dim] == entries[median].0[dim] {
            median -= 1;
        }

        let slot = slots.next()?;
        let key = entries[median].0;
        let values = mem::take(&mut entries[median].1);

        let (lower, rest) = entries.split_at_mut(median);
        let left = self.build_into(lower, slots);
        let right = self.build_into(&mut rest[1..], slots);

        let size = 1 + self.subtree_size(left) + self.subtree_size(right);
        self.nodes[slot] = Node {
            key,
            values,
            dim,
            left,
            right,
            size,
        };
        Some(slot)
    }
}

/// Axis with the largest spread of keys
fn widest_dim<T>(entries: &[(DVec3, T)]) -> usize {
    let mut lo = DVec3::INFINITY;
    let mut hi = DVec3::NEG_INFINITY;
    for (key, _) in entries {
        lo = lo.min(*key);
        hi = hi.max(*key);
    }
    let spread = hi - lo;
    if spread.x >= spread.y && spread.x >= spread.z {
        0
    } else if spread.y >= spread.z {
        1
    } else {
        2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Small deterministic generator for test point clouds
    fn lcg_points(count: usize, seed: u64) -> Vec<DVec3> {
        let mut state = seed;
        let mut next = move || {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            ((state >> 11) as f64 / (1u64 << 53) as f64) * 1000.0
        };
        (0..count).map(|_| DVec3::new(next(), next(), next())).collect()
    }

    fn brute_force_nearest(points: &[DVec3], query: DVec3) -> f64 {
        points
            .iter()
            .map(|p| p.distance_squared(query))
            .fold(f64::INFINITY, f64::min)
    }

    #[test]
    fn test_empty_tree() {
        let tree: KdTree<u32> = KdTree::new();
        assert!(tree.is_empty());
        assert_eq!(tree.depth(), 0);
        assert!(tree.nearest(DVec3::ZERO).is_none());
    }

    #[test]
    fn test_nearest_on_a_line() {
        let mut tree = KdTree::new();
        tree.insert(DVec3::new(0.0, 0.0, 0.0), "a").unwrap();
        tree.insert(DVec3::new(10.0, 0.0, 0.0), "b").unwrap();
        tree.insert(DVec3::new(100.0, 0.0, 0.0), "c").unwrap();

        let hit = tree.nearest(DVec3::new(4.0, 0.0, 0.0)).unwrap();
        assert_eq!(*hit.value, "a");
        assert_eq!(hit.dist_sq, 16.0);

        let hit = tree.nearest(DVec3::new(60.0, 0.0, 0.0)).unwrap();
        assert_eq!(*hit.value, "c");
    }

    #[test]
    fn test_rejects_non_finite_key() {
        let mut tree = KdTree::new();
        let err = tree.insert(DVec3::new(f64::NAN, 0.0, 0.0), 1).unwrap_err();
        assert!(matches!(err, InsertError::NonFiniteKey(_)));
        assert!(tree.is_empty());
        assert!(tree.insert(DVec3::splat(f64::INFINITY), 2).is_err());
    }

    #[test]
    fn test_non_finite_query_finds_nothing() {
        let mut tree = KdTree::new();
        tree.insert(DVec3::ZERO, 1).unwrap();
        assert!(tree.nearest(DVec3::new(0.0, f64::NAN, 0.0)).is_none());
    }

    #[test]
    fn test_duplicate_keys_share_a_node() {
        let mut tree = KdTree::new();
        tree.insert(DVec3::ONE, 1).unwrap();
        tree.insert(DVec3::ONE, 2).unwrap();
        tree.insert(DVec3::ZERO, 3).unwrap();

        assert_eq!(tree.len(), 3);
        assert_eq!(tree.key_count(), 2);
        assert_eq!(*tree.nearest(DVec3::splat(0.9)).unwrap().value, 1);
        assert_eq!(*tree.nearest_by(DVec3::splat(0.9), |v| *v != 1).unwrap().value, 2);
    }

    #[test]
    fn test_nearest_by_skips_rejected_values() {
        let mut tree = KdTree::new();
        for (i, x) in [0.0, 10.0, 20.0, 30.0].iter().enumerate() {
            tree.insert(DVec3::new(*x, 0.0, 0.0), i).unwrap();
        }

        let hit = tree.nearest_by(DVec3::new(11.0, 0.0, 0.0), |v| v % 2 == 0).unwrap();
        assert_eq!(*hit.value, 2);
        assert!(tree.nearest_by(DVec3::ZERO, |_| false).is_none());
    }

    #[test]
    fn test_sorted_inserts_stay_shallow() {
        let mut tree = KdTree::new();
        for i in 0..2000 {
            tree.insert(DVec3::new(i as f64, 0.0, 0.0), i).unwrap();
        }

        assert_eq!(tree.len(), 2000);
        // A degenerate chain would be 2000 deep
        assert!(tree.depth() < 40, "depth {}", tree.depth());

        let hit = tree.nearest(DVec3::new(1234.2, 5.0, 0.0)).unwrap();
        assert_eq!(*hit.value, 1234);
    }

    #[test]
    fn test_incremental_matches_brute_force() {
        let points = lcg_points(500, 7);
        let mut tree = KdTree::new();
        for (i, p) in points.iter().enumerate() {
            tree.insert(*p, i).unwrap();
        }

        for query in lcg_points(100, 99) {
            let hit = tree.nearest(query).unwrap();
            assert_eq!(hit.dist_sq, brute_force_nearest(&points, query));
            assert_eq!(points[*hit.value], hit.key);
        }
    }

    #[test]
    fn test_build_matches_brute_force() {
        let points = lcg_points(300, 3);
        let tree = KdTree::build(points.iter().copied().enumerate().map(|(i, p)| (p, i)));
        assert_eq!(tree.len(), 300);

        for query in lcg_points(50, 11) {
            let hit = tree.nearest(query).unwrap();
            assert_eq!(hit.dist_sq, brute_force_nearest(&points, query));
        }
    }

    #[test]
    fn test_build_groups_duplicates_in_order() {
        let tree = KdTree::build(vec![
            (DVec3::ONE, "first"),
            (DVec3::new(f64::NAN, 0.0, 0.0), "dropped"),
            (DVec3::ZERO, "other"),
            (DVec3::ONE, "second"),
        ]);

        assert_eq!(tree.len(), 3);
        assert_eq!(tree.key_count(), 2);
        assert_eq!(*tree.nearest(DVec3::ONE).unwrap().value, "first");
        assert_eq!(tree.iter().count(), 3);
    }
}
