//! 2D k-d tree for spatial indexing
//!
//! Provides O(log n) k-nearest-neighbor queries for scattered sample
//! positions, one query at a time or in bulk over a block of query points.
//! Neighbors are ordered by ascending distance with ties broken by the
//! lower sample index, so results never depend on tree layout.
//!
//! Reference:
//! Bentley, J.L. (1975). Multidimensional binary search trees used
//! for associative searching. CACM, 18(9).

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::maybe_rayon::*;

/// A 2D k-d tree over sample positions.
///
/// Only positions are indexed; values stay with the caller and are looked up
/// by the returned sample indices.
#[derive(Debug)]
pub struct KdTree {
    nodes: Vec<KdNode>,
    /// Positions in original sample order
    points: Vec<[f64; 2]>,
}

#[derive(Debug)]
struct KdNode {
    /// Index into `points`
    point_idx: usize,
    /// Split dimension: 0 = x, 1 = y
    split_dim: u8,
    /// Left child index (None = leaf)
    left: Option<usize>,
    /// Right child index (None = leaf)
    right: Option<usize>,
}

/// Result of a single neighbor lookup
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearestResult {
    pub distance_sq: f64,
    pub index: usize,
}

/// Result of a bulk kNN query over `m` query points.
///
/// Arrays are row-major `m x k`: entry `i * k + j` is the j-th nearest
/// neighbor of query `i`.
#[derive(Debug, Clone, Default)]
pub struct KnnResult {
    /// Effective neighbor count, `min(requested, len)`
    pub k: usize,
    /// Euclidean distances, ascending per query
    pub distances: Vec<f64>,
    /// Sample indices matching `distances`
    pub indices: Vec<usize>,
}

impl KnnResult {
    /// Number of queries answered
    pub fn len(&self) -> usize {
        if self.k == 0 { 0 } else { self.indices.len() / self.k }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Neighbors of query `i` as `(distances, indices)`
    pub fn row(&self, i: usize) -> (&[f64], &[usize]) {
        let span = i * self.k..(i + 1) * self.k;
        (&self.distances[span.clone()], &self.indices[span])
    }
}

/// Heap entry, max-ordered by `(distance, index)` so the root is the worst kept neighbor
#[derive(Debug, Clone, Copy)]
struct Candidate {
    dist_sq: f64,
    index: usize,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.dist_sq
            .total_cmp(&other.dist_sq)
            .then(self.index.cmp(&other.index))
    }
}

impl KdTree {
    /// Build a k-d tree from sample positions.
    ///
    /// Construction is O(n log n) using median-of-coordinate splitting.
    pub fn build(points: &[[f64; 2]]) -> Self {
        let mut nodes = Vec::with_capacity(points.len());
        if !points.is_empty() {
            let mut indices: Vec<usize> = (0..points.len()).collect();
            build_recursive(points, &mut indices, 0, &mut nodes);
        }
        Self {
            nodes,
            points: points.to_vec(),
        }
    }

    /// Number of points in the tree.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the tree is empty.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Find the k nearest points to (qx, qy).
    ///
    /// Returns `min(k, len)` results sorted by ascending distance, ties by
    /// ascending sample index.
    pub fn k_nearest(&self, qx: f64, qy: f64, k: usize) -> Vec<NearestResult> {
        if self.nodes.is_empty() || k == 0 {
            return Vec::new();
        }

        let mut heap = BinaryHeap::with_capacity(k + 1);
        self.knn_recursive(0, qx, qy, k, &mut heap);

        heap.into_sorted_vec()
            .into_iter()
            .map(|c| NearestResult {
                distance_sq: c.dist_sq,
                index: c.index,
            })
            .collect()
    }

    /// Answer a kNN query for every point in `queries`.
    ///
    /// The effective neighbor count is clamped to the number of samples.
    /// Queries run in parallel when the `parallel` feature is enabled.
    pub fn query_bulk(&self, queries: &[[f64; 2]], k: usize) -> KnnResult {
        let k = k.min(self.len());
        if k == 0 {
            return KnnResult::default();
        }

        let per_query: Vec<Vec<NearestResult>> = (0..queries.len())
            .into_par_iter()
            .map(|i| self.k_nearest(queries[i][0], queries[i][1], k))
            .collect();

        let mut result = KnnResult {
            k,
            distances: Vec::with_capacity(queries.len() * k),
            indices: Vec::with_capacity(queries.len() * k),
        };
        for neighbors in per_query {
            for n in neighbors {
                result.distances.push(n.distance_sq.sqrt());
                result.indices.push(n.index);
            }
        }
        result
    }

    fn knn_recursive(&self, node_idx: usize, qx: f64, qy: f64, k: usize, heap: &mut BinaryHeap<Candidate>) {
        let node = &self.nodes[node_idx];
        let [px, py] = self.points[node.point_idx];

        let dx = qx - px;
        let dy = qy - py;
        let candidate = Candidate {
            dist_sq: dx * dx + dy * dy,
            index: node.point_idx,
        };

        if heap.len() < k {
            heap.push(candidate);
        } else if heap.peek().is_some_and(|worst| candidate < *worst) {
            heap.pop();
            heap.push(candidate);
        }

        let diff = if node.split_dim == 0 { dx } else { dy };
        let (first, second) = if diff < 0.0 {
            (node.left, node.right)
        } else {
            (node.right, node.left)
        };

        if let Some(child) = first {
            self.knn_recursive(child, qx, qy, k, heap);
        }

        // Equal distances across the plane may still win on index
        let threshold = match heap.peek() {
            Some(worst) if heap.len() >= k => worst.dist_sq,
            _ => f64::INFINITY,
        };
        if diff * diff <= threshold {
            if let Some(child) = second {
                self.knn_recursive(child, qx, qy, k, heap);
            }
        }
    }
}

/// Recursively build the k-d tree.
fn build_recursive(points: &[[f64; 2]], indices: &mut [usize], depth: usize, nodes: &mut Vec<KdNode>) -> usize {
    let n = indices.len();
    let split_dim = (depth % 2) as u8;
    let axis = split_dim as usize;

    let median = n / 2;
    indices.select_nth_unstable_by(median, |&a, &b| points[a][axis].total_cmp(&points[b][axis]));
    let point_idx = indices[median];

    let node_idx = nodes.len();
    nodes.push(KdNode {
        point_idx,
        split_dim,
        left: None,
        right: None,
    });

    let (left, rest) = indices.split_at_mut(median);
    let right = &mut rest[1..];

    if !left.is_empty() {
        let left_idx = build_recursive(points, left, depth + 1, nodes);
        nodes[node_idx].left = Some(left_idx);
    }

    if !right.is_empty() {
        let right_idx = build_recursive(points, right, depth + 1, nodes);
        nodes[node_idx].right = Some(right_idx);
    }

    node_idx
}
