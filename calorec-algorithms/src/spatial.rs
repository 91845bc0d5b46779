//! Spatial indexing for candidate pruning.
//!
//! A bulk-built KD-tree over N-dimensional points with axis-aligned box
//! range queries. The tree is built once per clustering pass from the
//! then-current hit and track lists and is never mutated afterwards: object
//! ownership changes during the pass are tracked in auxiliary maps, not by
//! removing entries.

/// Maximum number of entries in a leaf node before a split.
const LEAF_SIZE: usize = 16;

#[derive(Debug, Clone)]
enum Node {
    /// Interior node: split dimension and value, child node indices.
    Split {
        dim: usize,
        value: f64,
        left: usize,
        right: usize,
    },
    /// Leaf node: range `[start, end)` into the entries array.
    Leaf { start: usize, end: usize },
}

/// Immutable KD-tree over `(coordinates, id)` entries.
///
/// Const-generic over the dimensionality: tracks are indexed in 3-D
/// (calorimeter-face projection) and hits in 4-D (position plus pseudolayer).
#[derive(Debug, Clone)]
pub struct KdTree<const DIM: usize> {
    nodes: Vec<Node>,
    entries: Vec<([f64; DIM], usize)>,
}

impl<const DIM: usize> KdTree<DIM> {
    /// Builds a tree from `(coordinates, id)` entries, consuming them once.
    #[must_use]
    pub fn build(mut entries: Vec<([f64; DIM], usize)>) -> Self {
        let mut tree = Self {
            nodes: Vec::new(),
            entries: Vec::new(),
        };
        if entries.is_empty() {
            return tree;
        }
        let len = entries.len();
        tree.build_recursive(&mut entries, 0, len);
        tree.entries = entries;
        tree
    }

    /// Number of indexed entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the tree holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn build_recursive(
        &mut self,
        entries: &mut [([f64; DIM], usize)],
        start: usize,
        end: usize,
    ) -> usize {
        let count = end - start;
        if count <= LEAF_SIZE {
            let node_idx = self.nodes.len();
            self.nodes.push(Node::Leaf { start, end });
            return node_idx;
        }

        let dim = Self::widest_dimension(&entries[start..end]);
        let mid = start + count / 2;
        entries[start..end].select_nth_unstable_by(mid - start, |a, b| {
            a.0[dim].partial_cmp(&b.0[dim]).unwrap_or(std::cmp::Ordering::Equal)
        });
        let value = entries[mid].0[dim];

        let node_idx = self.nodes.len();
        self.nodes.push(Node::Leaf { start: 0, end: 0 });

        let left = self.build_recursive(entries, start, mid);
        let right = self.build_recursive(entries, mid, end);
        self.nodes[node_idx] = Node::Split {
            dim,
            value,
            left,
            right,
        };
        node_idx
    }

    fn widest_dimension(entries: &[([f64; DIM], usize)]) -> usize {
        let mut best_dim = 0;
        let mut best_spread = f64::NEG_INFINITY;
        for dim in 0..DIM {
            let mut lo = f64::INFINITY;
            let mut hi = f64::NEG_INFINITY;
            for (coords, _) in entries {
                let value = coords[dim];
                lo = lo.min(value);
                hi = hi.max(value);
            }
            let spread = hi - lo;
            if spread > best_spread {
                best_spread = spread;
                best_dim = dim;
            }
        }
        best_dim
    }

    /// Collects the ids of all entries inside the axis-aligned box
    /// `[min, max]` (inclusive bounds) into `out`. No ordering guarantee.
    pub fn search_box(&self, min: &[f64; DIM], max: &[f64; DIM], out: &mut Vec<usize>) {
        if self.nodes.is_empty() {
            return;
        }
        self.search_node(0, min, max, out);
    }

    fn search_node(&self, node_idx: usize, min: &[f64; DIM], max: &[f64; DIM], out: &mut Vec<usize>) {
        match &self.nodes[node_idx] {
            Node::Leaf { start, end } => {
                for (coords, id) in &self.entries[*start..*end] {
                    if (0..DIM).all(|d| coords[d] >= min[d] && coords[d] <= max[d]) {
                        out.push(*id);
                    }
                }
            }
            Node::Split {
                dim,
                value,
                left,
                right,
            } => {
                // Left subtree holds coordinates <= value, right holds >= value.
                if min[*dim] <= *value {
                    self.search_node(*left, min, max, out);
                }
                if max[*dim] >= *value {
                    self.search_node(*right, min, max, out);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box_search_3d() {
        let entries = vec![
            ([0.0, 0.0, 0.0], 0),
            ([5.0, 5.0, 5.0], 1),
            ([100.0, 100.0, 100.0], 2),
            ([-3.0, 2.0, 1.0], 3),
        ];
        let tree = KdTree::<3>::build(entries);

        let mut found = Vec::new();
        tree.search_box(&[-5.0, -5.0, -5.0], &[6.0, 6.0, 6.0], &mut found);
        found.sort_unstable();
        assert_eq!(found, vec![0, 1, 3]);
    }

    #[test]
    fn test_box_search_inclusive_bounds() {
        let tree = KdTree::<3>::build(vec![([1.0, 2.0, 3.0], 7)]);
        let mut found = Vec::new();
        tree.search_box(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0], &mut found);
        assert_eq!(found, vec![7]);
    }

    #[test]
    fn test_empty_tree_search_is_noop() {
        let tree = KdTree::<4>::build(Vec::new());
        assert!(tree.is_empty());
        let mut found = Vec::new();
        tree.search_box(&[0.0; 4], &[1.0; 4], &mut found);
        assert!(found.is_empty());
    }

    #[test]
    fn test_layer_pinned_4d_search() {
        // Fourth dimension is a discrete pseudolayer; pin the box to one layer.
        let entries = vec![
            ([0.0, 0.0, 10.0, 1.0], 0),
            ([0.0, 0.0, 10.0, 2.0], 1),
            ([0.0, 0.0, 10.0, 3.0], 2),
        ];
        let tree = KdTree::<4>::build(entries);

        let mut found = Vec::new();
        tree.search_box(&[-1.0, -1.0, 9.0, 2.0], &[1.0, 1.0, 11.0, 2.0], &mut found);
        assert_eq!(found, vec![1]);
    }

    #[test]
    fn test_large_tree_matches_linear_scan() {
        // Deterministic pseudo-grid large enough to force splits.
        let mut entries = Vec::new();
        for i in 0..400usize {
            let x = (i % 20) as f64 * 3.0;
            let y = (i / 20) as f64 * 3.0;
            let z = ((i * 7) % 13) as f64;
            entries.push(([x, y, z], i));
        }
        let tree = KdTree::<3>::build(entries.clone());

        let min = [10.0, 10.0, 2.0];
        let max = [40.0, 30.0, 9.0];
        let mut found = Vec::new();
        tree.search_box(&min, &max, &mut found);
        found.sort_unstable();

        let mut expected: Vec<usize> = entries
            .iter()
            .filter(|(c, _)| (0..3).all(|d| c[d] >= min[d] && c[d] <= max[d]))
            .map(|(_, id)| *id)
            .collect();
        expected.sort_unstable();
        assert_eq!(found, expected);
    }
}
