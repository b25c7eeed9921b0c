//! Sum tree for prioritized sampling.
//!
//! [`PrioritySumTree`] keeps one non-negative weight per slot of a fixed-size
//! ring buffer. The weights are the leaves of a complete binary tree stored
//! in a flat array, and every internal node holds the sum of its children,
//! so that updating a slot, sampling a slot in proportion to its weight
//! and reading the total all stay cheap.
//!
//! ```rust
//! use prioreplay_core::PrioritySumTree;
//!
//! let mut tree = PrioritySumTree::new(4).unwrap();
//! for w in [1.0, 2.0, 3.0, 4.0] {
//!     tree.append(w).unwrap();
//! }
//! assert_eq!(tree.total(), 10.0);
//! assert_eq!(tree.find(9.999, false).unwrap(), 3);
//! ```
use crate::error::PrioError;
use log::trace;
use std::fmt;

/// A fixed-capacity sum tree addressed by slot index.
///
/// The tree holds `2^(depth+1) - 1` nodes, where `depth = ceil(log2(capacity))`.
/// Node `0` is the root and the children of node `i` are `2i+1` and `2i+2`.
/// Slot `s` lives in the leaf `s + 2^depth - 1`; leaves beyond `capacity`
/// are padding and stay zero forever.
///
/// Mutation goes through [`update`](Self::update), which writes a slot
/// explicitly, and [`append`](Self::append), which writes the slot under
/// the ring-buffer cursor and advances it. Once the buffer has wrapped,
/// `append` overwrites the oldest slot and its old contribution leaves
/// the sums through the same upward walk.
///
/// The structure has no internal synchronization. Callers sharing it
/// must serialize mutations against each other and against reads.
#[derive(Debug, Clone)]
pub struct PrioritySumTree {
    capacity: usize,
    depth: usize,
    weights: Vec<f64>,
    cursor: usize,
    count: usize,
}

impl PrioritySumTree {
    /// Creates a tree with all weights set to zero.
    ///
    /// Fails with [`PrioError::InvalidCapacity`] when `capacity` is zero
    /// or too large to be padded to a power of two.
    pub fn new(capacity: usize) -> Result<Self, PrioError> {
        let n_leaves = match capacity {
            0 => None,
            n => n.checked_next_power_of_two(),
        }
        .ok_or(PrioError::InvalidCapacity(capacity))?;
        let size = n_leaves
            .checked_mul(2)
            .ok_or(PrioError::InvalidCapacity(capacity))?
            - 1;

        Ok(Self {
            capacity,
            depth: n_leaves.trailing_zeros() as usize,
            weights: vec![0f64; size],
            cursor: 0,
            count: 0,
        })
    }

    /// Maximum number of slots.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Depth of the tree, `ceil(log2(capacity))`.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Number of slots written by [`append`](Self::append) so far, saturating at the capacity.
    pub fn len(&self) -> usize {
        self.count
    }

    /// Returns `true` if nothing has been appended yet.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Slot that the next [`append`](Self::append) writes.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    #[inline]
    fn leaf_offset(&self) -> usize {
        (1 << self.depth) - 1
    }

    fn check_slot(&self, slot: usize) -> Result<(), PrioError> {
        if slot < self.capacity {
            Ok(())
        } else {
            Err(PrioError::IndexOutOfRange {
                slot,
                capacity: self.capacity,
            })
        }
    }

    /// Leaf weights of the `capacity` real slots, in slot order.
    pub fn leaves(&self) -> &[f64] {
        let start = self.leaf_offset();
        &self.weights[start..start + self.capacity]
    }

    /// Weight currently stored in `slot`.
    pub fn get(&self, slot: usize) -> Result<f64, PrioError> {
        self.check_slot(slot)?;
        Ok(self.weights[slot + self.leaf_offset()])
    }

    /// Sets the weight of `slot` and propagates the change up to the root.
    ///
    /// Rejected inputs leave the tree untouched.
    pub fn update(&mut self, slot: usize, weight: f64) -> Result<(), PrioError> {
        self.check_slot(slot)?;
        check_weight(weight)?;

        let mut ix = slot + self.leaf_offset();
        let delta = weight - self.weights[ix];
        self.weights[ix] = weight;
        // Every ancestor is exactly the sum of its children, even after rounding.
        while ix > 0 {
            ix = (ix - 1) / 2;
            self.weights[ix] = self.weights[2 * ix + 1] + self.weights[2 * ix + 2];
        }
        trace!("sum tree: slot {} <- {} (delta {})", slot, weight, delta);

        Ok(())
    }

    /// Writes `weight` into the slot under the cursor and advances the cursor.
    ///
    /// When the buffer is full this replaces the oldest slot.
    pub fn append(&mut self, weight: f64) -> Result<(), PrioError> {
        self.update(self.cursor, weight)?;
        self.cursor = (self.cursor + 1) % self.capacity;
        self.count = (self.count + 1).min(self.capacity);
        Ok(())
    }

    /// Returns the slot whose cumulative weight range contains `target`.
    ///
    /// Leaves are ordered left to right, slot `s` covering
    /// `(w_0 + .. + w_{s-1}, w_0 + .. + w_s]`. With `normalize`, `target`
    /// is a fraction of the total weight, typically uniform in `[0, 1)`.
    /// A target equal to the weight of a left child descends left.
    pub fn find(&self, target: f64, normalize: bool) -> Result<usize, PrioError> {
        self.find_with_weight(target, normalize).map(|(slot, _)| slot)
    }

    /// Same as [`find`](Self::find), also returning the weight of the found slot.
    ///
    /// Fails with [`PrioError::EmptyDistribution`] when the total weight is
    /// zero. Targets beyond the total are clamped to the right-most slot
    /// with a positive weight.
    pub fn find_with_weight(&self, target: f64, normalize: bool) -> Result<(usize, f64), PrioError> {
        if target.is_nan() {
            return Err(PrioError::InvalidTarget(target));
        }
        let total = self.total();
        if !(total > 0.0) {
            return Err(PrioError::EmptyDistribution);
        }

        let mut target = if normalize { target * total } else { target };
        let mut ix = 0;
        while 2 * ix + 1 < self.weights.len() {
            let left = 2 * ix + 1;
            let right = left + 1;
            if target <= self.weights[left] || self.weights[right] <= 0.0 {
                ix = left;
            } else {
                target -= self.weights[left];
                ix = right;
            }
        }

        let slot = ix - self.leaf_offset();
        debug_assert!(slot < self.capacity);
        Ok((slot, self.weights[ix]))
    }

    /// Sum of all weights.
    pub fn total(&self) -> f64 {
        self.weights[0]
    }

    /// Largest weight among the slots written by [`append`](Self::append), `0` when empty.
    pub fn max(&self) -> f64 {
        self.leaves()[..self.count]
            .iter()
            .fold(0f64, |m, &w| m.max(w))
    }
}

fn check_weight(weight: f64) -> Result<(), PrioError> {
    if !weight.is_finite() {
        Err(PrioError::NonFiniteWeight(weight))
    } else if weight < 0.0 {
        Err(PrioError::NegativeWeight(weight))
    } else {
        Ok(())
    }
}

impl fmt::Display for PrioritySumTree {
    /// One line per depth with the node weights at that depth.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for d in 0..=self.depth {
            let start = (1 << d) - 1;
            let end = (1 << (d + 1)) - 1;
            if d > 0 {
                writeln!(f)?;
            }
            write!(f, "depth {}:\t{:?}", d, &self.weights[start..end])?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_sum_invariant(tree: &PrioritySumTree) {
        let n_internal = tree.leaf_offset();
        for i in 0..n_internal {
            assert_eq!(
                tree.weights[i],
                tree.weights[2 * i + 1] + tree.weights[2 * i + 2],
                "node {} is not the sum of its children",
                i
            );
        }
        let sum = tree.leaves().iter().sum::<f64>();
        assert!((tree.total() - sum).abs() <= 1e-9 * sum.max(1.0));
    }

    fn tree_from(weights: &[f64]) -> PrioritySumTree {
        let mut tree = PrioritySumTree::new(weights.len()).unwrap();
        for &w in weights {
            tree.append(w).unwrap();
        }
        tree
    }

    #[test]
    fn test_shape() {
        let cases = [(1, 0, 1), (2, 1, 3), (3, 2, 7), (4, 2, 7), (5, 3, 15), (8, 3, 15)];
        for &(capacity, depth, size) in cases.iter() {
            let tree = PrioritySumTree::new(capacity).unwrap();
            assert_eq!(tree.depth(), depth, "capacity {}", capacity);
            assert_eq!(tree.weights.len(), size, "capacity {}", capacity);
            assert_eq!(tree.leaves().len(), capacity);
            assert_eq!(tree.total(), 0.0);
            assert!(tree.is_empty());
        }
        assert_eq!(PrioritySumTree::new(0).unwrap_err(), PrioError::InvalidCapacity(0));
    }

    #[test]
    fn test_single_slot() {
        let mut tree = PrioritySumTree::new(1).unwrap();
        tree.append(2.5).unwrap();
        assert_eq!(tree.total(), 2.5);
        assert_eq!(tree.find(0.7, true).unwrap(), 0);
        tree.append(1.5).unwrap();
        assert_eq!(tree.total(), 1.5);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.cursor(), 0);
    }

    #[test]
    fn test_sum_invariant() {
        let mut tree = PrioritySumTree::new(7).unwrap();
        let ops = [(0, 1.0), (3, 2.5), (6, 0.5), (3, 0.0), (1, 8.0), (0, 0.25), (6, 4.0)];
        for &(slot, w) in ops.iter() {
            tree.update(slot, w).unwrap();
            assert_sum_invariant(&tree);
        }
        for &w in [3.0, 1.0, 0.5, 2.0, 7.0, 0.0, 1.5, 6.0, 9.0].iter() {
            tree.append(w).unwrap();
            assert_sum_invariant(&tree);
        }
    }

    #[test]
    fn test_update_idempotent() {
        let mut tree = tree_from(&[1.0, 2.0, 3.0]);
        tree.update(1, 5.0).unwrap();
        let before = tree.weights.clone();
        tree.update(1, 5.0).unwrap();
        assert_eq!(tree.weights, before);
    }

    #[test]
    fn test_find() {
        let tree = tree_from(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(tree.total(), 10.0);
        assert_eq!(tree.find(0.0, false).unwrap(), 0);
        assert_eq!(tree.find(0.5, false).unwrap(), 0);
        // Boundaries belong to the left range.
        assert_eq!(tree.find(1.0, false).unwrap(), 0);
        assert_eq!(tree.find(1.001, false).unwrap(), 1);
        assert_eq!(tree.find(3.0, false).unwrap(), 1);
        assert_eq!(tree.find(3.5, false).unwrap(), 2);
        assert_eq!(tree.find(6.0, false).unwrap(), 2);
        assert_eq!(tree.find(9.999, false).unwrap(), 3);
        assert_eq!(tree.find(0.05, true).unwrap(), 0);
        assert_eq!(tree.find(0.65, true).unwrap(), 3);
        assert_eq!(tree.find_with_weight(4.5, false).unwrap(), (2, 3.0));
    }

    #[test]
    fn test_find_clamps_to_populated_slots() {
        // Capacity 5 pads to 8 leaves.
        let tree = tree_from(&[1.0, 2.0, 0.0, 4.0, 0.0]);
        assert_eq!(tree.find(7.0, false).unwrap(), 3);
        assert_eq!(tree.find(100.0, false).unwrap(), 3);
        assert_eq!(tree.find(1.0, true).unwrap(), 3);
        assert_eq!(tree.find(f64::INFINITY, true).unwrap(), 3);
    }

    #[test]
    fn test_find_rejects() {
        let tree = PrioritySumTree::new(4).unwrap();
        assert_eq!(tree.find(0.5, true), Err(PrioError::EmptyDistribution));
        assert_eq!(tree.find(0.0, false), Err(PrioError::EmptyDistribution));

        let tree = tree_from(&[1.0, 1.0]);
        assert!(matches!(tree.find(f64::NAN, true), Err(PrioError::InvalidTarget(_))));
    }

    #[test]
    fn test_no_drift_after_zeroing_large_weights() {
        let mut tree = tree_from(&[1.0, 1.0, 1.0, 1.0]);
        tree.update(3, 1023.153).unwrap();
        tree.update(2, 0.1).unwrap();
        tree.update(3, 0.0).unwrap();
        tree.update(2, 0.0).unwrap();
        assert_eq!(tree.weights[2], 0.0);
        assert_eq!(tree.total(), 2.0);
        assert_sum_invariant(&tree);
        for i in 1..=1000 {
            let (slot, w) = tree.find_with_weight(i as f64 / 1000.0 - 1e-9, true).unwrap();
            assert!(w > 0.0, "target {} gave slot {} with zero weight", i, slot);
        }

        let mut tree = PrioritySumTree::new(7).unwrap();
        for i in 0..200 {
            let slot = i % 7;
            tree.update(slot, 1e6 / (i + 1) as f64 + 0.1 * i as f64).unwrap();
        }
        for slot in 1..7 {
            tree.update(slot, 0.0).unwrap();
        }
        tree.update(0, 0.3).unwrap();
        assert_sum_invariant(&tree);
        assert!(tree.weights.iter().all(|&w| w >= 0.0));
        assert_eq!(tree.total(), 0.3);
        assert_eq!(tree.find_with_weight(0.999999, true).unwrap(), (0, 0.3));
        assert_eq!(tree.find_with_weight(50.0, false).unwrap(), (0, 0.3));
    }

    #[test]
    fn test_ring_buffer_eviction() {
        let mut tree = PrioritySumTree::new(3).unwrap();
        for &w in [1.0, 2.0, 3.0].iter() {
            tree.append(w).unwrap();
        }
        assert_eq!(tree.total(), 6.0);
        assert_eq!(tree.cursor(), 0);

        tree.append(4.0).unwrap();
        assert_eq!(tree.total(), 9.0);
        assert_eq!(tree.leaves(), &[4.0, 2.0, 3.0]);
        assert_eq!(tree.len(), 3);
        assert_eq!(tree.cursor(), 1);
        for i in 0..=100 {
            let (_, w) = tree.find_with_weight(i as f64 / 100.0, true).unwrap();
            assert_ne!(w, 1.0);
        }
        assert_sum_invariant(&tree);
    }

    #[test]
    fn test_max_over_populated_slots() {
        let mut tree = PrioritySumTree::new(5).unwrap();
        assert_eq!(tree.max(), 0.0);
        tree.append(5.0).unwrap();
        tree.append(1.0).unwrap();
        assert_eq!(tree.max(), 5.0);
        tree.append(0.0).unwrap();
        assert_eq!(tree.max(), 5.0);

        // Slots written by `update` alone are not yet part of the buffer.
        tree.update(4, 9.0).unwrap();
        assert_eq!(tree.max(), 5.0);
        tree.append(0.0).unwrap();
        tree.append(0.0).unwrap();
        assert_eq!(tree.max(), 5.0);

        // After wrapping, the evicted 5 is gone.
        tree.append(2.0).unwrap();
        assert_eq!(tree.max(), 2.0);
    }

    #[test]
    fn test_rejection_leaves_tree_unchanged() {
        let mut tree = tree_from(&[1.0, 2.0, 3.0]);
        let before = tree.weights.clone();

        assert_eq!(
            tree.update(3, 1.0),
            Err(PrioError::IndexOutOfRange { slot: 3, capacity: 3 })
        );
        assert!(matches!(
            tree.update(usize::MAX, 1.0),
            Err(PrioError::IndexOutOfRange { .. })
        ));
        assert_eq!(tree.update(0, -1.0), Err(PrioError::NegativeWeight(-1.0)));
        assert!(matches!(tree.update(0, f64::NAN), Err(PrioError::NonFiniteWeight(_))));
        assert!(matches!(
            tree.append(f64::INFINITY),
            Err(PrioError::NonFiniteWeight(_))
        ));
        assert_eq!(tree.append(-0.5), Err(PrioError::NegativeWeight(-0.5)));

        assert_eq!(tree.weights, before);
        assert_eq!(tree.total(), 6.0);
        assert_eq!(tree.cursor(), 0);
        assert_eq!(tree.len(), 3);
    }

    #[test]
    fn test_display() {
        let tree = tree_from(&[1.0, 2.0, 3.0]);
        let s = format!("{}", tree);
        let lines = s.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "depth 0:\t[6.0]");
        assert_eq!(lines[1], "depth 1:\t[3.0, 3.0]");
        assert_eq!(lines[2], "depth 2:\t[1.0, 2.0, 3.0, 0.0]");
    }
}
