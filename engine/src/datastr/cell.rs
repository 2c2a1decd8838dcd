//! Octree cell representation.
//!
//! Cells live in a flat arena (see [`super::cell_pool`]) and reference each
//! other by index, never by pointer: a cell's progeny, parent, and the task
//! attached to each of its 14 sort handles are all `Option<u32>` indices into
//! the same pool. Indices survive a rebuild; pointers into a `Vec` that may
//! reallocate would not.

use std::sync::atomic::{AtomicBool, Ordering};

/// A spinlock guarding concurrent mutation of a single cell's particle
/// range, density accumulator, etc. Two-cell (pair) tasks acquire the locks
/// of both cells involved, always in ascending index order, to avoid
/// deadlock.
#[derive(Debug, Default)]
pub struct Spinlock(AtomicBool);

impl Spinlock {
    pub fn new() -> Self {
        Spinlock(AtomicBool::new(false))
    }

    /// Spins until the lock is acquired.
    pub fn lock(&self) {
        while self
            .0
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            std::hint::spin_loop();
        }
    }

    pub fn unlock(&self) {
        self.0.store(false, Ordering::Release);
    }
}

/// A node in the spatial tree.
///
/// `offset`/`count` index into the shared [`super::particle::ParticleStore`]
/// arrays; a cell never copies or owns particle data.
#[derive(Debug)]
pub struct Cell {
    /// Lower corner of the cell's bounding box.
    pub loc: [f64; 3],
    /// Extent of the cell along each axis.
    pub width: [f64; 3],
    /// Offset of this cell's particles in the shared particle arrays.
    pub offset: usize,
    /// Number of particles belonging to this cell.
    pub count: usize,
    /// Depth in the tree; the root is depth 0.
    pub depth: u32,
    /// Whether this cell has been split into progeny.
    pub split: bool,
    /// Indices of up to 8 child cells, in Morton/octant order.
    pub progeny: [Option<u32>; 8],
    /// Index of the parent cell; `None` for the root.
    pub parent: Option<u32>,
    /// Largest smoothing length among this cell's particles (and, once
    /// computed bottom-up, among its entire subtree).
    pub h_max: f64,
    /// For each of the 14 sort handles, the index of the sort task that
    /// produces that handle's permutation, if one has been created. Handle
    /// 13 is always equal to handle 12, never independently populated.
    pub sorts: [Option<u32>; 14],
    /// Number of pair/sub tasks currently referencing this cell, used to
    /// decide whether this cell is a "super cell" (the highest ancestor
    /// with any task attached) when inserting ghost tasks.
    pub nr_pairs: u32,
    pub lock: Spinlock,
}

impl Cell {
    pub fn new(loc: [f64; 3], width: [f64; 3], offset: usize, count: usize, depth: u32, parent: Option<u32>) -> Self {
        Cell {
            loc,
            width,
            offset,
            count,
            depth,
            split: false,
            progeny: [None; 8],
            parent,
            h_max: 0.0,
            sorts: [None; 14],
            nr_pairs: 0,
            lock: Spinlock::new(),
        }
    }

    /// Resolves sort handle 13 to its alias, handle 12.
    pub fn sort_handle(&self, handle: usize) -> Option<u32> {
        if handle == 13 {
            self.sorts[12]
        } else {
            self.sorts[handle]
        }
    }

    pub fn is_leaf(&self) -> bool {
        !self.split
    }

    /// Octant index (0..8) of `pos` within this cell: bit 0 is x, bit 1 is
    /// y, bit 2 is z, set when the coordinate is past the cell's midpoint.
    pub fn octant_of(&self, pos: [f64; 3]) -> usize {
        let mut idx = 0;
        for k in 0..3 {
            if pos[k] - self.loc[k] >= self.width[k] / 2.0 {
                idx |= 1 << k;
            }
        }
        idx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn octant_of_splits_on_midpoint() {
        let c = Cell::new([0.0, 0.0, 0.0], [2.0, 2.0, 2.0], 0, 0, 0, None);
        assert_eq!(c.octant_of([0.1, 0.1, 0.1]), 0);
        assert_eq!(c.octant_of([1.5, 0.1, 0.1]), 1);
        assert_eq!(c.octant_of([1.5, 1.5, 1.5]), 7);
    }

    #[test]
    fn sort_handle_13_aliases_12() {
        let mut c = Cell::new([0.0; 3], [1.0; 3], 0, 0, 0, None);
        c.sorts[12] = Some(42);
        assert_eq!(c.sort_handle(13), Some(42));
        assert_eq!(c.sort_handle(12), Some(42));
    }

    #[test]
    fn spinlock_mutual_exclusion() {
        let lock = Spinlock::new();
        lock.lock();
        lock.unlock();
        lock.lock();
        lock.unlock();
    }
}
