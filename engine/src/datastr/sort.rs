//! Per-cell, per-direction particle orderings, and the parallel sort that
//! produces them.
//!
//! A cell's particles are projected onto each of the 13 direction vectors in
//! [`SID_DIRECTION`] and sorted by that projection; a pair task along
//! direction `sid` then walks both cells' particles in lock-step along that
//! ordering instead of scanning the full cross product.

use crate::error::SchedulerError;
use crate::fatal;

/// The 13 direction vectors a sort handle (0..=12) projects particles onto.
/// Handle 13 is never sorted separately; callers resolve it to handle 12
/// (see [`crate::datastr::cell::Cell::sort_handle`]).
pub const SID_DIRECTION: [[i8; 3]; 13] = [
    [-1, -1, -1],
    [-1, -1, 0],
    [-1, -1, 1],
    [-1, 0, -1],
    [-1, 0, 0],
    [-1, 0, 1],
    [-1, 1, -1],
    [-1, 1, 0],
    [-1, 1, 1],
    [0, -1, -1],
    [0, -1, 0],
    [0, -1, 1],
    [0, 0, -1],
];

/// One entry of a sorted direction index: the projected distance and the
/// local particle index (offset from the cell's `offset`) it belongs to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SortEntry {
    pub d: f64,
    pub i: u32,
}

/// Below this many entries, sort with a plain insertion sort instead of
/// recursing.
const INSERTION_SORT_CUTOFF: usize = 16;
/// Below this many entries, recurse sequentially instead of forking a
/// parallel task for each half.
const PARALLEL_CUTOFF: usize = 100;

fn insertion_sort(entries: &mut [SortEntry]) {
    for i in 1..entries.len() {
        let mut j = i;
        while j > 0 && entries[j - 1].d > entries[j].d {
            entries.swap(j - 1, j);
            j -= 1;
        }
    }
}

fn partition(entries: &mut [SortEntry]) -> usize {
    let mid = entries.len() / 2;
    entries.swap(mid, entries.len() - 1);
    let pivot = entries[entries.len() - 1].d;
    let mut store = 0;
    for i in 0..entries.len() - 1 {
        if entries[i].d < pivot {
            entries.swap(i, store);
            store += 1;
        }
    }
    entries.swap(store, entries.len() - 1);
    debug_assert!(entries[..store].iter().all(|e| e.d < entries[store].d));
    debug_assert!(entries[store + 1..].iter().all(|e| e.d >= entries[store].d));
    store
}

fn quicksort(entries: &mut [SortEntry]) {
    if entries.len() <= INSERTION_SORT_CUTOFF {
        insertion_sort(entries);
        return;
    }
    let pivot = partition(entries);
    let (left, right) = entries.split_at_mut(pivot);
    let right = &mut right[1..];
    if left.len() + right.len() > PARALLEL_CUTOFF {
        rayon::join(|| quicksort(left), || quicksort(right));
    } else {
        quicksort(left);
        quicksort(right);
    }
}

/// Sorts `entries` by ascending `d`, using sequential insertion sort for
/// small slices and a parallel fork-join quicksort above [`PARALLEL_CUTOFF`].
/// Stability is not preserved; nothing here depends on it, only on
/// `d`-order.
pub fn parallel_quicksort(entries: &mut [SortEntry]) {
    quicksort(entries);
}

/// Confirms `entries` is sorted ascending by `d`. Called once after a sort
/// task's full range has been sorted, not after each recursive step.
pub fn verify_sorted(entries: &[SortEntry]) -> Result<(), SchedulerError> {
    for w in entries.windows(2) {
        if w[0].d > w[1].d {
            return Err(SchedulerError::InvariantViolated {
                file: file!(),
                function: crate::function_name!(),
                line: line!(),
                msg: format!("sort entries out of order: {} > {}", w[0].d, w[1].d),
            });
        }
    }
    Ok(())
}

/// Builds the unsorted entry list for `positions[range]` projected onto
/// `sid`'s direction, with `i` set to the local index within `range`, into a
/// caller-supplied scratch buffer (cleared first) to avoid an allocation per
/// sort task on the hot path.
pub fn project_into(positions: &[[f64; 3]], sid: u8, out: &mut Vec<SortEntry>) {
    let dir = SID_DIRECTION.get(sid as usize).unwrap_or_else(|| fatal!("sid out of range: {}", sid));
    let norm = ((dir[0] * dir[0] + dir[1] * dir[1] + dir[2] * dir[2]) as f64).sqrt();
    out.clear();
    out.extend(positions.iter().enumerate().map(|(i, p)| {
        let d = (p[0] * dir[0] as f64 + p[1] * dir[1] as f64 + p[2] * dir[2] as f64) / norm;
        SortEntry { d, i: i as u32 }
    }));
}

/// Convenience wrapper around [`project_into`] that allocates its own buffer.
pub fn project(positions: &[[f64; 3]], sid: u8) -> Vec<SortEntry> {
    let mut out = Vec::new();
    project_into(positions, sid, &mut out);
    out
}

/// Returns `order` such that `order[i]` is the original index that should
/// occupy output position `i`, grouped by `keys[original_index]` ascending.
/// Reuses the same parallel quicksort the per-cell direction sorts run,
/// rather than a separate counting-sort implementation, so the tree
/// builder's top-grid and octant bucketing go through one sorting routine.
pub fn order_by_bucket(keys: &[u32]) -> Vec<u32> {
    let mut entries: Vec<SortEntry> = keys.iter().enumerate().map(|(i, &k)| SortEntry { d: k as f64, i: i as u32 }).collect();
    parallel_quicksort(&mut entries);
    debug_assert!(verify_sorted(&entries).is_ok());
    entries.into_iter().map(|e| e.i).collect()
}
