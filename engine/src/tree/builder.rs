//! Top-grid sizing, particle bucketing, and incremental octree maintenance.
//!
//! A rebuild keeps the existing top grid whenever it's still fine enough for
//! the current `h_max` (shrinking only, never regrowing a cell that's
//! already too big); every particle is always rebucketed since particles
//! move every step, but the grid itself and any subtree under it that still
//! satisfies the split/collapse thresholds is left alone. Only cells whose
//! splitting decision actually flips get their progeny rebuilt — this, plus
//! the free list in [`crate::datastr::cell_pool`], is what makes a rebuild
//! cheap relative to a from-scratch tree every step.

use crate::config::SchedulerConfig;
use crate::datastr::cell::Cell;
use crate::datastr::cell_pool::CellPool;
use crate::datastr::particle::ParticleStore;
use crate::datastr::sort;

#[derive(Debug, Clone, Copy, Default)]
pub struct TreeStats {
    pub max_depth: u32,
    pub tot_cells: usize,
}

/// The top-level grid, persisted across steps so [`rebuild`] can tell
/// whether the existing grid is still adequate instead of reallocating it
/// every call. `cdim == [0, 0, 0]` (the `Default`) means no grid has been
/// built yet and the next `rebuild` must build one from scratch.
#[derive(Debug, Default)]
pub struct TopGrid {
    pub cdim: [usize; 3],
    pub top_cells: Vec<u32>,
}

/// Rebuilds (or incrementally updates) the tree over every particle in
/// `store`. `force` forces a fresh top grid regardless of sizing; `cell_max`
/// is a floor on cell width independent of smoothing length. Returns
/// whether anything about the tree's structure changed this call, plus
/// summary stats.
pub fn rebuild(
    store: &mut ParticleStore,
    pool: &mut CellPool,
    top: &mut TopGrid,
    cfg: &SchedulerConfig,
    origin: [f64; 3],
    dim: [f64; 3],
    force: bool,
    cell_max: f64,
) -> (bool, TreeStats) {
    let h_max = store.condensed().iter().fold(0.0_f64, |m, p| m.max(p.h));
    let min_width = (h_max * cfg.stretch).max(cell_max).max(1e-12);
    let new_cdim = [
        ((dim[0] / min_width).floor() as usize).max(1),
        ((dim[1] / min_width).floor() as usize).max(1),
        ((dim[2] / min_width).floor() as usize).max(1),
    ];

    let need_new_grid =
        force || top.top_cells.is_empty() || (0..3).any(|k| new_cdim[k] < top.cdim[k]);

    let mut changed = need_new_grid;
    if need_new_grid {
        for &c in &top.top_cells {
            pool.recycle(c);
        }
        let width = [dim[0] / new_cdim[0] as f64, dim[1] / new_cdim[1] as f64, dim[2] / new_cdim[2] as f64];
        let n_top = new_cdim[0] * new_cdim[1] * new_cdim[2];
        let mut top_cells = Vec::with_capacity(n_top);
        for b in 0..n_top {
            let (ii, jj, kk) = unflatten(b, new_cdim);
            let loc = [origin[0] + ii as f64 * width[0], origin[1] + jj as f64 * width[1], origin[2] + kk as f64 * width[2]];
            top_cells.push(pool.alloc(Cell::new(loc, width, 0, 0, 0, None)));
        }
        top.cdim = new_cdim;
        top.top_cells = top_cells;
    }

    let cdim = top.cdim;
    let width = [dim[0] / cdim[0] as f64, dim[1] / cdim[1] as f64, dim[2] / cdim[2] as f64];
    let n_top = cdim[0] * cdim[1] * cdim[2];

    let bucket_of = |pos: [f64; 3]| -> usize {
        let ii = (((pos[0] - origin[0]) / width[0]) as isize).clamp(0, cdim[0] as isize - 1) as usize;
        let jj = (((pos[1] - origin[1]) / width[1]) as isize).clamp(0, cdim[1] as isize - 1) as usize;
        let kk = (((pos[2] - origin[2]) / width[2]) as isize).clamp(0, cdim[2] as isize - 1) as usize;
        ii + cdim[0] * (jj + cdim[1] * kk)
    };

    let n = store.len();
    let buckets: Vec<u32> = store.full().iter().map(|p| bucket_of(p.pos) as u32).collect();
    let order = sort::order_by_bucket(&buckets);
    store.apply_permutation(&order);

    let mut counts = vec![0usize; n_top];
    for &b in &buckets {
        counts[b as usize] += 1;
    }
    let mut offsets = vec![0usize; n_top + 1];
    for b in 0..n_top {
        offsets[b + 1] = offsets[b] + counts[b];
    }
    debug_assert_eq!(offsets[n_top], n);

    for (b, &idx) in top.top_cells.iter().enumerate() {
        let c = pool.get_mut(idx);
        c.offset = offsets[b];
        c.count = counts[b];
    }

    let mut max_depth = 0u32;
    for &idx in &top.top_cells {
        changed |= rebuild_cell(store, pool, idx, cfg);
        max_depth = max_depth.max(max_depth_of(pool, idx));
    }

    (changed, TreeStats { max_depth, tot_cells: pool.live_count() })
}

fn max_depth_of(pool: &CellPool, idx: u32) -> u32 {
    let c = pool.get(idx);
    if c.split {
        c.progeny.iter().flatten().map(|&ch| max_depth_of(pool, ch)).max().unwrap_or(c.depth)
    } else {
        c.depth
    }
}

fn h_max_of(store: &ParticleStore, offset: usize, count: usize) -> f64 {
    store.condensed()[offset..offset + count].iter().fold(0.0_f64, |m, p| m.max(p.h))
}

/// Fraction of `[offset, offset+count)` whose `h` fits within `half_width`,
/// i.e. is small enough that splitting the cell further is worthwhile.
fn enough_small_h(store: &ParticleStore, offset: usize, count: usize, half_width: f64, split_ratio: f64) -> bool {
    if count == 0 {
        return false;
    }
    let small = store.condensed()[offset..offset + count].iter().filter(|p| p.h <= half_width).count();
    (small as f64) >= split_ratio * count as f64
}

/// Applies the collapse/keep-split/split decision to the cell at `idx`,
/// returning whether its split state or progeny composition changed.
fn rebuild_cell(store: &mut ParticleStore, pool: &mut CellPool, idx: u32, cfg: &SchedulerConfig) -> bool {
    let (offset, count, width, split) = {
        let c = pool.get(idx);
        (c.offset, c.count, c.width, c.split)
    };
    let half_width = width[0].min(width[1]).min(width[2]) / 2.0;
    let should_split = count >= cfg.split_size && enough_small_h(store, offset, count, half_width, cfg.split_ratio);

    if split && !should_split {
        for child in pool.get(idx).progeny.into_iter().flatten() {
            pool.recycle(child);
        }
        let c = pool.get_mut(idx);
        c.progeny = [None; 8];
        c.split = false;
        c.h_max = h_max_of(store, offset, count);
        return true;
    }

    if !split && !should_split {
        pool.get_mut(idx).h_max = h_max_of(store, offset, count);
        return false;
    }

    let mut changed = !split;
    pool.get_mut(idx).split = true;
    changed |= redistribute_octants(store, pool, idx, cfg);
    changed
}

/// Buckets `idx`'s particle range by octant (parallel quicksort, same
/// routine as the per-cell direction sorts), creates progeny that don't yet
/// exist, prunes ones that emptied out, and recurses into every surviving
/// child.
fn redistribute_octants(store: &mut ParticleStore, pool: &mut CellPool, idx: u32, cfg: &SchedulerConfig) -> bool {
    let (offset, count, loc, width, depth) = {
        let c = pool.get(idx);
        (c.offset, c.count, c.loc, c.width, c.depth)
    };

    let octants: Vec<u32> = store.full()[offset..offset + count]
        .iter()
        .map(|p| pool.get(idx).octant_of(p.pos) as u32)
        .collect();
    let order = sort::order_by_bucket(&octants);
    store.apply_range_permutation(offset, &order);

    let mut octant_counts = [0usize; 8];
    for &o in &octants {
        octant_counts[o as usize] += 1;
    }
    let mut octant_offsets = [0usize; 9];
    for o in 0..8 {
        octant_offsets[o + 1] = octant_offsets[o] + octant_counts[o];
    }

    let mut changed = false;
    for o in 0..8 {
        let o_count = octant_counts[o];
        let existing = pool.get(idx).progeny[o];
        if o_count == 0 {
            if let Some(child) = existing {
                pool.recycle(child);
                pool.get_mut(idx).progeny[o] = None;
                changed = true;
            }
            continue;
        }

        let child_offset = offset + octant_offsets[o];
        let child_idx = match existing {
            Some(c) => {
                let cell = pool.get_mut(c);
                cell.offset = child_offset;
                cell.count = o_count;
                c
            }
            None => {
                let child_width = [width[0] / 2.0, width[1] / 2.0, width[2] / 2.0];
                let child_loc = [
                    loc[0] + if o & 1 != 0 { child_width[0] } else { 0.0 },
                    loc[1] + if o & 2 != 0 { child_width[1] } else { 0.0 },
                    loc[2] + if o & 4 != 0 { child_width[2] } else { 0.0 },
                ];
                let child = Cell::new(child_loc, child_width, child_offset, o_count, depth + 1, Some(idx));
                let c = pool.alloc(child);
                pool.get_mut(idx).progeny[o] = Some(c);
                changed = true;
                c
            }
        };
        changed |= rebuild_cell(store, pool, child_idx, cfg);
    }

    let h_max = pool
        .get(idx)
        .progeny
        .iter()
        .flatten()
        .map(|&c| pool.get(c).h_max)
        .fold(0.0_f64, f64::max);
    pool.get_mut(idx).h_max = h_max;

    changed
}

fn unflatten(idx: usize, cdim: [usize; 3]) -> (usize, usize, usize) {
    let kk = idx / (cdim[0] * cdim[1]);
    let rem = idx % (cdim[0] * cdim[1]);
    let jj = rem / cdim[0];
    let ii = rem % cdim[0];
    (ii, jj, kk)
}
