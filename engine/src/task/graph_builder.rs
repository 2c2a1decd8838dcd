//! Turns a built cell tree into a [`TaskGraph`]: sort tasks, self/pair
//! interaction tasks (split recursively until small enough to inline as a
//! `sub`), and per-cell ghost barriers separating the density and force
//! phases.

use std::collections::HashMap;

use super::{Subtype, TaskGraph, TaskKind};
use crate::config::SchedulerConfig;
use crate::datastr::cell::Cell;
use crate::datastr::cell_pool::CellPool;
use crate::datastr::direction::{is_corner_sid, sid_expansion, sid_of_offset, PROGENY_PAIR_SID};

/// A pending density-phase task plus the ids of every handle it still needs
/// to wait on before it can run. Used as a work queue so that splitting a
/// task can push its replacements back onto the same queue instead of
/// recursing the Rust call stack per tree level.
struct Pending {
    kind: TaskKind,
    /// `(cell, sid_or_all)` sort dependencies not yet wired up as graph
    /// edges because the sort task for that cell may not exist yet.
    waits_on_sorts: Vec<(u32, u8)>,
}

/// Builds the full task graph for one step over the tree rooted at the
/// cells in `top_cells` (a flat list of top-level cell indices, already
/// neighbour-adjacent in the grid `cdim` describes).
pub fn build(cells: &mut CellPool, top_cells: &[u32], cdim: [usize; 3], cfg: &SchedulerConfig) -> TaskGraph {
    let tot_cells = cells.len();
    let mut graph = TaskGraph::with_capacity_for_cells(tot_cells);

    for &c in top_cells {
        make_sort_tasks(cells, c, &mut graph);
    }

    let all_cells = collect_all_cells(cells, top_cells);
    for &c in &all_cells {
        cells.get_mut(c).nr_pairs = 0;
    }

    let mut density_tasks: Vec<u32> = Vec::new();
    let mut pending: Vec<Pending> = Vec::new();

    for &c in top_cells {
        if cells.get(c).count > 0 {
            pending.push(Pending {
                kind: TaskKind::SelfInteraction { cell: c, subtype: Subtype::Density },
                waits_on_sorts: vec![],
            });
        }
    }

    for (idx, &ci) in top_cells.iter().enumerate() {
        let (ii, jj, kk) = unflatten(idx, cdim);
        for dz in -1i8..=1 {
            for dy in -1i8..=1 {
                for dx in -1i8..=1 {
                    if dx == 0 && dy == 0 && dz == 0 {
                        continue;
                    }
                    let sid = sid_of_offset(dx, dy, dz);
                    // Each unordered neighbour pair is visited from exactly
                    // one of its two directions: keep the one whose sid is
                    // in the canonical (>= 13 before folding) half, i.e.
                    // only emit when stepping in the +dz, or +dy at dz==0,
                    // or +dx at dy==dz==0 direction.
                    if !is_canonical_step(dx, dy, dz) {
                        continue;
                    }
                    if let Some((oi, oj, ok, _shifted)) = neighbour(ii, jj, kk, dx, dy, dz, cdim, cfg.periodic) {
                        let cj_idx = flatten(oi, oj, ok, cdim);
                        let cj = top_cells[cj_idx];
                        if cells.get(ci).count == 0 || cells.get(cj).count == 0 {
                            continue;
                        }
                        pending.push(Pending {
                            kind: TaskKind::Pair { ci, cj, sid, subtype: Subtype::Density },
                            waits_on_sorts: vec![(ci, sid), (cj, sid)],
                        });
                    }
                }
            }
        }
    }

    let mut queue = pending;
    while let Some(Pending { kind, waits_on_sorts }) = queue.pop() {
        match kind {
            TaskKind::SelfInteraction { cell, subtype } => {
                split_self(cells, cell, subtype, cfg, &mut graph, &mut queue, &mut density_tasks, &waits_on_sorts);
            }
            TaskKind::Pair { ci, cj, sid, subtype } => {
                split_pair(cells, ci, cj, sid, subtype, cfg, &mut graph, &mut queue, &mut density_tasks);
            }
            TaskKind::Sub { .. } | TaskKind::Sort { .. } | TaskKind::Ghost { .. } | TaskKind::None => {
                unreachable!("split_self/split_pair never queue these variants")
            }
        }
    }

    prune_unused_sorts(cells, &all_cells, &mut graph);
    build_ghosts(cells, &all_cells, &density_tasks, &mut graph);

    graph
}

/// True for exactly one of each `(dx,dy,dz)`/`(-dx,-dy,-dz)` pair, so a
/// 26-neighbour loop visits every unordered neighbour pair once.
fn is_canonical_step(dx: i8, dy: i8, dz: i8) -> bool {
    if dz != 0 {
        dz < 0
    } else if dy != 0 {
        dy < 0
    } else {
        dx < 0
    }
}

fn unflatten(idx: usize, cdim: [usize; 3]) -> (usize, usize, usize) {
    let kk = idx / (cdim[0] * cdim[1]);
    let rem = idx % (cdim[0] * cdim[1]);
    let jj = rem / cdim[0];
    let ii = rem % cdim[0];
    (ii, jj, kk)
}

fn flatten(ii: usize, jj: usize, kk: usize, cdim: [usize; 3]) -> usize {
    ii + cdim[0] * (jj + cdim[1] * kk)
}

/// Resolves the neighbour of `(ii,jj,kk)` along `(dx,dy,dz)`, wrapping if
/// `periodic`. Returns `None` if the neighbour falls outside the grid in a
/// non-periodic domain.
fn neighbour(
    ii: usize,
    jj: usize,
    kk: usize,
    dx: i8,
    dy: i8,
    dz: i8,
    cdim: [usize; 3],
    periodic: bool,
) -> Option<(usize, usize, usize, bool)> {
    let step = |c: usize, d: i8, n: usize| -> Option<(usize, bool)> {
        let v = c as i64 + d as i64;
        if v < 0 || v >= n as i64 {
            if periodic {
                Some((v.rem_euclid(n as i64) as usize, true))
            } else {
                None
            }
        } else {
            Some((v as usize, false))
        }
    };
    let (oi, si) = step(ii, dx, cdim[0])?;
    let (oj, sj) = step(jj, dy, cdim[1])?;
    let (ok, sk) = step(kk, dz, cdim[2])?;
    Some((oi, oj, ok, si || sj || sk))
}

/// Every cell under `top_cells`, split or leaf, parents before children.
fn collect_all_cells(cells: &CellPool, top_cells: &[u32]) -> Vec<u32> {
    fn visit(cells: &CellPool, idx: u32, out: &mut Vec<u32>) {
        out.push(idx);
        if cells.get(idx).split {
            for child in cells.get(idx).progeny.into_iter().flatten() {
                visit(cells, child, out);
            }
        }
    }
    let mut out = Vec::new();
    for &c in top_cells {
        visit(cells, c, &mut out);
    }
    out
}

fn make_sort_tasks(cells: &mut CellPool, cell: u32, graph: &mut TaskGraph) {
    let progeny = cells.get(cell).progeny;
    let split = cells.get(cell).split;
    if split {
        for child in progeny.into_iter().flatten() {
            make_sort_tasks(cells, child, graph);
        }
    }
    // All 14 handles requested; unused ones cost one idle merge each and
    // are cheap relative to tracking demand precisely.
    let id = graph.add_task(TaskKind::Sort { cell, handles: 0x3FFF });
    if split {
        for child in progeny.into_iter().flatten() {
            if let Some(child_sort) = cells.get(child).sorts[0] {
                graph.add_unlock(child_sort, id);
            }
        }
    }
    cells.get_mut(cell).sorts = [Some(id); 14];
}

/// Demotes every sort task nothing ended up depending on to
/// [`TaskKind::None`] and nulls the cell's handles pointing at it, so the
/// scheduler runs it as a zero-cost relay instead of an unconditional sort.
fn prune_unused_sorts(cells: &mut CellPool, all_cells: &[u32], graph: &mut TaskGraph) {
    for &c in all_cells {
        if let Some(sort_id) = cells.get(c).sorts[0] {
            if graph.unlocks_of(sort_id).is_empty() {
                graph.demote_to_none(sort_id);
                cells.get_mut(c).sorts = [None; 14];
            }
        }
    }
}

fn wire_sorts(cells: &CellPool, waits: &[(u32, u8)], task: u32, graph: &mut TaskGraph) {
    for &(cell, sid) in waits {
        if let Some(sort) = cells.get(cell).sort_handle(sid as usize) {
            graph.add_unlock(sort, task);
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn split_self(
    cells: &mut CellPool,
    cell: u32,
    subtype: Subtype,
    cfg: &SchedulerConfig,
    graph: &mut TaskGraph,
    queue: &mut Vec<Pending>,
    density_tasks: &mut Vec<u32>,
    waits: &[(u32, u8)],
) {
    if !cells.get(cell).split {
        let id = graph.add_task(TaskKind::SelfInteraction { cell, subtype });
        wire_sorts(cells, waits, id, graph);
        if subtype == Subtype::Density {
            density_tasks.push(id);
            cells.get_mut(cell).nr_pairs += 1;
        }
        return;
    }
    if cells.get(cell).count < cfg.sub_size {
        let id = graph.add_task(TaskKind::Sub { ci: cell, cj: None, sid: None, subtype });
        for k in 0..14 {
            if k == 0 || cells.get(cell).sorts[k] != cells.get(cell).sorts[k - 1] {
                if let Some(sort) = cells.get(cell).sorts[k] {
                    graph.add_unlock(sort, id);
                }
            }
        }
        if subtype == Subtype::Density {
            density_tasks.push(id);
            cells.get_mut(cell).nr_pairs += 1;
        }
        return;
    }

    let progeny: Vec<u32> = cells.get(cell).progeny.into_iter().flatten().collect();
    for &p in &progeny {
        if cells.get(p).count > 0 {
            queue.push(Pending {
                kind: TaskKind::SelfInteraction { cell: p, subtype },
                waits_on_sorts: vec![],
            });
        }
    }
    for (a, &pj) in progeny.iter().enumerate() {
        if cells.get(pj).count == 0 {
            continue;
        }
        for &pk in &progeny[a + 1..] {
            if cells.get(pk).count == 0 {
                continue;
            }
            let j = progeny_slot(cells, cell, pj);
            let k = progeny_slot(cells, cell, pk);
            let sid = PROGENY_PAIR_SID[j.min(k)][j.max(k)];
            queue.push(Pending {
                kind: TaskKind::Pair { ci: pj, cj: pk, sid, subtype },
                waits_on_sorts: vec![(pj, sid), (pk, sid)],
            });
        }
    }
}

fn progeny_slot(cells: &CellPool, parent: u32, child: u32) -> usize {
    cells
        .get(parent)
        .progeny
        .iter()
        .position(|&p| p == Some(child))
        .expect("child must be a progeny of parent")
}

#[allow(clippy::too_many_arguments)]
fn split_pair(
    cells: &mut CellPool,
    ci: u32,
    cj: u32,
    sid: u8,
    subtype: Subtype,
    cfg: &SchedulerConfig,
    graph: &mut TaskGraph,
    queue: &mut Vec<Pending>,
    density_tasks: &mut Vec<u32>,
) {
    let split_both = cells.get(ci).split && cells.get(cj).split;
    let h_room = |cell: &Cell| -> bool {
        let h = cell.width[0].max(cell.width[1]).max(cell.width[2]);
        cell.h_max * cfg.stretch < h / 2.0
    };
    if !(split_both && h_room(cells.get(ci)) && h_room(cells.get(cj))) {
        let id = graph.add_task(TaskKind::Pair { ci, cj, sid, subtype });
        wire_sorts(cells, &[(ci, sid), (cj, sid)], id, graph);
        if subtype == Subtype::Density {
            density_tasks.push(id);
            cells.get_mut(ci).nr_pairs += 1;
            cells.get_mut(cj).nr_pairs += 1;
        }
        return;
    }

    if cells.get(ci).count < cfg.sub_size && cells.get(cj).count < cfg.sub_size && !is_corner_sid(sid) {
        let id = graph.add_task(TaskKind::Sub { ci, cj: Some(cj), sid: Some(sid), subtype });
        for &cell in &[ci, cj] {
            for &child in cells.get(cell).progeny.iter().flatten() {
                for k in 0..14 {
                    if let Some(sort) = cells.get(child).sorts[k] {
                        graph.add_unlock(sort, id);
                    }
                }
            }
        }
        if subtype == Subtype::Density {
            density_tasks.push(id);
            cells.get_mut(ci).nr_pairs += 1;
            cells.get_mut(cj).nr_pairs += 1;
        }
        return;
    }

    for &(pi_idx, pj_idx, sub_sid) in sid_expansion(sid) {
        let pi = cells.get(ci).progeny[pi_idx as usize];
        let pj = cells.get(cj).progeny[pj_idx as usize];
        if let (Some(pi), Some(pj)) = (pi, pj) {
            if cells.get(pi).count == 0 || cells.get(pj).count == 0 {
                continue;
            }
            queue.push(Pending {
                kind: TaskKind::Pair { ci: pi, cj: pj, sid: sub_sid, subtype },
                waits_on_sorts: vec![(pi, sub_sid), (pj, sub_sid)],
            });
        }
    }
}

/// The cell(s) a density task's kernel call actually touches.
fn touched_cells(kind: &TaskKind) -> Vec<u32> {
    match kind {
        TaskKind::SelfInteraction { cell, .. } => vec![*cell],
        TaskKind::Pair { ci, cj, .. } => vec![*ci, *cj],
        TaskKind::Sub { ci, cj: Some(cj), .. } => vec![*ci, *cj],
        TaskKind::Sub { ci, cj: None, .. } => vec![*ci],
        _ => vec![],
    }
}

fn twin_force_kind(kind: &TaskKind) -> TaskKind {
    match kind.clone() {
        TaskKind::SelfInteraction { cell, .. } => TaskKind::SelfInteraction { cell, subtype: Subtype::Force },
        TaskKind::Pair { ci, cj, sid, .. } => TaskKind::Pair { ci, cj, sid, subtype: Subtype::Force },
        TaskKind::Sub { ci, cj, sid, .. } => TaskKind::Sub { ci, cj, sid, subtype: Subtype::Force },
        other => other,
    }
}

/// Inserts one ghost barrier per cell. A cell that is its own "super cell"
/// (the highest ancestor with at least one density/sub/pair task directly
/// attached, tracked via [`Cell::nr_pairs`]) has its ghost unlocked directly
/// by those tasks; every other cell's ghost simply waits on its parent's,
/// cascading the barrier down from the nearest super cell above it. Each
/// density task also gets a force-phase twin gated on the ghost(s) of every
/// cell it touches (two, for a pair task spanning two top-level trees).
fn build_ghosts(cells: &CellPool, all_cells: &[u32], density_tasks: &[u32], graph: &mut TaskGraph) {
    let mut ghosts: HashMap<u32, u32> = HashMap::with_capacity(all_cells.len());
    for &c in all_cells {
        ghosts.insert(c, graph.add_task(TaskKind::Ghost { cell: c }));
    }

    for &c in all_cells {
        if find_super_cell(cells, c) != c {
            if let Some(parent) = cells.get(c).parent {
                graph.add_unlock(ghosts[&parent], ghosts[&c]);
            }
        }
    }

    for &t in density_tasks {
        let touched = touched_cells(&graph.get(t).kind);
        let mut supers: Vec<u32> = touched.iter().map(|&c| find_super_cell(cells, c)).collect();
        supers.sort_unstable();
        supers.dedup();
        for &s in &supers {
            graph.add_unlock(t, ghosts[&s]);
        }

        let force_id = graph.add_task(twin_force_kind(&graph.get(t).kind));
        for &s in &supers {
            graph.add_unlock(ghosts[&s], force_id);
        }
    }
}

/// Climbs from `cell` to the root, returning the highest (closest-to-root)
/// ancestor, inclusive of `cell` itself, with at least one task directly
/// attached (`nr_pairs > 0`). Falls back to the root if no cell along the
/// path has one.
fn find_super_cell(cells: &CellPool, cell: u32) -> u32 {
    let mut best = if cells.get(cell).nr_pairs > 0 { Some(cell) } else { None };
    let mut cur = cell;
    while let Some(parent) = cells.get(cur).parent {
        cur = parent;
        if cells.get(cur).nr_pairs > 0 {
            best = Some(cur);
        }
    }
    best.unwrap_or(cur)
}
