//! Runs a built [`TaskGraph`] to completion on a pool of worker threads.
//!
//! Workers share one ready queue, shuffled on refill so that the bursts of
//! same-shaped tasks a split produces (e.g. the 16 sub-pairs from a face
//! direction) don't get drained by the same worker in lockstep with its
//! neighbours. Each task claims itself via [`Task::try_take`] before
//! running, so a task surfacing on the queue twice (possible if two of its
//! upstreams finish concurrently) only runs once. Two-cell tasks lock both
//! cells in ascending pool-index order before touching either one's
//! particles, which rules out deadlock without needing a global lock order
//! table.

use std::cell::RefCell;
use std::slice;
use std::sync::Mutex;

use rand::seq::SliceRandom;
use scoped_tls::scoped_thread_local;

use crate::datastr::cell_pool::CellPool;
use crate::datastr::particle::{Particle, ParticleStore};
use crate::datastr::sort;
use crate::datastr::sort::SortEntry;
use crate::error::{KernelError, SchedulerError};
use crate::fatal;
use crate::kernel::Kernel;
use crate::report;
use crate::task::{Subtype, TaskGraph, TaskKind};

// One projection scratch buffer per worker thread, reused across every sort
// task that thread picks up instead of allocating fresh on each one.
scoped_thread_local!(static SORT_WORKSPACE: RefCell<Vec<SortEntry>>);

struct ReadyQueue {
    items: Mutex<Vec<u32>>,
}

impl ReadyQueue {
    fn new(initial: Vec<u32>) -> Self {
        ReadyQueue { items: Mutex::new(initial) }
    }

    fn pop(&self) -> Option<u32> {
        self.items.lock().unwrap().pop()
    }

    fn push_many(&self, mut ids: Vec<u32>) {
        if ids.is_empty() {
            return;
        }
        ids.shuffle(&mut rand::thread_rng());
        self.items.lock().unwrap().extend(ids);
    }
}

/// Runs every task in `graph` to completion, calling into `kernel` for the
/// interaction work each task represents. Blocks until the graph is fully
/// drained; on a kernel failure, already-dispatched tasks are still run to
/// completion before the first error encountered is returned.
pub fn run(
    graph: &TaskGraph,
    cells: &CellPool,
    store: &mut ParticleStore,
    kernel: &dyn Kernel,
    num_threads: usize,
) -> Result<(), SchedulerError> {
    if graph.is_empty() {
        return Ok(());
    }

    let particles_ptr = store.full_as_mut_ptr() as usize;
    let queue = ReadyQueue::new(graph.ready_ids());
    let errors: Mutex<Vec<KernelError>> = Mutex::new(Vec::new());

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads.max(1))
        .build()
        .map_err(|_| SchedulerError::ResourceExhausted { what: "worker thread pool" })?;

    report!("scheduler_threads", num_threads);

    pool.scope(|scope| {
        for _ in 0..num_threads.max(1) {
            scope.spawn(|_| {
                SORT_WORKSPACE.set(&RefCell::new(Vec::new()), || {
                    worker_loop(graph, cells, particles_ptr, kernel, &queue, &errors)
                })
            });
        }
    });

    let mut errs = errors.into_inner().unwrap();
    if errs.is_empty() {
        Ok(())
    } else {
        Err(SchedulerError::Kernel(errs.remove(0)))
    }
}

fn worker_loop(
    graph: &TaskGraph,
    cells: &CellPool,
    particles_ptr: usize,
    kernel: &dyn Kernel,
    queue: &ReadyQueue,
    errors: &Mutex<Vec<KernelError>>,
) {
    loop {
        let id = match queue.pop() {
            Some(id) => id,
            None => return,
        };
        if !graph.get(id).try_take() {
            continue;
        }
        if let Err(e) = execute(graph.get(id).kind.clone(), cells, particles_ptr as *mut Particle, kernel) {
            errors.lock().unwrap().push(e);
        }
        let newly_ready = graph.complete(id);
        queue.push_many(newly_ready);
    }
}

fn slice_for(cells: &CellPool, particles: *mut Particle, cell: u32) -> &'static mut [Particle] {
    let c = cells.get(cell);
    // Safety: the cell's (offset, count) range never overlaps another
    // cell's range at the same tree level, and cross-level overlaps (a
    // self task on a parent after its children ran) are excluded by the
    // graph's own sort/task dependencies, which never schedule a parent
    // self/sub task concurrently with a child one over the same range.
    unsafe { slice::from_raw_parts_mut(particles.add(c.offset), c.count) }
}

fn execute(
    kind: TaskKind,
    cells: &CellPool,
    particles: *mut Particle,
    kernel: &dyn Kernel,
) -> Result<(), KernelError> {
    match kind {
        TaskKind::Sort { cell, handles } => {
            let lock = &cells.get(cell).lock;
            lock.lock();
            let positions: Vec<[f64; 3]> = slice_for(cells, particles, cell).iter().map(|p| p.pos).collect();
            for h in 0..13u8 {
                if handles & (1 << h) != 0 {
                    SORT_WORKSPACE.with(|ws| {
                        let mut entries = ws.borrow_mut();
                        sort::project_into(&positions, h, &mut entries);
                        sort::parallel_quicksort(&mut entries);
                        if let Err(e) = sort::verify_sorted(&entries) {
                            fatal!("{}", e);
                        }
                    });
                }
            }
            lock.unlock();
            Ok(())
        }
        TaskKind::Ghost { cell } => {
            let lock = &cells.get(cell).lock;
            lock.lock();
            let res = kernel.ghost(slice_for(cells, particles, cell));
            lock.unlock();
            res
        }
        TaskKind::SelfInteraction { cell, subtype } => {
            let lock = &cells.get(cell).lock;
            lock.lock();
            let res = match subtype {
                Subtype::Density => kernel.self_density(slice_for(cells, particles, cell)),
                Subtype::Force => kernel.self_force(slice_for(cells, particles, cell)),
            };
            lock.unlock();
            res
        }
        TaskKind::Pair { ci, cj, sid, subtype } => with_two_locks(cells, ci, cj, |a, b| match subtype {
            Subtype::Density => kernel.pair_density(a, b, sid),
            Subtype::Force => kernel.pair_force(a, b, sid),
        }, particles),
        TaskKind::Sub { ci, cj: Some(cj), sid, subtype } => with_two_locks(cells, ci, cj, |a, b| match subtype {
            Subtype::Density => kernel.sub_density(a, Some(b), sid),
            Subtype::Force => kernel.sub_force(a, Some(b), sid),
        }, particles),
        TaskKind::Sub { ci, cj: None, sid, subtype } => {
            let lock = &cells.get(ci).lock;
            lock.lock();
            let res = match subtype {
                Subtype::Density => kernel.sub_density(slice_for(cells, particles, ci), None, sid),
                Subtype::Force => kernel.sub_force(slice_for(cells, particles, ci), None, sid),
            };
            lock.unlock();
            res
        }
        TaskKind::None => Ok(()),
    }
}

fn with_two_locks(
    cells: &CellPool,
    ci: u32,
    cj: u32,
    f: impl FnOnce(&mut [Particle], &mut [Particle]) -> Result<(), KernelError>,
    particles: *mut Particle,
) -> Result<(), KernelError> {
    let (first, second) = if ci < cj { (ci, cj) } else { (cj, ci) };
    cells.get(first).lock.lock();
    cells.get(second).lock.lock();
    let a = slice_for(cells, particles, ci);
    let b = slice_for(cells, particles, cj);
    let res = f(a, b);
    cells.get(second).lock.unlock();
    cells.get(first).lock.unlock();
    res
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::test_support::CountingKernel;
    use std::sync::atomic::Ordering;

    #[test]
    fn runs_every_task_exactly_once() {
        let mut pool = CellPool::new(8);
        let mut cells_idx = Vec::new();
        for _ in 0..2 {
            cells_idx.push(pool.alloc(crate::datastr::cell::Cell::new([0.0; 3], [1.0; 3], 0, 1, 0, None)));
        }
        let mut graph = TaskGraph::default();
        let t1 = graph.add_task(TaskKind::SelfInteraction { cell: cells_idx[0], subtype: Subtype::Density });
        let t2 = graph.add_task(TaskKind::Ghost { cell: cells_idx[0] });
        graph.add_unlock(t1, t2);

        let mut store = ParticleStore::new(vec![Particle::new([0.0; 3], 0.1, 0)]);
        let kernel = CountingKernel::default();
        run(&graph, &pool, &mut store, &kernel, 2).unwrap();
        assert_eq!(kernel.self_density.load(Ordering::Relaxed), 1);
        assert_eq!(kernel.ghost.load(Ordering::Relaxed), 1);
        let _ = t2;
    }
}
