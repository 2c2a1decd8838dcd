//! The task graph: nodes are sort/self/pair/sub/ghost tasks over cells,
//! edges are "must run before" unlock relations tracked as an in-degree
//! (`wait`) counter per task.
//!
//! A task becomes ready when its `wait` counter reaches zero. Completing a
//! task decrements the counter of everything it unlocks; whichever
//! decrement drives a counter to zero is the one responsible for pushing
//! that task onto the scheduler's ready queue, so no task is ever enqueued
//! twice.

pub mod graph_builder;

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subtype {
    Density,
    Force,
}

/// What a task does and which cell(s) it does it to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskKind {
    /// Sorts `cell`'s particles along every direction set in `handles`
    /// (bit `h` set means handle `h` is requested).
    Sort { cell: u32, handles: u16 },
    /// All-pairs interaction within a single cell.
    SelfInteraction { cell: u32, subtype: Subtype },
    /// Cross interaction between two distinct cells along direction `sid`.
    Pair { ci: u32, cj: u32, sid: u8, subtype: Subtype },
    /// A pair (or self) task small enough to run directly instead of being
    /// split further; `cj`/`sid` are `None` for a self-sub.
    Sub {
        ci: u32,
        cj: Option<u32>,
        sid: Option<u8>,
        subtype: Subtype,
    },
    /// Barrier separating the density phase from the force phase for this
    /// cell. Unlocked directly by the density tasks attached to this cell's
    /// nearest task-bearing ancestor (its "super cell"); chains from its
    /// parent's ghost otherwise.
    Ghost { cell: u32 },
    /// A pruned task with nothing left depending on it: a zero-cost relay
    /// that still decrements whatever it unlocks.
    None,
}

#[derive(Debug)]
pub struct Task {
    pub kind: TaskKind,
    unlocks: Vec<u32>,
    wait: AtomicU32,
    taken: AtomicBool,
}

impl Task {
    fn new(kind: TaskKind) -> Self {
        Task {
            kind,
            unlocks: Vec::new(),
            wait: AtomicU32::new(0),
            taken: AtomicBool::new(false),
        }
    }

    pub fn wait_count(&self) -> u32 {
        self.wait.load(Ordering::Acquire)
    }

    pub fn is_ready(&self) -> bool {
        self.wait_count() == 0
    }

    /// Atomically claims this task for execution by the calling worker.
    /// Returns `false` if another worker already claimed it.
    pub fn try_take(&self) -> bool {
        self.taken
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Owns every task created for a step, plus the unlock edges between them.
#[derive(Debug, Default)]
pub struct TaskGraph {
    tasks: Vec<Task>,
}

impl TaskGraph {
    /// Tasks in a fully split tree number at most a small constant times
    /// the cell count; pre-reserving avoids reallocation during the (single
    /// threaded) build phase.
    pub fn with_capacity_for_cells(tot_cells: usize) -> Self {
        TaskGraph {
            tasks: Vec::with_capacity(43 * tot_cells),
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn add_task(&mut self, kind: TaskKind) -> u32 {
        self.tasks.push(Task::new(kind));
        (self.tasks.len() - 1) as u32
    }

    pub fn get(&self, id: u32) -> &Task {
        &self.tasks[id as usize]
    }

    /// Records that `downstream` must wait for `upstream` to finish.
    pub fn add_unlock(&mut self, upstream: u32, downstream: u32) {
        self.tasks[upstream as usize].unlocks.push(downstream);
        self.tasks[downstream as usize]
            .wait
            .fetch_add(1, Ordering::AcqRel);
    }

    /// Demotes a task to [`TaskKind::None`], used by the pruning pass to
    /// turn a sort task nothing depends on into a zero-cost relay.
    pub fn demote_to_none(&mut self, id: u32) {
        self.tasks[id as usize].kind = TaskKind::None;
    }

    /// Undoes a previously recorded `add_unlock`, used when a task is
    /// rewritten in place during splitting.
    pub fn rm_unlock(&mut self, upstream: u32, downstream: u32) {
        let unlocks = &mut self.tasks[upstream as usize].unlocks;
        if let Some(pos) = unlocks.iter().position(|&d| d == downstream) {
            unlocks.remove(pos);
            self.tasks[downstream as usize]
                .wait
                .fetch_sub(1, Ordering::AcqRel);
        }
    }

    pub fn unlocks_of(&self, id: u32) -> &[u32] {
        &self.tasks[id as usize].unlocks
    }

    /// Decrements the wait count of every task `id` unlocks, returning the
    /// ids that became ready (reached zero) as a result of this call.
    pub fn complete(&self, id: u32) -> Vec<u32> {
        let mut newly_ready = Vec::new();
        for &down in &self.tasks[id as usize].unlocks {
            let prev = self.tasks[down as usize].wait.fetch_sub(1, Ordering::AcqRel);
            if prev == 1 {
                newly_ready.push(down);
            }
        }
        newly_ready
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &Task)> {
        self.tasks.iter().enumerate().map(|(i, t)| (i as u32, t))
    }

    pub fn ready_ids(&self) -> Vec<u32> {
        self.tasks
            .iter()
            .enumerate()
            .filter(|(_, t)| t.is_ready())
            .map(|(i, _)| i as u32)
            .collect()
    }

    /// Per-kind task counts, for the post-build diagnostic report.
    pub fn kind_counts(&self) -> TaskKindCounts {
        let mut counts = TaskKindCounts::default();
        for t in &self.tasks {
            match t.kind {
                TaskKind::Sort { .. } => counts.sort += 1,
                TaskKind::SelfInteraction { .. } => counts.self_interaction += 1,
                TaskKind::Pair { .. } => counts.pair += 1,
                TaskKind::Sub { .. } => counts.sub += 1,
                TaskKind::Ghost { .. } => counts.ghost += 1,
                TaskKind::None => counts.none += 1,
            }
        }
        counts
    }
}

/// Per-kind task counts produced by [`TaskGraph::kind_counts`], mirroring the
/// original's post-`space_maketasks` task-count diagnostic.
#[derive(Debug, Default, Clone, Copy, serde::Serialize)]
pub struct TaskKindCounts {
    pub sort: usize,
    pub self_interaction: usize,
    pub pair: usize,
    pub sub: usize,
    pub ghost: usize,
    pub none: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlock_tracks_in_degree() {
        let mut g = TaskGraph::default();
        let a = g.add_task(TaskKind::Ghost { cell: 0 });
        let b = g.add_task(TaskKind::Ghost { cell: 1 });
        assert!(g.get(b).is_ready());
        g.add_unlock(a, b);
        assert!(!g.get(b).is_ready());
        let ready = g.complete(a);
        assert_eq!(ready, vec![b]);
        assert!(g.get(b).is_ready());
    }

    #[test]
    fn rm_unlock_undoes_add_unlock() {
        let mut g = TaskGraph::default();
        let a = g.add_task(TaskKind::Ghost { cell: 0 });
        let b = g.add_task(TaskKind::Ghost { cell: 1 });
        g.add_unlock(a, b);
        g.rm_unlock(a, b);
        assert!(g.get(b).is_ready());
        assert!(g.unlocks_of(a).is_empty());
    }

    #[test]
    fn try_take_is_exclusive() {
        let mut g = TaskGraph::default();
        let a = g.add_task(TaskKind::Ghost { cell: 0 });
        assert!(g.get(a).try_take());
        assert!(!g.get(a).try_take());
    }
}
