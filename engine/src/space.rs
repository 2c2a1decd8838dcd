//! Top-level entry point: owns the particle store and cell pool across
//! steps and drives one rebuild-schedule-run cycle per [`Space::step`].

use crate::config::SchedulerConfig;
use crate::datastr::cell_pool::CellPool;
use crate::datastr::particle::{Particle, ParticleStore};
use crate::error::SchedulerError;
use crate::kernel::Kernel;
use crate::report::Timer;
use crate::scheduler;
use crate::task::graph_builder;
use crate::tree;

pub struct Space {
    store: ParticleStore,
    pool: CellPool,
    top: tree::TopGrid,
    cfg: SchedulerConfig,
    origin: [f64; 3],
    dim: [f64; 3],
    num_threads: usize,
}

impl Space {
    pub fn new(particles: Vec<Particle>, origin: [f64; 3], dim: [f64; 3], cfg: SchedulerConfig) -> Self {
        for p in &particles {
            for k in 0..3 {
                if p.pos[k] < origin[k] || p.pos[k] > origin[k] + dim[k] {
                    fatal!("particle at {:?} outside domain [{:?}, {:?}]", p.pos, origin, dim);
                }
            }
        }
        Space {
            store: ParticleStore::new(particles),
            pool: CellPool::new(cfg.cell_alloc_chunk),
            top: tree::TopGrid::default(),
            cfg,
            origin,
            dim,
            num_threads: std::cmp::max(1, core_affinity::get_core_ids().map(|ids| ids.len()).unwrap_or(1)),
        }
    }

    pub fn with_num_threads(mut self, n: usize) -> Self {
        self.num_threads = n.max(1);
        self
    }

    pub fn particles(&self) -> &[Particle] {
        self.store.full()
    }

    /// Rebuilds the tree (keeping the existing top grid unless it's now too
    /// coarse), compiles the task graph, and runs it to completion against
    /// `kernel`. Equivalent to `step_with(kernel, false, 0.0)`.
    pub fn step(&mut self, kernel: &dyn Kernel) -> Result<(), SchedulerError> {
        self.step_with(kernel, false, 0.0)
    }

    /// As [`Space::step`], but `force` discards the existing top grid
    /// unconditionally and `cell_max` floors the top-level cell width
    /// independent of the particles' smoothing lengths.
    pub fn step_with(&mut self, kernel: &dyn Kernel, force: bool, cell_max: f64) -> Result<(), SchedulerError> {
        let rebuild_timer = Timer::new();
        let (changed, stats) =
            tree::rebuild(&mut self.store, &mut self.pool, &mut self.top, &self.cfg, self.origin, self.dim, force, cell_max);
        rebuild_timer.report_passed_ms("rebuild_ms");

        if cfg!(feature = "detailed-stats") {
            report!("tree_changed", changed);
            report!("max_depth", stats.max_depth);
            report!("tot_cells", stats.tot_cells);
        }

        let graph_timer = Timer::new();
        let graph = graph_builder::build(&mut self.pool, &self.top.top_cells, self.top.cdim, &self.cfg);
        graph_timer.report_passed_ms("task_graph_build_ms");

        if cfg!(feature = "detailed-stats") {
            report!("nr_tasks", graph.len());
            report!("task_kind_counts", graph.kind_counts());
        }

        let expected_max = 43 * stats.tot_cells.max(1);
        if graph.len() > expected_max {
            fatal!("task graph grew to {} tasks, expected at most {}", graph.len(), expected_max);
        }

        let run_timer = Timer::new();
        let result = scheduler::run(&graph, &self.pool, &mut self.store, kernel, self.num_threads);
        run_timer.report_passed_ms("scheduler_run_ms");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::test_support::CountingKernel;

    fn uniform_particles(n: usize, dim: f64, h: f64) -> Vec<Particle> {
        let side = (n as f64).cbrt().ceil() as usize;
        let spacing = dim / side as f64;
        (0..n)
            .map(|i| {
                let x = (i % side) as f64 * spacing + spacing / 2.0;
                let y = ((i / side) % side) as f64 * spacing + spacing / 2.0;
                let z = (i / (side * side)) as f64 * spacing + spacing / 2.0;
                Particle::new([x, y, z], h, i as u32)
            })
            .collect()
    }

    #[test]
    fn step_runs_density_then_ghost_then_force() {
        let particles = uniform_particles(1000, 10.0, 0.3);
        let cfg = SchedulerConfig::new().with_split_size(100);
        let mut space = Space::new(particles, [0.0; 3], [10.0; 3], cfg).with_num_threads(2);
        let kernel = CountingKernel::default();
        space.step(&kernel).unwrap();

        use std::sync::atomic::Ordering;
        let density_calls = kernel.self_density.load(Ordering::Relaxed)
            + kernel.pair_density.load(Ordering::Relaxed)
            + kernel.sub_density.load(Ordering::Relaxed);
        let force_calls = kernel.self_force.load(Ordering::Relaxed)
            + kernel.pair_force.load(Ordering::Relaxed)
            + kernel.sub_force.load(Ordering::Relaxed);
        assert!(density_calls > 0);
        assert!(force_calls > 0);
        assert!(kernel.ghost.load(Ordering::Relaxed) > 0);
    }

    #[test]
    #[should_panic(expected = "outside domain")]
    fn rejects_particles_outside_domain() {
        let particles = vec![Particle::new([11.0, 0.0, 0.0], 0.1, 0)];
        Space::new(particles, [0.0; 3], [10.0; 3], SchedulerConfig::new());
    }
}
