//! Synthetic-particle demo driver: generates a uniform cube of particles,
//! runs one step against a no-op kernel, and reports timing and task-graph
//! size.

use rand::Rng;
use swift_sched::datastr::particle::Particle;
use swift_sched::error::KernelError;
use swift_sched::{Kernel, SchedulerConfig, Space};

struct NoopKernel;

impl Kernel for NoopKernel {
    fn self_density(&self, _: &mut [Particle]) -> Result<(), KernelError> {
        Ok(())
    }
    fn pair_density(&self, _: &mut [Particle], _: &mut [Particle], _: u8) -> Result<(), KernelError> {
        Ok(())
    }
    fn sub_density(&self, _: &mut [Particle], _: Option<&mut [Particle]>, _: Option<u8>) -> Result<(), KernelError> {
        Ok(())
    }
    fn self_force(&self, _: &mut [Particle]) -> Result<(), KernelError> {
        Ok(())
    }
    fn pair_force(&self, _: &mut [Particle], _: &mut [Particle], _: u8) -> Result<(), KernelError> {
        Ok(())
    }
    fn sub_force(&self, _: &mut [Particle], _: Option<&mut [Particle]>, _: Option<u8>) -> Result<(), KernelError> {
        Ok(())
    }
    fn ghost(&self, _: &mut [Particle]) -> Result<(), KernelError> {
        Ok(())
    }
}

fn main() {
    let n: usize = std::env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(50_000);
    let dim = 100.0;

    let mut rng = rand::thread_rng();
    let particles: Vec<Particle> = (0..n)
        .map(|i| {
            let pos = [rng.gen_range(0.0..dim), rng.gen_range(0.0..dim), rng.gen_range(0.0..dim)];
            Particle::new(pos, rng.gen_range(0.5..1.5), i as u32)
        })
        .collect();

    let cfg = SchedulerConfig::new().with_periodic(true);
    let mut space = Space::new(particles, [0.0; 3], [dim; 3], cfg);

    let kernel = NoopKernel;
    if let Err(e) = space.step(&kernel) {
        eprintln!("step failed: {}", e);
        std::process::exit(1);
    }

    swift_sched::report!("particles", n);
}
