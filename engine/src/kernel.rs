//! The interaction kernel boundary.
//!
//! This crate owns the spatial decomposition and the schedule; it knows
//! nothing about density, pressure, or force. Those live behind the
//! [`Kernel`] trait, implemented by whatever physics the caller is running
//! and invoked once per task the scheduler executes.

use crate::datastr::particle::Particle;
use crate::error::KernelError;

/// Per-step physics callbacks. Implementations must be safe to call
/// concurrently from multiple worker threads on disjoint cells; the
/// scheduler only serializes calls that touch the same cell (see
/// [`crate::datastr::cell::Spinlock`]).
pub trait Kernel: Send + Sync {
    /// All-pairs density accumulation within one cell's particles.
    fn self_density(&self, particles: &mut [Particle]) -> Result<(), KernelError>;
    /// Density accumulation between two distinct cells' particles. `sid` is
    /// the direction class of `b` relative to `a`, which the kernel needs to
    /// resolve the minimum-image offset for a periodic-wrapped pair.
    fn pair_density(&self, a: &mut [Particle], b: &mut [Particle], sid: u8) -> Result<(), KernelError>;
    /// Density accumulation for a task too small to be worth splitting
    /// further; `b`/`sid` are `None` for a self-sub.
    fn sub_density(&self, a: &mut [Particle], b: Option<&mut [Particle]>, sid: Option<u8>) -> Result<(), KernelError>;

    /// All-pairs force accumulation within one cell's particles.
    fn self_force(&self, particles: &mut [Particle]) -> Result<(), KernelError>;
    /// Force accumulation between two distinct cells' particles; see
    /// [`Kernel::pair_density`] for `sid`.
    fn pair_force(&self, a: &mut [Particle], b: &mut [Particle], sid: u8) -> Result<(), KernelError>;
    /// Force accumulation for a task too small to be worth splitting
    /// further; `b`/`sid` are `None` for a self-sub.
    fn sub_force(&self, a: &mut [Particle], b: Option<&mut [Particle]>, sid: Option<u8>) -> Result<(), KernelError>;

    /// Runs once per cell between the density and force phases, e.g. to
    /// finish an equation of state evaluation from accumulated density.
    fn ghost(&self, particles: &mut [Particle]) -> Result<(), KernelError>;
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// A no-op kernel that counts how many times each callback ran, for
    /// asserting the scheduler actually drives every phase.
    #[derive(Default)]
    pub struct CountingKernel {
        pub self_density: AtomicUsize,
        pub pair_density: AtomicUsize,
        pub sub_density: AtomicUsize,
        pub self_force: AtomicUsize,
        pub pair_force: AtomicUsize,
        pub sub_force: AtomicUsize,
        pub ghost: AtomicUsize,
    }

    impl Kernel for CountingKernel {
        fn self_density(&self, _: &mut [Particle]) -> Result<(), KernelError> {
            self.self_density.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
        fn pair_density(&self, _: &mut [Particle], _: &mut [Particle], _: u8) -> Result<(), KernelError> {
            self.pair_density.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
        fn sub_density(&self, _: &mut [Particle], _: Option<&mut [Particle]>, _: Option<u8>) -> Result<(), KernelError> {
            self.sub_density.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
        fn self_force(&self, _: &mut [Particle]) -> Result<(), KernelError> {
            self.self_force.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
        fn pair_force(&self, _: &mut [Particle], _: &mut [Particle], _: u8) -> Result<(), KernelError> {
            self.pair_force.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
        fn sub_force(&self, _: &mut [Particle], _: Option<&mut [Particle]>, _: Option<u8>) -> Result<(), KernelError> {
            self.sub_force.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
        fn ghost(&self, _: &mut [Particle]) -> Result<(), KernelError> {
            self.ghost.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
    }
}
