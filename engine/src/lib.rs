//! Parallel task scheduler over a hierarchical spatial decomposition.
//!
//! Given a set of particles with positions and per-particle interaction
//! radii in a (optionally periodic) rectangular domain, this crate builds an
//! adaptive octree over them, compiles a dependency graph of sort/self/
//! pair/sub/ghost tasks, and runs that graph on a pool of worker threads so
//! that every particle pair closer than the sum of their radii is visited
//! exactly once per step.
//!
//! Physics kernels (density, force, ...) are external collaborators reached
//! through the [`kernel::Kernel`] trait; this crate only owns the spatial
//! indexing, the task graph, and its parallel execution.

#[macro_use]
pub mod report;
#[macro_use]
pub mod error;

pub mod config;
pub mod datastr;
pub mod kernel;
pub mod scheduler;
pub mod space;
pub mod task;
pub mod tree;

pub use config::SchedulerConfig;
pub use error::{KernelError, SchedulerError};
pub use kernel::Kernel;
pub use space::Space;
