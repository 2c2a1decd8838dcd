//! Core data structures: particles, arena-allocated cells, direction
//! tables, and per-direction sort orderings.

pub mod cell;
pub mod cell_pool;
pub mod direction;
pub mod particle;
pub mod sort;

pub use cell::{Cell, Spinlock};
pub use cell_pool::CellPool;
pub use particle::{CondensedParticle, Particle, ParticleStore};
