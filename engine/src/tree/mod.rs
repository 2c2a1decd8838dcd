//! Builds the top-level grid and the octree rooted in each of its cells
//! from a freshly bucketed particle array.

pub mod builder;

pub use builder::{rebuild, TopGrid, TreeStats};
