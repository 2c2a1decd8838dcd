//! Immutable, process-wide scheduler configuration. Constructed once and
//! threaded through [`crate::Space`].

/// Defaults match the reference implementation's split/sub-size thresholds.
pub const DEFAULT_SPLIT_SIZE: usize = 400;
pub const DEFAULT_SUB_SIZE: usize = 100;
pub const DEFAULT_SPLIT_RATIO: f64 = 0.5;
pub const DEFAULT_STRETCH: f64 = 1.0;
pub const DEFAULT_CELL_ALLOC_CHUNK: usize = 1_000;

/// Process-wide scheduler configuration. Cheap to clone; intended to be
/// constructed once per [`crate::Space`] and shared by reference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerConfig {
    /// Minimum particle count a cell must have to be eligible for splitting.
    pub split_size: usize,
    /// Particle-count threshold below which a pair/self task is inlined as
    /// a `sub` task instead of being recursed into further.
    pub sub_size: usize,
    /// Fraction of particles with `h <= cell_h/2` required to keep a cell
    /// split.
    pub split_ratio: f64,
    /// Safety factor applied to `h_max` when sizing the top-level grid and
    /// deciding whether a pair task needs further splitting.
    pub stretch: f64,
    /// Whether the domain wraps at its boundaries this step.
    pub periodic: bool,
    /// Cell-pool growth quantum.
    pub cell_alloc_chunk: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            split_size: DEFAULT_SPLIT_SIZE,
            sub_size: DEFAULT_SUB_SIZE,
            split_ratio: DEFAULT_SPLIT_RATIO,
            stretch: DEFAULT_STRETCH,
            periodic: false,
            cell_alloc_chunk: DEFAULT_CELL_ALLOC_CHUNK,
        }
    }
}

impl SchedulerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_split_size(mut self, v: usize) -> Self {
        self.split_size = v;
        self
    }

    pub fn with_sub_size(mut self, v: usize) -> Self {
        self.sub_size = v;
        self
    }

    pub fn with_split_ratio(mut self, v: f64) -> Self {
        self.split_ratio = v;
        self
    }

    pub fn with_stretch(mut self, v: f64) -> Self {
        self.stretch = v;
        self
    }

    pub fn with_periodic(mut self, v: bool) -> Self {
        self.periodic = v;
        self
    }

    pub fn with_cell_alloc_chunk(mut self, v: usize) -> Self {
        self.cell_alloc_chunk = v;
        self
    }
}
