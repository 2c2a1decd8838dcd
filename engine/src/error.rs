//! Error kinds for the scheduler. `ResourceExhausted` and `InvariantViolated`
//! name conditions that the scheduler has no recovery path for and panic
//! through [`fatal!`]; `KernelError` is surfaced from physics callbacks and
//! propagated as a normal `Result` instead, since the caller who supplied the
//! kernel is in a position to decide what a failed interaction means.

use std::fmt;

/// Fatal or kernel-surfaced failure of the scheduler.
#[derive(Debug)]
pub enum SchedulerError {
    /// Allocation or pool-growth failure. Always fatal.
    ResourceExhausted { what: &'static str },
    /// A structural invariant (domain bound, sort order, progeny count,
    /// task buffer capacity, ...) did not hold.
    InvariantViolated {
        file: &'static str,
        function: &'static str,
        line: u32,
        msg: String,
    },
    /// An interaction kernel reported an error. Rethrown after the scheduler
    /// has drained all in-flight tasks for the current step.
    Kernel(KernelError),
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerError::ResourceExhausted { what } => write!(f, "resource exhausted: {}", what),
            SchedulerError::InvariantViolated { file, function, line, msg } => {
                write!(f, "{}:{} ({}): invariant violated: {}", file, line, function, msg)
            }
            SchedulerError::Kernel(e) => write!(f, "kernel error: {}", e),
        }
    }
}

impl std::error::Error for SchedulerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SchedulerError::Kernel(e) => Some(e),
            _ => None,
        }
    }
}

impl From<KernelError> for SchedulerError {
    fn from(e: KernelError) -> Self {
        SchedulerError::Kernel(e)
    }
}

/// Opaque error returned by a physics kernel callback.
#[derive(Debug)]
pub struct KernelError(pub String);

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for KernelError {}

/// Expands to the fully qualified name of the function it's written in.
///
/// `std` has no equivalent of C's `__FUNCTION__`; this is the usual
/// `std::any::type_name` trick, stripping the trailing `::f` left by naming
/// the probe function after the surrounding scope.
#[macro_export]
macro_rules! function_name {
    () => {{
        fn f() {}
        fn type_name_of<T>(_: T) -> &'static str {
            std::any::type_name::<T>()
        }
        let name = type_name_of(f);
        &name[..name.len() - 3]
    }};
}

/// Panics with a diagnostic naming the file, function, and line of the
/// failing invariant.
///
/// There is no recoverable path from these conditions at this layer: they
/// indicate either a programming error (an invariant the tree/task-graph
/// construction itself is supposed to uphold) or an environment failure
/// (allocation).
#[macro_export]
macro_rules! fatal {
    ($($arg:tt)*) => {{
        panic!("{}:{} ({}): {}", file!(), line!(), $crate::function_name!(), format!($($arg)*));
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_invariant_violated() {
        let e = SchedulerError::InvariantViolated {
            file: "tree/builder.rs",
            function: "rebuild",
            line: 42,
            msg: "particle outside domain".into(),
        };
        let s = format!("{}", e);
        assert!(s.contains("tree/builder.rs"));
        assert!(s.contains("particle outside domain"));
    }

    #[test]
    #[should_panic(expected = "invariant")]
    fn fatal_panics() {
        fatal!("invariant {} broken", 7);
    }
}
