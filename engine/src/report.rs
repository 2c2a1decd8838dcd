//! Structured per-run diagnostics.
//!
//! `report!("key", value)` emits one JSON object line `{"key": value}` to
//! stderr when the `report-to-stderr` feature is enabled; it is a silent
//! no-op otherwise unless `report-allow-override` additionally forces it on
//! at runtime via [`set_report_enabled`].

use std::sync::atomic::{AtomicBool, Ordering};

static FORCE_ENABLED: AtomicBool = AtomicBool::new(false);

/// Force report output on at runtime, even without the `report-to-stderr`
/// feature. Only has an effect when built with `report-allow-override`.
pub fn set_report_enabled(enabled: bool) {
    FORCE_ENABLED.store(enabled, Ordering::Relaxed);
}

#[doc(hidden)]
pub fn enabled() -> bool {
    if cfg!(feature = "report-to-stderr") {
        return true;
    }
    if cfg!(feature = "report-allow-override") {
        return FORCE_ENABLED.load(Ordering::Relaxed);
    }
    false
}

/// Emit a single structured key/value diagnostic line.
#[macro_export]
macro_rules! report {
    ($key:expr, $value:expr) => {
        if $crate::report::enabled() {
            match serde_json::to_string(&$value) {
                Ok(v) => eprintln!("{{\"{}\": {}}}", $key, v),
                Err(_) => eprintln!("{{\"{}\": \"<unserializable>\"}}", $key),
            }
        }
    };
}

/// Wall-clock timer for reporting the duration of a phase of a step.
#[derive(Debug)]
pub struct Timer {
    start: chrono::DateTime<chrono::Utc>,
}

impl Timer {
    pub fn new() -> Timer {
        Timer { start: chrono::Utc::now() }
    }

    pub fn restart(&mut self) {
        self.start = chrono::Utc::now();
    }

    pub fn passed_ms(&self) -> i64 {
        (chrono::Utc::now() - self.start).num_milliseconds()
    }

    pub fn report_passed_ms(&self, label: &str) {
        report!(label, self.passed_ms());
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

/// Run `f`, reporting its wall-clock duration under `name`.
pub fn measure<Out, F: FnOnce() -> Out>(name: &str, f: F) -> Out {
    let timer = Timer::new();
    let res = f();
    report!(name, timer.passed_ms());
    res
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timer_reports_nonnegative() {
        let timer = Timer::new();
        std::thread::sleep(std::time::Duration::from_millis(1));
        assert!(timer.passed_ms() >= 0);
    }

    #[test]
    fn measure_returns_value() {
        let v = measure("test_op", || 41 + 1);
        assert_eq!(v, 42);
    }
}
