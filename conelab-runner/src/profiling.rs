//! Timing scopes for the inference and cone hot paths.
//!
//! Scopes always count, but only report when profiling is enabled. Reports go
//! through `tracing` under the `conelab::profile` target, so they follow the
//! subscriber's filter like every other event.
//!
//! ```
//! use conelab_runner::profiling::ProfileScope;
//!
//! fn expensive_operation() {
//!     let _scope = ProfileScope::new("expensive_operation");
//! }
//! ```
//!
//! Set `CONELAB_PROFILE=1` and call [`init`] to enable reporting.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

static PROFILING_ENABLED: AtomicBool = AtomicBool::new(false);

static TOTAL_OPERATIONS: AtomicU64 = AtomicU64::new(0);

/// Read `CONELAB_PROFILE` and enable reporting if it is `1` or `true`.
pub fn init() {
    let enabled = std::env::var("CONELAB_PROFILE")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    set_enabled(enabled);
    if enabled {
        tracing::info!(target: "conelab::profile", "profiling enabled");
    }
}

pub fn set_enabled(enabled: bool) {
    PROFILING_ENABLED.store(enabled, Ordering::Relaxed);
}

#[inline]
pub fn is_enabled() -> bool {
    PROFILING_ENABLED.load(Ordering::Relaxed)
}

fn report(name: &str, elapsed: Duration) {
    if is_enabled() {
        tracing::info!(
            target: "conelab::profile",
            scope = name,
            elapsed_ms = elapsed.as_secs_f64() * 1000.0,
            "scope finished"
        );
    }
}

/// Measures the time between creation and drop.
pub struct ProfileScope {
    name: &'static str,
    start: Instant,
}

impl ProfileScope {
    #[inline]
    pub fn new(name: &'static str) -> Self {
        TOTAL_OPERATIONS.fetch_add(1, Ordering::Relaxed);
        Self {
            name,
            start: Instant::now(),
        }
    }

    #[inline]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for ProfileScope {
    fn drop(&mut self) {
        report(self.name, self.start.elapsed());
    }
}

/// Run `f`, returning its result and duration.
pub fn profile<F, R>(name: &'static str, f: F) -> (R, Duration)
where
    F: FnOnce() -> R,
{
    TOTAL_OPERATIONS.fetch_add(1, Ordering::Relaxed);
    let start = Instant::now();
    let result = f();
    let duration = start.elapsed();
    report(name, duration);
    (result, duration)
}

/// Scopes and closures profiled since the last [`reset`].
pub fn total_operations() -> u64 {
    TOTAL_OPERATIONS.load(Ordering::Relaxed)
}

pub fn reset() {
    TOTAL_OPERATIONS.store(0, Ordering::Relaxed);
}
