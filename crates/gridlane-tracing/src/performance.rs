//! Timing guards for dispatch and allocation paths.
//!
//! A [`PerformanceSpan`] records its start time on creation and emits a
//! single debug event with the elapsed time when dropped. Spans shorter than
//! the configured threshold are silent.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

const NO_THRESHOLD: u64 = u64::MAX;

static DEFAULT_THRESHOLD_US: AtomicU64 = AtomicU64::new(NO_THRESHOLD);

/// Set the threshold applied by [`PerformanceSpan::with_default_threshold`]
/// and the `perf_span!` macro.
pub fn set_default_threshold(threshold_us: Option<u64>) {
    DEFAULT_THRESHOLD_US.store(threshold_us.unwrap_or(NO_THRESHOLD), Ordering::Relaxed);
}

/// Threshold currently applied to macro-created spans.
pub fn default_threshold() -> Option<u64> {
    match DEFAULT_THRESHOLD_US.load(Ordering::Relaxed) {
        NO_THRESHOLD => None,
        value => Some(value),
    }
}

/// RAII timing guard.
///
/// ```rust
/// use gridlane_tracing::performance::PerformanceSpan;
///
/// {
///     let _span = PerformanceSpan::new("copy_rows", Some(1000));
///     // ... work ...
/// } // logged only if the block took at least 1ms
/// ```
pub struct PerformanceSpan {
    threshold_us: Option<u64>,
    start_time: Instant,
    span: tracing::Span,
}

impl PerformanceSpan {
    /// Time a section named `name`, reporting only if it lasts at least
    /// `threshold_us` microseconds.
    pub fn new(name: &str, threshold_us: Option<u64>) -> Self {
        Self::within(tracing::debug_span!("perf", name = %name), threshold_us)
    }

    /// Same as [`Self::new`] with the process-wide default threshold.
    pub fn with_default_threshold(name: &str) -> Self {
        Self::new(name, default_threshold())
    }

    /// Time a section attached to an existing span (used by `perf_span!` to
    /// carry extra fields).
    pub fn within(span: tracing::Span, threshold_us: Option<u64>) -> Self {
        Self {
            threshold_us,
            start_time: Instant::now(),
            span,
        }
    }

    /// Microseconds since the guard was created.
    pub fn elapsed_us(&self) -> u64 {
        self.start_time.elapsed().as_micros() as u64
    }

    pub fn span(&self) -> &tracing::Span {
        &self.span
    }
}

impl Drop for PerformanceSpan {
    fn drop(&mut self) {
        let elapsed_us = self.elapsed_us();
        if self.threshold_us.map_or(true, |threshold| elapsed_us >= threshold) {
            let _entered = self.span.enter();
            tracing::debug!(
                duration_us = elapsed_us,
                duration_ms = elapsed_us as f64 / 1000.0,
                "performance_span_complete"
            );
        }
    }
}
