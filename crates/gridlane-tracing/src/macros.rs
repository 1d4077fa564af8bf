//! Convenience macros over [`crate::performance`].

/// Create a [`crate::performance::PerformanceSpan`] using the process-wide
/// threshold, optionally recording extra fields on the span.
///
/// ```rust
/// use gridlane_tracing::perf_span;
///
/// {
///     let _span = perf_span!("dispatch", lanes = 1024, buffers = 2);
///     // ... work ...
/// }
/// ```
#[macro_export]
macro_rules! perf_span {
    ($name:expr) => {{
        $crate::performance::PerformanceSpan::with_default_threshold($name)
    }};
    ($name:expr, $($field:tt = $value:expr),+ $(,)?) => {{
        $crate::performance::PerformanceSpan::within(
            $crate::__tracing::debug_span!("perf", name = $name, $($field = $value),+),
            $crate::performance::default_threshold(),
        )
    }};
}

#[cfg(test)]
mod tests {
    #[test]
    fn perf_span_accepts_fields() {
        let span = perf_span!("fields", size = 1024, count = 3);
        assert!(span.elapsed_us() < 60_000_000);
    }

    #[test]
    fn perf_span_without_fields() {
        let _span = perf_span!("bare");
    }
}
