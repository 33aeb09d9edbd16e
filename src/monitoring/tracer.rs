/*!
 * Tracing
 * Structured logging bootstrap and timed operation spans
 *
 * Features:
 * - Trace ID per operation for correlating interleaved thread output
 * - JSON or compact human-readable output
 * - Slow operations reported at warn level
 */

use crate::core::limits::{ENV_TRACE_JSON, SLOW_OPERATION_THRESHOLD};
use std::time::Instant;
use tracing::{debug, info, span, warn, Level};
use tracing_subscriber::{
    fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};
use uuid::Uuid;

/// Install the global tracing subscriber
///
/// Environment variables:
/// - RUST_LOG: log filter (default: info)
/// - SYNCHRO_TRACE_JSON: `1` or `true` for JSON output
///
/// Returns `false` if a subscriber was already installed.
pub fn init_tracing() -> bool {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let use_json = std::env::var(ENV_TRACE_JSON)
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = if use_json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_thread_names(true)
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()
            .is_ok()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_thread_names(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .compact(),
            )
            .try_init()
            .is_ok()
    };

    if installed {
        info!(json = use_json, "tracing initialized");
    }
    installed
}

/// Generate a unique trace ID
pub fn generate_trace_id() -> String {
    Uuid::new_v4().to_string()
}

/// Span timing one coordinator-level operation
pub struct OperationSpan {
    _span: tracing::Span,
    start: Instant,
    operation: String,
    trace_id: String,
}

impl OperationSpan {
    pub fn new(operation: &str) -> Self {
        let trace_id = generate_trace_id();

        let span = span!(
            Level::DEBUG,
            "operation",
            trace_id = %trace_id,
            operation = operation,
            duration_us = tracing::field::Empty,
            duration_ms = tracing::field::Empty,
            result = tracing::field::Empty,
            items_processed = tracing::field::Empty,
            error = tracing::field::Empty,
        );

        let _entered = span.enter();
        debug!(operation = operation, trace_id = %trace_id, "operation started");
        drop(_entered);

        Self {
            _span: span,
            start: Instant::now(),
            operation: operation.to_string(),
            trace_id,
        }
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn record_result(&self, success: bool) {
        self._span.record("result", if success { "success" } else { "error" });
    }

    pub fn record_error(&self, error: &str) {
        self._span.record("error", error);
        self._span.record("result", "error");
    }

    /// Record how many items the operation handled
    pub fn record_items_processed(&self, count: usize) {
        self._span.record("items_processed", count);
    }

    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self._span.enter()
    }
}

impl Drop for OperationSpan {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        let _entered = self._span.enter();

        if duration > SLOW_OPERATION_THRESHOLD {
            self._span.record("duration_ms", duration.as_millis());
            warn!(
                trace_id = %self.trace_id,
                operation = %self.operation,
                duration_ms = duration.as_millis(),
                slow = true,
                "slow operation detected"
            );
        } else {
            self._span.record("duration_us", duration.as_micros());
            debug!(
                trace_id = %self.trace_id,
                operation = %self.operation,
                duration_us = duration.as_micros(),
                "operation completed"
            );
        }
    }
}

/// Helper to create an operation span
#[inline]
pub fn span_operation(name: &str) -> OperationSpan {
    OperationSpan::new(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init_test_tracing() {
        let _ = tracing_subscriber::registry()
            .with(EnvFilter::new("debug"))
            .with(tracing_subscriber::fmt::layer().compact())
            .try_init();
    }

    #[test]
    fn test_operation_span() {
        init_test_tracing();

        let span = span_operation("test_op");
        span.record_items_processed(3);
        span.record_result(true);
        std::thread::sleep(std::time::Duration::from_micros(100));
    }

    #[test]
    fn test_trace_ids_unique() {
        let a = span_operation("a");
        let b = span_operation("b");
        assert_ne!(a.trace_id(), b.trace_id());
        assert_eq!(a.trace_id().len(), 36);
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init_test_tracing();
        assert!(!init_tracing());
    }
}
