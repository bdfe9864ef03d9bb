//! Spans for alerting operations.

use tracing::{info_span, Span};

/// Span for one scheduler-driven execution of an alert.
pub fn alert_run_span(alert_id: &str, alert_type_id: &str, space_id: &str) -> Span {
    info_span!(
        target: "plugins::alerting",
        "alert_run",
        alert_id = %alert_id,
        alert_type_id = %alert_type_id,
        space_id = %space_id,
        error = tracing::field::Empty,
    )
}

/// Span for an alerts-client operation issued on behalf of a request.
pub fn client_span(operation: &'static str, space_id: &str) -> Span {
    info_span!(
        target: "plugins::alerting",
        "alerts_client",
        op = operation,
        space_id = %space_id,
    )
}

/// Record an error on the current span.
///
/// Only spans that declare an `error` field (such as [`alert_run_span`])
/// keep the value.
pub fn record_error(error: &dyn std::error::Error) {
    Span::current().record("error", tracing::field::display(error));
}

/// Timing utility for operations.
pub struct Timer {
    start: std::time::Instant,
    operation: &'static str,
}

impl Timer {
    /// Start a new timer.
    pub fn start(operation: &'static str) -> Self {
        Self {
            start: std::time::Instant::now(),
            operation,
        }
    }

    /// Complete the timer and record duration.
    pub fn finish(self) {
        let duration = self.start.elapsed();
        tracing::debug!(
            target: "plugins::alerting",
            operation = %self.operation,
            duration_ms = %duration.as_millis(),
            "operation completed"
        );
    }
}
