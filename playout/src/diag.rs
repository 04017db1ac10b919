//! Trivial metric sink used by channels, stages, and producers.
//!
//! The pipeline reports two things: named gauge values (tick and produce
//! times as a fraction of the frame budget, buffer fill) and named tags
//! (one-shot events such as `underflow` or `late-frame`). Hosts decide what
//! to do with them; the library never owns a global sink.

use std::sync::Arc;

/// Capability for receiving pipeline metrics.
pub trait MetricSink: Send + Sync {
    /// Record a gauge value under `name`.
    fn set_value(&self, name: &str, value: f64);

    /// Record a one-shot event under `name`.
    fn tag(&self, name: &str);
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullMetricSink;

impl MetricSink for NullMetricSink {
    fn set_value(&self, _name: &str, _value: f64) {}

    fn tag(&self, _name: &str) {}
}

/// Sink that forwards metrics to `tracing` at trace/debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TraceMetricSink;

impl MetricSink for TraceMetricSink {
    fn set_value(&self, name: &str, value: f64) {
        tracing::trace!(metric = name, value, "gauge");
    }

    fn tag(&self, name: &str) {
        tracing::debug!(metric = name, "tag");
    }
}

/// Shorthand for the default do-nothing sink.
pub fn null_sink() -> Arc<dyn MetricSink> {
    Arc::new(NullMetricSink)
}
