//! # Pipeline Metrics
//!
//! Lightweight counters describing one pipeline run. Counters are
//! `AtomicU64` with `Ordering::Relaxed`; readers only need eventual values,
//! never cross-field ordering.

use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of the pipeline counters at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Pushed messages decoded from the subscription.
    pub messages_received: u64,
    /// Events handed to the sink, whether or not it succeeded.
    pub events_delivered: u64,
    /// Pushes dropped for having fewer than four elements.
    pub malformed_messages: u64,
    /// Value lookups that failed; their events went out without a value.
    pub lookup_failures: u64,
    /// Sink calls that returned an error or panicked.
    pub sink_failures: u64,
}

#[derive(Debug, Default)]
pub(crate) struct PipelineMetrics {
    messages_received: AtomicU64,
    events_delivered: AtomicU64,
    malformed_messages: AtomicU64,
    lookup_failures: AtomicU64,
    sink_failures: AtomicU64,
}

impl PipelineMetrics {
    pub(crate) fn record_message(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delivery(&self) {
        self.events_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_malformed(&self) {
        self.malformed_messages.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_lookup_failure(&self) {
        self.lookup_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_sink_failure(&self) {
        self.sink_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> PipelineStats {
        PipelineStats {
            messages_received: self.messages_received.load(Ordering::Relaxed),
            events_delivered: self.events_delivered.load(Ordering::Relaxed),
            malformed_messages: self.malformed_messages.load(Ordering::Relaxed),
            lookup_failures: self.lookup_failures.load(Ordering::Relaxed),
            sink_failures: self.sink_failures.load(Ordering::Relaxed),
        }
    }
}
