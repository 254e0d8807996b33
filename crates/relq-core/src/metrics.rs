//! Prometheus instruments for the broker.
//!
//! One `QueueMetrics` is built at process start and shared via `Arc`; every
//! component records through it and the HTTP edge exposes `encode_text()`
//! at `/metrics`.

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("failed to register metric: {0}")]
    Registration(#[from] prometheus::Error),

    #[error("failed to encode metrics: {0}")]
    Encoding(String),
}

pub type MetricsResult<T> = Result<T, MetricsError>;

/// Broker counters and the sweeper duration histogram. All instruments are
/// additive and safe for concurrent increments.
#[derive(Clone)]
pub struct QueueMetrics {
    registry: Registry,

    messages_enqueued: IntCounterVec,
    messages_received: IntCounterVec,
    messages_acked: IntCounter,
    messages_requeued: IntCounter,
    messages_dlq: IntCounter,
    sweeper_errors: IntCounter,
    sweeper_duration: Histogram,
}

impl QueueMetrics {
    pub fn new() -> MetricsResult<Self> {
        let registry = Registry::new();

        let messages_enqueued = IntCounterVec::new(
            Opts::new(
                "sqs_messages_enqueued_total",
                "Total number of messages enqueued",
            ),
            &["queue"],
        )?;
        registry.register(Box::new(messages_enqueued.clone()))?;

        let messages_received = IntCounterVec::new(
            Opts::new(
                "sqs_messages_received_total",
                "Total number of messages received",
            ),
            &["queue"],
        )?;
        registry.register(Box::new(messages_received.clone()))?;

        let messages_acked = IntCounter::with_opts(Opts::new(
            "sqs_messages_acked_total",
            "Total number of messages acknowledged",
        ))?;
        registry.register(Box::new(messages_acked.clone()))?;

        let messages_requeued = IntCounter::with_opts(Opts::new(
            "sqs_messages_requeued_total",
            "Total number of messages requeued by sweeper",
        ))?;
        registry.register(Box::new(messages_requeued.clone()))?;

        let messages_dlq = IntCounter::with_opts(Opts::new(
            "sqs_messages_dlq_total",
            "Total number of messages sent to DLQ",
        ))?;
        registry.register(Box::new(messages_dlq.clone()))?;

        let sweeper_errors = IntCounter::with_opts(Opts::new(
            "sqs_sweeper_errors_total",
            "Total number of sweeper errors",
        ))?;
        registry.register(Box::new(sweeper_errors.clone()))?;

        let sweeper_duration = Histogram::with_opts(HistogramOpts::new(
            "sqs_sweeper_duration_seconds",
            "Time taken for sweeper to process messages",
        ))?;
        registry.register(Box::new(sweeper_duration.clone()))?;

        Ok(Self {
            registry,
            messages_enqueued,
            messages_received,
            messages_acked,
            messages_requeued,
            messages_dlq,
            sweeper_errors,
            sweeper_duration,
        })
    }

    pub fn record_enqueued(&self, queue: &str) {
        self.messages_enqueued.with_label_values(&[queue]).inc();
    }

    pub fn record_received(&self, queue: &str, count: u64) {
        if count > 0 {
            self.messages_received
                .with_label_values(&[queue])
                .inc_by(count);
        }
    }

    pub fn record_acked(&self) {
        self.messages_acked.inc();
    }

    pub fn record_requeued(&self, count: u64) {
        if count > 0 {
            self.messages_requeued.inc_by(count);
        }
    }

    pub fn record_dead_lettered(&self, count: u64) {
        if count > 0 {
            self.messages_dlq.inc_by(count);
        }
    }

    pub fn record_sweeper_error(&self) {
        self.sweeper_errors.inc();
    }

    pub fn observe_sweep_duration(&self, seconds: f64) {
        self.sweeper_duration.observe(seconds);
    }

    /// Render the registry in the Prometheus text exposition format.
    pub fn encode_text(&self) -> MetricsResult<String> {
        let encoder = TextEncoder::new();
        let mut buf = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buf)
            .map_err(|e| MetricsError::Encoding(e.to_string()))?;
        String::from_utf8(buf).map_err(|e| MetricsError::Encoding(e.to_string()))
    }

    #[cfg(test)]
    pub(crate) fn sweeper_error_count(&self) -> u64 {
        self.sweeper_errors.get()
    }
}
