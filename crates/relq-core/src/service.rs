use std::sync::Arc;
use std::time::Duration;

use tracing::instrument;

use crate::error::{AckError, EnqueueError, ReceiveError};
use crate::message::{ClaimOptions, Message, NewMessage};
use crate::metrics::QueueMetrics;
use crate::store::Store;

/// Substituted when an enqueue leaves `max_retries` unset (zero is the
/// legacy "unspecified" sentinel).
pub const DEFAULT_MAX_RETRIES: i32 = 5;

/// Hard bounds on a single claim batch.
pub const MIN_BATCH: i64 = 1;
pub const MAX_BATCH: i64 = 32;

/// Contract layer over the store: validates inputs, applies defaults, and
/// records the per-operation counters. Holds no state of its own.
pub struct QueueService {
    store: Arc<dyn Store>,
    metrics: Arc<QueueMetrics>,
    default_visibility: Duration,
    default_batch: i64,
}

impl QueueService {
    pub fn new(
        store: Arc<dyn Store>,
        metrics: Arc<QueueMetrics>,
        default_visibility: Duration,
        default_batch: i64,
    ) -> Self {
        Self {
            store,
            metrics,
            default_visibility,
            default_batch: default_batch.clamp(MIN_BATCH, MAX_BATCH),
        }
    }

    /// Validate and insert one message. Returns the new id, which is also
    /// the receipt consumers will ack with.
    #[instrument(skip_all, fields(queue = %msg.queue))]
    pub async fn enqueue(&self, mut msg: NewMessage) -> Result<i64, EnqueueError> {
        if msg.queue.is_empty() {
            return Err(EnqueueError::EmptyQueue);
        }
        if msg.body.is_null() {
            return Err(EnqueueError::NullBody);
        }
        if msg.max_retries <= 0 {
            msg.max_retries = DEFAULT_MAX_RETRIES;
        }

        let queue = msg.queue.clone();
        let id = self.store.enqueue(msg).await?;
        self.metrics.record_enqueued(&queue);
        Ok(id)
    }

    /// Claim a batch of messages. `max` outside `[1, 32]` is clamped to 1;
    /// an omitted `max` uses the configured default batch size. An omitted
    /// or non-positive visibility uses the configured default lease.
    #[instrument(skip_all, fields(queue = %queue))]
    pub async fn receive(
        &self,
        queue: &str,
        max: Option<i64>,
        visibility: Option<Duration>,
    ) -> Result<Vec<Message>, ReceiveError> {
        if queue.is_empty() {
            return Err(ReceiveError::EmptyQueue);
        }

        let limit = clamp_limit(max, self.default_batch);
        let visibility = effective_visibility(visibility, self.default_visibility);

        let messages = self
            .store
            .claim(ClaimOptions {
                queue: queue.to_string(),
                limit,
                visibility,
            })
            .await?;
        self.metrics.record_received(queue, messages.len() as u64);
        Ok(messages)
    }

    /// Acknowledge (delete) a message. Unknown ids surface as `NotFound` so
    /// the edge can answer 404; a repeated ack is not a storage error.
    #[instrument(skip(self))]
    pub async fn ack(&self, id: i64) -> Result<(), AckError> {
        if self.store.ack(id).await? {
            self.metrics.record_acked();
            Ok(())
        } else {
            Err(AckError::NotFound(id))
        }
    }
}

fn clamp_limit(requested: Option<i64>, default_batch: i64) -> i64 {
    match requested {
        None => default_batch,
        Some(n) if (MIN_BATCH..=MAX_BATCH).contains(&n) => n,
        Some(_) => MIN_BATCH,
    }
}

fn effective_visibility(requested: Option<Duration>, default: Duration) -> Duration {
    match requested {
        Some(v) if !v.is_zero() => v,
        _ => default,
    }
}
