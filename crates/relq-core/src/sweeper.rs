use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{error, info};

use crate::metrics::QueueMetrics;
use crate::store::Store;

/// Periodic reclamation task. One sweeper runs per process; each tick calls
/// `Store::sweep()` once. Ticks that fire while a sweep is still running are
/// coalesced, so there is never more than one sweep in flight.
pub struct Sweeper {
    store: Arc<dyn Store>,
    metrics: Arc<QueueMetrics>,
    interval: Duration,
}

impl Sweeper {
    pub fn new(store: Arc<dyn Store>, metrics: Arc<QueueMetrics>, interval: Duration) -> Self {
        Self {
            store,
            metrics,
            interval,
        }
    }

    /// Run until the shutdown channel fires (or its sender is dropped).
    /// Shutdown is observed between ticks and while a sweep is awaiting the
    /// store, so the task returns promptly at the next await point.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(interval_secs = self.interval.as_secs(), "sweeper started");

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("sweeper stopped");
                    return;
                }
                _ = ticker.tick() => {}
            }

            let started = Instant::now();
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("sweeper stopped");
                    return;
                }
                result = self.store.sweep() => {
                    match result {
                        Ok(outcome) => {
                            self.metrics.record_requeued(outcome.requeued);
                            self.metrics.record_dead_lettered(outcome.dead_lettered);
                            if outcome.processed() > 0 {
                                info!(
                                    requeued = outcome.requeued,
                                    dead_lettered = outcome.dead_lettered,
                                    "sweeper processed messages"
                                );
                            }
                        }
                        Err(e) => {
                            // Logged and counted; the next tick retries the
                            // whole selection, so nothing is resumed here.
                            error!(error = %e, "sweep failed");
                            self.metrics.record_sweeper_error();
                        }
                    }
                    self.metrics.observe_sweep_duration(started.elapsed().as_secs_f64());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::error::{StoreError, StoreResult};
    use crate::message::{ClaimOptions, Message, NewMessage};
    use crate::store::{MemoryStore, SweepOutcome};

    struct FailingStore;

    #[async_trait]
    impl Store for FailingStore {
        async fn enqueue(&self, _msg: NewMessage) -> StoreResult<i64> {
            Err(StoreError::Database(sqlx::Error::PoolClosed))
        }

        async fn claim(&self, _opts: ClaimOptions) -> StoreResult<Vec<Message>> {
            Err(StoreError::Database(sqlx::Error::PoolClosed))
        }

        async fn ack(&self, _id: i64) -> StoreResult<bool> {
            Err(StoreError::Database(sqlx::Error::PoolClosed))
        }

        async fn sweep(&self) -> StoreResult<SweepOutcome> {
            Err(StoreError::Database(sqlx::Error::PoolClosed))
        }
    }

    fn metrics() -> Arc<QueueMetrics> {
        Arc::new(QueueMetrics::new().unwrap())
    }

    async fn leased_expired_message(store: &MemoryStore) -> i64 {
        let id = store
            .enqueue(NewMessage {
                queue: "q".to_string(),
                body: json!({"v": 1}),
                delay: Duration::ZERO,
                max_retries: 5,
                dlq: None,
                trace_id: None,
            })
            .await
            .unwrap();
        store
            .claim(ClaimOptions {
                queue: "q".to_string(),
                limit: 1,
                visibility: Duration::from_secs(30),
            })
            .await
            .unwrap();
        store.expire_lease(id);
        id
    }

    #[tokio::test(start_paused = true)]
    async fn tick_runs_a_sweep_and_records_counts() {
        let store = Arc::new(MemoryStore::new());
        let id = leased_expired_message(&store).await;

        let m = metrics();
        let sweeper = Sweeper::new(
            Arc::clone(&store) as Arc<dyn Store>,
            Arc::clone(&m),
            Duration::from_secs(60),
        );
        let (_tx, rx) = watch::channel(false);
        let handle = tokio::spawn(sweeper.run(rx));

        tokio::time::sleep(Duration::from_secs(61)).await;
        tokio::task::yield_now().await;

        assert!(
            store.get(id).unwrap().lease_until.is_none(),
            "expired lease should be reclaimed on the first tick"
        );
        let text = m.encode_text().unwrap();
        assert!(text.contains("sqs_messages_requeued_total 1"));
        assert!(text.contains("sqs_sweeper_duration_seconds_count 1"));

        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn no_sweep_before_the_first_interval_elapses() {
        let store = Arc::new(MemoryStore::new());
        let id = leased_expired_message(&store).await;

        let sweeper = Sweeper::new(
            Arc::clone(&store) as Arc<dyn Store>,
            metrics(),
            Duration::from_secs(60),
        );
        let (_tx, rx) = watch::channel(false);
        let handle = tokio::spawn(sweeper.run(rx));

        tokio::time::sleep(Duration::from_secs(30)).await;
        tokio::task::yield_now().await;
        assert!(
            store.get(id).unwrap().lease_until.is_some(),
            "sweeper must wait a full period before its first pass"
        );

        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_signal_stops_the_loop() {
        let sweeper = Sweeper::new(
            Arc::new(MemoryStore::new()) as Arc<dyn Store>,
            metrics(),
            Duration::from_secs(60),
        );
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(sweeper.run(rx));

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sweeper should return promptly on shutdown")
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_errors_are_counted_and_the_loop_survives() {
        let m = metrics();
        let sweeper = Sweeper::new(Arc::new(FailingStore), Arc::clone(&m), Duration::from_secs(60));
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(sweeper.run(rx));

        tokio::time::sleep(Duration::from_secs(125)).await;
        tokio::task::yield_now().await;
        assert!(m.sweeper_error_count() >= 2, "one error per tick");

        // Still alive and responsive to shutdown after errors.
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sweeper should still shut down after errors")
            .unwrap();
    }
}
