use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::client::{Client, DeliveredMessage, ReceiveOptions};
use crate::error::{AckError, WorkerError};

/// Error type handlers report processing failures with.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Processes one message. Returning `Ok` acks the message; returning `Err`
/// (or panicking) leaves it leased, so the sweeper will redeliver it or
/// route it to the DLQ once the retry budget is spent.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn handle(&self, msg: DeliveredMessage) -> Result<(), HandlerError>;
}

/// Configuration for a polling worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Broker base URL, e.g. `http://localhost:8080`.
    pub base_url: String,
    /// Time between polls of each queue.
    pub poll_delay: Duration,
    /// Messages fetched per poll.
    pub batch_size: i64,
    /// Visibility timeout requested for claimed messages.
    pub visibility: Duration,
}

impl WorkerConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            poll_delay: Duration::from_secs(1),
            batch_size: 10,
            visibility: Duration::from_secs(30),
        }
    }
}

/// Polling consumer runtime: one poller task per registered queue, each
/// claiming batches and dispatching them to its handler.
pub struct Worker {
    client: Client,
    config: WorkerConfig,
    handlers: HashMap<String, Arc<dyn Handler>>,
}

impl Worker {
    pub fn new(config: WorkerConfig) -> Self {
        Self {
            client: Client::new(config.base_url.clone()),
            config,
            handlers: HashMap::new(),
        }
    }

    /// Register a handler for a queue. A later registration for the same
    /// queue replaces the earlier one.
    pub fn handle(&mut self, queue: impl Into<String>, handler: impl Handler) {
        let queue = queue.into();
        info!(%queue, "registered handler");
        self.handlers.insert(queue, Arc::new(handler));
    }

    /// Run all pollers until the shutdown channel fires (or its sender is
    /// dropped).
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<(), WorkerError> {
        if self.handlers.is_empty() {
            return Err(WorkerError::NoHandlers);
        }

        info!(queues = self.handlers.len(), "worker starting");

        let mut pollers = Vec::new();
        for (queue, handler) in self.handlers {
            pollers.push(tokio::spawn(poll_queue(
                self.client.clone(),
                queue,
                handler,
                self.config.clone(),
                shutdown.clone(),
            )));
        }
        for poller in pollers {
            let _ = poller.await;
        }

        info!("worker stopped");
        Ok(())
    }
}

async fn poll_queue(
    client: Client,
    queue: String,
    handler: Arc<dyn Handler>,
    config: WorkerConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(config.poll_delay);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    info!(%queue, "polling started");

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                info!(%queue, "polling stopped");
                return;
            }
            _ = ticker.tick() => {}
        }

        let opts = ReceiveOptions::default()
            .with_max(config.batch_size)
            .with_visibility(config.visibility);
        let messages = match client.receive(&queue, opts).await {
            Ok(messages) => messages,
            Err(e) => {
                warn!(%queue, error = %e, "receive failed");
                continue;
            }
        };

        for mut msg in messages {
            msg.queue = queue.clone();
            process_message(&client, &handler, msg).await;
        }
    }
}

/// Run one handler invocation in its own task so a panic is contained: the
/// message simply stays leased and the sweeper takes it from there.
async fn process_message(client: &Client, handler: &Arc<dyn Handler>, msg: DeliveredMessage) {
    let id = msg.id;
    let queue = msg.queue.clone();
    let attempt = msg.delivery_count;
    let budget = msg.max_retries;

    let handler = Arc::clone(handler);
    let outcome = tokio::spawn(async move { handler.handle(msg).await }).await;

    match outcome {
        Err(join_err) if join_err.is_panic() => {
            warn!(%queue, id, "handler panicked, message will be redelivered");
        }
        Err(_) => {
            // Cancelled during shutdown; the lease expires on its own.
        }
        Ok(Err(e)) => {
            warn!(
                %queue, id, attempt, budget, error = %e,
                "handler failed, message will be redelivered"
            );
        }
        Ok(Ok(())) => match client.ack(id).await {
            Ok(()) => {}
            Err(AckError::NotFound(_)) => {
                // Lease expired and the sweeper already reclaimed it; a
                // duplicate delivery is the accepted at-least-once cost.
                warn!(%queue, id, "late ack, message was already reclaimed");
            }
            Err(e) => warn!(%queue, id, error = %e, "ack failed"),
        },
    }
}
