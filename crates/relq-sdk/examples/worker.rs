//! Worker example: poll queues and process messages with per-queue handlers.
//!
//! Start a broker and enqueue some work (see the `producer` example), then:
//!
//! ```sh
//! cargo run -p relq-sdk --example worker
//! ```
//!
//! Stop with ctrl-c; in-flight handlers finish their current message.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::watch;

use relq_sdk::{DeliveredMessage, Handler, HandlerError, Worker, WorkerConfig};

struct OrderHandler;

#[async_trait]
impl Handler for OrderHandler {
    async fn handle(&self, msg: DeliveredMessage) -> Result<(), HandlerError> {
        #[derive(Deserialize)]
        struct Order {
            order_id: String,
            #[serde(default)]
            customer: String,
            #[serde(default)]
            amount: f64,
        }

        let order: Order = serde_json::from_value(msg.body)?;
        println!(
            "processing order {} for {} (${:.2}), attempt {}/{}",
            order.order_id, order.customer, order.amount, msg.delivery_count, msg.max_retries
        );

        // Simulated work.
        tokio::time::sleep(Duration::from_millis(500)).await;
        println!("order {} completed", order.order_id);
        Ok(())
    }
}

struct EmailHandler;

#[async_trait]
impl Handler for EmailHandler {
    async fn handle(&self, msg: DeliveredMessage) -> Result<(), HandlerError> {
        let to = msg.body["to"].as_str().unwrap_or("<unknown>");
        println!("sending email to {to}");
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let mut worker = Worker::new(WorkerConfig::new("http://localhost:8080"));
    worker.handle("orders", OrderHandler);
    worker.handle("emails", EmailHandler);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        let _ = shutdown_tx.send(true);
    });

    println!("worker started, press ctrl-c to stop");
    worker.run(shutdown_rx).await?;
    println!("worker stopped");

    Ok(())
}
