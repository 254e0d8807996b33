//! Producer example: enqueue a few tasks with different options.
//!
//! Start a broker first:
//!
//! ```sh
//! DATABASE_URL=postgres://localhost/relq cargo run -p relq-server
//! ```
//!
//! Then run:
//!
//! ```sh
//! cargo run -p relq-sdk --example producer
//! ```

use std::time::Duration;

use serde_json::json;

use relq_sdk::{Client, EnqueueOptions};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let client = Client::new("http://localhost:8080");

    // A plain order with the broker's default retry budget.
    let id = client
        .enqueue(
            "orders",
            &json!({
                "order_id": "ORD-001",
                "customer": "Alice Johnson",
                "amount": 149.99,
                "items": ["Widget", "Gadget"],
            }),
            EnqueueOptions::default(),
        )
        .await?;
    println!("enqueued order (message id: {id})");

    // An email with a custom retry budget and a trace id for correlation.
    let id = client
        .enqueue(
            "emails",
            &json!({
                "to": "customer@example.com",
                "subject": "Order Confirmation",
                "body": "Your order has been placed successfully!",
            }),
            EnqueueOptions::default()
                .with_max_retries(3)
                .with_trace_id("trace-12345"),
        )
        .await?;
    println!("enqueued email (message id: {id})");

    // A notification that becomes visible five seconds from now.
    let id = client
        .enqueue(
            "notifications",
            &json!({
                "user_id": "user-789",
                "message": "Your order will arrive tomorrow!",
            }),
            EnqueueOptions::default().with_delay(Duration::from_secs(5)),
        )
        .await?;
    println!("enqueued delayed notification (message id: {id}, delay: 5s)");

    // A task that lands in a dead-letter queue after two failed deliveries.
    let id = client
        .enqueue(
            "orders",
            &json!({"order_id": "ORD-002", "simulate": "failure"}),
            EnqueueOptions::default()
                .with_max_retries(2)
                .with_dlq("orders-dead"),
        )
        .await?;
    println!("enqueued task with DLQ (message id: {id})");

    Ok(())
}
