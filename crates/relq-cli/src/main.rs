use std::process;
use std::time::Duration;

use clap::{Parser, Subcommand};

use relq_sdk::{Client, EnqueueOptions, ReceiveOptions};

#[derive(Parser)]
#[command(name = "relq", about = "relq message broker CLI")]
struct Cli {
    /// Broker address
    #[arg(long, default_value = "http://localhost:8080", global = true)]
    addr: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enqueue a message
    Enqueue {
        /// Queue name
        queue: String,

        /// Message body as a JSON document
        body: String,

        /// Delivery delay in milliseconds
        #[arg(long)]
        delay_ms: Option<u64>,

        /// Delivery attempts before dead-lettering (0 = broker default)
        #[arg(long)]
        max_retries: Option<i32>,

        /// Dead-letter queue name
        #[arg(long)]
        dlq: Option<String>,

        /// Correlation token stored with the message
        #[arg(long)]
        trace_id: Option<String>,
    },

    /// Receive a batch of messages (leases them without acking)
    Receive {
        /// Queue name
        queue: String,

        /// Maximum batch size (1..32)
        #[arg(long)]
        max: Option<i64>,

        /// Visibility timeout in milliseconds
        #[arg(long)]
        visibility_ms: Option<u64>,
    },

    /// Acknowledge a message by id, deleting it
    Ack {
        /// Message id (the receipt)
        id: i64,
    },

    /// Run the showcase scenarios against a live broker
    Demo {
        /// The broker's sweeper interval in seconds; the demo waits this
        /// long (plus a margin) for reclaims. Run the server with a short
        /// SWEEP_INTERVAL to keep the demo snappy.
        #[arg(long, default_value = "2")]
        sweep_interval: u64,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let client = connect(&cli.addr).await;

    match cli.command {
        Commands::Enqueue {
            queue,
            body,
            delay_ms,
            max_retries,
            dlq,
            trace_id,
        } => {
            let body: serde_json::Value = match serde_json::from_str(&body) {
                Ok(body) => body,
                Err(e) => {
                    eprintln!("Error: body is not valid JSON: {e}");
                    process::exit(1);
                }
            };
            let mut opts = EnqueueOptions::default();
            if let Some(ms) = delay_ms {
                opts = opts.with_delay(Duration::from_millis(ms));
            }
            if let Some(n) = max_retries {
                opts = opts.with_max_retries(n);
            }
            if let Some(q) = dlq {
                opts = opts.with_dlq(q);
            }
            if let Some(t) = trace_id {
                opts = opts.with_trace_id(t);
            }

            match client.enqueue(&queue, &body, opts).await {
                Ok(id) => println!("enqueued message {id} to '{queue}'"),
                Err(e) => fail(e),
            }
        }

        Commands::Receive {
            queue,
            max,
            visibility_ms,
        } => {
            let mut opts = ReceiveOptions::default();
            if let Some(n) = max {
                opts = opts.with_max(n);
            }
            if let Some(ms) = visibility_ms {
                opts = opts.with_visibility(Duration::from_millis(ms));
            }

            match client.receive(&queue, opts).await {
                Ok(messages) if messages.is_empty() => println!("no messages available"),
                Ok(messages) => {
                    for m in messages {
                        println!(
                            "id={} delivery={}/{} receipt={} body={}",
                            m.id, m.delivery_count, m.max_retries, m.receipt, m.body
                        );
                    }
                }
                Err(e) => fail(e),
            }
        }

        Commands::Ack { id } => match client.ack(id).await {
            Ok(()) => println!("acked message {id}"),
            Err(relq_sdk::AckError::NotFound(_)) => {
                eprintln!("Error: message {id} does not exist");
                process::exit(1);
            }
            Err(e) => fail(e),
        },

        Commands::Demo { sweep_interval } => demo(&client, sweep_interval).await,
    }
}

async fn connect(addr: &str) -> Client {
    let client = Client::new(addr);
    if !client.healthy().await {
        eprintln!("Error: cannot reach broker at {addr}");
        process::exit(1);
    }
    client
}

fn fail(err: impl std::fmt::Display) -> ! {
    eprintln!("Error: {err}");
    process::exit(1);
}

/// Wait out one sweeper period plus a safety margin.
async fn wait_for_sweep(sweep_interval: u64) {
    tokio::time::sleep(Duration::from_secs(sweep_interval + 1)).await;
}

async fn demo(client: &Client, sweep_interval: u64) {
    println!("=== scenario 1: basic flow (enqueue -> receive -> ack) ===");
    let body = serde_json::json!({"order_id": "ORD-12345", "customer": "John Doe"});
    let id = client
        .enqueue(
            "demo-orders",
            &body,
            EnqueueOptions::default().with_max_retries(3),
        )
        .await
        .unwrap_or_else(|e| fail(e));
    println!("enqueued message {id}");

    let messages = client
        .receive("demo-orders", ReceiveOptions::default().with_max(1))
        .await
        .unwrap_or_else(|e| fail(e));
    println!(
        "received message {} (delivery_count={})",
        messages[0].id, messages[0].delivery_count
    );

    client.ack(id).await.unwrap_or_else(|e| fail(e));
    println!("acked; queue is empty: {}", {
        let rest = client
            .receive("demo-orders", ReceiveOptions::default())
            .await
            .unwrap_or_else(|e| fail(e));
        rest.is_empty()
    });

    println!();
    println!("=== scenario 2: sweeper reclaims an expired lease ===");
    let id = client
        .enqueue(
            "demo-retries",
            &serde_json::json!({"task": "slow"}),
            EnqueueOptions::default(),
        )
        .await
        .unwrap_or_else(|e| fail(e));
    let messages = client
        .receive(
            "demo-retries",
            ReceiveOptions::default()
                .with_max(1)
                .with_visibility(Duration::from_millis(1000)),
        )
        .await
        .unwrap_or_else(|e| fail(e));
    println!(
        "received message {} with a 1s lease, not acking",
        messages[0].id
    );

    println!("waiting for the sweeper...");
    wait_for_sweep(sweep_interval).await;

    let messages = client
        .receive("demo-retries", ReceiveOptions::default().with_max(1))
        .await
        .unwrap_or_else(|e| fail(e));
    println!(
        "received message {} again (delivery_count={})",
        messages[0].id, messages[0].delivery_count
    );
    client.ack(id).await.unwrap_or_else(|e| fail(e));

    println!();
    println!("=== scenario 3: exhausted message routes to the DLQ ===");
    client
        .enqueue(
            "demo-flaky",
            &serde_json::json!({"task": "fail"}),
            EnqueueOptions::default()
                .with_max_retries(2)
                .with_dlq("demo-dead"),
        )
        .await
        .unwrap_or_else(|e| fail(e));
    println!("enqueued with max_retries=2, dlq=demo-dead");

    for cycle in 1..=2 {
        let messages = client
            .receive(
                "demo-flaky",
                ReceiveOptions::default()
                    .with_max(1)
                    .with_visibility(Duration::from_millis(1000)),
            )
            .await
            .unwrap_or_else(|e| fail(e));
        println!(
            "cycle {cycle}: received (delivery_count={}), not acking",
            messages[0].delivery_count
        );
        wait_for_sweep(sweep_interval).await;
    }

    let original = client
        .receive("demo-flaky", ReceiveOptions::default())
        .await
        .unwrap_or_else(|e| fail(e));
    let dead = client
        .receive("demo-dead", ReceiveOptions::default().with_max(1))
        .await
        .unwrap_or_else(|e| fail(e));
    println!("original queue empty: {}", original.is_empty());
    if let Some(m) = dead.first() {
        println!("dead-letter queue holds message {} body={}", m.id, m.body);
        client.ack(m.id).await.unwrap_or_else(|e| fail(e));
    }

    println!();
    println!("demo complete; metrics at {}/metrics", client.base_url());
}
