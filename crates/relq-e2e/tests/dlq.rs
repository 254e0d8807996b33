mod helpers;

use std::time::Duration;

use serde_json::json;

use relq_sdk::{EnqueueOptions, ReceiveOptions};

/// A message that keeps failing lands in its dead-letter queue exactly once,
/// with its payload and trace id intact and a fresh delivery count.
#[tokio::test]
async fn e2e_exhausted_message_routes_to_dlq() {
    let Some(server) = helpers::TestServer::start() else {
        eprintln!("skipping: TEST_DATABASE_URL not set");
        return;
    };
    let client = server.client();
    let queue = helpers::unique_queue("flaky");
    let dlq = helpers::unique_queue("dead");

    let body = json!({"task": "fail"});
    client
        .enqueue(
            &queue,
            &body,
            EnqueueOptions::default()
                .with_max_retries(2)
                .with_dlq(dlq.clone())
                .with_trace_id("trace-dlq"),
        )
        .await
        .unwrap();

    // Two claim-without-ack cycles burn through the retry budget. After the
    // first expiry the sweeper reclaims; after the second it quarantines.
    for cycle in 1..=2 {
        let messages = helpers::receive_within(
            &client,
            &queue,
            ReceiveOptions::default()
                .with_max(1)
                .with_visibility(Duration::from_millis(800)),
            Duration::from_secs(10),
        )
        .await;
        assert_eq!(messages.len(), 1, "cycle {cycle}");
        assert_eq!(messages[0].delivery_count, cycle);

        tokio::time::sleep(Duration::from_secs(helpers::SWEEP_INTERVAL_SECS + 1)).await;
    }

    // The quarantined copy shows up in the DLQ with a restarted count and
    // no further DLQ of its own.
    let dead = helpers::receive_within(
        &client,
        &dlq,
        ReceiveOptions::default().with_max(2),
        Duration::from_secs(10),
    )
    .await;
    assert_eq!(dead.len(), 1, "exactly one copy in the DLQ");
    assert_eq!(dead[0].body, body);
    assert_eq!(dead[0].trace_id.as_deref(), Some("trace-dlq"));
    assert_eq!(dead[0].delivery_count, 1);
    assert_eq!(dead[0].dlq, None);

    // And the original queue stays empty.
    let original = client
        .receive(&queue, ReceiveOptions::default())
        .await
        .unwrap();
    assert!(original.is_empty());

    client.ack(dead[0].id).await.unwrap();
}
