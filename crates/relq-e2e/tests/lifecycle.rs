mod helpers;

use std::time::Duration;

use serde_json::json;

use relq_sdk::{AckError, EnqueueOptions, ReceiveOptions};

/// Basic message flow: enqueue → receive → ack → queue empty.
#[tokio::test]
async fn e2e_enqueue_receive_ack() {
    let Some(server) = helpers::TestServer::start() else {
        eprintln!("skipping: TEST_DATABASE_URL not set");
        return;
    };
    let client = server.client();
    let queue = helpers::unique_queue("lifecycle");

    let body = json!({"task": "x"});
    let id = client
        .enqueue(&queue, &body, EnqueueOptions::default())
        .await
        .unwrap();

    let messages = client
        .receive(
            &queue,
            ReceiveOptions::default()
                .with_max(1)
                .with_visibility(Duration::from_secs(30)),
        )
        .await
        .unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].id, id);
    assert_eq!(messages[0].delivery_count, 1);
    assert_eq!(messages[0].body, body, "payload round-trips unchanged");
    assert_eq!(messages[0].receipt, id.to_string());

    client.ack(id).await.unwrap();

    // Double-ack is a clean not-found, never a server error.
    let err = client.ack(id).await.unwrap_err();
    assert!(matches!(err, AckError::NotFound(found) if found == id));

    let rest = client
        .receive(&queue, ReceiveOptions::default())
        .await
        .unwrap();
    assert!(rest.is_empty(), "queue must be empty after ack");
}

/// A live lease hides the message from other consumers.
#[tokio::test]
async fn e2e_leased_message_is_invisible() {
    let Some(server) = helpers::TestServer::start() else {
        eprintln!("skipping: TEST_DATABASE_URL not set");
        return;
    };
    let client = server.client();
    let queue = helpers::unique_queue("leased");

    let id = client
        .enqueue(&queue, &json!({"n": 1}), EnqueueOptions::default())
        .await
        .unwrap();

    let first = client
        .receive(
            &queue,
            ReceiveOptions::default().with_visibility(Duration::from_secs(30)),
        )
        .await
        .unwrap();
    assert_eq!(first.len(), 1);

    let second = client
        .receive(&queue, ReceiveOptions::default())
        .await
        .unwrap();
    assert!(second.is_empty(), "leased message must not be redelivered");

    client.ack(id).await.unwrap();
}
