use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{Store, SweepOutcome};
use crate::error::StoreResult;
use crate::message::{ClaimOptions, Message, NewMessage};

/// In-memory store implementing the same lifecycle state machine as the
/// Postgres backend. Used by unit tests and local experiments; it is not a
/// durable production path.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    rows: Vec<Message>,
    next_id: i64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot a message by id, if it still exists.
    pub fn get(&self, id: i64) -> Option<Message> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.rows.iter().find(|m| m.id == id).cloned()
    }

    /// Number of rows currently held, across all queues.
    pub fn len(&self) -> usize {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Force a message's lease into the past so the next sweep sees it as
    /// expired. Test hook; the Postgres backend relies on real time.
    pub fn expire_lease(&self, id: i64) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(m) = inner.rows.iter_mut().find(|m| m.id == id) {
            if m.lease_until.is_some() {
                m.lease_until = Some(Utc::now() - chrono::Duration::seconds(1));
            }
        }
    }
}

fn delta(d: std::time::Duration) -> chrono::Duration {
    chrono::Duration::milliseconds(i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
}

#[async_trait]
impl Store for MemoryStore {
    async fn enqueue(&self, msg: NewMessage) -> StoreResult<i64> {
        let now = Utc::now();
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.next_id += 1;
        let id = inner.next_id;
        inner.rows.push(Message {
            id,
            queue: msg.queue,
            body: msg.body,
            enqueued_at: now,
            not_before: now + delta(msg.delay),
            lease_until: None,
            delivery_count: 0,
            max_retries: msg.max_retries,
            dlq: msg.dlq,
            trace_id: msg.trace_id,
        });
        Ok(id)
    }

    async fn claim(&self, opts: ClaimOptions) -> StoreResult<Vec<Message>> {
        let now = Utc::now();
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        // Rows are kept in insertion order, which is id order, so the first
        // `limit` available matches are already id-ascending.
        let mut claimed = Vec::new();
        for m in inner.rows.iter_mut() {
            if claimed.len() as i64 >= opts.limit {
                break;
            }
            if m.queue == opts.queue && m.is_available(now) {
                m.delivery_count += 1;
                m.lease_until = Some(now + delta(opts.visibility));
                claimed.push(m.clone());
            }
        }
        Ok(claimed)
    }

    async fn ack(&self, id: i64) -> StoreResult<bool> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let before = inner.rows.len();
        inner.rows.retain(|m| m.id != id);
        Ok(inner.rows.len() < before)
    }

    async fn sweep(&self) -> StoreResult<SweepOutcome> {
        let now = Utc::now();
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let mut outcome = SweepOutcome::default();

        // Reclaim pass: expired leases still under the cap, or with no DLQ.
        for m in inner.rows.iter_mut() {
            if lease_expired(m, now) && (m.delivery_count < m.max_retries || m.dlq.is_none()) {
                m.lease_until = None;
                outcome.requeued += 1;
            }
        }

        // DLQ pass: expired and exhausted, with a quarantine target.
        let mut quarantined = Vec::new();
        inner.rows.retain(|m| {
            if lease_expired(m, now) && m.delivery_count >= m.max_retries && m.dlq.is_some() {
                quarantined.push(m.clone());
                false
            } else {
                true
            }
        });
        for m in quarantined {
            let Some(target) = m.dlq else { continue };
            inner.next_id += 1;
            let id = inner.next_id;
            inner.rows.push(Message {
                id,
                queue: target,
                body: m.body,
                enqueued_at: m.enqueued_at,
                not_before: now,
                lease_until: None,
                delivery_count: 0,
                max_retries: m.max_retries,
                dlq: None,
                trace_id: m.trace_id,
            });
            outcome.dead_lettered += 1;
        }

        Ok(outcome)
    }
}

fn lease_expired(m: &Message, now: DateTime<Utc>) -> bool {
    matches!(m.lease_until, Some(until) if until < now)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;

    fn new_msg(queue: &str) -> NewMessage {
        NewMessage {
            queue: queue.to_string(),
            body: json!({"k": 1}),
            delay: Duration::ZERO,
            max_retries: 5,
            dlq: None,
            trace_id: None,
        }
    }

    fn claim_opts(queue: &str, limit: i64) -> ClaimOptions {
        ClaimOptions {
            queue: queue.to_string(),
            limit,
            visibility: Duration::from_secs(30),
        }
    }

    #[tokio::test]
    async fn enqueue_claim_ack_lifecycle() {
        let store = MemoryStore::new();
        let id = store.enqueue(new_msg("q")).await.unwrap();

        let claimed = store.claim(claim_opts("q", 1)).await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].id, id);
        assert_eq!(claimed[0].delivery_count, 1);
        assert!(claimed[0].lease_until.is_some());

        assert!(store.ack(id).await.unwrap());
        assert!(!store.ack(id).await.unwrap(), "second ack finds nothing");
        assert!(store.claim(claim_opts("q", 1)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn leased_messages_are_hidden_from_claims() {
        let store = MemoryStore::new();
        store.enqueue(new_msg("q")).await.unwrap();

        let first = store.claim(claim_opts("q", 1)).await.unwrap();
        assert_eq!(first.len(), 1);
        let second = store.claim(claim_opts("q", 1)).await.unwrap();
        assert!(second.is_empty(), "leased row must not be claimed twice");
    }

    #[tokio::test]
    async fn delay_defers_availability() {
        let store = MemoryStore::new();
        let mut msg = new_msg("q");
        msg.delay = Duration::from_secs(3600);
        store.enqueue(msg).await.unwrap();

        assert!(store.claim(claim_opts("q", 1)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn claims_return_ids_ascending_and_respect_queue() {
        let store = MemoryStore::new();
        for _ in 0..3 {
            store.enqueue(new_msg("a")).await.unwrap();
        }
        store.enqueue(new_msg("b")).await.unwrap();

        let claimed = store.claim(claim_opts("a", 10)).await.unwrap();
        let ids: Vec<i64> = claimed.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert!(claimed.iter().all(|m| m.queue == "a"));
    }

    #[tokio::test]
    async fn sweep_reclaims_expired_lease_under_cap() {
        let store = MemoryStore::new();
        let id = store.enqueue(new_msg("q")).await.unwrap();
        store.claim(claim_opts("q", 1)).await.unwrap();
        store.expire_lease(id);

        let outcome = store.sweep().await.unwrap();
        assert_eq!(outcome.requeued, 1);
        assert_eq!(outcome.dead_lettered, 0);

        let again = store.claim(claim_opts("q", 1)).await.unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].delivery_count, 2);
    }

    #[tokio::test]
    async fn sweep_ignores_live_leases() {
        let store = MemoryStore::new();
        store.enqueue(new_msg("q")).await.unwrap();
        store.claim(claim_opts("q", 1)).await.unwrap();

        let outcome = store.sweep().await.unwrap();
        assert_eq!(outcome.processed(), 0);
    }

    #[tokio::test]
    async fn sweep_moves_exhausted_message_to_dlq() {
        let store = MemoryStore::new();
        let mut msg = new_msg("q");
        msg.max_retries = 1;
        msg.dlq = Some("q-dead".to_string());
        msg.trace_id = Some("trace-1".to_string());
        let id = store.enqueue(msg).await.unwrap();

        store.claim(claim_opts("q", 1)).await.unwrap();
        store.expire_lease(id);

        let outcome = store.sweep().await.unwrap();
        assert_eq!(outcome.requeued, 0);
        assert_eq!(outcome.dead_lettered, 1);

        // Original queue drained; quarantined copy carries the payload and
        // trace id, restarts the delivery count, and has no further DLQ.
        assert!(store.claim(claim_opts("q", 1)).await.unwrap().is_empty());
        let dead = store.claim(claim_opts("q-dead", 1)).await.unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].body, json!({"k": 1}));
        assert_eq!(dead[0].trace_id.as_deref(), Some("trace-1"));
        assert_eq!(dead[0].delivery_count, 1, "fresh count after quarantine");
        assert_eq!(dead[0].dlq, None);
    }

    #[tokio::test]
    async fn exhausted_without_dlq_is_reclaimed_forever() {
        let store = MemoryStore::new();
        let mut msg = new_msg("q");
        msg.max_retries = 1;
        let id = store.enqueue(msg).await.unwrap();

        for round in 2..5 {
            store.claim(claim_opts("q", 1)).await.unwrap();
            store.expire_lease(id);
            let outcome = store.sweep().await.unwrap();
            assert_eq!(outcome.requeued, 1, "round {round}");
        }
        let m = store.get(id).unwrap();
        assert!(m.delivery_count >= m.max_retries);
        assert_eq!(m.queue, "q", "never quarantined without a dlq");
    }
}
