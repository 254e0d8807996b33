use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::debug;

use super::{Store, SweepOutcome};
use crate::error::StoreResult;
use crate::message::{ClaimOptions, Message, NewMessage};

/// Connections kept in the shared pool. This bounds concurrent storage
/// operations across HTTP handlers and the sweeper.
const POOL_MAX_CONNECTIONS: u32 = 20;

// SQL templates. All `now()` comparisons are evaluated by Postgres so that
// lease-expiry arithmetic is monotonic within the engine's clock.

const SQL_ENQUEUE: &str = r#"
INSERT INTO messages (queue, body, not_before, max_retries, dlq, trace_id)
VALUES ($1, $2, now() + ($3 * interval '1 millisecond'), $4, $5, $6)
RETURNING id
"#;

// Pick-then-update CTE: `FOR UPDATE SKIP LOCKED` lets concurrent claimers
// partition the available set instead of serializing on it.
const SQL_CLAIM: &str = r#"
WITH picked AS (
    SELECT id
    FROM messages
    WHERE queue = $1
      AND lease_until IS NULL
      AND not_before <= now()
    ORDER BY id
    FOR UPDATE SKIP LOCKED
    LIMIT $2
),
updated AS (
    UPDATE messages m
    SET lease_until    = now() + ($3 * interval '1 millisecond'),
        delivery_count = m.delivery_count + 1
    FROM picked
    WHERE m.id = picked.id
    RETURNING m.*
)
SELECT id, queue, body, enqueued_at, not_before, lease_until,
       delivery_count, max_retries, dlq, trace_id
FROM updated
ORDER BY id
"#;

const SQL_ACK: &str = "DELETE FROM messages WHERE id = $1";

const SQL_SWEEP_REQUEUE: &str = r#"
WITH expired AS (
    SELECT id
    FROM messages
    WHERE lease_until IS NOT NULL
      AND lease_until < now()
      AND (delivery_count < max_retries OR dlq IS NULL)
    FOR UPDATE SKIP LOCKED
)
UPDATE messages
SET lease_until = NULL
WHERE id IN (SELECT id FROM expired)
"#;

// The quarantined copy keeps body, enqueued_at, max_retries and trace_id;
// delivery_count restarts at zero and the dlq column is left NULL so a
// dead-letter queue can never chain into another one.
const SQL_SWEEP_DLQ: &str = r#"
WITH expired_for_dlq AS (
    SELECT id, dlq, body, enqueued_at, max_retries, trace_id
    FROM messages
    WHERE lease_until IS NOT NULL
      AND lease_until < now()
      AND delivery_count >= max_retries
      AND dlq IS NOT NULL
    FOR UPDATE SKIP LOCKED
),
inserted AS (
    INSERT INTO messages (queue, body, enqueued_at, max_retries, trace_id, delivery_count)
    SELECT dlq, body, enqueued_at, max_retries, trace_id, 0
    FROM expired_for_dlq
    RETURNING id
)
DELETE FROM messages
WHERE id IN (SELECT id FROM expired_for_dlq)
"#;

/// Postgres-backed message store. `Clone` is cheap; the pool is shared.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Build a store over a connection pool the caller constructed.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a bounded pool to the given database. `connect_timeout`
    /// applies both to the initial connection and to later acquires, so an
    /// unreachable database fails fast at boot.
    pub async fn connect(database_url: &str, connect_timeout: Duration) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(POOL_MAX_CONNECTIONS)
            .acquire_timeout(connect_timeout)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Apply the embedded schema migrations.
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Round-trip a trivial query to verify the database is reachable.
    pub async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Close the pool, waiting for checked-out connections to be returned.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn millis(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}

#[async_trait]
impl Store for PostgresStore {
    async fn enqueue(&self, msg: NewMessage) -> StoreResult<i64> {
        let id: i64 = sqlx::query_scalar(SQL_ENQUEUE)
            .bind(&msg.queue)
            .bind(&msg.body)
            .bind(millis(msg.delay))
            .bind(msg.max_retries)
            .bind(msg.dlq.as_deref())
            .bind(msg.trace_id.as_deref())
            .fetch_one(&self.pool)
            .await?;
        Ok(id)
    }

    async fn claim(&self, opts: ClaimOptions) -> StoreResult<Vec<Message>> {
        let messages = sqlx::query_as::<_, Message>(SQL_CLAIM)
            .bind(&opts.queue)
            .bind(opts.limit)
            .bind(millis(opts.visibility))
            .fetch_all(&self.pool)
            .await?;
        Ok(messages)
    }

    async fn ack(&self, id: i64) -> StoreResult<bool> {
        let result = sqlx::query(SQL_ACK).bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn sweep(&self) -> StoreResult<SweepOutcome> {
        let requeued = sqlx::query(SQL_SWEEP_REQUEUE)
            .execute(&self.pool)
            .await?
            .rows_affected();

        let dead_lettered = sqlx::query(SQL_SWEEP_DLQ)
            .execute(&self.pool)
            .await?
            .rows_affected();

        let outcome = SweepOutcome {
            requeued,
            dead_lettered,
        };
        if outcome.processed() > 0 {
            debug!(
                requeued = outcome.requeued,
                dead_lettered = outcome.dead_lettered,
                "sweep pass complete"
            );
        }
        Ok(outcome)
    }
}
