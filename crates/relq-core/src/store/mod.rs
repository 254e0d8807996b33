mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::message::{ClaimOptions, Message, NewMessage};

/// Row counts from one sweep invocation. The sum of the two passes is the
/// sweep's processed count; they are reported separately so the caller can
/// feed the requeue and dead-letter counters independently.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepOutcome {
    /// Expired leases cleared back into the available pool.
    pub requeued: u64,
    /// Exhausted messages moved to their dead-letter queue.
    pub dead_lettered: u64,
}

impl SweepOutcome {
    pub fn processed(&self) -> u64 {
        self.requeued + self.dead_lettered
    }
}

/// Storage trait for the four message primitives. Implementations must be
/// thread-safe and may only fail with infrastructure errors; domain
/// validation happens in the service layer above.
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert one message; `not_before` is the storage engine's `now()` plus
    /// the requested delay. Returns the new server-assigned id.
    async fn enqueue(&self, msg: NewMessage) -> StoreResult<i64>;

    /// Atomically lease up to `limit` available messages from a queue, in
    /// ascending id order. Rows being selected by a concurrent claim are
    /// skipped, never waited on, so two claimers partition the available
    /// set. Each returned message has its delivery count advanced and its
    /// lease set to `now() + visibility`.
    async fn claim(&self, opts: ClaimOptions) -> StoreResult<Vec<Message>>;

    /// Delete the message, regardless of lease state. Returns `true` iff a
    /// row was removed; a repeated ack returns `false` without error.
    async fn ack(&self, id: i64) -> StoreResult<bool>;

    /// Run the two reclamation passes: clear expired leases still under
    /// their retry cap (or with no DLQ configured), then move exhausted
    /// messages to their dead-letter queue. Safe to run concurrently with
    /// claims, since both passes use the same skip-if-locked discipline.
    async fn sweep(&self) -> StoreResult<SweepOutcome>;
}
