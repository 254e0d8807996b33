use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Core message domain type, one row of the `messages` table. This is the
/// internal representation used by the service and storage layer, distinct
/// from the HTTP wire DTOs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Message {
    /// Server-assigned, monotonically increasing. Doubles as the receipt.
    pub id: i64,
    pub queue: String,
    /// Opaque payload, stored and returned verbatim.
    pub body: serde_json::Value,
    pub enqueued_at: DateTime<Utc>,
    /// Earliest delivery time; `enqueued_at + delay` at insertion.
    pub not_before: DateTime<Utc>,
    /// Set while a consumer holds a lease; `None` means not in flight.
    pub lease_until: Option<DateTime<Utc>>,
    /// Number of successful claims so far. Monotonic.
    pub delivery_count: i32,
    pub max_retries: i32,
    /// Quarantine target once `delivery_count` reaches `max_retries`.
    /// Without one, expired leases are reclaimed indefinitely.
    pub dlq: Option<String>,
    pub trace_id: Option<String>,
}

impl Message {
    /// A message is available iff it has no lease and its delivery time
    /// has arrived.
    pub fn is_available(&self, now: DateTime<Utc>) -> bool {
        self.lease_until.is_none() && self.not_before <= now
    }
}

/// Parameters for a single enqueue. Validation and defaulting happen in the
/// service layer; the store inserts what it is given.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub queue: String,
    pub body: serde_json::Value,
    pub delay: Duration,
    pub max_retries: i32,
    pub dlq: Option<String>,
    pub trace_id: Option<String>,
}

/// Parameters for a single claim.
#[derive(Debug, Clone)]
pub struct ClaimOptions {
    pub queue: String,
    pub limit: i64,
    pub visibility: Duration,
}
