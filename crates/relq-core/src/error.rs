/// Low-level storage errors (database, migrations).
/// This is the error type for the `Store` trait: storage operations can only
/// fail with infrastructure errors, never domain errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

// --- Per-operation service errors ---

#[derive(Debug, thiserror::Error)]
pub enum EnqueueError {
    #[error("queue name must not be empty")]
    EmptyQueue,

    #[error("message body must not be null")]
    NullBody,

    #[error(transparent)]
    Storage(#[from] StoreError),
}

#[derive(Debug, thiserror::Error)]
pub enum ReceiveError {
    #[error("queue name must not be empty")]
    EmptyQueue,

    #[error(transparent)]
    Storage(#[from] StoreError),
}

#[derive(Debug, thiserror::Error)]
pub enum AckError {
    #[error("message not found: {0}")]
    NotFound(i64),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

/// Environment configuration errors. All of these are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("DATABASE_URL is required")]
    MissingDatabaseUrl,

    #[error("invalid PORT: {0}")]
    InvalidPort(String),

    #[error("invalid RECEIVE_MAX: {0}")]
    InvalidReceiveMax(String),
}
