/// Transport and server failures shared across all operations: the "infra"
/// error every per-operation type embeds.
#[derive(Debug, thiserror::Error)]
pub enum ApiFailure {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("server returned {status}: {message}")]
    Api { status: u16, message: String },
}

// --- Per-operation error types ---

#[derive(Debug, thiserror::Error)]
pub enum EnqueueError {
    #[error("failed to encode body: {0}")]
    InvalidBody(#[from] serde_json::Error),

    #[error(transparent)]
    Failure(#[from] ApiFailure),
}

#[derive(Debug, thiserror::Error)]
pub enum ReceiveError {
    #[error(transparent)]
    Failure(#[from] ApiFailure),
}

#[derive(Debug, thiserror::Error)]
pub enum AckError {
    #[error("message not found: {0}")]
    NotFound(i64),

    #[error(transparent)]
    Failure(#[from] ApiFailure),
}

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("no handlers registered")]
    NoHandlers,
}
