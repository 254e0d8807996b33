pub mod config;
pub mod error;
pub mod message;
pub mod metrics;
pub mod service;
pub mod store;
pub mod sweeper;
pub mod telemetry;

pub use config::Config;
pub use error::{
    AckError, ConfigError, EnqueueError, ReceiveError, StoreError, StoreResult,
};
pub use message::{ClaimOptions, Message, NewMessage};
pub use metrics::{MetricsError, QueueMetrics};
pub use service::QueueService;
pub use store::{MemoryStore, PostgresStore, Store, SweepOutcome};
pub use sweeper::Sweeper;
