mod client;
mod error;
mod worker;

pub use client::{Client, DeliveredMessage, EnqueueOptions, ReceiveOptions};
pub use error::{AckError, ApiFailure, EnqueueError, ReceiveError, WorkerError};
pub use worker::{Handler, HandlerError, Worker, WorkerConfig};
