use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{AckError, ApiFailure, EnqueueError, ReceiveError};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// A message delivered by a receive call.
#[derive(Debug, Clone, Deserialize)]
pub struct DeliveredMessage {
    pub id: i64,
    pub body: serde_json::Value,
    /// Token to present on ack; currently the id in decimal form.
    pub receipt: String,
    #[serde(default)]
    pub lease_until: Option<DateTime<Utc>>,
    pub delivery_count: i32,
    pub max_retries: i32,
    #[serde(default)]
    pub dlq: Option<String>,
    #[serde(default)]
    pub trace_id: Option<String>,
    /// Filled in by the worker runtime, not by the wire format.
    #[serde(skip)]
    pub queue: String,
}

/// Options for customizing an enqueue.
#[derive(Debug, Clone, Default)]
pub struct EnqueueOptions {
    pub delay: Option<Duration>,
    pub max_retries: Option<i32>,
    pub dlq: Option<String>,
    pub trace_id: Option<String>,
}

impl EnqueueOptions {
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_max_retries(mut self, max_retries: i32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_dlq(mut self, dlq: impl Into<String>) -> Self {
        self.dlq = Some(dlq.into());
        self
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }
}

/// Options for a receive call. Unset fields use the broker's defaults.
#[derive(Debug, Clone, Default)]
pub struct ReceiveOptions {
    pub max: Option<i64>,
    pub visibility: Option<Duration>,
}

impl ReceiveOptions {
    pub fn with_max(mut self, max: i64) -> Self {
        self.max = Some(max);
        self
    }

    pub fn with_visibility(mut self, visibility: Duration) -> Self {
        self.visibility = Some(visibility);
        self
    }
}

/// HTTP client for the broker. `Clone`, `Send`, and `Sync`, so it can be
/// shared across tasks.
#[derive(Debug, Clone)]
pub struct Client {
    base_url: String,
    http: reqwest::Client,
}

impl Client {
    /// Create a client for a broker at the given base URL, e.g.
    /// `http://localhost:8080`.
    pub fn new(base_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        }
    }

    /// Enqueue a message. Returns the broker-assigned id.
    pub async fn enqueue<T>(
        &self,
        queue: &str,
        body: &T,
        opts: EnqueueOptions,
    ) -> Result<i64, EnqueueError>
    where
        T: Serialize + ?Sized,
    {
        let mut request = json!({ "body": serde_json::to_value(body)? });
        if let Some(delay) = opts.delay {
            request["delay"] = json!(delay.as_millis() as u64);
        }
        if let Some(max_retries) = opts.max_retries {
            request["max_retries"] = json!(max_retries);
        }
        if let Some(dlq) = opts.dlq {
            request["dlq"] = json!(dlq);
        }
        if let Some(trace_id) = opts.trace_id {
            request["trace_id"] = json!(trace_id);
        }

        let resp = self
            .http
            .post(format!("{}/v1/queues/{queue}/messages", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(ApiFailure::from)?;

        if resp.status() != reqwest::StatusCode::CREATED {
            return Err(api_failure(resp).await.into());
        }

        #[derive(Deserialize)]
        struct EnqueueResponse {
            id: i64,
        }
        let parsed: EnqueueResponse = resp.json().await.map_err(ApiFailure::from)?;
        Ok(parsed.id)
    }

    /// Claim a batch of messages. An empty result means the queue is idle;
    /// the call always returns promptly.
    pub async fn receive(
        &self,
        queue: &str,
        opts: ReceiveOptions,
    ) -> Result<Vec<DeliveredMessage>, ReceiveError> {
        let request = json!({
            "max": opts.max,
            "visibility_ms": opts.visibility.map(|v| v.as_millis() as u64),
        });

        let resp = self
            .http
            .post(format!("{}/v1/queues/{queue}:receive", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(ApiFailure::from)?;

        if !resp.status().is_success() {
            return Err(api_failure(resp).await.into());
        }
        let messages = resp.json().await.map_err(ApiFailure::from)?;
        Ok(messages)
    }

    /// Acknowledge a successfully processed message, removing it for good.
    pub async fn ack(&self, id: i64) -> Result<(), AckError> {
        let resp = self
            .http
            .post(format!("{}/v1/messages/{id}:ack", self.base_url))
            .json(&json!({}))
            .send()
            .await
            .map_err(ApiFailure::from)?;

        match resp.status() {
            reqwest::StatusCode::OK => Ok(()),
            reqwest::StatusCode::NOT_FOUND => Err(AckError::NotFound(id)),
            _ => Err(api_failure(resp).await.into()),
        }
    }

    /// Probe the broker's health endpoint.
    pub async fn healthy(&self) -> bool {
        self.http
            .get(format!("{}/healthz", self.base_url))
            .send()
            .await
            .map(|resp| resp.status().is_success())
            .unwrap_or(false)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Turn a non-success response into an `ApiFailure`, preferring the
/// server's `{"error": ...}` message when one is present.
async fn api_failure(resp: reqwest::Response) -> ApiFailure {
    let status = resp.status().as_u16();
    let message = match resp.json::<serde_json::Value>().await {
        Ok(body) => body["error"]
            .as_str()
            .unwrap_or("unexpected response")
            .to_string(),
        Err(_) => "unexpected response".to_string(),
    };
    ApiFailure::Api { status, message }
}
