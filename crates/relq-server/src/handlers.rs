use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use relq_core::{Message, NewMessage};

use crate::error::ApiError;
use crate::routes::AppState;

// --- Wire DTOs ---

#[derive(Debug, Deserialize)]
pub struct EnqueueBody {
    /// Any JSON value except `null`. Absent and `null` are both rejected.
    #[serde(default)]
    body: Option<serde_json::Value>,
    /// Delivery delay in milliseconds.
    #[serde(default)]
    delay: Option<i64>,
    /// Zero or absent means "use the default".
    #[serde(default)]
    max_retries: Option<i32>,
    #[serde(default)]
    dlq: Option<String>,
    #[serde(default)]
    trace_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EnqueueResponse {
    id: i64,
}

#[derive(Debug, Deserialize)]
pub struct ReceiveBody {
    #[serde(default)]
    max: Option<i64>,
    #[serde(default)]
    visibility_ms: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ReceivedMessage {
    id: i64,
    body: serde_json::Value,
    /// Currently the decimal string of the id.
    receipt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    lease_until: Option<DateTime<Utc>>,
    delivery_count: i32,
    max_retries: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    dlq: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    trace_id: Option<String>,
}

impl From<Message> for ReceivedMessage {
    fn from(m: Message) -> Self {
        Self {
            receipt: m.id.to_string(),
            id: m.id,
            body: m.body,
            lease_until: m.lease_until,
            delivery_count: m.delivery_count,
            max_retries: m.max_retries,
            dlq: m.dlq,
            trace_id: m.trace_id,
        }
    }
}

/// Reserved for a future opaque receipt; accepted and ignored today.
#[derive(Debug, Default, Deserialize)]
pub struct AckBody {
    #[serde(default)]
    #[allow(dead_code)]
    receipt: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AckResponse {
    ok: bool,
}

// --- Handlers ---

/// POST /v1/queues/{queue}/messages
pub async fn enqueue(
    State(state): State<AppState>,
    Path(queue): Path<String>,
    payload: Result<Json<EnqueueBody>, JsonRejection>,
) -> Result<(StatusCode, Json<EnqueueResponse>), ApiError> {
    let Json(req) = payload.map_err(bad_json)?;

    let Some(body) = req.body.filter(|b| !b.is_null()) else {
        return Err(ApiError::BadRequest("`body` is required".to_string()));
    };
    let delay = match req.delay {
        Some(ms) if ms < 0 => {
            return Err(ApiError::BadRequest(
                "`delay` must be non-negative".to_string(),
            ));
        }
        Some(ms) => Duration::from_millis(ms as u64),
        None => Duration::ZERO,
    };

    let id = state
        .service
        .enqueue(NewMessage {
            queue,
            body,
            delay,
            max_retries: req.max_retries.unwrap_or(0),
            dlq: req.dlq,
            trace_id: req.trace_id,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(EnqueueResponse { id })))
}

/// POST /v1/queues/{queue}:receive
///
/// The whole last path segment arrives as one parameter; the literal
/// `:receive` suffix is stripped here.
pub async fn receive(
    State(state): State<AppState>,
    Path(action): Path<String>,
    payload: Result<Json<ReceiveBody>, JsonRejection>,
) -> Result<Json<Vec<ReceivedMessage>>, ApiError> {
    let Some(queue) = action.strip_suffix(":receive") else {
        return Err(ApiError::NotFound(format!("unknown route: {action}")));
    };
    let Json(req) = payload.map_err(bad_json)?;

    let visibility = req
        .visibility_ms
        .filter(|ms| *ms > 0)
        .map(|ms| Duration::from_millis(ms as u64));

    let messages = state.service.receive(queue, req.max, visibility).await?;
    Ok(Json(messages.into_iter().map(Into::into).collect()))
}

/// POST /v1/messages/{id}:ack
pub async fn ack(
    State(state): State<AppState>,
    Path(action): Path<String>,
    payload: Result<Json<AckBody>, JsonRejection>,
) -> Result<Json<AckResponse>, ApiError> {
    let Some(raw_id) = action.strip_suffix(":ack") else {
        return Err(ApiError::NotFound(format!("unknown route: {action}")));
    };
    let id: i64 = raw_id
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid message id: {raw_id}")))?;

    // The receipt field is reserved; the body is optional and nothing
    // checks it yet.
    let _ = payload;

    state.service.ack(id).await?;
    Ok(Json(AckResponse { ok: true }))
}

fn bad_json(rejection: JsonRejection) -> ApiError {
    ApiError::BadRequest(format!("invalid json: {}", rejection.body_text()))
}
