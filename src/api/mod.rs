//! HTTP ingress.
//!
//! - `POST /test`: submit a work item `{source_id, test_number}`
//! - `GET /api/queue`: current queue contents and occupancy
//! - `GET /health`: liveness probe

pub mod client;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::Instrument;
use uuid::Uuid;

use crate::error::{DispatcherError, Result};
use crate::scheduler::{Admission, AdmissionController, OverflowMailbox, WorkItem};
use crate::sink::TestRequestBody;

#[derive(Clone)]
pub struct ApiState {
    pub admission: Arc<AdmissionController>,
    pub mailbox: Arc<OverflowMailbox>,
}

/// Body returned by `POST /test`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResponse {
    pub message: String,
    pub status: String,
}

impl TestResponse {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: "success".to_string(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: "error".to_string(),
        }
    }
}

/// One row of `GET /api/queue`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntryResponse {
    pub slot: u32,
    pub source_id: u32,
    pub request_id: u32,
    pub arrival_time: DateTime<Utc>,
}

/// Body returned by `GET /api/queue`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStatusResponse {
    pub max_size: u32,
    pub occupancy: u32,
    pub available_space: u32,
    pub pending_overflow: usize,
    pub entries: Vec<QueueEntryResponse>,
}

pub fn router(state: ApiState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/test", post(submit_test_handler))
        .route("/api/queue", get(queue_status_handler))
        .route("/health", get(health_handler))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::new())
        .with_state(state)
}

/// Serve `app` on `addr` until `shutdown` is cancelled.
pub async fn run_api(addr: SocketAddr, app: Router, shutdown: CancellationToken) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %addr, "Starting HTTP ingress");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    tracing::info!("HTTP ingress stopped");
    Ok(())
}

/// Parse a `POST /test` body. Blank bodies are reported separately so the
/// caller can tell "nothing sent" from "garbage sent".
pub fn decode_test_request(body: &[u8]) -> Result<WorkItem> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(DispatcherError::EmptyBody);
    }
    serde_json::from_slice::<TestRequestBody>(body)
        .map(WorkItem::from)
        .map_err(|e| DispatcherError::Decode(e.to_string()))
}

async fn submit_test_handler(
    State(state): State<ApiState>,
    body: Bytes,
) -> (StatusCode, Json<TestResponse>) {
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("submit_test", %request_id);

    async move {
        let item = match decode_test_request(&body) {
            Ok(item) => item,
            Err(e) => {
                tracing::error!(error = %e, "Failed to decode request body");
                let message = match e {
                    DispatcherError::EmptyBody => "Request body is empty",
                    _ => "Failed to decode request body",
                };
                return (StatusCode::BAD_REQUEST, Json(TestResponse::error(message)));
            }
        };
        tracing::info!(
            source_id = item.source_id,
            test_number = item.request_id,
            "Request body decoded"
        );

        match state.admission.admit(item).await {
            Ok(Admission::DispatchFailed { device_id, .. }) => (
                StatusCode::BAD_GATEWAY,
                Json(TestResponse::error(format!(
                    "Failed to dispatch test to device {}",
                    device_id
                ))),
            ),
            Ok(admission) => {
                tracing::info!(outcome = ?admission, "Request admitted");
                (
                    StatusCode::OK,
                    Json(TestResponse::success("Data received successfully")),
                )
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to admit request");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(TestResponse::error("Failed to store test")),
                )
            }
        }
    }
    .instrument(span)
    .await
}

async fn queue_status_handler(State(state): State<ApiState>) -> impl IntoResponse {
    let queue = state.admission.queue();
    let entries = match queue.entries().await {
        Ok(entries) => entries,
        Err(e) => {
            tracing::error!(error = %e, "Failed to read queue");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "Failed to read queue" })),
            )
                .into_response();
        }
    };
    let pending_overflow = state.mailbox.pending_count().await.unwrap_or_default();

    let occupancy = entries.len() as u32;
    let max_size = queue.max_size();
    Json(QueueStatusResponse {
        max_size,
        occupancy,
        available_space: max_size.saturating_sub(occupancy),
        pending_overflow,
        entries: entries
            .into_iter()
            .map(|e| QueueEntryResponse {
                slot: e.slot,
                source_id: e.item.source_id,
                request_id: e.item.request_id,
                arrival_time: e.arrival_time,
            })
            .collect(),
    })
    .into_response()
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
