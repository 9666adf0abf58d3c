use crate::store::{generate, RecordStore, StoreError};
use primeq_client::{ConnectionManager, OneShotPublisher, OpenMode};
use primeq_core::{parse_value, RecordId, ResultRecord, WorkRecord};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Shared state behind every route
pub struct AppState {
    pub store: Arc<dyn RecordStore>,
    pub publisher: OneShotPublisher,
    pub manager: ConnectionManager,
    pub results_queue: String,
    pub results_wait: Duration,
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/records", get(list_records).post(put_record))
        .route("/records/generate", post(generate_records))
        .route("/records/send", post(send_records))
        .route("/records/:id", get(get_record))
        .route("/results", get(drain_results))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct GenerateRequest {
    count: usize,
    #[serde(default = "default_max_digits")]
    max_digits: usize,
}

fn default_max_digits() -> usize {
    20
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SendResponse {
    pub queue: String,
    pub sent: usize,
    pub failed: usize,
}

#[derive(Debug, Deserialize)]
struct ResultsQuery {
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    records: usize,
    queue: String,
}

/// List every stored record
async fn list_records(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<WorkRecord>>, ApiError> {
    Ok(Json(state.store.list_all().await?))
}

/// Get one record by id
async fn get_record(
    State(state): State<Arc<AppState>>,
    Path(id): Path<RecordId>,
) -> Result<Json<WorkRecord>, ApiError> {
    let record = state.store.get(id).await?.ok_or(ApiError::NotFound)?;
    Ok(Json(record))
}

/// Store a record supplied by the caller
async fn put_record(
    State(state): State<Arc<AppState>>,
    Json(record): Json<WorkRecord>,
) -> Result<(StatusCode, Json<WorkRecord>), ApiError> {
    if record.id == 0 {
        return Err(ApiError::BadRequest("id must be positive".to_string()));
    }
    parse_value(&record.value).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    state.store.set(&record).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// Add random records to the store
async fn generate_records(
    State(state): State<Arc<AppState>>,
    Json(req): Json<GenerateRequest>,
) -> Result<(StatusCode, Json<Vec<WorkRecord>>), ApiError> {
    if req.count == 0 || req.max_digits == 0 {
        return Err(ApiError::BadRequest(
            "count and max_digits must be positive".to_string(),
        ));
    }

    let records = generate(state.store.as_ref(), req.count, req.max_digits).await?;
    info!("Generated {} records", records.len());

    Ok((StatusCode::CREATED, Json(records)))
}

/// Publish every stored record at once, each through its own output handle
async fn send_records(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SendResponse>, ApiError> {
    let records = state.store.list_all().await?;

    let outcomes = join_all(records.iter().map(|record| state.publisher.publish(record))).await;

    let mut failed = 0;
    for (record, outcome) in records.iter().zip(&outcomes) {
        if let Err(e) = outcome {
            failed += 1;
            error!("Failed to send record {}: {}", record.id, e);
        }
    }

    let response = SendResponse {
        queue: state.publisher.queue().to_string(),
        sent: records.len() - failed,
        failed,
    };
    info!(
        "Sent {} records to {} ({} failed)",
        response.sent, response.queue, response.failed
    );

    Ok(Json(response))
}

/// Take up to `limit` verdicts off the results queue
async fn drain_results(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ResultsQuery>,
) -> Result<Json<Vec<ResultRecord>>, ApiError> {
    let limit = query.limit.unwrap_or(10);

    let session = state.manager.connect().await.map_err(ApiError::broker)?;
    let drained = drain(&session, &state, limit).await;
    if let Err(e) = session.disconnect().await {
        warn!("Disconnect after draining results failed: {}", e);
    }

    Ok(Json(drained?))
}

async fn drain(
    session: &primeq_client::Session,
    state: &AppState,
    limit: usize,
) -> Result<Vec<ResultRecord>, ApiError> {
    let input = session
        .open(&state.results_queue, OpenMode::Input)
        .await
        .map_err(ApiError::broker)?;

    let mut results = Vec::new();
    while results.len() < limit {
        let Some(envelope) = input
            .receive(state.results_wait)
            .await
            .map_err(ApiError::broker)?
        else {
            break;
        };

        match ResultRecord::from_payload(&envelope.payload) {
            Ok(result) => results.push(result),
            Err(e) => warn!("Skipping unreadable result {}: {}", envelope.message_id, e),
        }
    }

    Ok(results)
}

/// Health check
async fn health_check(State(state): State<Arc<AppState>>) -> Result<Json<HealthResponse>, ApiError> {
    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        records: state.store.list_all().await?.len(),
        queue: state.publisher.queue().to_string(),
    }))
}

/// API error types
#[derive(Debug)]
pub enum ApiError {
    NotFound,
    BadRequest(String),
    Unavailable(String),
    Internal(String),
}

impl ApiError {
    fn broker(e: primeq_client::ClientError) -> Self {
        ApiError::Unavailable(e.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::IdsExhausted { .. } => ApiError::BadRequest(e.to_string()),
            _ => ApiError::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound => (StatusCode::NOT_FOUND, "Not found".to_string()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(serde_json::json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}
