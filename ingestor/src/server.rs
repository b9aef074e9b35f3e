use axum::extract::{DefaultBodyLimit, FromRef, Multipart, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{Notify, RwLock};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::types::{KindCounts, RecordKind, UploadLedgerEntry};
use crate::upload::{UploadError, UploadRequest, UploadService, UploadSummary};

pub const DEFAULT_LIST_LIMIT: i64 = 50;
pub const MAX_LIST_LIMIT: i64 = 500;

/// Live counters exposed on `/health` and `/metrics`
#[derive(Debug, Default)]
pub struct IngestState {
    pub current_task: Option<String>,
    pub inserted: KindCounts,
    pub uploads_completed: u64,
    pub uploads_failed: u64,
    pub records_processed: u64,
    pub records_skipped: u64,
    pub records_failed: u64,
    pub error_count: u64,
    pub last_upload_time: Option<DateTime<Utc>>,
    pub database_connected: bool,
}

impl IngestState {
    pub fn record_success(&mut self, summary: &UploadSummary) {
        self.current_task = None;
        self.uploads_completed += 1;
        self.records_processed += summary.records_processed;
        self.records_skipped += summary.skipped_records;
        self.records_failed += summary.failed_records;
        self.inserted = self.inserted + summary.inserted;
        self.last_upload_time = Some(Utc::now());
    }

    pub fn record_failure(&mut self, err: &UploadError) {
        self.current_task = None;
        self.uploads_failed += 1;
        if !err.is_input_error() {
            self.error_count += 1;
        }
    }
}

/// Bearer-token gate for the analytics routes. With no token configured the routes are open.
#[derive(Debug, Clone, Default)]
pub struct AccessGate {
    pub token: Option<String>,
    pub user_id: Option<i64>,
}

impl AccessGate {
    pub fn new(token: Option<String>, user_id: Option<i64>) -> Self {
        Self { token, user_id }
    }

    pub fn authorize(&self, headers: &HeaderMap) -> Result<Option<i64>, ApiError> {
        let Some(expected) = self.token.as_deref() else {
            return Ok(None);
        };

        let presented = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()).and_then(|v| v.strip_prefix("Bearer ")).map(str::trim);

        match presented {
            Some(token) if token == expected => Ok(self.user_id),
            _ => Err(ApiError::new(StatusCode::UNAUTHORIZED, "Unauthorized")),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub service: UploadService,
    pub status: Arc<RwLock<IngestState>>,
    pub gate: AccessGate,
}

impl FromRef<AppState> for Arc<RwLock<IngestState>> {
    fn from_ref(app: &AppState) -> Self {
        app.status.clone()
    }
}

/// `{error}` body with a status code
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }
}

impl From<UploadError> for ApiError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::Store(e) => {
                error!("❌ Analytics upload failed: {}", e);
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Failed to process analytics upload")
            }
            not_found @ UploadError::ArtistNotFound(_) => ApiError::new(StatusCode::NOT_FOUND, not_found.to_string()),
            other => ApiError::new(StatusCode::BAD_REQUEST, other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub message: String,
    pub records_processed: u64,
    pub skipped_records: u64,
    pub failed_records: u64,
    pub upload_id: i64,
}

impl From<&UploadSummary> for UploadResponse {
    fn from(summary: &UploadSummary) -> Self {
        Self {
            message: "Analytics data uploaded successfully".to_string(),
            records_processed: summary.records_processed,
            skipped_records: summary.skipped_records,
            failed_records: summary.failed_records,
            upload_id: summary.upload_id,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub limit: Option<i64>,
}

pub fn router(app: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/ready", get(ready_handler))
        .route("/api/analytics/upload", post(upload_handler))
        .route("/api/analytics/uploads", get(list_uploads_handler))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(app)
}

pub struct IngestServer {
    port: u16,
    max_upload_bytes: usize,
    app: AppState,
}

impl IngestServer {
    pub fn new(port: u16, max_upload_bytes: usize, app: AppState) -> Self {
        Self { port, max_upload_bytes, app }
    }

    pub async fn run(self, shutdown: Arc<Notify>) -> anyhow::Result<()> {
        let app = router(self.app, self.max_upload_bytes);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("🌐 Ingest server listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).with_graceful_shutdown(async move { shutdown.notified().await }).await.map_err(|e| {
            error!("Ingest server error: {}", e);
            e.into()
        })
    }
}

async fn health_handler(State(state): State<Arc<RwLock<IngestState>>>) -> (StatusCode, Json<serde_json::Value>) {
    let state = state.read().await;

    let health = json!({
        "status": "healthy",
        "service": "ingestor",
        "current_task": state.current_task.as_deref(),
        "database_connected": state.database_connected,
        "inserted": {
            "streaming": state.inserted.streaming,
            "shazam": state.inserted.shazam,
            "meta": state.inserted.meta,
            "tiktok": state.inserted.tiktok,
            "total": state.inserted.total(),
        },
        "last_upload_time": state.last_upload_time.map(|t| t.to_rfc3339()),
        "timestamp": Utc::now().to_rfc3339(),
    });

    (StatusCode::OK, Json(health))
}

async fn metrics_handler(State(state): State<Arc<RwLock<IngestState>>>) -> (StatusCode, Json<serde_json::Value>) {
    let state = state.read().await;

    let mut metrics = json!({
        "uploads_completed": state.uploads_completed,
        "uploads_failed": state.uploads_failed,
        "records_processed": state.records_processed,
        "records_skipped": state.records_skipped,
        "records_failed": state.records_failed,
        "inserted_total": state.inserted.total(),
        "error_count": state.error_count,
    });
    for kind in RecordKind::ALL {
        metrics[format!("inserted_{}", kind.table())] = json!(state.inserted.get(kind));
    }

    (StatusCode::OK, Json(metrics))
}

async fn ready_handler(State(state): State<Arc<RwLock<IngestState>>>) -> StatusCode {
    let state = state.read().await;

    if state.database_connected { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE }
}

async fn upload_handler(State(app): State<AppState>, headers: HeaderMap, mut multipart: Multipart) -> Result<(StatusCode, Json<UploadResponse>), ApiError> {
    let uploaded_by = app.gate.authorize(&headers)?;

    let mut request = UploadRequest { uploaded_by, ..UploadRequest::default() };
    while let Some(field) = multipart.next_field().await.map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, format!("Invalid multipart body: {}", e)))? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                request.filename = field.file_name().map(str::to_string);
                let bytes = field.bytes().await.map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, format!("Failed to read file: {}", e)))?;
                request.content = Some(String::from_utf8_lossy(&bytes).into_owned());
            }
            "platform" | "reporting_date" | "artist_id" => {
                let value = field.text().await.map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, format!("Failed to read {}: {}", name, e)))?;
                match name.as_str() {
                    "platform" => request.platform = Some(value),
                    "reporting_date" => request.reporting_date = Some(value),
                    _ => request.artist_id = Some(value),
                }
            }
            other => warn!("⚠️ Ignoring unexpected multipart field '{}'", other),
        }
    }

    {
        let mut s = app.status.write().await;
        s.current_task = Some(format!("Processing {}", request.filename.as_deref().unwrap_or("upload")));
    }

    match app.service.process(request).await {
        Ok(summary) => {
            app.status.write().await.record_success(&summary);
            Ok((StatusCode::OK, Json(UploadResponse::from(&summary))))
        }
        Err(e) => {
            app.status.write().await.record_failure(&e);
            Err(e.into())
        }
    }
}

async fn list_uploads_handler(State(app): State<AppState>, headers: HeaderMap, Query(params): Query<ListParams>) -> Result<Json<Vec<UploadLedgerEntry>>, ApiError> {
    app.gate.authorize(&headers)?;

    let limit = params.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
    let entries = app.service.store().list_uploads(limit).await.map_err(|e| {
        error!("❌ Failed to list analytics uploads: {}", e);
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Failed to list analytics uploads")
    })?;

    Ok(Json(entries))
}
