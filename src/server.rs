//! JSON HTTP API over a [`SegmentationStore`].

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, FromRequest, Multipart, Query, Request, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use log::{error, info};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;

use crate::error::{Result, SegmentError};
use crate::optimal_k::OptimalKReport;
use crate::result::SegmentationResult;
use crate::settings::{ModelSettings, OptimalKConfig};
use crate::store::{SegmentationStore, UploadSummary};

/// Listen address for [`serve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
        }
    }
}

type AppState = Arc<SegmentationStore>;

/// Largest accepted upload, multipart or raw.
pub const MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

/// Form field carrying the CSV in a multipart upload.
const FILE_FIELD: &str = "file";

impl IntoResponse for SegmentError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!("{}", self);
        }
        let body = Json(json!({ "error": self.to_string(), "kind": self.kind() }));
        (status, body).into_response()
    }
}

/// Run CPU-bound work off the async workers.
async fn blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| SegmentError::Io(std::io::Error::other(e)))?
}

pub fn router(store: AppState) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/health", get(health))
        .route("/api/upload", post(upload))
        .route("/api/run-model", post(run_model))
        .route("/api/segmentation", get(segmentation))
        .route("/api/optimal-k", get(optimal_k))
        .route("/api/export-csv", get(export_csv))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::permissive())
        .with_state(store)
}

/// Bind and serve until ctrl-c.
pub async fn serve(config: &ServerConfig, store: AppState) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;
    info!("segmentation API listening on {}", listener.local_addr()?);

    axum::serve(listener, router(store))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await
}

async fn home() -> Json<Value> {
    Json(json!({ "message": "Welcome to the Mall Customer Segmentation API!" }))
}

async fn health(State(store): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "datasetLoaded": store.dataset().is_some(),
        "resultAvailable": store.has_result(),
    }))
}

fn is_multipart(request: &Request) -> bool {
    request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map_or(false, |ct| ct.starts_with("multipart/form-data"))
}

fn upload_err(e: impl std::fmt::Display) -> SegmentError {
    SegmentError::Parse(format!("upload: {}", e))
}

/// Pull the CSV bytes out of a `multipart/form-data` body (the `file` part)
/// or, for any other content type, take the whole body.
async fn csv_payload(request: Request) -> Result<Bytes> {
    if !is_multipart(&request) {
        return axum::body::to_bytes(request.into_body(), MAX_UPLOAD_BYTES)
            .await
            .map_err(upload_err);
    }

    let mut multipart = Multipart::from_request(request, &())
        .await
        .map_err(upload_err)?;
    while let Some(field) = multipart.next_field().await.map_err(upload_err)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let bytes = field.bytes().await.map_err(upload_err)?;
        if bytes.is_empty() {
            return Err(SegmentError::Parse("uploaded file is empty".to_string()));
        }
        return Ok(bytes);
    }
    Err(SegmentError::Parse(format!("no '{}' part in upload", FILE_FIELD)))
}

/// Accepts a multipart form with a `file` part, or the raw CSV as the body.
async fn upload(State(store): State<AppState>, request: Request) -> Result<Json<Value>> {
    let bytes = csv_payload(request).await?;
    let text = String::from_utf8(bytes.to_vec())
        .map_err(|e| SegmentError::Parse(format!("upload is not valid UTF-8: {}", e)))?;
    let summary: UploadSummary = blocking(move || store.load_csv(&text)).await?;
    Ok(Json(json!({
        "success": true,
        "message": "File uploaded successfully",
        "rows": summary.rows,
        "columns": summary.columns,
    })))
}

/// An empty body runs with default settings.
async fn run_model(State(store): State<AppState>, body: Bytes) -> Result<Json<Value>> {
    let settings = if body.iter().all(u8::is_ascii_whitespace) {
        ModelSettings::default()
    } else {
        let value: Value = serde_json::from_slice(&body)
            .map_err(|e| SegmentError::InvalidParameter(format!("malformed JSON: {}", e)))?;
        ModelSettings::from_json(value)?
    };

    let result = blocking(move || store.run_model(&settings)).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Model run completed",
        "modelInfo": result.model_info,
    })))
}

async fn segmentation(State(store): State<AppState>) -> Result<Json<SegmentationResult>> {
    let result = store.segmentation()?;
    Ok(Json(result.as_ref().clone()))
}

async fn optimal_k(
    State(store): State<AppState>,
    Query(config): Query<OptimalKConfig>,
) -> Result<Json<OptimalKReport>> {
    let report = blocking(move || store.optimal_k(&config)).await?;
    Ok(Json(report))
}

async fn export_csv(State(store): State<AppState>) -> Result<impl IntoResponse> {
    let csv = store.export_csv()?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv"),
            (header::CONTENT_DISPOSITION, "attachment; filename=customer_segments.csv"),
        ],
        csv,
    ))
}
