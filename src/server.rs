//!
//! smartquery HTTP server
//! -----------------------
//! Axum-based JSON API over a single bucket.
//!
//! Responsibilities:
//! - Object endpoints: search, file details, upload, delete, download.
//! - Fixed analytics reports and the HTML dashboard.
//! - The `/query` endpoint that answers plain-English questions.
//! - Periodic bucket snapshot flushing and a final flush on shutdown.

use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use anyhow::Context;
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Multipart, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{NaiveDate, SecondsFormat, Utc};
use futures_util::FutureExt; // for catch_unwind on async blocks
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::error::{AppError, AppResult};
use crate::storage::{self, Bucket, FileRecord, ObjectMeta, SnapshotSource};

pub mod analytics;
pub mod exec;
pub mod query;

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub bucket: Bucket,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!(target: "smartquery::http", "request failed: {}", self);
        } else {
            debug!(target: "smartquery::http", "request rejected: {}", self);
        }
        (status, Json(json!({"error": self.message(), "code": self.code_str()}))).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct QueryPayload {
    #[serde(default)]
    pub query: String,
}

#[derive(Debug, Deserialize)]
pub struct DeletePayload {
    #[serde(default)]
    pub filename: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FilenameParam {
    filename: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DateParam {
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    prefix: Option<String>,
}

/// Build the API router for `state`. Request bodies are capped at `max_body_bytes`.
pub fn router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/", get(|| async { Json(json!({"status": "ok"})) }))
        .route("/search", get(search))
        .route("/file-details", get(file_details))
        .route("/upload", post(upload))
        .route("/delete", post(delete))
        .route("/download", get(download))
        .route("/count-by-type", get(count_by_type))
        .route("/files-by-date", get(files_by_date))
        .route("/uploads-by-user", get(uploads_by_user))
        .route("/storage-by-date", get(storage_by_date))
        .route("/total-storage", get(total_storage))
        .route("/dashboard", get(dashboard))
        .route("/query", post(query_handler))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(state)
}

fn log_startup(config: &ServerConfig) {
    let cwd = std::env::current_dir().ok();
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    info!(
        target: "startup",
        "smartquery starting: RUST_LOG='{}', cwd={:?}, http_port={}, data_root='{}', bucket='{}', snapshot_interval_ms={}, max_upload_bytes={}",
        rust_log, cwd, config.http_port, config.data_root, config.bucket, config.snapshot_interval_ms, config.max_upload_bytes
    );
    let root = std::path::Path::new(&config.data_root);
    info!(target: "startup", "Path existence: data_root_exists={}", root.exists());
}

/// Start the HTTP server and serve until Ctrl-C.
pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
    log_startup(&config);

    let bucket = Bucket::open(&config.data_root, &config.bucket)
        .with_context(|| format!("While opening bucket '{}' under '{}'", config.bucket, config.data_root))?;
    let live = storage::list_objects(&bucket, None).map(|v| v.len()).unwrap_or(0);
    info!(target: "startup", "bucket '{}' ready with {} objects", bucket.name(), live);

    // Background snapshot ticker
    if config.snapshot_interval_ms > 0 {
        let bucket_for_flush = bucket.clone();
        let every = Duration::from_millis(config.snapshot_interval_ms);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(every).await;
                match bucket_for_flush.flush() {
                    Ok(true) => debug!(target: "smartquery::storage", "snapshot flushed"),
                    Ok(false) => {}
                    Err(e) => warn!(target: "smartquery::storage", "snapshot flush failed: {:#}", e),
                }
            }
        });
    } else {
        info!("snapshot_ticker" = false, "periodic snapshot flush disabled");
    }

    let app = router(AppState { bucket: bucket.clone() }, config.max_upload_bytes);

    let addr: SocketAddr = format!("0.0.0.0:{}", config.http_port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await.with_context(|| format!("While binding {}", addr))?;
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    let wrote = bucket.flush()?;
    info!(target: "startup", "smartquery stopped (final snapshot written: {})", wrote);
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!(target: "startup", "shutdown requested");
}

fn take_snapshot(state: &AppState) -> AppResult<Vec<FileRecord>> {
    state
        .bucket
        .snapshot()
        .map_err(|e| AppError::io("snapshot_unavailable", format!("{:#}", e).as_str()))
}

fn required(value: Option<String>, what: &str) -> AppResult<String> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(AppError::user("missing_parameter", format!("{} is required", what).as_str())),
    }
}

fn parse_date(value: Option<String>) -> AppResult<NaiveDate> {
    let raw = required(value, "date query parameter (YYYY-MM-DD)")?;
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
        .map_err(|_| AppError::user("invalid_date", format!("invalid date '{}', expected YYYY-MM-DD", raw).as_str()))
}

fn rfc3339_ms(ms: i64) -> String {
    chrono::DateTime::<Utc>::from_timestamp_millis(ms)
        .unwrap_or_default()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn meta_json(m: &ObjectMeta) -> serde_json::Value {
    json!({
        "key": m.key,
        "size": m.size,
        "last_modified": rfc3339_ms(m.last_modified),
        "content_type": m.content_type,
        "uploader": m.uploader_or_unknown(),
        "etag": m.etag,
        "version": m.version,
    })
}

async fn search(State(state): State<AppState>, Query(params): Query<SearchParams>) -> AppResult<Json<serde_json::Value>> {
    let objects = storage::list_objects(&state.bucket, params.prefix.as_deref())?;
    let files: Vec<serde_json::Value> = objects
        .iter()
        .map(|m| json!({"key": m.key, "size": m.size, "last_modified": rfc3339_ms(m.last_modified)}))
        .collect();
    Ok(Json(json!({"files": files})))
}

async fn file_details(State(state): State<AppState>, Query(params): Query<FilenameParam>) -> AppResult<Json<serde_json::Value>> {
    let filename = required(params.filename, "filename query parameter")?;
    match storage::get_object(&state.bucket, &filename)? {
        Some(meta) => Ok(Json(meta_json(&meta))),
        None => Err(AppError::not_found("not_found", format!("file '{}' not found", filename).as_str())),
    }
}

async fn upload(State(state): State<AppState>, mut multipart: Multipart) -> AppResult<Json<serde_json::Value>> {
    let bad_multipart = |e: axum::extract::multipart::MultipartError| AppError::user("bad_multipart", e.body_text().as_str());
    let mut file: Option<(String, Option<String>, Vec<u8>)> = None;
    let mut uploader: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or("").to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(bad_multipart)?;
                file = Some((file_name, content_type, bytes.to_vec()));
            }
            "uploader" => {
                let text = field.text().await.map_err(bad_multipart)?;
                uploader = Some(text.trim().to_string()).filter(|s| !s.is_empty());
            }
            _ => {}
        }
    }

    let Some((filename, content_type, bytes)) = file else {
        return Err(AppError::user("no_file_part", "No file part"));
    };
    if filename.trim().is_empty() {
        return Err(AppError::user("no_selected_file", "No selected file"));
    }
    let meta = storage::put_object(&state.bucket, &filename, &bytes, content_type.as_deref(), uploader.as_deref())
        .map_err(|e| AppError::user("invalid_object", e.to_string().as_str()))?;
    info!(target: "smartquery::http", "uploaded key='{}' size={} uploader={:?} version={}", meta.key, meta.size, meta.uploader, meta.version);
    Ok(Json(json!({
        "message": "File uploaded successfully",
        "filename": meta.key,
        "etag": meta.etag,
        "version": meta.version,
    })))
}

async fn delete(
    State(state): State<AppState>,
    payload: Result<Json<DeletePayload>, JsonRejection>,
) -> AppResult<Json<serde_json::Value>> {
    let Json(payload) = payload.map_err(|e| AppError::user("bad_request", e.body_text().as_str()))?;
    let filename = required(payload.filename, "filename")?;
    storage::delete_object(&state.bucket, &filename)?;
    info!(target: "smartquery::http", "deleted key='{}'", filename);
    Ok(Json(json!({"message": "File deleted successfully", "filename": filename})))
}

fn attachment_name(key: &str) -> String {
    let base = key.rsplit('/').next().unwrap_or(key);
    base.chars().map(|c| if c.is_ascii_graphic() && c != '"' && c != '\\' { c } else { '_' }).collect()
}

async fn download(State(state): State<AppState>, Query(params): Query<FilenameParam>) -> AppResult<Response> {
    let filename = required(params.filename, "filename query parameter")?;
    let Some(meta) = storage::get_object(&state.bucket, &filename)? else {
        return Err(AppError::not_found("not_found", format!("file '{}' not found", filename).as_str()));
    };
    let Some(bytes) = storage::get_object_bytes(&state.bucket, &meta)? else {
        return Err(AppError::internal("missing_blob", format!("content for '{}' is missing", meta.key).as_str()));
    };
    let content_type = meta.content_type.clone().unwrap_or_else(|| "application/octet-stream".to_string());
    let disposition = format!("attachment; filename=\"{}\"", attachment_name(&meta.key));
    Ok(([(header::CONTENT_TYPE, content_type), (header::CONTENT_DISPOSITION, disposition)], bytes).into_response())
}

async fn count_by_type(State(state): State<AppState>) -> AppResult<Json<serde_json::Value>> {
    let records = take_snapshot(&state)?;
    Ok(Json(json!(analytics::count_by_type(&records))))
}

async fn files_by_date(State(state): State<AppState>, Query(params): Query<DateParam>) -> AppResult<Json<serde_json::Value>> {
    let date = parse_date(params.date)?;
    let records = take_snapshot(&state)?;
    let files = analytics::files_by_date(&records, date);
    Ok(Json(json!({"count": files.len(), "files": files})))
}

async fn uploads_by_user(State(state): State<AppState>) -> AppResult<Json<serde_json::Value>> {
    let records = take_snapshot(&state)?;
    Ok(Json(json!(analytics::uploads_by_user(&records))))
}

async fn storage_by_date(State(state): State<AppState>, Query(params): Query<DateParam>) -> AppResult<Json<serde_json::Value>> {
    let date = parse_date(params.date)?;
    let records = take_snapshot(&state)?;
    let bytes = analytics::storage_by_date(&records, date);
    Ok(Json(json!({"total_gb": analytics::bytes_to_gb(bytes), "total_bytes": bytes})))
}

async fn total_storage(State(state): State<AppState>) -> AppResult<Json<serde_json::Value>> {
    let records = take_snapshot(&state)?;
    let bytes = analytics::total_storage(&records);
    Ok(Json(json!({"total_gb": analytics::bytes_to_gb(bytes), "total_bytes": bytes})))
}

async fn dashboard(State(state): State<AppState>) -> AppResult<Html<String>> {
    let records = take_snapshot(&state)?;
    Ok(Html(analytics::dashboard_html(state.bucket.name(), &records)))
}

async fn query_handler(
    State(state): State<AppState>,
    payload: Result<Json<QueryPayload>, JsonRejection>,
) -> Response {
    let Json(payload) = match payload {
        Ok(p) => p,
        Err(e) => return AppError::user("bad_request", e.body_text().as_str()).into_response(),
    };
    let today = Utc::now().date_naive();
    let exec_fut = async { exec::answer_question(&payload.query, &state.bucket, today) };
    match AssertUnwindSafe(exec_fut).catch_unwind().await {
        Ok(Ok(answer)) => (StatusCode::OK, Json(answer)).into_response(),
        Ok(Err(e)) => {
            warn!(target: "smartquery::query", "query '{}' failed: {}", payload.query, e);
            AppError::from(e).into_response()
        }
        Err(panic_payload) => {
            // Convert panics to a 500 error response without crashing the server task
            let msg = if let Some(s) = panic_payload.downcast_ref::<&str>() { *s }
                      else if let Some(s) = panic_payload.downcast_ref::<String>() { s.as_str() }
                      else { "panic" };
            error!(target: "panic", "HTTP query_handler panic: {}", msg);
            AppError::internal("internal_panic", "internal server error").into_response()
        }
    }
}
