//! HTTP surface: upload ingress and ledger queries.
//!
//! Endpoints:
//! - `POST /statements`: multipart field `file`, accepted with 202
//! - `GET /balance?upload_id=`: net balance of SUCCESS rows
//! - `GET /transactions/issues?upload_id=&page=&per_page=&status=`:
//!   paged FAILED/PENDING rows
//! - `GET /health`: liveness
//!
//! Query `page`/`per_page` fall back to defaults on anything unparseable;
//! a non-empty `status` other than FAILED/PENDING is a 400.

use std::future::Future;
use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Multipart, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use uuid::Uuid;

use crate::domain::{DomainError, TransactionStatus};
use crate::services::{StatementService, StatementStream};

/// Uploads larger than this are rejected at the framework level.
const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

/// Shared state for axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<StatementService>,
}

impl AppState {
    pub fn new(service: Arc<StatementService>) -> Self {
        Self { service }
    }
}

/// Build the axum router (separated for testing).
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/statements", post(upload))
        .route("/balance", get(get_balance))
        .route("/transactions/issues", get(get_issues))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until the shutdown future resolves, then drain in-flight
/// requests.
pub async fn serve(
    addr: &str,
    router: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(address = %addr, "HTTP server listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}

// ============================================================================
// Handlers
// ============================================================================

async fn health() -> Response {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339(),
    }))
    .into_response()
}

async fn upload(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let data = loop {
        match multipart.next_field().await {
            Ok(Some(field)) if field.name() == Some("file") => match field.bytes().await {
                Ok(data) => break data,
                Err(err) => {
                    error!(error = %err, "Failed to read uploaded file");
                    return error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to open file");
                }
            },
            Ok(Some(_)) => continue,
            Ok(None) => return error_response(StatusCode::BAD_REQUEST, "file is required"),
            Err(err) => {
                error!(error = %err, "Failed to parse multipart request");
                return error_response(StatusCode::BAD_REQUEST, "file is required");
            }
        }
    };

    let stream: StatementStream = Box::new(std::io::Cursor::new(data.to_vec()));
    match state.service.upload_statement(stream).await {
        Ok(upload_id) => {
            info!(upload_id = %upload_id, "Upload accepted");
            (
                StatusCode::ACCEPTED,
                Json(json!({
                    "upload_id": upload_id,
                    "status": "processing",
                })),
            )
                .into_response()
        }
        Err(err) => {
            error!(error = %err, "Failed to upload statement");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "failed to upload statement",
            )
        }
    }
}

#[derive(Debug, Deserialize)]
struct BalanceParams {
    upload_id: Option<String>,
}

async fn get_balance(
    State(state): State<AppState>,
    Query(params): Query<BalanceParams>,
) -> Response {
    let upload_id = match parse_upload_id(params.upload_id.as_deref()) {
        Ok(upload_id) => upload_id,
        Err(response) => return response,
    };

    match state.service.get_balance(upload_id).await {
        Ok(balance) => Json(json!({
            "upload_id": upload_id,
            "balance": balance,
        }))
        .into_response(),
        Err(err) => domain_error_response(err, "failed to get balance"),
    }
}

#[derive(Debug, Deserialize)]
struct IssuesParams {
    upload_id: Option<String>,
    page: Option<String>,
    per_page: Option<String>,
    status: Option<String>,
}

async fn get_issues(
    State(state): State<AppState>,
    Query(params): Query<IssuesParams>,
) -> Response {
    let upload_id = match parse_upload_id(params.upload_id.as_deref()) {
        Ok(upload_id) => upload_id,
        Err(response) => return response,
    };

    let page = positive_or(params.page.as_deref(), 1);
    let per_page = positive_or(params.per_page.as_deref(), 10);

    let status = match params.status.as_deref() {
        None | Some("") => None,
        Some("FAILED") => Some(TransactionStatus::Failed),
        Some("PENDING") => Some(TransactionStatus::Pending),
        Some(_) => {
            return error_response(StatusCode::BAD_REQUEST, "status must be FAILED or PENDING")
        }
    };

    match state.service.get_issues(upload_id, page, per_page, status).await {
        Ok((items, total)) => Json(json!({
            "upload_id": upload_id,
            "items": items,
            "page": page,
            "per_page": per_page,
            "total": total,
        }))
        .into_response(),
        Err(err) => domain_error_response(err, "failed to get issues"),
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

/// Missing id is a 400; an id that does not parse can never exist, so it
/// maps to the same 404 as an unknown upload.
fn parse_upload_id(raw: Option<&str>) -> Result<Uuid, Response> {
    let raw = match raw {
        Some(raw) if !raw.is_empty() => raw,
        _ => return Err(error_response(StatusCode::BAD_REQUEST, "upload_id is required")),
    };

    Uuid::parse_str(raw)
        .map_err(|_| error_response(StatusCode::NOT_FOUND, "upload not found"))
}

/// Parse a positive integer query value, falling back to `default` when
/// absent, unparseable, or zero.
fn positive_or(raw: Option<&str>, default: u64) -> u64 {
    raw.and_then(|value| value.parse::<u64>().ok())
        .filter(|value| *value >= 1)
        .unwrap_or(default)
}

fn domain_error_response(err: DomainError, message: &str) -> Response {
    match err {
        DomainError::UploadNotFound => {
            error_response(StatusCode::NOT_FOUND, "upload not found")
        }
        err => {
            error!(error = %err, "Request failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, message)
        }
    }
}
