//! HTTP API over the knowledge base.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/query` | Ranked passages for `{ query, category?, k? }` |
//! | `POST` | `/refresh` | Start a refresh cycle unless one is running |
//! | `GET`  | `/status` | Scheduler state and current snapshot metadata |
//! | `GET`  | `/categories` | The configured taxonomy |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "invalid_query", "message": "query is empty after normalization" } }
//! ```
//!
//! Error codes: `invalid_query` (400), `unknown_category` (400),
//! `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so browser-based chat
//! front ends can call the API directly.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use docsense_core::{Category, QueryError, QueryResult};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use crate::knowledge::KnowledgeBase;
use crate::refresh::{RefreshAck, RefreshStatus};

/// Build the router. Split from [`run_server`] so tests can drive it
/// without binding a socket.
pub fn router(kb: KnowledgeBase) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/query", post(handle_query))
        .route("/refresh", post(handle_refresh))
        .route("/status", get(handle_status))
        .route("/categories", get(handle_categories))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(kb)
}

/// Serve the API on `bind` until the process is terminated.
pub async fn run_server(kb: KnowledgeBase, bind: &str) -> anyhow::Result<()> {
    let app = router(kb);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!("listening on http://{}", bind);
    axum::serve(listener, app).await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<QueryError> for AppError {
    fn from(err: QueryError) -> Self {
        let code = match err {
            QueryError::InvalidQuery => "invalid_query",
            QueryError::UnknownCategory(_) => "unknown_category",
        };
        AppError {
            status: StatusCode::BAD_REQUEST,
            code: code.to_string(),
            message: err.to_string(),
        }
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

// ============ POST /query ============

#[derive(Deserialize)]
struct QueryRequest {
    query: String,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    k: Option<usize>,
}

async fn handle_query(
    State(kb): State<KnowledgeBase>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<QueryResult>, AppError> {
    let k = req.k.unwrap_or(kb.default_k);
    let engine = kb.engine.clone();
    // Query embedding may block on an HTTP provider.
    let result = tokio::task::spawn_blocking(move || {
        engine.query(&req.query, req.category.as_deref(), k)
    })
    .await
    .map_err(|e| internal(e.to_string()))??;

    if result.semantic_degraded {
        tracing::warn!(version = result.version, "query embedding failed; ranked lexically");
    }
    Ok(Json(result))
}

// ============ POST /refresh ============

#[derive(Serialize)]
struct RefreshResponse {
    status: RefreshAck,
}

async fn handle_refresh(State(kb): State<KnowledgeBase>) -> (StatusCode, Json<RefreshResponse>) {
    let status = kb.scheduler.request_refresh();
    let code = match status {
        RefreshAck::Accepted => StatusCode::ACCEPTED,
        RefreshAck::AlreadyInProgress => StatusCode::OK,
    };
    (code, Json(RefreshResponse { status }))
}

// ============ GET /status ============

async fn handle_status(State(kb): State<KnowledgeBase>) -> Json<RefreshStatus> {
    Json(kb.scheduler.status())
}

// ============ GET /categories ============

#[derive(Serialize)]
struct CategoriesResponse {
    categories: Vec<Category>,
}

async fn handle_categories(State(kb): State<KnowledgeBase>) -> Json<CategoriesResponse> {
    Json(CategoriesResponse {
        categories: kb.engine.taxonomy().categories().to_vec(),
    })
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
