//! HTTP API: search, ask, ETL and operational endpoints.

use crate::app::App;
use anyhow::Context;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use blogsearch_core::AppError;
use blogsearch_knowledge::rag::{AskResponse, QueryRequest, SearchError, SearchResponse};
use blogsearch_knowledge::{EtlOutcome, EtlRequest, IndexStats, Readiness};
use serde::Serialize;
use serde_json::Value;
use std::net::SocketAddr;

/// Error body of the search endpoints.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Error body of the ETL endpoint.
#[derive(Debug, Serialize)]
pub struct EtlErrorBody {
    pub status: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
struct StatsBody {
    #[serde(flatten)]
    index: IndexStats,
    embedder: Readiness,
}

type ApiError = (StatusCode, Json<ErrorBody>);
type EtlError = (StatusCode, Json<EtlErrorBody>);

pub fn router(app: App) -> Router {
    Router::new()
        .route("/search", post(search))
        .route("/ask", post(ask))
        .route("/etl/process", post(etl_process))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/stats", get(stats))
        .with_state(app)
}

/// Serve the API on `bind` until Ctrl-C.
pub async fn serve(app: App, bind: &str) -> anyhow::Result<()> {
    let addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("invalid bind address {}", bind))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    tracing::info!("Listening on http://{}", addr);
    axum::serve(listener, router(app))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server shutdown")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

async fn search(
    State(app): State<App>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<SearchResponse>, ApiError> {
    let query = query_from(payload)?;
    app.pipeline.search(&query).await.map(Json).map_err(search_error)
}

async fn ask(
    State(app): State<App>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<AskResponse>, ApiError> {
    let query = query_from(payload)?;
    app.pipeline.ask(&query).await.map(Json).map_err(search_error)
}

async fn etl_process(
    State(app): State<App>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<EtlOutcome>, EtlError> {
    let Json(body) = payload.map_err(|_| etl_error(StatusCode::BAD_REQUEST, "Body must be JSON"))?;

    let request = EtlRequest::from_value(body)
        .map_err(|e| etl_error(StatusCode::BAD_REQUEST, e.to_string()))?;

    app.ingestor.process(&request).await.map(Json).map_err(|e| {
        tracing::error!(post_id = request.post_id(), "ETL failed: {}", e);
        let status = match e {
            AppError::Embedding(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        etl_error(status, e.to_string())
    })
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn readyz(State(app): State<App>) -> (StatusCode, Json<Readiness>) {
    let readiness = app.embedder().readiness();
    let status = if app.embedder().is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(readiness))
}

async fn stats(State(app): State<App>) -> Result<Json<StatsBody>, ApiError> {
    let index = app.index().stats().await.map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorBody {
                error: e.to_string(),
            }),
        )
    })?;

    Ok(Json(StatsBody {
        index,
        embedder: app.embedder().readiness(),
    }))
}

fn query_from(payload: Result<Json<QueryRequest>, JsonRejection>) -> Result<String, ApiError> {
    let Json(request) = payload.map_err(|rejection| bad_request(rejection.body_text()))?;
    Ok(request.query.unwrap_or_default())
}

fn bad_request(message: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
}

fn search_error(err: SearchError) -> ApiError {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        Json(ErrorBody {
            error: err.to_string(),
        }),
    )
}

fn etl_error(status: StatusCode, message: impl Into<String>) -> EtlError {
    (
        status,
        Json(EtlErrorBody {
            status: "error",
            message: message.into(),
        }),
    )
}
