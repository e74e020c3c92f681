//! HTTP scoring service
//!
//! Thin axum layer over a read-only `Scorer`. The service holds the
//! trained artifacts in memory for its whole lifetime; requests never
//! touch disk.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::extract::{Path as AxumPath, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

use churnkit_model::{Prediction, ScoreError, Scorer};

#[derive(Clone)]
pub struct AppState {
    pub scorer: Arc<Scorer>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(scorer: Scorer) -> Self {
        Self {
            scorer: Arc::new(scorer),
            start_time: Instant::now(),
        }
    }

    fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

type SharedState = Arc<AppState>;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    feature_rows: usize,
    uptime_secs: u64,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new<S: Into<String>>(status: StatusCode, message: S) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn bad_request<S: Into<String>>(message: S) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    fn not_found<S: Into<String>>(message: S) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let payload = Json(ErrorResponse {
            error: self.message,
        });
        (self.status, payload).into_response()
    }
}

fn score_error(user_id: i64, err: ScoreError) -> ApiError {
    match err {
        // The message carries the exact "User Id {id} not found" text.
        ScoreError::NotFound(_) => ApiError::not_found(err.to_string()),
        other => {
            error!(user_id, "scoring failed: {other}");
            ApiError::internal()
        }
    }
}

pub async fn start_server(state: AppState, addr: &str) -> Result<()> {
    let shared = Arc::new(state);
    let app = build_router(shared);
    let listener = bind_listener(addr).await?;
    axum::serve(listener, app)
        .await
        .context("scoring server terminated unexpectedly")
}

async fn bind_listener(addr: &str) -> Result<tokio::net::TcpListener> {
    if let Ok(socket_addr) = addr.parse::<SocketAddr>() {
        tokio::net::TcpListener::bind(socket_addr)
            .await
            .with_context(|| format!("failed to bind listener on {socket_addr}"))
    } else {
        tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind listener on {addr}"))
    }
}

pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/churn_risk/:user_id", get(handle_churn_risk))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn handle_health(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        feature_rows: state.scorer.feature_rows(),
        uptime_secs: state.uptime_seconds(),
    })
}

async fn handle_churn_risk(
    State(state): State<SharedState>,
    AxumPath(user_id): AxumPath<String>,
) -> Result<Json<Prediction>, ApiError> {
    let user_id: i64 = user_id
        .parse()
        .map_err(|_| ApiError::bad_request(format!("invalid user id {user_id:?}")))?;

    let prediction = state
        .scorer
        .score_user(user_id, Utc::now())
        .map_err(|err| score_error(user_id, err))?;
    Ok(Json(prediction))
}
