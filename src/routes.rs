use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Serialize;
use std::any::Any;
use std::sync::Arc;
use thiserror::Error;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

use crate::{
    cache::{FileDailyStore, PersistenceError},
    config::Config,
    reshape::WeatherReshaper,
    weather::{qweather::UpstreamError, types::OutputDocument, WeatherSource},
};

// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub weather: Arc<WeatherSource>,
    pub reshaper: Arc<WeatherReshaper<FileDailyStore>>,
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Upstream fetch failed: {0}")]
    Upstream(#[from] UpstreamError),
    #[error("Cache persistence failed: {0}")]
    Persistence(#[from] PersistenceError),
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub version: String,
    pub mock: bool,
}

fn internal_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: "Internal Server Error".to_string(),
        }),
    )
        .into_response()
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::error!("Weather request failed: {}", self);
        internal_error()
    }
}

fn panic_response(_panic: Box<dyn Any + Send + 'static>) -> Response {
    tracing::error!("Weather request panicked");
    internal_error()
}

// Route handlers
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        mock: state.config.use_mock,
    })
}

/// One full fetch -> reshape cycle.
pub async fn get_weather(State(state): State<AppState>) -> Result<Json<OutputDocument>, AppError> {
    let snapshot = state.weather.fetch_snapshot().await?;
    let document = state.reshaper.reshape(&snapshot).await?;
    Ok(Json(document))
}

// Create the router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(get_weather))
        .route("/weather", get(get_weather))
        .route("/health", get(health))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
