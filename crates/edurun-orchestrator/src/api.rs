//! HTTP API for a learner session.
//!
//! Exposes one [`RequestCoordinator`](crate::RequestCoordinator) to a browser
//! front end. Backend calls and the generative credential stay on this side.
//!
//! # Endpoints
//!
//! - `POST /api/run` - dispatch a run (or syntax check), returns its generation
//! - `PUT /api/code` - replace the code buffer
//! - `POST /api/analyze` - fire a debounced analysis trigger
//! - `GET /api/state` - current coordinator snapshot
//! - `GET /api/languages` - built-in language table
//! - `GET /ws` - live event stream
//!
//! # Example
//!
//! ```no_run
//! use edurun_orchestrator::{create_router, AppState, Config};
//!
//! # async fn example() -> edurun_orchestrator::Result<()> {
//! let config = Config::default();
//! let state = AppState::from_config(config)?;
//!
//! let router = create_router(state);
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, router).await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::config::Config;
use crate::coordinator::{CoordinatorHandle, CoordinatorSnapshot, RequestCoordinator, RunRequest};
use crate::error::{EduRunError, Result};
use crate::lane::RequestGeneration;
use crate::language::{LanguageDescriptor, LanguageRegistry};
use crate::source::MAX_SOURCE_SIZE;
use crate::websocket::ws_handler;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Response body for `POST /api/run`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResponse {
    /// Generation assigned to the dispatched run.
    pub generation: RequestGeneration,
}

/// Request body for `PUT /api/code`.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateCodeRequest {
    /// New contents of the code buffer.
    pub code: String,
}

/// Error response body returned on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Description of the error.
    pub error: String,
}

// ============================================================================
// Application State
// ============================================================================

/// Shared application state for the HTTP server.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Configuration the session was started with.
    pub config: Config,
    /// Handle to the session's coordinator.
    pub coordinator: CoordinatorHandle,
}

impl AppState {
    /// Creates state around an already running coordinator.
    #[must_use]
    pub const fn new(config: Config, coordinator: CoordinatorHandle) -> Self {
        Self {
            config,
            coordinator,
        }
    }

    /// Starts a coordinator over the configured HTTP backends.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be built.
    pub fn from_config(config: Config) -> Result<Self> {
        let coordinator = RequestCoordinator::spawn_from_config(&config)?;
        Ok(Self::new(config, coordinator))
    }
}

// ============================================================================
// API Error Type
// ============================================================================

/// Internal error type for API handlers.
#[derive(Debug)]
enum ApiError {
    /// Submitted code exceeds the size limit.
    CodeTooLarge(usize),
    /// The coordinator is gone.
    Unavailable(String),
}

impl From<EduRunError> for ApiError {
    fn from(err: EduRunError) -> Self {
        Self::Unavailable(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::CodeTooLarge(len) => (
                StatusCode::PAYLOAD_TOO_LARGE,
                format!("Code is {len} bytes; the limit is {MAX_SOURCE_SIZE} bytes"),
            ),
            Self::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
        };

        let body = Json(ErrorResponse { error: message });
        (status, body).into_response()
    }
}

fn check_size(code: &str) -> std::result::Result<(), ApiError> {
    let len = code.len();
    if u64::try_from(len).map_or(true, |len| len > MAX_SOURCE_SIZE) {
        warn!(len, "Rejecting oversized code");
        return Err(ApiError::CodeTooLarge(len));
    }
    Ok(())
}

// ============================================================================
// Router Setup
// ============================================================================

/// Creates the HTTP router with all endpoints.
///
/// Routes live under `/api` plus `/ws`, behind permissive CORS and request
/// tracing.
pub fn create_router(state: AppState) -> Router {
    info!(
        execution_backend = %state.config.execution_backend_url,
        model = %state.config.feedback.model,
        debounce_ms = state.config.coordinator.debounce_ms,
        "Session router ready"
    );

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/run", post(handle_run))
        .route("/code", put(handle_update_code))
        .route("/analyze", post(handle_analyze))
        .route("/state", get(handle_state))
        .route("/languages", get(handle_languages));

    Router::new()
        .nest("/api", api_routes)
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(Arc::new(state))
}

// ============================================================================
// Handlers
// ============================================================================

/// Handler for `POST /api/run`.
async fn handle_run(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RunRequest>,
) -> std::result::Result<(StatusCode, Json<RunResponse>), ApiError> {
    check_size(&request.code)?;
    info!(
        language = request.language.as_deref().unwrap_or("default"),
        syntax_only = request.syntax_only,
        code_len = request.code.len(),
        "Run requested"
    );

    let generation = state.coordinator.run(request).await?;
    Ok((StatusCode::ACCEPTED, Json(RunResponse { generation })))
}

/// Handler for `PUT /api/code`.
async fn handle_update_code(
    State(state): State<Arc<AppState>>,
    Json(request): Json<UpdateCodeRequest>,
) -> std::result::Result<StatusCode, ApiError> {
    check_size(&request.code)?;
    state.coordinator.update_code(request.code).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for `POST /api/analyze`.
async fn handle_analyze(
    State(state): State<Arc<AppState>>,
) -> std::result::Result<StatusCode, ApiError> {
    state.coordinator.request_analysis().await?;
    Ok(StatusCode::ACCEPTED)
}

/// Handler for `GET /api/state`.
async fn handle_state(
    State(state): State<Arc<AppState>>,
) -> std::result::Result<Json<CoordinatorSnapshot>, ApiError> {
    Ok(Json(state.coordinator.snapshot().await?))
}

/// Handler for `GET /api/languages`.
async fn handle_languages() -> Json<Vec<LanguageDescriptor>> {
    Json(LanguageRegistry::builtin().all().to_vec())
}

// ============================================================================
// Tests
// ============================================================================
