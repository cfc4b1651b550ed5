use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use envforge_models::{CustomResourceRequest, CustomResourceResponse};
use envforge_orchestrations::reconciler::EnvController;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tower_http::trace::TraceLayer;

/// Shared API state
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<EnvController>,
    /// Hard response deadline, measured from request receipt
    pub deadline: Duration,
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/custom-resource", post(handle_custom_resource))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the controller server
pub async fn start_server(port: u16, state: AppState) -> Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("✓ Environment controller listening on {}", addr);

    axum::serve(listener, app)
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    Ok(())
}

// ============================================================================
// Health Check
// ============================================================================

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "envforge",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

// ============================================================================
// Custom Resources
// ============================================================================

async fn handle_custom_resource(
    State(state): State<AppState>,
    Json(raw): Json<serde_json::Value>,
) -> Result<Json<CustomResourceResponse>, AppError> {
    let deadline = Instant::now() + state.deadline;
    let request = match serde_json::from_value::<CustomResourceRequest>(raw.clone()) {
        Ok(request) => request,
        Err(e) => {
            let reason = format!("Malformed request: {}", e);
            let rejected = state
                .controller
                .reject_malformed(&raw, &reason)
                .await
                .map_err(|e| AppError::Internal(format!("{:#}", e)))?;
            return rejected.map(Json).ok_or(AppError::BadRequest(reason));
        }
    };
    let response = state
        .controller
        .handle(request, deadline)
        .await
        .map_err(|e| AppError::Internal(format!("{:#}", e)))?;
    Ok(Json(response))
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug)]
enum AppError {
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(serde_json::json!({
            "error": message
        }));

        (status, body).into_response()
    }
}
