use crate::admin::admin_router;
use crate::error::{AppError, AppResult};
use crate::vault::VaultParams;
use crate::web::AppState;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

/// Liveness probe
pub async fn ping() -> &'static str {
    "pong"
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub store: String,
}

/// Health check endpoint
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let (code, status, store) = match state.vault.ping().await {
        Ok(()) => (StatusCode::OK, "ok", "ok"),
        Err(e) => {
            warn!("Store health check failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, "degraded", "unavailable")
        }
    };
    (
        code,
        Json(HealthResponse {
            status: status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            store: store.to_string(),
        }),
    )
}

/// Limits a client needs before creating a message
pub async fn params(State(state): State<AppState>) -> Json<VaultParams> {
    Json(state.vault.params())
}

#[derive(Debug, Deserialize)]
pub struct CreateRequest {
    pub message: String,
    /// Lifetime in seconds
    pub exp: u64,
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct CreateResponse {
    pub key: String,
    /// Shown once; the service cannot display it again
    pub pin: String,
    pub expires_at: DateTime<Utc>,
}

/// Store a new PIN-protected message
pub async fn create_message(
    State(state): State<AppState>,
    request: Result<Json<CreateRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<CreateResponse>)> {
    let Json(request) = request?;
    if request.exp == 0 {
        return Err(AppError::bad_request("exp must be a positive number of seconds"));
    }
    let created = state
        .vault
        .create(
            request.message.as_bytes(),
            Duration::from_secs(request.exp),
            request.max_attempts,
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateResponse {
            key: created.key,
            pin: created.pin,
            expires_at: created.expires_at,
        }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct RevealRequest {
    pub pin: String,
}

#[derive(Debug, Serialize)]
pub struct RevealResponse {
    pub key: String,
    pub message: String,
}

/// Reveal a message. Succeeds at most once per message.
pub async fn reveal_message(
    Path(key): Path<String>,
    State(state): State<AppState>,
    request: Result<Json<RevealRequest>, JsonRejection>,
) -> AppResult<Json<RevealResponse>> {
    let Json(request) = request?;
    let payload = state.vault.reveal(&key, &request.pin).await?;
    Ok(Json(RevealResponse {
        key,
        message: String::from_utf8_lossy(&payload).into_owned(),
    }))
}

/// Create the web router
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ping", get(ping))
        .route("/health", get(health))
        .route("/api/v1/params", get(params))
        .route("/api/v1/message", post(create_message))
        .route("/api/v1/message/{key}", post(reveal_message))
        .with_state(state.clone())
        .nest("/api/v1/admin", admin_router(state))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
