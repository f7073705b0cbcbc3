//! Admin endpoints, mounted under `/api/v1/admin` behind [`require_admin`].
//!
//! - `GET /keys` lists live secrets
//! - `GET /keys/{key}` describes one
//! - `DELETE /keys/{key}` revokes one

use crate::admin::auth::require_admin;
use crate::error::AppResult;
use crate::vault::SecretSummary;
use crate::web::AppState;
use axum::{
    extract::{Path, State},
    http::{HeaderName, HeaderValue, StatusCode},
    middleware,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use tracing::info;

const TOTAL_COUNT: HeaderName = HeaderName::from_static("x-total-count");

/// Handler: GET /keys
async fn list_keys(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let secrets = state.vault.list().await?;
    let total = HeaderValue::from(secrets.len());
    Ok(([(TOTAL_COUNT, total)], Json(secrets)))
}

/// Handler: GET /keys/{key}
async fn get_key(
    Path(key): Path<String>,
    State(state): State<AppState>,
) -> AppResult<Json<SecretSummary>> {
    Ok(Json(state.vault.describe(&key).await?))
}

/// Handler: DELETE /keys/{key}
async fn delete_key(
    Path(key): Path<String>,
    State(state): State<AppState>,
) -> AppResult<StatusCode> {
    state.vault.delete(&key).await?;
    info!("Admin revoked secret");
    Ok(StatusCode::NO_CONTENT)
}

/// Create the admin router.
pub fn admin_router(state: AppState) -> Router {
    Router::new()
        .route("/keys", get(list_keys))
        .route("/keys/{key}", get(get_key).delete(delete_key))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin))
        .with_state(state)
}
