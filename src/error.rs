use crate::vault::VaultError;
use axum::extract::rejection::JsonRejection;
use axum::http::{header, HeaderValue, StatusCode};
use thiserror::Error;

/// Body text shared by unknown, expired, revealed and locked secrets so a
/// caller cannot tell them apart.
pub const INVALID_OR_EXPIRED: &str = "message is invalid or expired";

/// Application-wide error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Authentication required")]
    AuthRequired,
}

impl AppError {
    pub fn bad_request<S: Into<String>>(msg: S) -> Self {
        Self::BadRequest(msg.into())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Convert AppError to HTTP status codes for web responses
impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Vault(err) => match err {
                VaultError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
                VaultError::NotFound | VaultError::Locked => StatusCode::NOT_FOUND,
                VaultError::WrongPin { .. } => StatusCode::FORBIDDEN,
                VaultError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                VaultError::Corrupted(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::AuthRequired => StatusCode::UNAUTHORIZED,
        }
    }

    /// Message safe to show a client. Store and internal details stay in the logs.
    fn public_message(&self) -> String {
        match self {
            Self::Vault(VaultError::NotFound | VaultError::Locked) => INVALID_OR_EXPIRED.to_string(),
            Self::Vault(VaultError::StoreUnavailable(_)) => "storage unavailable".to_string(),
            Self::Vault(VaultError::Corrupted(_)) => "internal error".to_string(),
            other => other.to_string(),
        }
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }

        let mut body = serde_json::json!({
            "error": self.public_message(),
            "code": status.as_u16()
        });
        if let Self::Vault(VaultError::WrongPin {
            remaining: Some(remaining),
        }) = &self
        {
            body["attempts_remaining"] = (*remaining).into();
        }

        let mut response = (status, axum::Json(body)).into_response();
        if matches!(self, Self::AuthRequired) {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static("Basic realm=\"pinvault\""),
            );
        }
        response
    }
}
