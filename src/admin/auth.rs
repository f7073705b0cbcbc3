//! Administrator credential check.
//!
//! The gateway only needs a yes/no answer for a login/password pair, so the
//! check is a capability trait. The shipped implementation compares against
//! the static pair from configuration.

use crate::error::AppError;
use crate::web::AppState;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{authorization::Basic, Authorization, HeaderMapExt};
use tracing::{debug, warn};

/// Decides whether a login/password pair may use the admin API.
pub trait AdminGuard: Send + Sync {
    fn authorize(&self, login: &str, password: &str) -> bool;
}

/// Static login/password pair from configuration.
pub struct StaticCredentials {
    login: blake3::Hash,
    password: blake3::Hash,
}

impl StaticCredentials {
    pub fn new(login: &str, password: &str) -> Self {
        Self {
            login: blake3::hash(login.as_bytes()),
            password: blake3::hash(password.as_bytes()),
        }
    }
}

impl AdminGuard for StaticCredentials {
    fn authorize(&self, login: &str, password: &str) -> bool {
        // hash both sides so the comparison is constant time and length independent
        let login_ok = blake3::hash(login.as_bytes()) == self.login;
        let password_ok = blake3::hash(password.as_bytes()) == self.password;
        login_ok & password_ok
    }
}

impl std::fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticCredentials").finish_non_exhaustive()
    }
}

/// Middleware: reject requests without valid basic credentials.
pub async fn require_admin(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(Authorization(basic)) = request.headers().typed_get::<Authorization<Basic>>() else {
        debug!("No basic credentials on admin request");
        return Err(AppError::AuthRequired);
    };

    if !state.admin.authorize(basic.username(), basic.password()) {
        warn!("Rejected admin credentials for login {:?}", basic.username());
        return Err(AppError::AuthRequired);
    }

    Ok(next.run(request).await)
}
