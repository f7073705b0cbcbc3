//! Administrator surface: credential guard and the routes it protects.
//!
//! The core never checks credentials itself. The gateway consults an
//! [`AdminGuard`] before letting a request reach the vault's list, describe
//! and delete operations.

pub mod auth;
pub mod routes;

pub use auth::{require_admin, AdminGuard, StaticCredentials};
pub use routes::admin_router;
