pub mod admin;
pub mod config;
pub mod error;
pub mod pin;
pub mod store;
pub mod vault;
pub mod web;

pub use self::config::AppConfig;
pub use error::{AppError, AppResult};
pub use vault::{Vault, VaultError};
