use crate::admin::AdminGuard;
use crate::vault::Vault;
use std::sync::Arc;

/// Application state for web handlers
#[derive(Clone)]
pub struct AppState {
    pub vault: Arc<Vault>,
    pub admin: Arc<dyn AdminGuard>,
}

impl AppState {
    pub fn new(vault: Vault, admin: impl AdminGuard + 'static) -> Self {
        Self {
            vault: Arc::new(vault),
            admin: Arc::new(admin),
        }
    }
}
