use crate::config::AppConfig;
use crate::shared::utils::DbPool;
use crate::webhooks::Notifier;
use std::sync::Arc;

/// Shared application state handed to every handler through axum's `State`.
#[derive(Clone)]
pub struct AppState {
    pub conn: DbPool,
    pub config: AppConfig,
    pub notifier: Arc<dyn Notifier>,
}
