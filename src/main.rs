use deskserver::auth::ensure_admin_account;
use deskserver::config::AppConfig;
use deskserver::main_module::run_server;
use deskserver::shared::state::AppState;
use deskserver::shared::utils::{create_conn, run_migrations};
use deskserver::webhooks::{Notifier, WebhookNotifier};
use dotenvy::dotenv;
use log::info;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AppConfig::from_env();
    info!("Starting deskserver {}", env!("CARGO_PKG_VERSION"));

    let pool = create_conn(&config.database_url())?;
    run_migrations(&pool)?;
    ensure_admin_account(&pool)?;

    let notifier: Arc<dyn Notifier> = Arc::new(WebhookNotifier::new(config.webhooks.clone())?);
    let state = Arc::new(AppState {
        conn: pool,
        config,
        notifier,
    });

    run_server(state).await?;
    Ok(())
}
