//! HTTP server initialization and routing.

use crate::auth::configure_auth_routes;
use crate::main_module::health_check;
use crate::shared::state::AppState;
use crate::tickets::configure_tickets_routes;
use axum::http::HeaderValue;
use axum::routing::get;
use axum::Router;
use log::{error, info, warn};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub async fn run_server(app_state: Arc<AppState>) -> std::io::Result<()> {
    let cors = build_cors_layer(&app_state.config.cors_origins);

    let app = Router::new()
        .route("/api/health", get(health_check))
        .merge(configure_tickets_routes())
        .merge(configure_auth_routes())
        .with_state(app_state.clone())
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let host: IpAddr = match app_state.config.server.host.parse() {
        Ok(host) => host,
        Err(_) => {
            warn!(
                "Invalid SERVER_HOST {:?}, falling back to 0.0.0.0",
                app_state.config.server.host
            );
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        }
    };
    let addr = SocketAddr::new(host, app_state.config.server.port);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {addr}: {e} - is another instance running?");
            return Err(e);
        }
    };
    info!("deskserver listening on {addr}");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
}

fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() || origins.iter().any(|origin| origin == "*") {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin {origin:?}");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(parsed))
        .allow_methods(Any)
        .allow_headers(Any)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received, stopping server");
}
