use crate::shared::state::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};
use std::sync::Arc;

/// Liveness plus a pool check. Reports degraded (503) when no database
/// connection can be handed out.
pub async fn health_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<Value>) {
    let database_ok = state.conn.get().is_ok();
    let (code, status, database) = if database_ok {
        (StatusCode::OK, "healthy", "connected")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded", "unavailable")
    };

    (
        code,
        Json(json!({
            "status": status,
            "service": "deskserver",
            "version": env!("CARGO_PKG_VERSION"),
            "database": database,
        })),
    )
}
