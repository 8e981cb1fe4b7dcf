use crate::auth::User;
use crate::security::jwt::{verify_token, Claims};
use crate::shared::error::ServiceError;
use crate::shared::state::AppState;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use std::sync::Arc;
use tracing::warn;

/// Extractor for endpoints that require a valid bearer token. Resolves the
/// token back to a live user row so disabled or deleted accounts are locked
/// out immediately, not just when their token expires.
pub struct AuthUser {
    pub user: User,
    pub claims: Claims,
}

impl AuthUser {
    pub fn require_admin(&self) -> Result<(), ServiceError> {
        if self.claims.is_admin() {
            Ok(())
        } else {
            Err(ServiceError::Forbidden("Admin access required".to_string()))
        }
    }
}

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ServiceError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| ServiceError::Unauthorized("Missing authorization header".to_string()))?;
        let token = header.strip_prefix("Bearer ").ok_or_else(|| {
            ServiceError::Unauthorized("Invalid authorization header".to_string())
        })?;

        let claims = verify_token(token, &state.config.jwt_secret).map_err(|_| {
            warn!("Rejected request with invalid bearer token");
            ServiceError::Unauthorized("Invalid or expired token".to_string())
        })?;
        let user_id = claims
            .user_id()
            .ok_or_else(|| ServiceError::Unauthorized("Invalid or expired token".to_string()))?;

        let mut conn = state
            .conn
            .get()
            .map_err(|e| ServiceError::Database(format!("DB pool error: {e}")))?;
        let user = crate::auth::get_user(&mut conn, user_id)?
            .ok_or_else(|| ServiceError::Unauthorized("User no longer exists".to_string()))?;
        if !user.is_active {
            return Err(ServiceError::Unauthorized("Account is disabled".to_string()));
        }

        Ok(Self { user, claims })
    }
}
