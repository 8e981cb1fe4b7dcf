use crate::security::jwt::{issue_token, Claims};
use crate::security::password::{hash_password, verify_password};
use crate::security::AuthUser;
use crate::shared::error::ServiceError;
use crate::shared::schema::users;
use crate::shared::state::AppState;
use crate::shared::utils::{require_field, DbPool};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserRole {
    Admin,
    Agent,
}

impl UserRole {
    pub fn as_str(self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::Agent => "agent",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "admin" => Some(UserRole::Admin),
            "agent" => Some(UserRole::Agent),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = users)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub full_name: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub role: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub full_name: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: User,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub role: Option<String>,
    pub is_active: Option<bool>,
    pub password: Option<String>,
}

pub fn get_user(conn: &mut PgConnection, id: Uuid) -> Result<Option<User>, ServiceError> {
    Ok(users::table.find(id).first::<User>(conn).optional()?)
}

/// Creates the initial admin account on an empty database. Without
/// `ADMIN_PASSWORD` in the environment the bootstrap is skipped so the
/// service never ships with a well-known login.
pub fn ensure_admin_account(pool: &DbPool) -> anyhow::Result<()> {
    let mut conn = pool.get()?;
    let existing: i64 = users::table.count().get_result(&mut conn)?;
    if existing > 0 {
        return Ok(());
    }

    let password = match std::env::var("ADMIN_PASSWORD") {
        Ok(p) if !p.trim().is_empty() => p,
        _ => {
            warn!("No users exist and ADMIN_PASSWORD is not set; skipping admin bootstrap");
            return Ok(());
        }
    };

    let now = Utc::now();
    let admin = User {
        id: Uuid::new_v4(),
        username: std::env::var("ADMIN_USERNAME").unwrap_or_else(|_| "admin".to_string()),
        email: std::env::var("ADMIN_EMAIL")
            .unwrap_or_else(|_| "admin@deskserver.local".to_string()),
        full_name: "Administrator".to_string(),
        password_hash: hash_password(&password)?,
        role: UserRole::Admin.as_str().to_string(),
        is_active: true,
        created_at: now,
        updated_at: now,
    };
    diesel::insert_into(users::table)
        .values(&admin)
        .execute(&mut conn)?;
    info!("Created initial admin account {}", admin.username);
    Ok(())
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<User>), ServiceError> {
    let username = require_field(req.username, "username")?;
    let email = require_field(req.email, "email")?;
    let password = require_field(req.password, "password")?;
    let full_name = require_field(req.full_name, "full_name")?;
    let role = match req.role.as_deref() {
        None | Some("") => UserRole::Agent,
        Some(value) => UserRole::parse(value)
            .ok_or_else(|| ServiceError::Validation(format!("Invalid role: {value}")))?,
    };

    let mut conn = state
        .conn
        .get()
        .map_err(|e| ServiceError::Database(format!("DB pool error: {e}")))?;

    let username_taken = users::table
        .filter(users::username.eq(&username))
        .select(users::id)
        .first::<Uuid>(&mut conn)
        .optional()?
        .is_some();
    if username_taken {
        return Err(ServiceError::Conflict("Username already exists".to_string()));
    }
    let email_taken = users::table
        .filter(users::email.eq(&email))
        .select(users::id)
        .first::<Uuid>(&mut conn)
        .optional()?
        .is_some();
    if email_taken {
        return Err(ServiceError::Conflict("Email already exists".to_string()));
    }

    let now = Utc::now();
    let user = User {
        id: Uuid::new_v4(),
        username,
        email,
        full_name,
        password_hash: hash_password(&password)
            .map_err(|e| ServiceError::Internal(e.to_string()))?,
        role: role.as_str().to_string(),
        is_active: true,
        created_at: now,
        updated_at: now,
    };
    let user: User = diesel::insert_into(users::table)
        .values(&user)
        .get_result(&mut conn)?;

    info!("Registered user {} ({})", user.username, user.role);
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ServiceError> {
    let username = require_field(req.username, "username")?;
    let password = require_field(req.password, "password")?;

    let mut conn = state
        .conn
        .get()
        .map_err(|e| ServiceError::Database(format!("DB pool error: {e}")))?;

    let user = users::table
        .filter(users::username.eq(&username))
        .first::<User>(&mut conn)
        .optional()?
        .ok_or_else(|| ServiceError::Unauthorized("Invalid credentials".to_string()))?;

    let valid = verify_password(&password, &user.password_hash)
        .map_err(|e| ServiceError::Internal(e.to_string()))?;
    if !valid {
        warn!("Failed login attempt for {username}");
        return Err(ServiceError::Unauthorized("Invalid credentials".to_string()));
    }
    if !user.is_active {
        return Err(ServiceError::Unauthorized("Account is disabled".to_string()));
    }

    let claims = Claims::new(user.id, &user.username, &user.role);
    let token = issue_token(&claims, &state.config.jwt_secret)
        .map_err(|e| ServiceError::Internal(format!("Failed to issue token: {e}")))?;
    info!("User {} logged in", user.username);
    Ok(Json(LoginResponse { token, user }))
}

pub async fn me(auth: AuthUser) -> Json<User> {
    Json(auth.user)
}

pub async fn list_users(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<Vec<User>>, ServiceError> {
    auth.require_admin()?;
    let mut conn = state
        .conn
        .get()
        .map_err(|e| ServiceError::Database(format!("DB pool error: {e}")))?;
    let all_users = users::table
        .order(users::created_at.desc())
        .load::<User>(&mut conn)?;
    Ok(Json(all_users))
}

pub async fn update_user(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<Json<User>, ServiceError> {
    auth.require_admin()?;
    let mut conn = state
        .conn
        .get()
        .map_err(|e| ServiceError::Database(format!("DB pool error: {e}")))?;

    let mut user =
        get_user(&mut conn, id)?.ok_or_else(|| ServiceError::NotFound("User not found".to_string()))?;

    if let Some(email) = req.email {
        user.email = email;
    }
    if let Some(full_name) = req.full_name {
        user.full_name = full_name;
    }
    if let Some(role) = req.role {
        let parsed = UserRole::parse(&role)
            .ok_or_else(|| ServiceError::Validation(format!("Invalid role: {role}")))?;
        user.role = parsed.as_str().to_string();
    }
    if let Some(is_active) = req.is_active {
        user.is_active = is_active;
    }
    if let Some(password) = req.password {
        if !password.trim().is_empty() {
            user.password_hash =
                hash_password(&password).map_err(|e| ServiceError::Internal(e.to_string()))?;
        }
    }
    user.updated_at = Utc::now();

    let updated: User = diesel::update(users::table.find(id))
        .set(&user)
        .get_result(&mut conn)?;
    info!("Updated user {}", updated.username);
    Ok(Json(updated))
}

/// Lists the accounts tickets can be routed to: active users with the agent
/// role. Admin accounts manage the desk but do not take assignments.
pub async fn list_agents(
    State(state): State<Arc<AppState>>,
    _auth: AuthUser,
) -> Result<Json<Vec<User>>, ServiceError> {
    let mut conn = state
        .conn
        .get()
        .map_err(|e| ServiceError::Database(format!("DB pool error: {e}")))?;
    let agents = users::table
        .filter(users::is_active.eq(true))
        .filter(users::role.eq(UserRole::Agent.as_str()))
        .order(users::full_name.asc())
        .load::<User>(&mut conn)?;
    Ok(Json(agents))
}

pub fn configure_auth_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/me", get(me))
        .route("/api/auth/users", get(list_users))
        .route("/api/auth/users/:id", put(update_user))
        .route("/api/auth/agents", get(list_agents))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_roles() {
        assert_eq!(UserRole::parse("admin"), Some(UserRole::Admin));
        assert_eq!(UserRole::parse("agent"), Some(UserRole::Agent));
        assert_eq!(UserRole::parse("superuser"), None);
    }

    #[test]
    fn serialized_user_omits_password_hash() {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            username: "sam".to_string(),
            email: "sam@example.com".to_string(),
            full_name: "Sam Doe".to_string(),
            password_hash: "$argon2id$secret".to_string(),
            role: "agent".to_string(),
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("password_hash"));
        assert!(json.contains("\"username\":\"sam\""));
    }
}
