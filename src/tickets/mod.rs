use crate::assignment::{self, AgentStats};
use crate::lifecycle;
use crate::security::AuthUser;
use crate::shared::error::ServiceError;
use crate::shared::schema::{ticket_comments, tickets};
use crate::shared::state::AppState;
use crate::shared::utils::require_field;
use crate::webhooks;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

pub mod store;

/// Statuses that count against an agent's capacity.
pub const ACTIVE_STATUSES: [&str; 2] = ["open", "in_progress"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketStatus {
    Open,
    InProgress,
    Closed,
}

impl TicketStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TicketStatus::Open => "open",
            TicketStatus::InProgress => "in_progress",
            TicketStatus::Closed => "closed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "open" => Some(TicketStatus::Open),
            "in_progress" => Some(TicketStatus::InProgress),
            "closed" => Some(TicketStatus::Closed),
            _ => None,
        }
    }

    pub fn is_active(self) -> bool {
        !matches!(self, TicketStatus::Closed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketPriority {
    Low,
    Medium,
    High,
    Critical,
}

impl TicketPriority {
    pub fn as_str(self) -> &'static str {
        match self {
            TicketPriority::Low => "low",
            TicketPriority::Medium => "medium",
            TicketPriority::High => "high",
            TicketPriority::Critical => "critical",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "low" => Some(TicketPriority::Low),
            "medium" => Some(TicketPriority::Medium),
            "high" => Some(TicketPriority::High),
            "critical" => Some(TicketPriority::Critical),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = tickets)]
pub struct Ticket {
    pub id: Uuid,
    pub client_name: String,
    pub client_email: String,
    pub client_phone: Option<String>,
    pub subject: String,
    pub description: String,
    pub status: String,
    pub priority: String,
    pub category: Option<String>,
    pub department: Option<String>,
    pub assigned_agent_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = ticket_comments)]
pub struct TicketComment {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub author_name: String,
    pub author_email: String,
    pub content: String,
    pub is_internal: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateTicketRequest {
    pub client_name: Option<String>,
    pub client_email: Option<String>,
    pub client_phone: Option<String>,
    pub subject: Option<String>,
    pub description: Option<String>,
    pub priority: Option<String>,
    pub category: Option<String>,
    pub department: Option<String>,
}

/// Partial update for ticket metadata. Status is deliberately absent; status
/// moves only through the dedicated status endpoint so lifecycle rules apply.
#[derive(Debug, Default, Deserialize, AsChangeset)]
#[diesel(table_name = tickets)]
pub struct UpdateTicketRequest {
    pub client_phone: Option<String>,
    pub subject: Option<String>,
    pub description: Option<String>,
    pub priority: Option<String>,
    pub category: Option<String>,
    pub department: Option<String>,
    pub assigned_agent_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct ChangeStatusRequest {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AssignTicketRequest {
    pub agent_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateCommentRequest {
    pub author_name: Option<String>,
    pub author_email: Option<String>,
    pub content: Option<String>,
    pub is_internal: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TicketFilter {
    pub status: Option<String>,
    pub assigned: Option<bool>,
    pub assigned_agent_id: Option<Uuid>,
}

pub async fn list_tickets(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<TicketFilter>,
) -> Result<Json<Vec<Ticket>>, ServiceError> {
    if let Some(status) = filter.status.as_deref() {
        if TicketStatus::parse(status).is_none() {
            return Err(ServiceError::Validation(format!("Invalid status: {status}")));
        }
    }
    let mut conn = state
        .conn
        .get()
        .map_err(|e| ServiceError::Database(format!("DB pool error: {e}")))?;
    let results = store::list_tickets(&mut conn, &filter)?;
    Ok(Json(results))
}

pub async fn create_ticket(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateTicketRequest>,
) -> Result<(StatusCode, Json<Ticket>), ServiceError> {
    let mut conn = state
        .conn
        .get()
        .map_err(|e| ServiceError::Database(format!("DB pool error: {e}")))?;
    let (ticket, events) = lifecycle::create_ticket(&mut conn, req)?;
    webhooks::dispatch(state.notifier.clone(), events);
    Ok((StatusCode::CREATED, Json(ticket)))
}

pub async fn get_ticket(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Ticket>, ServiceError> {
    let mut conn = state
        .conn
        .get()
        .map_err(|e| ServiceError::Database(format!("DB pool error: {e}")))?;
    let ticket = store::get_ticket(&mut conn, id)?
        .ok_or_else(|| ServiceError::NotFound("Ticket not found".to_string()))?;
    Ok(Json(ticket))
}

pub async fn update_ticket(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateTicketRequest>,
) -> Result<Json<Ticket>, ServiceError> {
    if let Some(priority) = req.priority.as_deref() {
        if TicketPriority::parse(priority).is_none() {
            return Err(ServiceError::Validation(format!(
                "Invalid priority: {priority}"
            )));
        }
    }
    let mut conn = state
        .conn
        .get()
        .map_err(|e| ServiceError::Database(format!("DB pool error: {e}")))?;
    let ticket = store::update_ticket(&mut conn, id, &req)?
        .ok_or_else(|| ServiceError::NotFound("Ticket not found".to_string()))?;
    Ok(Json(ticket))
}

pub async fn change_ticket_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<ChangeStatusRequest>,
) -> Result<Json<Ticket>, ServiceError> {
    let status = require_field(req.status, "status")?;
    let next = TicketStatus::parse(&status)
        .ok_or_else(|| ServiceError::Validation(format!("Invalid status: {status}")))?;
    let mut conn = state
        .conn
        .get()
        .map_err(|e| ServiceError::Database(format!("DB pool error: {e}")))?;
    let (ticket, events) = lifecycle::change_status(&mut conn, id, next)?;
    webhooks::dispatch(state.notifier.clone(), events);
    Ok(Json(ticket))
}

pub async fn assign_ticket(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<AssignTicketRequest>,
) -> Result<Json<Ticket>, ServiceError> {
    let agent_id = req
        .agent_id
        .ok_or_else(|| ServiceError::Validation("agent_id is required".to_string()))?;
    let mut conn = state
        .conn
        .get()
        .map_err(|e| ServiceError::Database(format!("DB pool error: {e}")))?;
    let (ticket, events) = lifecycle::assign_manual(&mut conn, id, agent_id)?;
    webhooks::dispatch(state.notifier.clone(), events);
    Ok(Json(ticket))
}

pub async fn list_ticket_comments(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<TicketComment>>, ServiceError> {
    let mut conn = state
        .conn
        .get()
        .map_err(|e| ServiceError::Database(format!("DB pool error: {e}")))?;
    store::get_ticket(&mut conn, id)?
        .ok_or_else(|| ServiceError::NotFound("Ticket not found".to_string()))?;
    let comments = store::list_comments(&mut conn, id)?;
    Ok(Json(comments))
}

pub async fn add_ticket_comment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<CreateCommentRequest>,
) -> Result<(StatusCode, Json<TicketComment>), ServiceError> {
    let mut conn = state
        .conn
        .get()
        .map_err(|e| ServiceError::Database(format!("DB pool error: {e}")))?;
    let (comment, events) = lifecycle::add_comment(&mut conn, id, req)?;
    webhooks::dispatch(state.notifier.clone(), events);
    Ok((StatusCode::CREATED, Json(comment)))
}

pub async fn get_agent_stats(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<Vec<AgentStats>>, ServiceError> {
    auth.require_admin()?;
    let mut conn = state
        .conn
        .get()
        .map_err(|e| ServiceError::Database(format!("DB pool error: {e}")))?;
    let stats = assignment::agent_stats(&mut conn)?;
    Ok(Json(stats))
}

pub fn configure_tickets_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/tickets", get(list_tickets).post(create_ticket))
        .route("/api/tickets/agents/stats", get(get_agent_stats))
        .route("/api/tickets/:id", get(get_ticket).put(update_ticket))
        .route("/api/tickets/:id/status", put(change_ticket_status))
        .route("/api/tickets/:id/assign", put(assign_ticket))
        .route(
            "/api/tickets/:id/comments",
            get(list_ticket_comments).post(add_ticket_comment),
        )
}
