//! Ticket lifecycle rules: which status moves are legal, what each compound
//! operation writes, and which notification events it produces. Operations
//! return the events instead of sending them so callers dispatch strictly
//! after commit.

use crate::assignment;
use crate::auth::{self, User};
use crate::shared::error::ServiceError;
use crate::shared::utils::require_field;
use crate::tickets::store;
use crate::tickets::{
    CreateCommentRequest, CreateTicketRequest, Ticket, TicketComment, TicketPriority, TicketStatus,
};
use crate::webhooks::TicketEvent;
use chrono::Utc;
use diesel::prelude::*;
use log::{error, info};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusChange {
    Unchanged,
    Changed,
    Closing,
}

/// Decides what a requested transition means before anything is written.
/// Closed is terminal: repeating the close is a quiet no-op, while moving a
/// closed ticket anywhere else is rejected.
pub fn plan_status_change(
    current: TicketStatus,
    next: TicketStatus,
) -> Result<StatusChange, ServiceError> {
    match (current, next) {
        (TicketStatus::Closed, TicketStatus::Closed) => Ok(StatusChange::Unchanged),
        (TicketStatus::Closed, _) => Err(ServiceError::Validation(
            "Closed tickets cannot be reopened".to_string(),
        )),
        (current, next) if current == next => Ok(StatusChange::Unchanged),
        (_, TicketStatus::Closed) => Ok(StatusChange::Closing),
        _ => Ok(StatusChange::Changed),
    }
}

/// Validates a submission, routes it to an idle agent when one exists and
/// inserts it, all in one transaction.
pub fn create_ticket(
    conn: &mut PgConnection,
    req: CreateTicketRequest,
) -> Result<(Ticket, Vec<TicketEvent>), ServiceError> {
    let client_name = require_field(req.client_name, "client_name")?;
    let client_email = require_field(req.client_email, "client_email")?;
    let subject = require_field(req.subject, "subject")?;
    let description = require_field(req.description, "description")?;
    let priority = match req.priority.as_deref() {
        None | Some("") => TicketPriority::Medium,
        Some(value) => TicketPriority::parse(value)
            .ok_or_else(|| ServiceError::Validation(format!("Invalid priority: {value}")))?,
    };

    let now = Utc::now();
    let mut ticket = Ticket {
        id: Uuid::new_v4(),
        client_name,
        client_email,
        client_phone: req.client_phone,
        subject,
        description,
        status: TicketStatus::Open.as_str().to_string(),
        priority: priority.as_str().to_string(),
        category: req.category,
        department: req.department,
        assigned_agent_id: None,
        created_at: now,
        updated_at: now,
    };

    let (ticket, agent) = conn.transaction::<_, diesel::result::Error, _>(|conn| {
        let agent = assignment::assign_on_creation(conn, &mut ticket)?;
        let stored = store::insert_ticket(conn, &ticket)?;
        Ok((stored, agent))
    })?;

    info!("Created ticket {} ({})", ticket.id, ticket.status);
    let events = creation_events(&ticket, agent.as_ref());
    Ok((ticket, events))
}

/// Applies a status transition. Closing frees the agent's capacity, which
/// immediately pulls the oldest pending ticket onto their queue.
pub fn change_status(
    conn: &mut PgConnection,
    ticket_id: Uuid,
    next: TicketStatus,
) -> Result<(Ticket, Vec<TicketEvent>), ServiceError> {
    let ticket = store::get_ticket(conn, ticket_id)?
        .ok_or_else(|| ServiceError::NotFound("Ticket not found".to_string()))?;
    let current = TicketStatus::parse(&ticket.status).ok_or_else(|| {
        ServiceError::Internal(format!(
            "Ticket {} has unknown status {}",
            ticket.id, ticket.status
        ))
    })?;

    match plan_status_change(current, next)? {
        StatusChange::Unchanged => Ok((ticket, Vec::new())),
        StatusChange::Changed => {
            let updated = store::set_status(conn, ticket_id, next)?;
            Ok((updated, Vec::new()))
        }
        StatusChange::Closing => close_ticket(conn, ticket),
    }
}

fn close_ticket(
    conn: &mut PgConnection,
    ticket: Ticket,
) -> Result<(Ticket, Vec<TicketEvent>), ServiceError> {
    let freed_agent_id = ticket.assigned_agent_id;
    // Conditional write: when a concurrent request already closed this
    // ticket, this request lost the race and must not fire a second round
    // of close events or reassignment.
    let closed = match store::close_if_active(conn, ticket.id)? {
        Some(closed) => closed,
        None => {
            let current = store::get_ticket(conn, ticket.id)?
                .ok_or_else(|| ServiceError::NotFound("Ticket not found".to_string()))?;
            return Ok((current, Vec::new()));
        }
    };
    info!("Closed ticket {}", closed.id);

    let agent = match freed_agent_id {
        Some(id) => auth::get_user(conn, id)?,
        None => None,
    };

    // The reassignment runs in its own transaction after the close has
    // committed, so a concurrent creation can never double-book the agent.
    let reassigned = match &agent {
        Some(agent) => {
            let freed = agent.id;
            let result = conn.transaction::<_, diesel::result::Error, _>(|conn| {
                assignment::reassign_freed_capacity(conn, freed)
            });
            reassignment_outcome(result, freed, closed.id)
        }
        None => None,
    };

    let events = closure_events(&closed, agent.as_ref(), reassigned.as_ref());
    Ok((closed, events))
}

/// The close has already committed when the freed-capacity hand-off runs,
/// so a failed hand-off is logged and the close keeps its events. The next
/// freed agent or a manual assignment picks the pending ticket up instead.
fn reassignment_outcome(
    result: QueryResult<Option<Ticket>>,
    freed_agent_id: Uuid,
    closed_id: Uuid,
) -> Option<Ticket> {
    match result {
        Ok(next) => next,
        Err(e) => {
            error!(
                "Failed to hand freed agent {freed_agent_id} a pending ticket after closing {closed_id}: {e}"
            );
            None
        }
    }
}

/// Manual assignment override. Unlike automatic routing this ignores the
/// agent's current load, but it still refuses closed tickets and disabled
/// accounts.
pub fn assign_manual(
    conn: &mut PgConnection,
    ticket_id: Uuid,
    agent_id: Uuid,
) -> Result<(Ticket, Vec<TicketEvent>), ServiceError> {
    let ticket = store::get_ticket(conn, ticket_id)?
        .ok_or_else(|| ServiceError::NotFound("Ticket not found".to_string()))?;
    if ticket.status == TicketStatus::Closed.as_str() {
        return Err(ServiceError::Validation(
            "Cannot assign a closed ticket".to_string(),
        ));
    }

    let agent = auth::get_user(conn, agent_id)?
        .ok_or_else(|| ServiceError::NotFound("Agent not found".to_string()))?;
    if !agent.is_active {
        return Err(ServiceError::Validation(
            "Agent account is disabled".to_string(),
        ));
    }

    let updated = conn.transaction::<_, diesel::result::Error, _>(|conn| {
        store::save_assignment(conn, ticket_id, agent_id)
    })?;
    info!(
        "Manually assigned ticket {} to agent {}",
        updated.id, agent.username
    );

    let events = vec![TicketEvent::agent_assigned(&updated, &agent)];
    Ok((updated, events))
}

/// Records a comment and touches the ticket. Public comments produce one
/// update event carrying the comment text; internal notes stay silent.
pub fn add_comment(
    conn: &mut PgConnection,
    ticket_id: Uuid,
    req: CreateCommentRequest,
) -> Result<(TicketComment, Vec<TicketEvent>), ServiceError> {
    let author_name = require_field(req.author_name, "author_name")?;
    let author_email = require_field(req.author_email, "author_email")?;
    let content = require_field(req.content, "content")?;
    let is_internal = req.is_internal.unwrap_or(false);

    if store::get_ticket(conn, ticket_id)?.is_none() {
        return Err(ServiceError::NotFound("Ticket not found".to_string()));
    }

    let comment = TicketComment {
        id: Uuid::new_v4(),
        ticket_id,
        author_name,
        author_email,
        content,
        is_internal,
        created_at: Utc::now(),
    };

    let (comment, ticket) = conn.transaction::<_, diesel::result::Error, _>(|conn| {
        let stored = store::insert_comment(conn, &comment)?;
        let touched = store::touch_ticket(conn, ticket_id)?;
        Ok((stored, touched))
    })?;

    let events = if comment.is_internal {
        Vec::new()
    } else {
        let agent = match ticket.assigned_agent_id {
            Some(id) => auth::get_user(conn, id)?,
            None => None,
        };
        vec![TicketEvent::updated(
            &ticket,
            agent.as_ref(),
            comment.content.clone(),
        )]
    };
    Ok((comment, events))
}

/// Events for a freshly created ticket, in delivery order.
pub fn creation_events(ticket: &Ticket, agent: Option<&User>) -> Vec<TicketEvent> {
    let mut events = vec![TicketEvent::created(ticket)];
    if let Some(agent) = agent {
        events.push(TicketEvent::updated(
            ticket,
            Some(agent),
            assignment_message(agent),
        ));
        events.push(TicketEvent::agent_assigned(ticket, agent));
    }
    events
}

/// Events for a closed ticket, in delivery order. When the freed agent
/// picked up a pending ticket, the follow-up events describe that next
/// ticket, not the closed one.
pub fn closure_events(
    closed: &Ticket,
    agent: Option<&User>,
    reassigned: Option<&Ticket>,
) -> Vec<TicketEvent> {
    let mut events = vec![TicketEvent::closed(closed, agent)];
    if let (Some(agent), Some(next_ticket)) = (agent, reassigned) {
        events.push(TicketEvent::updated(
            next_ticket,
            Some(agent),
            assignment_message(agent),
        ));
        events.push(TicketEvent::agent_assigned(next_ticket, agent));
    }
    events
}

fn assignment_message(agent: &User) -> String {
    format!(
        "Your ticket has been automatically assigned to {}, who will be working on your request.",
        agent.full_name
    )
}
