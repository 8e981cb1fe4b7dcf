//! Query layer for tickets and comments. Functions here take a borrowed
//! connection so callers can compose them inside a single transaction.

use crate::shared::schema::{ticket_comments, tickets};
use crate::tickets::{
    Ticket, TicketComment, TicketFilter, TicketStatus, UpdateTicketRequest, ACTIVE_STATUSES,
};
use chrono::Utc;
use diesel::prelude::*;
use uuid::Uuid;

pub fn get_ticket(conn: &mut PgConnection, id: Uuid) -> QueryResult<Option<Ticket>> {
    tickets::table.find(id).first::<Ticket>(conn).optional()
}

pub fn list_tickets(conn: &mut PgConnection, filter: &TicketFilter) -> QueryResult<Vec<Ticket>> {
    let mut query = tickets::table.into_boxed();

    if let Some(status) = filter.status.as_deref() {
        query = query.filter(tickets::status.eq(status.to_string()));
    }
    if let Some(assigned) = filter.assigned {
        query = if assigned {
            query.filter(tickets::assigned_agent_id.is_not_null())
        } else {
            query.filter(tickets::assigned_agent_id.is_null())
        };
    }
    if let Some(agent_id) = filter.assigned_agent_id {
        query = query.filter(tickets::assigned_agent_id.eq(agent_id));
    }

    query.order(tickets::created_at.desc()).load::<Ticket>(conn)
}

pub fn insert_ticket(conn: &mut PgConnection, ticket: &Ticket) -> QueryResult<Ticket> {
    diesel::insert_into(tickets::table)
        .values(ticket)
        .get_result(conn)
}

pub fn update_ticket(
    conn: &mut PgConnection,
    id: Uuid,
    changes: &UpdateTicketRequest,
) -> QueryResult<Option<Ticket>> {
    diesel::update(tickets::table.find(id))
        .set((changes, tickets::updated_at.eq(Utc::now())))
        .get_result::<Ticket>(conn)
        .optional()
}

pub fn set_status(conn: &mut PgConnection, id: Uuid, status: TicketStatus) -> QueryResult<Ticket> {
    diesel::update(tickets::table.find(id))
        .set((
            tickets::status.eq(status.as_str()),
            tickets::updated_at.eq(Utc::now()),
        ))
        .get_result(conn)
}

/// Closes the ticket only if it is still active, returning `None` when a
/// concurrent request closed it first. The conditional write keeps the
/// close-side effects at exactly once per transition even when two close
/// requests read the same pre-close status.
pub fn close_if_active(conn: &mut PgConnection, id: Uuid) -> QueryResult<Option<Ticket>> {
    diesel::update(
        tickets::table
            .filter(tickets::id.eq(id))
            .filter(tickets::status.ne(TicketStatus::Closed.as_str())),
    )
    .set((
        tickets::status.eq(TicketStatus::Closed.as_str()),
        tickets::updated_at.eq(Utc::now()),
    ))
    .get_result(conn)
    .optional()
}

/// Writes an assignment and advances a fresh ticket to `in_progress`.
/// Callers run this inside a transaction so the row lock taken here holds
/// until the assignment commits.
pub fn save_assignment(
    conn: &mut PgConnection,
    ticket_id: Uuid,
    agent_id: Uuid,
) -> QueryResult<Ticket> {
    let ticket = tickets::table
        .find(ticket_id)
        .for_update()
        .first::<Ticket>(conn)?;

    let next_status = if ticket.status == TicketStatus::Open.as_str() {
        TicketStatus::InProgress.as_str()
    } else {
        ticket.status.as_str()
    };

    diesel::update(tickets::table.find(ticket_id))
        .set((
            tickets::assigned_agent_id.eq(agent_id),
            tickets::status.eq(next_status.to_string()),
            tickets::updated_at.eq(Utc::now()),
        ))
        .get_result(conn)
}

/// Oldest active ticket nobody owns yet, locked for the caller's
/// transaction. This is the FIFO pick used when an agent frees up.
/// SKIP LOCKED lets concurrent claimants take the first and second oldest
/// instead of one of them coming away empty after the row recheck.
pub fn oldest_unassigned_active(conn: &mut PgConnection) -> QueryResult<Option<Ticket>> {
    tickets::table
        .filter(tickets::assigned_agent_id.is_null())
        .filter(tickets::status.eq_any(ACTIVE_STATUSES))
        .order(tickets::created_at.asc())
        .for_update()
        .skip_locked()
        .first::<Ticket>(conn)
        .optional()
}

pub fn list_comments(conn: &mut PgConnection, ticket_id: Uuid) -> QueryResult<Vec<TicketComment>> {
    ticket_comments::table
        .filter(ticket_comments::ticket_id.eq(ticket_id))
        .order(ticket_comments::created_at.asc())
        .load(conn)
}

pub fn insert_comment(
    conn: &mut PgConnection,
    comment: &TicketComment,
) -> QueryResult<TicketComment> {
    diesel::insert_into(ticket_comments::table)
        .values(comment)
        .get_result(conn)
}

pub fn touch_ticket(conn: &mut PgConnection, id: Uuid) -> QueryResult<Ticket> {
    diesel::update(tickets::table.find(id))
        .set(tickets::updated_at.eq(Utc::now()))
        .get_result(conn)
}
