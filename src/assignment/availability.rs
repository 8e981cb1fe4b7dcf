//! Derives which agents can take a new ticket. Busy is never stored on the
//! user row; it is recomputed from the live ticket set on every call.

use crate::auth::{User, UserRole};
use crate::shared::schema::{tickets, users};
use crate::tickets::ACTIVE_STATUSES;
use diesel::prelude::*;
use std::collections::HashSet;
use uuid::Uuid;

/// Ids of agents currently holding at least one open or in-progress ticket.
pub fn busy_agent_ids(conn: &mut PgConnection) -> QueryResult<HashSet<Uuid>> {
    let ids: Vec<Option<Uuid>> = tickets::table
        .filter(tickets::status.eq_any(ACTIVE_STATUSES))
        .filter(tickets::assigned_agent_id.is_not_null())
        .select(tickets::assigned_agent_id)
        .distinct()
        .load(conn)?;
    Ok(ids.into_iter().flatten().collect())
}

/// Active agents with no active ticket on their plate right now.
pub fn available_agents(conn: &mut PgConnection) -> QueryResult<Vec<User>> {
    let agents = users::table
        .filter(users::is_active.eq(true))
        .filter(users::role.eq(UserRole::Agent.as_str()))
        .load::<User>(conn)?;
    let busy = busy_agent_ids(conn)?;
    Ok(filter_idle(agents, &busy))
}

/// Like [`available_agents`] but locks the candidate rows first, so
/// concurrent assignment decisions against the same pool of agents
/// serialize and each sees the other's committed tickets.
pub(crate) fn available_agents_locked(conn: &mut PgConnection) -> QueryResult<Vec<User>> {
    let agents = users::table
        .filter(users::is_active.eq(true))
        .filter(users::role.eq(UserRole::Agent.as_str()))
        .for_update()
        .load::<User>(conn)?;
    let busy = busy_agent_ids(conn)?;
    Ok(filter_idle(agents, &busy))
}

pub fn filter_idle(agents: Vec<User>, busy: &HashSet<Uuid>) -> Vec<User> {
    agents
        .into_iter()
        .filter(|agent| !busy.contains(&agent.id))
        .collect()
}
