//! Automatic ticket routing. Two deliberately different policies live here:
//! a uniform-random pick among idle agents when a ticket is created, and a
//! strict FIFO hand-off of the oldest pending ticket when an agent frees up.

use crate::auth::{User, UserRole};
use crate::shared::schema::{tickets, users};
use crate::tickets::store;
use crate::tickets::{Ticket, TicketStatus, ACTIVE_STATUSES};
use diesel::dsl::count_star;
use diesel::prelude::*;
use log::info;
use rand::seq::IndexedRandom;
use rand::Rng;
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

pub mod availability;

pub use availability::{available_agents, busy_agent_ids, filter_idle};

/// Uniform-random selection, pulled out of the query path so it can be
/// driven by a seeded RNG in tests.
pub fn choose_agent<'a, R: Rng + ?Sized>(agents: &'a [User], rng: &mut R) -> Option<&'a User> {
    agents.choose(rng)
}

/// Tries to hand a brand-new ticket to an idle agent. Runs inside the
/// caller's creation transaction and only mutates the in-memory row; the
/// caller inserts it. Returns the chosen agent, if any.
pub fn assign_on_creation(
    conn: &mut PgConnection,
    ticket: &mut Ticket,
) -> QueryResult<Option<User>> {
    let candidates = availability::available_agents_locked(conn)?;
    let chosen = choose_agent(&candidates, &mut rand::rng()).cloned();

    match &chosen {
        Some(agent) => {
            ticket.assigned_agent_id = Some(agent.id);
            if ticket.status == TicketStatus::Open.as_str() {
                ticket.status = TicketStatus::InProgress.as_str().to_string();
            }
            info!(
                "Assigning new ticket {} to agent {}",
                ticket.id, agent.username
            );
        }
        None => {
            info!("No idle agent for ticket {}, leaving it unassigned", ticket.id);
        }
    }
    Ok(chosen)
}

/// FIFO hand-off at freed capacity: the oldest active unassigned ticket
/// goes straight to the agent who just closed one. Runs inside the
/// caller's transaction.
pub fn reassign_freed_capacity(
    conn: &mut PgConnection,
    freed_agent_id: Uuid,
) -> QueryResult<Option<Ticket>> {
    let pending = match store::oldest_unassigned_active(conn)? {
        Some(ticket) => ticket,
        None => return Ok(None),
    };

    let updated = store::save_assignment(conn, pending.id, freed_agent_id)?;
    info!(
        "Reassigned pending ticket {} to freed agent {}",
        updated.id, freed_agent_id
    );
    Ok(Some(updated))
}

#[derive(Debug, Serialize)]
pub struct AgentStats {
    pub agent_id: Uuid,
    pub username: String,
    pub full_name: String,
    pub active_tickets: i64,
    pub available: bool,
}

/// Per-agent active ticket counts plus the derived availability flag.
pub fn agent_stats(conn: &mut PgConnection) -> QueryResult<Vec<AgentStats>> {
    let agents = users::table
        .filter(users::is_active.eq(true))
        .filter(users::role.eq(UserRole::Agent.as_str()))
        .order(users::full_name.asc())
        .load::<User>(conn)?;

    let counts: Vec<(Option<Uuid>, i64)> = tickets::table
        .filter(tickets::status.eq_any(ACTIVE_STATUSES))
        .filter(tickets::assigned_agent_id.is_not_null())
        .group_by(tickets::assigned_agent_id)
        .select((tickets::assigned_agent_id, count_star()))
        .load(conn)?;
    let by_agent: HashMap<Uuid, i64> = counts
        .into_iter()
        .filter_map(|(id, n)| id.map(|id| (id, n)))
        .collect();

    Ok(agents
        .into_iter()
        .map(|agent| {
            let active_tickets = by_agent.get(&agent.id).copied().unwrap_or(0);
            AgentStats {
                agent_id: agent.id,
                username: agent.username,
                full_name: agent.full_name,
                active_tickets,
                available: active_tickets == 0,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn agent(name: &str) -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            username: name.to_string(),
            email: format!("{name}@example.com"),
            full_name: name.to_string(),
            password_hash: String::new(),
            role: "agent".to_string(),
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn chooses_nobody_from_empty_pool() {
        let mut rng = StdRng::seed_from_u64(7);
        assert!(choose_agent(&[], &mut rng).is_none());
    }

    #[test]
    fn single_candidate_always_wins() {
        let pool = vec![agent("ana")];
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..10 {
            let picked = choose_agent(&pool, &mut rng).unwrap();
            assert_eq!(picked.username, "ana");
        }
    }

    #[test]
    fn seeded_choice_stays_inside_pool_and_varies() {
        let pool: Vec<User> = ["ana", "bruno", "carla", "dario"]
            .iter()
            .map(|n| agent(n))
            .collect();
        let mut rng = StdRng::seed_from_u64(42);

        let mut seen = std::collections::HashSet::new();
        for _ in 0..100 {
            let picked = choose_agent(&pool, &mut rng).unwrap();
            assert!(pool.iter().any(|a| a.id == picked.id));
            seen.insert(picked.id);
        }
        // 100 draws over 4 agents; a pick that never varies would mean the
        // selection is not actually random.
        assert!(seen.len() > 1);
    }
}
