#[cfg(test)]
mod assignment_flow_integration_tests {
    use chrono::Utc;
    use deskserver::assignment::{agent_stats, available_agents};
    use deskserver::auth::User;
    use deskserver::lifecycle;
    use deskserver::shared::schema::{tickets, users};
    use deskserver::shared::utils::{create_conn, run_migrations, DbPool};
    use deskserver::tickets::store;
    use deskserver::tickets::{CreateCommentRequest, CreateTicketRequest, TicketStatus};
    use diesel::prelude::*;
    use uuid::Uuid;

    fn test_pool() -> Option<DbPool> {
        let url = match std::env::var("DATABASE_URL") {
            Ok(url) => url,
            Err(_) => {
                println!("Skipping test - DATABASE_URL not available");
                return None;
            }
        };
        let pool = match create_conn(&url) {
            Ok(pool) => pool,
            Err(_) => {
                println!("Skipping test - database not reachable");
                return None;
            }
        };
        if run_migrations(&pool).is_err() {
            println!("Skipping test - migrations failed");
            return None;
        }
        Some(pool)
    }

    /// The flow assertions assume nobody else can take our tickets and
    /// nothing else is waiting in the queue.
    fn desk_is_quiet(conn: &mut PgConnection) -> bool {
        let idle = available_agents(conn).unwrap();
        let pending = store::oldest_unassigned_active(conn).unwrap();
        idle.is_empty() && pending.is_none()
    }

    fn insert_agent(conn: &mut PgConnection, marker: Uuid) -> User {
        let now = Utc::now();
        let agent = User {
            id: Uuid::new_v4(),
            username: format!("flow-agent-{marker}"),
            email: format!("flow-agent-{marker}@test.local"),
            full_name: format!("Flow Agent {marker}"),
            password_hash: "unused".to_string(),
            role: "agent".to_string(),
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        diesel::insert_into(users::table)
            .values(&agent)
            .execute(conn)
            .unwrap();
        agent
    }

    fn submission(marker: Uuid, subject: &str) -> CreateTicketRequest {
        CreateTicketRequest {
            client_name: Some("Flow Client".to_string()),
            client_email: Some(format!("flow-{marker}@test.local")),
            subject: Some(subject.to_string()),
            description: Some("integration flow".to_string()),
            ..Default::default()
        }
    }

    fn cleanup(conn: &mut PgConnection, marker: Uuid, agent_id: Option<Uuid>) {
        diesel::delete(
            tickets::table.filter(tickets::client_email.eq(format!("flow-{marker}@test.local"))),
        )
        .execute(conn)
        .ok();
        if let Some(id) = agent_id {
            diesel::delete(users::table.filter(users::id.eq(id)))
                .execute(conn)
                .ok();
        }
    }

    #[test]
    fn ticket_flow_assigns_then_reassigns_fifo() {
        let Some(pool) = test_pool() else { return };
        let mut conn = pool.get().unwrap();
        if !desk_is_quiet(&mut conn) {
            println!("Skipping test - database already has idle agents or pending tickets");
            return;
        }

        let marker = Uuid::new_v4();
        let agent = insert_agent(&mut conn, marker);

        // One idle agent: the first ticket lands on them immediately.
        let (first, events) =
            lifecycle::create_ticket(&mut conn, submission(marker, "first")).unwrap();
        assert_eq!(first.assigned_agent_id, Some(agent.id));
        assert_eq!(first.status, TicketStatus::InProgress.as_str());
        assert_eq!(events.len(), 3);

        // Agent is now busy: later tickets queue up unassigned.
        let (second, events) =
            lifecycle::create_ticket(&mut conn, submission(marker, "second")).unwrap();
        assert_eq!(second.assigned_agent_id, None);
        assert_eq!(second.status, TicketStatus::Open.as_str());
        assert_eq!(events.len(), 1);

        let (third, _) = lifecycle::create_ticket(&mut conn, submission(marker, "third")).unwrap();
        assert_eq!(third.assigned_agent_id, None);

        // Closing the first frees the agent, who pulls the oldest pending
        // ticket, not the newest.
        let (closed, events) =
            lifecycle::change_status(&mut conn, first.id, TicketStatus::Closed).unwrap();
        assert_eq!(closed.status, TicketStatus::Closed.as_str());
        assert_eq!(events.len(), 3);

        let second_now = store::get_ticket(&mut conn, second.id).unwrap().unwrap();
        assert_eq!(second_now.assigned_agent_id, Some(agent.id));
        assert_eq!(second_now.status, TicketStatus::InProgress.as_str());
        let third_now = store::get_ticket(&mut conn, third.id).unwrap().unwrap();
        assert_eq!(third_now.assigned_agent_id, None);

        let (_, events) =
            lifecycle::change_status(&mut conn, second.id, TicketStatus::Closed).unwrap();
        assert_eq!(events.len(), 3);
        let third_now = store::get_ticket(&mut conn, third.id).unwrap().unwrap();
        assert_eq!(third_now.assigned_agent_id, Some(agent.id));

        // Nothing left to hand over after the last close.
        let (_, events) =
            lifecycle::change_status(&mut conn, third.id, TicketStatus::Closed).unwrap();
        assert_eq!(events.len(), 1);

        // Closed tickets do not count against capacity.
        let idle = available_agents(&mut conn).unwrap();
        assert!(idle.iter().any(|a| a.id == agent.id));

        cleanup(&mut conn, marker, Some(agent.id));
    }

    #[test]
    fn concurrent_creations_claim_one_agent_exactly_once() {
        let Some(pool) = test_pool() else { return };
        let mut conn = pool.get().unwrap();
        if !desk_is_quiet(&mut conn) {
            println!("Skipping test - database already has idle agents or pending tickets");
            return;
        }

        let marker = Uuid::new_v4();
        let agent = insert_agent(&mut conn, marker);

        // A burst of simultaneous submissions races for the single idle
        // agent; the locked availability read serializes the claims.
        let handles: Vec<_> = (0..6)
            .map(|i| {
                let pool = pool.clone();
                std::thread::spawn(move || {
                    let mut conn = pool.get().unwrap();
                    lifecycle::create_ticket(&mut conn, submission(marker, &format!("burst-{i}")))
                        .unwrap()
                        .0
                })
            })
            .collect();
        let created: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let assigned: Vec<_> = created
            .iter()
            .filter(|t| t.assigned_agent_id.is_some())
            .collect();
        assert_eq!(assigned.len(), 1);
        assert_eq!(assigned[0].assigned_agent_id, Some(agent.id));
        assert_eq!(assigned[0].status, TicketStatus::InProgress.as_str());
        for waiting in created.iter().filter(|t| t.assigned_agent_id.is_none()) {
            assert_eq!(waiting.status, TicketStatus::Open.as_str());
        }

        cleanup(&mut conn, marker, Some(agent.id));
    }

    #[test]
    fn racing_closes_write_exactly_once() {
        let Some(pool) = test_pool() else { return };
        let mut conn = pool.get().unwrap();

        let marker = Uuid::new_v4();
        let (ticket, _) = lifecycle::create_ticket(&mut conn, submission(marker, "raced")).unwrap();

        // Two closers read the same active ticket; only the first
        // conditional write lands.
        let first = store::close_if_active(&mut conn, ticket.id).unwrap();
        assert_eq!(first.unwrap().status, TicketStatus::Closed.as_str());
        assert!(store::close_if_active(&mut conn, ticket.id).unwrap().is_none());

        // The loser surfaces the closed ticket without a second round of
        // close events.
        let (again, events) =
            lifecycle::change_status(&mut conn, ticket.id, TicketStatus::Closed).unwrap();
        assert_eq!(again.status, TicketStatus::Closed.as_str());
        assert!(events.is_empty());

        cleanup(&mut conn, marker, None);
    }

    #[test]
    fn closed_is_terminal_but_idempotent() {
        let Some(pool) = test_pool() else { return };
        let mut conn = pool.get().unwrap();
        if !desk_is_quiet(&mut conn) {
            println!("Skipping test - database already has idle agents or pending tickets");
            return;
        }

        let marker = Uuid::new_v4();
        // No agents around: the ticket stays open and unassigned.
        let (ticket, events) =
            lifecycle::create_ticket(&mut conn, submission(marker, "loner")).unwrap();
        assert_eq!(ticket.status, TicketStatus::Open.as_str());
        assert_eq!(events.len(), 1);

        let (closed, events) =
            lifecycle::change_status(&mut conn, ticket.id, TicketStatus::Closed).unwrap();
        assert_eq!(closed.status, TicketStatus::Closed.as_str());
        assert_eq!(events.len(), 1);

        // Closing again changes nothing and stays silent.
        let (again, events) =
            lifecycle::change_status(&mut conn, ticket.id, TicketStatus::Closed).unwrap();
        assert_eq!(again.status, TicketStatus::Closed.as_str());
        assert!(events.is_empty());

        // Reopening in any direction is rejected.
        for next in [TicketStatus::Open, TicketStatus::InProgress] {
            let err = lifecycle::change_status(&mut conn, ticket.id, next).unwrap_err();
            assert_eq!(err.to_string(), "Closed tickets cannot be reopened");
        }

        cleanup(&mut conn, marker, None);
    }

    #[test]
    fn manual_assignment_ignores_load_but_not_closure() {
        let Some(pool) = test_pool() else { return };
        let mut conn = pool.get().unwrap();
        if !desk_is_quiet(&mut conn) {
            println!("Skipping test - database already has idle agents or pending tickets");
            return;
        }

        let marker = Uuid::new_v4();
        let agent = insert_agent(&mut conn, marker);

        let (first, _) = lifecycle::create_ticket(&mut conn, submission(marker, "first")).unwrap();
        assert_eq!(first.assigned_agent_id, Some(agent.id));
        let (second, _) =
            lifecycle::create_ticket(&mut conn, submission(marker, "second")).unwrap();
        assert_eq!(second.assigned_agent_id, None);

        // The agent is busy, but a manual override still sticks.
        let (second, events) = lifecycle::assign_manual(&mut conn, second.id, agent.id).unwrap();
        assert_eq!(second.assigned_agent_id, Some(agent.id));
        assert_eq!(second.status, TicketStatus::InProgress.as_str());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].describe(), "agent assignment");

        let stats = agent_stats(&mut conn).unwrap();
        let mine = stats.iter().find(|s| s.agent_id == agent.id).unwrap();
        assert_eq!(mine.active_tickets, 2);
        assert!(!mine.available);

        // Closed tickets cannot be handed to anyone.
        lifecycle::change_status(&mut conn, first.id, TicketStatus::Closed).unwrap();
        let err = lifecycle::assign_manual(&mut conn, first.id, agent.id).unwrap_err();
        assert_eq!(err.to_string(), "Cannot assign a closed ticket");

        cleanup(&mut conn, marker, Some(agent.id));
    }

    #[test]
    fn comments_touch_the_ticket_and_internal_notes_stay_silent() {
        let Some(pool) = test_pool() else { return };
        let mut conn = pool.get().unwrap();

        let marker = Uuid::new_v4();
        let (ticket, _) =
            lifecycle::create_ticket(&mut conn, submission(marker, "chatty")).unwrap();

        let (comment, events) = lifecycle::add_comment(
            &mut conn,
            ticket.id,
            CreateCommentRequest {
                author_name: Some("Flow Client".to_string()),
                author_email: Some(format!("flow-{marker}@test.local")),
                content: Some("Any update?".to_string()),
                is_internal: None,
            },
        )
        .unwrap();
        assert!(!comment.is_internal);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].describe(), "ticket update");

        let (note, events) = lifecycle::add_comment(
            &mut conn,
            ticket.id,
            CreateCommentRequest {
                author_name: Some("Flow Agent".to_string()),
                author_email: Some(format!("flow-agent-{marker}@test.local")),
                content: Some("Spare part ordered, do not tell the client yet.".to_string()),
                is_internal: Some(true),
            },
        )
        .unwrap();
        assert!(note.is_internal);
        assert!(events.is_empty());

        let listed = store::list_comments(&mut conn, ticket.id).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].content, "Any update?");

        let touched = store::get_ticket(&mut conn, ticket.id).unwrap().unwrap();
        assert!(touched.updated_at >= ticket.updated_at);

        cleanup(&mut conn, marker, None);
    }

    #[test]
    fn rejects_incomplete_submission() {
        let Some(pool) = test_pool() else { return };
        let mut conn = pool.get().unwrap();

        let err = lifecycle::create_ticket(
            &mut conn,
            CreateTicketRequest {
                client_name: Some("No Email".to_string()),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "client_email is required");
    }
}
