//! Outbound workflow notifications. State changes produce `TicketEvent`s
//! that are posted to the automation engine (n8n-style webhooks) after the
//! database work has committed. Delivery is fire-and-forget: failures are
//! logged and never surface to the API caller.

use crate::auth::User;
use crate::config::WebhookConfig;
use crate::tickets::Ticket;
use async_trait::async_trait;
use log::{error, info, warn};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Point-in-time view of a ticket. Events are delivered after commit from a
/// spawned task, so they carry their own copy of everything the payload
/// needs instead of re-reading rows that may have moved on.
#[derive(Debug, Clone)]
pub struct TicketSnapshot {
    pub ticket_id: Uuid,
    pub client_name: String,
    pub client_email: String,
    pub client_phone: Option<String>,
    pub subject: String,
    pub description: String,
    pub status: String,
    pub priority: String,
    pub category: Option<String>,
    pub department: Option<String>,
    pub agent_name: Option<String>,
    pub agent_email: Option<String>,
}

impl TicketSnapshot {
    fn capture(ticket: &Ticket, agent: Option<&User>) -> Self {
        Self {
            ticket_id: ticket.id,
            client_name: ticket.client_name.clone(),
            client_email: ticket.client_email.clone(),
            client_phone: ticket.client_phone.clone(),
            subject: ticket.subject.clone(),
            description: ticket.description.clone(),
            status: ticket.status.clone(),
            priority: ticket.priority.clone(),
            category: ticket.category.clone(),
            department: ticket.department.clone(),
            agent_name: agent.map(|a| a.full_name.clone()),
            agent_email: agent.map(|a| a.email.clone()),
        }
    }
}

#[derive(Debug, Clone)]
pub enum TicketEvent {
    Created(TicketSnapshot),
    Updated {
        snapshot: TicketSnapshot,
        message: String,
    },
    Closed(TicketSnapshot),
    AgentAssigned(TicketSnapshot),
}

impl TicketEvent {
    pub fn created(ticket: &Ticket) -> Self {
        TicketEvent::Created(TicketSnapshot::capture(ticket, None))
    }

    pub fn updated(ticket: &Ticket, agent: Option<&User>, message: String) -> Self {
        TicketEvent::Updated {
            snapshot: TicketSnapshot::capture(ticket, agent),
            message,
        }
    }

    pub fn closed(ticket: &Ticket, agent: Option<&User>) -> Self {
        TicketEvent::Closed(TicketSnapshot::capture(ticket, agent))
    }

    pub fn agent_assigned(ticket: &Ticket, agent: &User) -> Self {
        TicketEvent::AgentAssigned(TicketSnapshot::capture(ticket, Some(agent)))
    }

    fn snapshot(&self) -> &TicketSnapshot {
        match self {
            TicketEvent::Created(s) | TicketEvent::Closed(s) | TicketEvent::AgentAssigned(s) => s,
            TicketEvent::Updated { snapshot, .. } => snapshot,
        }
    }

    pub fn ticket_id(&self) -> Uuid {
        self.snapshot().ticket_id
    }

    pub fn describe(&self) -> &'static str {
        match self {
            TicketEvent::Created(_) => "new ticket",
            TicketEvent::Updated { .. } => "ticket update",
            TicketEvent::Closed(_) => "ticket close",
            TicketEvent::AgentAssigned(_) => "agent assignment",
        }
    }

    pub fn target_url<'a>(&self, config: &'a WebhookConfig) -> &'a str {
        match self {
            TicketEvent::Created(_) => &config.new_ticket_url,
            TicketEvent::Updated { .. } => &config.update_ticket_url,
            TicketEvent::Closed(_) => &config.close_ticket_url,
            TicketEvent::AgentAssigned(_) => &config.agent_assignment_url,
        }
    }

    /// JSON body for the webhook POST. Multi-word keys are duplicated in
    /// snake_case and camelCase because existing workflows read both
    /// spellings.
    pub fn payload(&self) -> Value {
        let s = self.snapshot();
        let mut body = json!({
            "ticket_id": s.ticket_id,
            "ticketId": s.ticket_id,
            "client_name": s.client_name,
            "clientName": s.client_name,
            "client_email": s.client_email,
            "clientEmail": s.client_email,
            "client_phone": s.client_phone,
            "clientPhone": s.client_phone,
            "subject": s.subject,
            "category": s.category,
            "department": s.department,
        });

        match self {
            TicketEvent::Created(_) => {
                body["description"] = json!(s.description);
                body["priority"] = json!(s.priority);
            }
            TicketEvent::Updated { message, .. } => {
                body["comment_text"] = json!(message);
                body["commentText"] = json!(message);
                body["agent_name"] = json!(s.agent_name);
                body["agentName"] = json!(s.agent_name);
                body["agent_email"] = json!(s.agent_email);
                body["agentEmail"] = json!(s.agent_email);
            }
            TicketEvent::Closed(_) => {
                body["agent_name"] = json!(s.agent_name);
                body["agentName"] = json!(s.agent_name);
                body["agent_email"] = json!(s.agent_email);
                body["agentEmail"] = json!(s.agent_email);
            }
            TicketEvent::AgentAssigned(_) => {
                body["description"] = json!(s.description);
                body["priority"] = json!(s.priority);
                body["agent_name"] = json!(s.agent_name);
                body["agentName"] = json!(s.agent_name);
                body["agent_email"] = json!(s.agent_email);
                body["agentEmail"] = json!(s.agent_email);
            }
        }
        body
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("webhook request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("webhook returned status {0}")]
    Status(reqwest::StatusCode),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, event: &TicketEvent) -> Result<(), NotifyError>;
}

pub struct WebhookNotifier {
    client: reqwest::Client,
    config: WebhookConfig,
}

impl WebhookNotifier {
    pub fn new(config: WebhookConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn deliver(&self, event: &TicketEvent) -> Result<(), NotifyError> {
        let url = event.target_url(&self.config);
        if url.is_empty() {
            warn!(
                "No webhook URL configured for {} events, skipping",
                event.describe()
            );
            return Ok(());
        }

        let response = self.client.post(url).json(&event.payload()).send().await?;
        if !response.status().is_success() {
            return Err(NotifyError::Status(response.status()));
        }

        info!(
            "Delivered {} webhook for ticket {}",
            event.describe(),
            event.ticket_id()
        );
        Ok(())
    }
}

/// Sends a batch of events on a background task, preserving their order.
/// Delivery problems are logged and swallowed; they never reach the request
/// that produced the events. The handle is returned for tests that need to
/// await the drain.
pub fn dispatch(
    notifier: Arc<dyn Notifier>,
    events: Vec<TicketEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        for event in events {
            if let Err(e) = notifier.deliver(&event).await {
                error!(
                    "Failed to deliver {} webhook for ticket {}: {e}",
                    event.describe(),
                    event.ticket_id()
                );
            }
        }
    })
}
