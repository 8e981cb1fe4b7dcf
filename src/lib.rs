//! deskserver: a helpdesk ticketing backend. Tickets are routed to idle
//! agents automatically, walk a small open → in_progress → closed state
//! machine, and every state change fans out to workflow webhooks after
//! commit.

pub mod assignment;
pub mod auth;
pub mod config;
pub mod lifecycle;
pub mod main_module;
pub mod security;
pub mod shared;
pub mod tickets;
pub mod webhooks;
