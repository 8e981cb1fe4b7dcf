use crate::shared::error::ServiceError;
use anyhow::Context;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use log::info;

pub type DbPool = Pool<ConnectionManager<PgConnection>>;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

pub fn create_conn(database_url: &str) -> anyhow::Result<DbPool> {
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool = Pool::builder()
        .max_size(10)
        .build(manager)
        .context("Failed to create database connection pool")?;
    Ok(pool)
}

pub fn run_migrations(pool: &DbPool) -> anyhow::Result<()> {
    let mut conn = pool
        .get()
        .context("Failed to get connection for migrations")?;
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| anyhow::anyhow!("Failed to run migrations: {e}"))?;
    if !applied.is_empty() {
        info!("Applied {} pending database migrations", applied.len());
    }
    Ok(())
}

/// Pulls a required request field out of its `Option`, rejecting missing or
/// blank values with a field-specific validation error.
pub fn require_field(value: Option<String>, field: &str) -> Result<String, ServiceError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ServiceError::Validation(format!("{field} is required"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_field_accepts_present_value() {
        let value = require_field(Some("Printer is on fire".to_string()), "subject");
        assert_eq!(value.unwrap(), "Printer is on fire");
    }

    #[test]
    fn require_field_rejects_missing_and_blank() {
        for input in [None, Some(String::new()), Some("   ".to_string())] {
            let err = require_field(input, "subject").unwrap_err();
            assert_eq!(err.to_string(), "subject is required");
        }
    }
}
