/// Database abstraction layer
///
/// This module provides the persistent service registry and the append-only
/// ping log behind the `Database` trait, backed by LibSQL.

pub mod repository;
pub mod migrations;
pub mod models;

pub use repository::{Database, DatabaseImpl};

use anyhow::Result;

/// Initialize database with schema
pub async fn initialize_database(conn: &libsql::Connection) -> Result<()> {
    migrations::run_migrations(conn).await
}
