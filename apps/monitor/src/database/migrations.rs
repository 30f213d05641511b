use anyhow::Result;
use chrono::Utc;
use libsql::Connection;

/// Schema version - increment when making schema changes
const SCHEMA_VERSION: i32 = 1;

/// Run database migrations
///
/// This is the single source of truth for the database schema. The
/// administrative tooling that edits services only writes configuration
/// columns and never runs migrations itself.
pub async fn run_migrations(conn: &Connection) -> Result<()> {
    // Create schema_migrations table first (tracks applied migrations)
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL,
            description TEXT
        )",
        (),
    )
    .await?;

    let current_version = get_current_version(conn).await?;

    if current_version >= SCHEMA_VERSION {
        tracing::info!("Database schema is up to date (version {})", current_version);
        return Ok(());
    }

    tracing::info!("Running migrations from version {} to {}", current_version, SCHEMA_VERSION);

    if current_version < 1 {
        run_migration_v1(conn).await?;
        record_migration(conn, 1, "Monitored services and ping log").await?;
    }

    tracing::info!("Database migrations completed successfully (now at version {})", SCHEMA_VERSION);
    Ok(())
}

/// Get current schema version from database
async fn get_current_version(conn: &Connection) -> Result<i32> {
    let mut rows = conn.query("SELECT MAX(version) FROM schema_migrations", ()).await?;

    if let Some(row) = rows.next().await? {
        let version: Option<i32> = row.get(0)?;
        Ok(version.unwrap_or(0))
    } else {
        Ok(0)
    }
}

/// Record that a migration was applied
async fn record_migration(conn: &Connection, version: i32, description: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO schema_migrations (version, applied_at, description) VALUES (?, ?, ?)",
        libsql::params![version, Utc::now().timestamp(), description],
    )
    .await?;

    tracing::info!("Applied migration v{}: {}", version, description);
    Ok(())
}

/// Migration v1: Initial schema
/// Creates monitored_services and the append-only ping_log
async fn run_migration_v1(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS monitored_services (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            kind TEXT NOT NULL CHECK (kind IN ('http', 'sms')),
            url TEXT,
            connection_identity TEXT,
            probe_text TEXT NOT NULL DEFAULT '',
            response_pattern TEXT,
            recipients TEXT NOT NULL DEFAULT '',
            ping_interval_seconds INTEGER NOT NULL,
            timeout_seconds INTEGER NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            last_request_at INTEGER,
            last_response_at INTEGER,
            ping_state TEXT NOT NULL DEFAULT 'never_probed',
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )",
        (),
    )
    .await?;

    // Log rows outlive deactivation, so no ON DELETE CASCADE here
    conn.execute(
        "CREATE TABLE IF NOT EXISTS ping_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            service_id INTEGER NOT NULL,
            logged_at INTEGER NOT NULL,
            ping_state TEXT NOT NULL,
            FOREIGN KEY (service_id) REFERENCES monitored_services(id)
        )",
        (),
    )
    .await?;

    conn.execute("CREATE INDEX IF NOT EXISTS idx_services_active ON monitored_services(active)", ()).await?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_services_connection_identity ON monitored_services(connection_identity)",
        (),
    )
    .await?;

    conn.execute("CREATE INDEX IF NOT EXISTS idx_ping_log_service_id ON ping_log(service_id)", ()).await?;
    conn.execute("CREATE INDEX IF NOT EXISTS idx_ping_log_logged_at ON ping_log(logged_at DESC)", ()).await?;
    conn.execute("CREATE INDEX IF NOT EXISTS idx_ping_log_ping_state ON ping_log(ping_state)", ()).await?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_ping_log_service_logged_at ON ping_log(service_id, logged_at DESC)",
        (),
    )
    .await?;

    Ok(())
}
