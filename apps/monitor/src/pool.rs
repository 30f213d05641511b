use std::time::Duration;

use deadpool::managed::{self, Pool, RecycleError, RecycleResult};
use libsql::{Connection, Database, Error as LibsqlError};

/// How long a connection waits on a locked database before giving up
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct LibsqlManager {
    database: Database,
}

impl LibsqlManager {
    pub fn new(database: Database) -> Self {
        Self { database }
    }
}

impl managed::Manager for LibsqlManager {
    type Type = Connection;
    type Error = LibsqlError;

    async fn create(&self) -> Result<Self::Type, Self::Error> {
        let conn = self.database.connect()?;
        conn.query(&format!("PRAGMA busy_timeout = {}", BUSY_TIMEOUT.as_millis()), ()).await?;
        // WAL lets the inbound webhook read while a poll cycle writes
        conn.query("PRAGMA journal_mode = WAL", ()).await?;
        conn.execute("PRAGMA foreign_keys = ON", ()).await?;
        Ok(conn)
    }

    async fn recycle(
        &self,
        conn: &mut Self::Type,
        _: &managed::Metrics,
    ) -> RecycleResult<Self::Error> {
        let row = conn.query("SELECT 1", ()).await?.next().await?;
        match row {
            Some(_) => Ok(()),
            None => Err(RecycleError::Message("connection returned no row for SELECT 1".into())),
        }
    }
}

pub type LibsqlPool = Pool<LibsqlManager>;

/// Open (or create) the local database file and wrap it in a pool
pub async fn connect(path: &str) -> anyhow::Result<LibsqlPool> {
    let database = libsql::Builder::new_local(path).build().await?;
    let pool = Pool::builder(LibsqlManager::new(database))
        .config(managed::PoolConfig::default())
        .build()?;
    Ok(pool)
}
