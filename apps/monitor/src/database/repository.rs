use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Row, TransactionBehavior, params, params::IntoParams};
use std::time::Duration;

use super::models::{MonitoredService, PingLogEntry};
use crate::monitoring::types::PingState;
use crate::pool::LibsqlPool;

const SERVICE_COLUMNS: &str = "id, name, kind, url, connection_identity, probe_text, response_pattern, recipients, ping_interval_seconds, timeout_seconds, active, last_request_at, last_response_at, ping_state, created_at, updated_at";

/// Database trait for abstracting database operations
///
/// The two transition methods are conditional updates: they only apply when
/// the stored record still matches what the caller observed, and they append
/// the ping log entry in the same transaction. A `false` return means another
/// writer got there first and nothing was written.
#[async_trait]
pub trait Database: Send + Sync {
    /// Get all active services
    async fn get_active_services(&self) -> Result<Vec<MonitoredService>>;

    /// Get every service, active or not
    async fn get_all_services(&self) -> Result<Vec<MonitoredService>>;

    /// Get a service by id
    async fn get_service(&self, id: i64) -> Result<Option<MonitoredService>>;

    /// Get a service by its unique name
    async fn get_service_by_name(&self, name: &str) -> Result<Option<MonitoredService>>;

    /// Active SMS services bound to a connection identity
    async fn find_sms_services_by_identity(&self, identity: &str) -> Result<Vec<MonitoredService>>;

    /// Insert a service, or update the configuration columns of an existing one
    async fn save_service(&self, service: &MonitoredService) -> Result<i64>;

    /// Move a service to `RequestSent` if its last request time is still `observed_request`
    async fn mark_request_sent(
        &self,
        service_id: i64,
        observed_request: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    /// Resolve the request sent at `request_at` into `state` if it is still outstanding
    async fn record_resolution(
        &self,
        service_id: i64,
        request_at: DateTime<Utc>,
        state: PingState,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    /// Ping log of a service, newest first
    async fn get_ping_log(&self, service_id: i64, limit: usize) -> Result<Vec<PingLogEntry>>;

    /// Failure entries across all services since `since`, newest first
    async fn get_recent_failures(&self, since: DateTime<Utc>, limit: usize) -> Result<Vec<PingLogEntry>>;
}

/// LibSQL database implementation
pub struct DatabaseImpl {
    pool: LibsqlPool,
}

impl DatabaseImpl {
    /// Create a new database instance from a pool
    pub fn new_from_pool(pool: LibsqlPool) -> Self {
        Self { pool }
    }

    /// Get a connection from the pool
    async fn get_conn(&self) -> Result<deadpool::managed::Object<crate::pool::LibsqlManager>> {
        Ok(self.pool.get().await?)
    }

    async fn query_services(&self, sql: &str, params: impl IntoParams + Send) -> Result<Vec<MonitoredService>> {
        let conn = self.get_conn().await?;
        let mut stmt = conn.prepare(sql).await?;
        let mut rows = stmt.query(params).await?;
        let mut services = Vec::new();

        while let Some(row) = rows.next().await? {
            services.push(service_from_row(&row)?);
        }

        Ok(services)
    }

    async fn query_log(&self, sql: &str, params: impl IntoParams + Send) -> Result<Vec<PingLogEntry>> {
        let conn = self.get_conn().await?;
        let mut stmt = conn.prepare(sql).await?;
        let mut rows = stmt.query(params).await?;
        let mut entries = Vec::new();

        while let Some(row) = rows.next().await? {
            let state: String = row.get(3)?;
            entries.push(PingLogEntry {
                id: Some(row.get(0)?),
                service_id: row.get(1)?,
                logged_at: MonitoredService::i64_to_timestamp(row.get(2)?),
                ping_state: state.parse()?,
            });
        }

        Ok(entries)
    }
}

fn service_from_row(row: &Row) -> Result<MonitoredService> {
    let kind: String = row.get(2)?;
    let state: String = row.get(13)?;

    Ok(MonitoredService {
        id: Some(row.get(0)?),
        name: row.get(1)?,
        kind: kind.parse()?,
        url: row.get(3)?,
        connection_identity: row.get(4)?,
        probe_text: row.get(5)?,
        response_pattern: row.get(6)?,
        recipients: row.get(7)?,
        ping_interval: Duration::from_secs(row.get::<i64>(8)?.max(0) as u64),
        timeout: Duration::from_secs(row.get::<i64>(9)?.max(0) as u64),
        active: row.get::<i64>(10)? != 0,
        last_request_at: row.get::<Option<i64>>(11)?.map(MonitoredService::i64_to_timestamp),
        last_response_at: row.get::<Option<i64>>(12)?.map(MonitoredService::i64_to_timestamp),
        ping_state: state.parse()?,
        created_at: MonitoredService::i64_to_timestamp(row.get(14)?),
        updated_at: MonitoredService::i64_to_timestamp(row.get(15)?),
    })
}

#[async_trait]
impl Database for DatabaseImpl {
    async fn get_active_services(&self) -> Result<Vec<MonitoredService>> {
        let sql = format!("SELECT {SERVICE_COLUMNS} FROM monitored_services WHERE active = 1 ORDER BY id");
        self.query_services(&sql, ()).await
    }

    async fn get_all_services(&self) -> Result<Vec<MonitoredService>> {
        let sql = format!("SELECT {SERVICE_COLUMNS} FROM monitored_services ORDER BY name");
        self.query_services(&sql, ()).await
    }

    async fn get_service(&self, id: i64) -> Result<Option<MonitoredService>> {
        let sql = format!("SELECT {SERVICE_COLUMNS} FROM monitored_services WHERE id = ?");
        Ok(self.query_services(&sql, params![id]).await?.into_iter().next())
    }

    async fn get_service_by_name(&self, name: &str) -> Result<Option<MonitoredService>> {
        let sql = format!("SELECT {SERVICE_COLUMNS} FROM monitored_services WHERE name = ?");
        Ok(self.query_services(&sql, params![name]).await?.into_iter().next())
    }

    async fn find_sms_services_by_identity(&self, identity: &str) -> Result<Vec<MonitoredService>> {
        let sql = format!(
            "SELECT {SERVICE_COLUMNS} FROM monitored_services WHERE kind = 'sms' AND active = 1 AND connection_identity = ?"
        );
        self.query_services(&sql, params![identity]).await
    }

    async fn save_service(&self, service: &MonitoredService) -> Result<i64> {
        let conn = self.get_conn().await?;
        let created_at = MonitoredService::timestamp_to_i64(service.created_at);
        let updated_at = MonitoredService::timestamp_to_i64(service.updated_at);

        if let Some(id) = service.id {
            // Runtime columns belong to the engine and are never overwritten here
            conn.execute(
                "UPDATE monitored_services SET name = ?, kind = ?, url = ?, connection_identity = ?, probe_text = ?, response_pattern = ?, recipients = ?, ping_interval_seconds = ?, timeout_seconds = ?, active = ?, updated_at = ? WHERE id = ?",
                params![
                    service.name.clone(),
                    service.kind.to_string(),
                    service.url.clone(),
                    service.connection_identity.clone(),
                    service.probe_text.clone(),
                    service.response_pattern.clone(),
                    service.recipients.clone(),
                    service.ping_interval.as_secs() as i64,
                    service.timeout.as_secs() as i64,
                    if service.active { 1 } else { 0 },
                    updated_at,
                    id
                ],
            )
            .await?;
            Ok(id)
        } else {
            conn.execute(
                "INSERT INTO monitored_services (name, kind, url, connection_identity, probe_text, response_pattern, recipients, ping_interval_seconds, timeout_seconds, active, last_request_at, last_response_at, ping_state, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    service.name.clone(),
                    service.kind.to_string(),
                    service.url.clone(),
                    service.connection_identity.clone(),
                    service.probe_text.clone(),
                    service.response_pattern.clone(),
                    service.recipients.clone(),
                    service.ping_interval.as_secs() as i64,
                    service.timeout.as_secs() as i64,
                    if service.active { 1 } else { 0 },
                    service.last_request_at.map(MonitoredService::timestamp_to_i64),
                    service.last_response_at.map(MonitoredService::timestamp_to_i64),
                    service.ping_state.as_str(),
                    created_at,
                    updated_at
                ],
            )
            .await?;

            Ok(conn.last_insert_rowid())
        }
    }

    async fn mark_request_sent(
        &self,
        service_id: i64,
        observed_request: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let conn = self.get_conn().await?;
        let now = MonitoredService::timestamp_to_i64(now);
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate).await?;

        // `IS` compares NULL to NULL as equal, covering never-probed services
        let changed = tx
            .execute(
                "UPDATE monitored_services SET last_request_at = ?, last_response_at = NULL, ping_state = ? WHERE id = ? AND active = 1 AND last_request_at IS ?",
                params![
                    now,
                    PingState::RequestSent.as_str(),
                    service_id,
                    observed_request.map(MonitoredService::timestamp_to_i64)
                ],
            )
            .await?;

        if changed == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        tx.execute(
            "INSERT INTO ping_log (service_id, logged_at, ping_state) VALUES (?, ?, ?)",
            params![service_id, now, PingState::RequestSent.as_str()],
        )
        .await?;
        tx.commit().await?;

        Ok(true)
    }

    async fn record_resolution(
        &self,
        service_id: i64,
        request_at: DateTime<Utc>,
        state: PingState,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let responded = match state {
            PingState::ValidResponseReceived | PingState::InvalidResponseReceived => true,
            PingState::NoResponse => false,
            other => return Err(anyhow!("{other} does not resolve an outstanding request")),
        };

        let conn = self.get_conn().await?;
        let now = MonitoredService::timestamp_to_i64(now);
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate).await?;

        let changed = tx
            .execute(
                "UPDATE monitored_services SET ping_state = ?, last_response_at = ? WHERE id = ? AND ping_state = ? AND last_request_at = ?",
                params![
                    state.as_str(),
                    if responded { Some(now) } else { None },
                    service_id,
                    PingState::RequestSent.as_str(),
                    MonitoredService::timestamp_to_i64(request_at)
                ],
            )
            .await?;

        if changed == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        tx.execute(
            "INSERT INTO ping_log (service_id, logged_at, ping_state) VALUES (?, ?, ?)",
            params![service_id, now, state.as_str()],
        )
        .await?;
        tx.commit().await?;

        Ok(true)
    }

    async fn get_ping_log(&self, service_id: i64, limit: usize) -> Result<Vec<PingLogEntry>> {
        self.query_log(
            "SELECT id, service_id, logged_at, ping_state FROM ping_log WHERE service_id = ? ORDER BY logged_at DESC, id DESC LIMIT ?",
            params![service_id, limit as i64],
        )
        .await
    }

    async fn get_recent_failures(&self, since: DateTime<Utc>, limit: usize) -> Result<Vec<PingLogEntry>> {
        self.query_log(
            "SELECT id, service_id, logged_at, ping_state FROM ping_log WHERE logged_at >= ? AND ping_state IN (?, ?) ORDER BY logged_at DESC, id DESC LIMIT ?",
            params![
                MonitoredService::timestamp_to_i64(since),
                PingState::NoResponse.as_str(),
                PingState::InvalidResponseReceived.as_str(),
                limit as i64
            ],
        )
        .await
    }
}
