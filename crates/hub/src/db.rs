use anyhow::{Context, Result};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{FromRow, Pool, Sqlite};
use std::str::FromStr;

use automation_engine::Verdict;

#[derive(Clone)]
pub struct Db {
    pool: Pool<Sqlite>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct DeviceRow {
    pub device_id: String,
    pub name: String,
}

/// One persisted engine verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct VerdictRecord {
    pub ts: i64,
    pub day: String, // YYYY-MM-DD, local
    pub device_id: String,
    pub action: String,
    pub reason: String,
    pub is_holiday: bool,
    pub applied_start: Option<String>,
    pub applied_end: Option<String>,
}

impl VerdictRecord {
    pub fn new(ts: i64, day: &str, device_id: &str, v: &Verdict) -> Self {
        Self {
            ts,
            day: day.to_string(),
            device_id: device_id.to_string(),
            action: v.action.as_str().to_string(),
            reason: v.reason.as_str().to_string(),
            is_holiday: v.is_holiday_today,
            applied_start: v.applied_schedule.as_ref().map(|s| s.start_hour.to_string()),
            applied_end: v.applied_schedule.as_ref().map(|s| s.end_hour.to_string()),
        }
    }
}

impl Db {
    /// db_url examples:
    /// - "sqlite:/var/lib/automation/verdicts.db"
    /// - "sqlite::memory:" (tests)
    pub async fn connect(db_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(db_url)
            .with_context(|| format!("invalid sqlite connection string: {db_url}"))?
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        // Every connection to ":memory:" is its own database.
        let max_connections = if db_url.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .with_context(|| format!("failed to connect to sqlite db: {db_url}"))?;

        Ok(Self { pool })
    }

    /// Runs SQLx migrations from ./migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("failed to run migrations")?;
        Ok(())
    }

    // ----------------------------
    // Devices
    // ----------------------------

    pub async fn upsert_device(&self, device_id: &str, name: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO devices (device_id, name)
            VALUES (?, ?)
            ON CONFLICT(device_id) DO UPDATE SET
              name=excluded.name
            "#,
        )
        .bind(device_id)
        .bind(name)
        .execute(&self.pool)
        .await
        .context("upsert_device failed")?;
        Ok(())
    }

    pub async fn load_devices(&self) -> Result<Vec<DeviceRow>> {
        sqlx::query_as::<_, DeviceRow>(
            r#"
            SELECT device_id, name
            FROM devices
            ORDER BY device_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("load_devices failed")
    }

    // ----------------------------
    // Verdict log
    // ----------------------------

    pub async fn insert_verdict(&self, r: &VerdictRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO verdicts (
              ts, day, device_id, action, reason,
              is_holiday, applied_start, applied_end
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(r.ts)
        .bind(&r.day)
        .bind(&r.device_id)
        .bind(&r.action)
        .bind(&r.reason)
        .bind(r.is_holiday)
        .bind(&r.applied_start)
        .bind(&r.applied_end)
        .execute(&self.pool)
        .await
        .context("insert_verdict failed")?;
        Ok(())
    }

    /// All verdicts of one device on one local day, oldest first.
    pub async fn verdicts_for_day(&self, day: &str, device_id: &str) -> Result<Vec<VerdictRecord>> {
        sqlx::query_as::<_, VerdictRecord>(
            r#"
            SELECT ts, day, device_id, action, reason,
                   is_holiday, applied_start, applied_end
            FROM verdicts
            WHERE day = ? AND device_id = ?
            ORDER BY ts, id
            "#,
        )
        .bind(day)
        .bind(device_id)
        .fetch_all(&self.pool)
        .await
        .context("verdicts_for_day failed")
    }

    /// Delete verdicts older than `before_ts` (unix seconds). Returns the
    /// number of rows removed.
    pub async fn prune_verdicts(&self, before_ts: i64) -> Result<u64> {
        let res = sqlx::query("DELETE FROM verdicts WHERE ts < ?")
            .bind(before_ts)
            .execute(&self.pool)
            .await
            .context("prune_verdicts failed")?;
        Ok(res.rows_affected())
    }

    pub async fn last_verdict(&self, device_id: &str) -> Result<Option<VerdictRecord>> {
        sqlx::query_as::<_, VerdictRecord>(
            r#"
            SELECT ts, day, device_id, action, reason,
                   is_holiday, applied_start, applied_end
            FROM verdicts
            WHERE device_id = ?
            ORDER BY ts DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await
        .context("last_verdict failed")
    }
}

// ===========================================================================
// Tests
// ===========================================================================
