//! Swarm Database (§4.11): one SQLite table, atomic claim/defer/retry,
//! lease expiry — all single-statement so they stay race-safe under
//! concurrent runners. Grounded on the claim-by-compare-and-swap
//! pattern used for task claiming in the swarm example's task
//! repository adapter.

use chrono::{DateTime, Utc};
use orc_domain::{Error, Result};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SwarmTaskStatus {
    Pending,
    Claimed,
    Completed,
    Failed,
}

impl SwarmTaskStatus {
    fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Claimed => "claimed",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "claimed" => Some(Self::Claimed),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SwarmTask {
    pub id: String,
    pub session_id: String,
    pub description: String,
    pub category: String,
    pub wave: i64,
    pub priority: i64,
    pub status: SwarmTaskStatus,
    pub claimed_by: Option<String>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub files_owned: Vec<String>,
    pub depends_on: Vec<String>,
    pub retry_count: u32,
    pub result: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CreateTaskParams {
    pub session_id: String,
    pub description: String,
    pub category: String,
    pub wave: i64,
    pub priority: i64,
    pub files_owned: Vec<String>,
    pub depends_on: Vec<String>,
}

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: String,
    session_id: String,
    description: String,
    category: String,
    wave: i64,
    priority: i64,
    status: String,
    claimed_by: Option<String>,
    claimed_at: Option<String>,
    completed_at: Option<String>,
    files_owned: String,
    depends_on: String,
    retry_count: i64,
    result: Option<String>,
}

impl TryFrom<TaskRow> for SwarmTask {
    type Error = Error;

    fn try_from(row: TaskRow) -> Result<Self> {
        Ok(SwarmTask {
            id: row.id,
            session_id: row.session_id,
            description: row.description,
            category: row.category,
            wave: row.wave,
            priority: row.priority,
            status: SwarmTaskStatus::parse(&row.status)
                .ok_or_else(|| Error::ParseError(format!("unknown swarm task status: {}", row.status)))?,
            claimed_by: row.claimed_by,
            claimed_at: row.claimed_at.map(|s| parse_rfc3339(&s)).transpose()?,
            completed_at: row.completed_at.map(|s| parse_rfc3339(&s)).transpose()?,
            files_owned: serde_json::from_str(&row.files_owned).unwrap_or_default(),
            depends_on: serde_json::from_str(&row.depends_on).unwrap_or_default(),
            retry_count: row.retry_count as u32,
            result: row.result,
        })
    }
}

fn parse_rfc3339(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| Error::ParseError(format!("bad timestamp {s}: {e}")))
}

pub struct SwarmDb {
    pool: SqlitePool,
}

impl SwarmDb {
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let opts = SqliteConnectOptions::from_str(&format!("sqlite://{}", path.as_ref().display()))
            .map_err(|e| Error::Sqlite(e.to_string()))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(opts)
            .await
            .map_err(|e| Error::Sqlite(e.to_string()))?;
        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// In-memory database, useful for tests and for callers with no
    /// persistent-storage requirement (e.g. a demonstration run).
    pub async fn connect_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| Error::Sqlite(e.to_string()))?;
        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS swarm_tasks (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                description TEXT NOT NULL,
                category TEXT NOT NULL,
                wave INTEGER NOT NULL,
                priority INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL DEFAULT 'pending',
                claimed_by TEXT,
                claimed_at TEXT,
                completed_at TEXT,
                files_owned TEXT NOT NULL DEFAULT '[]',
                depends_on TEXT NOT NULL DEFAULT '[]',
                retry_count INTEGER NOT NULL DEFAULT 0,
                result TEXT
            )"#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Sqlite(e.to_string()))?;

        for stmt in [
            "CREATE INDEX IF NOT EXISTS idx_swarm_tasks_session ON swarm_tasks(session_id)",
            "CREATE INDEX IF NOT EXISTS idx_swarm_tasks_status ON swarm_tasks(status)",
            "CREATE INDEX IF NOT EXISTS idx_swarm_tasks_wave ON swarm_tasks(wave)",
        ] {
            sqlx::query(stmt).execute(&self.pool).await.map_err(|e| Error::Sqlite(e.to_string()))?;
        }
        Ok(())
    }

    pub async fn create_task(&self, params: CreateTaskParams) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let files_json = serde_json::to_string(&params.files_owned).map_err(Error::from)?;
        let deps_json = serde_json::to_string(&params.depends_on).map_err(Error::from)?;
        sqlx::query(
            r#"INSERT INTO swarm_tasks
               (id, session_id, description, category, wave, priority, status, files_owned, depends_on)
               VALUES (?, ?, ?, ?, ?, ?, 'pending', ?, ?)"#,
        )
        .bind(&id)
        .bind(&params.session_id)
        .bind(&params.description)
        .bind(&params.category)
        .bind(params.wave)
        .bind(params.priority)
        .bind(&files_json)
        .bind(&deps_json)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Sqlite(e.to_string()))?;
        Ok(id)
    }

    /// Single-statement CAS: only succeeds if the row was still pending.
    pub async fn claim_task(&self, id: &str, claimer: &str) -> Result<bool> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE swarm_tasks SET status = 'claimed', claimed_by = ?, claimed_at = ? WHERE id = ? AND status = 'pending'",
        )
        .bind(claimer)
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Sqlite(e.to_string()))?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn complete_task(&self, id: &str, result: Option<String>) -> Result<bool> {
        self.finish_task(id, "completed", result).await
    }

    pub async fn fail_task(&self, id: &str, result: Option<String>) -> Result<bool> {
        self.finish_task(id, "failed", result).await
    }

    async fn finish_task(&self, id: &str, status: &str, result: Option<String>) -> Result<bool> {
        let now = Utc::now().to_rfc3339();
        let changed = sqlx::query("UPDATE swarm_tasks SET status = ?, completed_at = ?, result = ? WHERE id = ?")
            .bind(status)
            .bind(&now)
            .bind(&result)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Sqlite(e.to_string()))?;
        Ok(changed.rows_affected() == 1)
    }

    /// Only from claimed; resets to pending, clears claim fields,
    /// leaves `retry_count` untouched.
    pub async fn defer_task(&self, id: &str) -> Result<bool> {
        let changed = sqlx::query(
            "UPDATE swarm_tasks SET status = 'pending', claimed_by = NULL, claimed_at = NULL WHERE id = ? AND status = 'claimed'",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Sqlite(e.to_string()))?;
        Ok(changed.rows_affected() == 1)
    }

    /// From claimed or failed; resets to pending, clears claim fields,
    /// increments `retry_count`.
    pub async fn retry_task(&self, id: &str) -> Result<bool> {
        let changed = sqlx::query(
            r#"UPDATE swarm_tasks SET status = 'pending', claimed_by = NULL, claimed_at = NULL,
               retry_count = retry_count + 1
               WHERE id = ? AND status IN ('claimed', 'failed')"#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Sqlite(e.to_string()))?;
        Ok(changed.rows_affected() == 1)
    }

    pub async fn get_task(&self, id: &str) -> Result<Option<SwarmTask>> {
        let row: Option<TaskRow> = sqlx::query_as("SELECT * FROM swarm_tasks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::Sqlite(e.to_string()))?;
        row.map(SwarmTask::try_from).transpose()
    }

    pub async fn get_tasks_by_session(&self, session: &str) -> Result<Vec<SwarmTask>> {
        let rows: Vec<TaskRow> =
            sqlx::query_as("SELECT * FROM swarm_tasks WHERE session_id = ? ORDER BY wave ASC, priority DESC")
                .bind(session)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| Error::Sqlite(e.to_string()))?;
        rows.into_iter().map(SwarmTask::try_from).collect()
    }

    pub async fn get_pending_tasks(&self, session: &str, wave: Option<i64>) -> Result<Vec<SwarmTask>> {
        let rows: Vec<TaskRow> = match wave {
            Some(w) => sqlx::query_as(
                "SELECT * FROM swarm_tasks WHERE session_id = ? AND status = 'pending' AND wave = ? ORDER BY wave ASC, priority DESC",
            )
            .bind(session)
            .bind(w)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::Sqlite(e.to_string()))?,
            None => sqlx::query_as(
                "SELECT * FROM swarm_tasks WHERE session_id = ? AND status = 'pending' ORDER BY wave ASC, priority DESC",
            )
            .bind(session)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::Sqlite(e.to_string()))?,
        };
        rows.into_iter().map(SwarmTask::try_from).collect()
    }

    /// Resets every claimed task whose lease exceeds `max_age_ms` back
    /// to pending; terminal states are untouched. Returns the count.
    pub async fn expire_stale_leases(&self, max_age_ms: i64) -> Result<u64> {
        let cutoff = (Utc::now() - chrono::Duration::milliseconds(max_age_ms)).to_rfc3339();
        let changed = sqlx::query(
            "UPDATE swarm_tasks SET status = 'pending', claimed_by = NULL, claimed_at = NULL WHERE status = 'claimed' AND claimed_at < ?",
        )
        .bind(&cutoff)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Sqlite(e.to_string()))?;
        Ok(changed.rows_affected())
    }
}
