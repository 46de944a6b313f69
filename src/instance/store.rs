/// SQLite-backed status store for instance records
///
/// The store file is shared by the orchestrating process and every supervisor
/// process. Each operation is a single statement, so there is no in-process cache
/// and no lock is held between calls. WAL mode plus a busy timeout lets
/// concurrent writers from separate processes queue instead of failing.

use crate::instance::types::{Instance, InstanceStatus};
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow},
    Row,
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// How long a connection waits on a locked database before giving up
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors surfaced by the status store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("instance not found: {0}")]
    NotFound(String),

    #[error("instance already exists: {0}")]
    AlreadyExists(String),

    #[error("instance {id}: illegal status transition {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: InstanceStatus,
        to: InstanceStatus,
    },

    #[error("instance {id}: corrupt record: {reason}")]
    Corrupt { id: String, reason: String },

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Durable instance id -> record store
#[derive(Debug, Clone)]
pub struct StatusStore {
    pool: SqlitePool,
    path: PathBuf,
}

impl StatusStore {
    /// Open (creating if missing) the store at `path` and ensure the schema exists
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let store = Self {
            pool,
            path: path.to_path_buf(),
        };
        store.init_schema().await?;

        tracing::debug!("🗄️ Status store open: {}", path.display());
        Ok(store)
    }

    /// Location of the backing database file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Safe to call from every process that opens the file (uses IF NOT EXISTS)
    async fn init_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS instances (
                id TEXT PRIMARY KEY,
                pid INTEGER,
                path TEXT NOT NULL,
                workflow TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'UNKNOWN',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert a new record
    ///
    /// Status changes after creation go through [`StatusStore::update_status`] so the
    /// transition rules are always applied.
    pub async fn put(&self, instance: &Instance) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO instances (id, pid, path, workflow, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(&instance.id)
        .bind(instance.pid)
        .bind(instance.path.to_string_lossy().into_owned())
        .bind(&instance.workflow)
        .bind(instance.status.as_str())
        .bind(instance.created_at.to_rfc3339())
        .bind(instance.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::AlreadyExists(instance.id.clone()));
        }
        Ok(())
    }

    /// Retrieve an instance by id
    pub async fn get(&self, id: &str) -> Result<Option<Instance>, StoreError> {
        let row = sqlx::query("SELECT * FROM instances WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(instance_from_row).transpose()
    }

    /// Every instance, oldest first
    pub async fn list(&self) -> Result<Vec<Instance>, StoreError> {
        let rows = sqlx::query("SELECT * FROM instances ORDER BY created_at, id")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(instance_from_row).collect()
    }

    /// Delete a record, returning it as it was at the moment of deletion
    ///
    /// The row is read and removed in one statement, so the returned status is
    /// the last one any supervisor managed to persist.
    pub async fn delete(&self, id: &str) -> Result<Option<Instance>, StoreError> {
        let row = sqlx::query("DELETE FROM instances WHERE id = ? RETURNING *")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(instance_from_row).transpose()
    }

    /// Record the supervisor's process id
    pub async fn set_pid(&self, id: &str, pid: i64) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE instances SET pid = ?, updated_at = ? WHERE id = ?")
            .bind(pid)
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// Move an instance to `next`, enforcing the lifecycle transition rules
    ///
    /// The current-status check and the write happen in one conditional UPDATE,
    /// so two processes racing on the same record cannot both win.
    pub async fn update_status(
        &self,
        id: &str,
        next: InstanceStatus,
    ) -> Result<Instance, StoreError> {
        let allowed_from = InstanceStatus::predecessors(next);

        if !allowed_from.is_empty() {
            let placeholders = vec!["?"; allowed_from.len()].join(", ");
            let statement = format!(
                "UPDATE instances SET status = ?, updated_at = ? WHERE id = ? AND status IN ({})",
                placeholders
            );

            let mut query = sqlx::query(&statement)
                .bind(next.as_str())
                .bind(Utc::now().to_rfc3339())
                .bind(id);
            for status in &allowed_from {
                query = query.bind(status.as_str());
            }

            let result = query.execute(&self.pool).await?;
            if result.rows_affected() > 0 {
                tracing::debug!("Instance {} -> {}", id, next);
                return self
                    .get(id)
                    .await?
                    .ok_or_else(|| StoreError::NotFound(id.to_string()));
            }
        }

        match self.get(id).await? {
            None => Err(StoreError::NotFound(id.to_string())),
            Some(current) => Err(StoreError::InvalidTransition {
                id: id.to_string(),
                from: current.status,
                to: next,
            }),
        }
    }
}

fn instance_from_row(row: &SqliteRow) -> Result<Instance, StoreError> {
    let id: String = row.try_get("id")?;
    let corrupt = |reason: String| StoreError::Corrupt {
        id: id.clone(),
        reason,
    };

    let status: String = row.try_get("status")?;
    let status = status.parse::<InstanceStatus>().map_err(corrupt)?;
    let created_at = parse_timestamp(&row.try_get::<String, _>("created_at")?).map_err(corrupt)?;
    let updated_at = parse_timestamp(&row.try_get::<String, _>("updated_at")?).map_err(corrupt)?;
    let path: String = row.try_get("path")?;

    Ok(Instance {
        pid: row.try_get("pid")?,
        path: PathBuf::from(path),
        workflow: row.try_get("workflow")?,
        status,
        created_at,
        updated_at,
        id,
    })
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .map_err(|e| format!("bad timestamp '{}': {}", value, e))
}
