use std::{path::Path, str::FromStr, sync::Arc};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::Mutex;
use tracing::debug;

use crate::jobs::{JobId, JobSnapshot, JobStatus};
use crate::Result;

const DEFAULT_TABLE: &str = "queue";

/// Relational backend: one row per job, `status` column, conditional-update
/// claim. Table creation is idempotent and happens at construction.
#[derive(Clone)]
pub struct Backend {
    conn: Arc<Mutex<Connection>>,
    table: String,
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend").field("table", &self.table).finish()
    }
}

impl Backend {
    pub fn open<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        Self::open_with_table(path, DEFAULT_TABLE)
    }

    pub fn open_with_table<P>(path: P, table: &str) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        Self::from_connection(Connection::open(path)?, table)
    }

    /// Private on-heap database, handy for tests.
    pub fn in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?, DEFAULT_TABLE)
    }

    fn from_connection(conn: Connection, table: &str) -> Result<Self> {
        create_table(&conn, table)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            table: table.to_string(),
        })
    }
}

fn create_table(conn: &Connection, table: &str) -> Result<()> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {t} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            uid TEXT NOT NULL,
            type TEXT NOT NULL,
            data TEXT NOT NULL,
            status TEXT NOT NULL,
            retries INTEGER NOT NULL DEFAULT 0,
            created TEXT NOT NULL,
            modified TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS {t}_key_uid ON {t}(uid);
        CREATE INDEX IF NOT EXISTS {t}_key_type ON {t}(type);
        CREATE INDEX IF NOT EXISTS {t}_key_status ON {t}(status);",
        t = table,
    ))?;
    Ok(())
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

#[async_trait::async_trait]
impl super::Backend for Backend {
    async fn add(&self, job_type: &str, data: &str) -> Result<JobId> {
        let uid = JobId::random();
        let conn = self.conn.lock().await;
        conn.execute(
            &format!(
                "INSERT INTO {} (uid, type, data, status, retries, created, modified)
                 VALUES (?1, ?2, ?3, ?4, 0, ?5, ?5)",
                self.table,
            ),
            params![
                uid.as_str(),
                job_type,
                data,
                JobStatus::Pending.as_str(),
                now(),
            ],
        )?;
        Ok(uid)
    }

    async fn get(&self) -> Result<Option<JobSnapshot>> {
        let conn = self.conn.lock().await;
        // The claim is a single conditional update so two workers can never
        // take the same row: the inner select picks the oldest Pending row
        // and the outer guard re-checks its status before writing.
        let row = conn
            .query_row(
                &format!(
                    "UPDATE {t} SET status = ?1, modified = ?2
                     WHERE id = (SELECT id FROM {t} WHERE status = ?3
                                 ORDER BY modified ASC, id ASC LIMIT 1)
                       AND status = ?3
                     RETURNING uid, type, data, status, retries",
                    t = self.table,
                ),
                params![
                    JobStatus::Working.as_str(),
                    now(),
                    JobStatus::Pending.as_str(),
                ],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, u32>(4)?,
                    ))
                },
            )
            .optional()?;
        let (uid, job_type, data, status, retries) = match row {
            Some(row) => row,
            None => return Ok(None),
        };
        Ok(Some(JobSnapshot {
            uid: JobId::new(uid)?,
            job_type,
            data,
            status: JobStatus::from_str(&status)?,
            retries,
        }))
    }

    async fn complete(&self, id: &JobId) -> Result<()> {
        let conn = self.conn.lock().await;
        let deleted = conn.execute(
            &format!("DELETE FROM {} WHERE uid = ?1", self.table),
            params![id.as_str()],
        )?;
        if deleted == 0 {
            debug!("complete: job {} not found, ignoring", id);
        }
        Ok(())
    }

    async fn failed(&self, id: &JobId) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            &format!(
                "UPDATE {} SET status = ?1, modified = ?2 WHERE uid = ?3",
                self.table,
            ),
            params![JobStatus::Failed.as_str(), now(), id.as_str()],
        )?;
        Ok(())
    }

    async fn retry(&self, id: &JobId) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            &format!(
                "UPDATE {} SET status = ?1, retries = retries + 1, modified = ?2
                 WHERE uid = ?3",
                self.table,
            ),
            params![JobStatus::Pending.as_str(), now(), id.as_str()],
        )?;
        Ok(())
    }

    async fn pending(&self, job_type: Option<&str>) -> Result<u64> {
        let conn = self.conn.lock().await;
        let count = match job_type {
            Some(job_type) => conn.query_row(
                &format!(
                    "SELECT COUNT(*) FROM {} WHERE status = ?1 AND type = ?2",
                    self.table,
                ),
                params![JobStatus::Pending.as_str(), job_type],
                |row| row.get::<_, u64>(0),
            )?,
            None => conn.query_row(
                &format!("SELECT COUNT(*) FROM {} WHERE status = ?1", self.table),
                params![JobStatus::Pending.as_str()],
                |row| row.get::<_, u64>(0),
            )?,
        };
        Ok(count)
    }

    async fn reset(&self, job_type: Option<&str>) -> Result<()> {
        let conn = self.conn.lock().await;
        // Matches every non-Working row, so already-Pending rows get their
        // retry counter zeroed too. Stated behavior of this backend.
        match job_type {
            Some(job_type) => conn.execute(
                &format!(
                    "UPDATE {} SET status = ?1, retries = 0, modified = ?2
                     WHERE status != ?3 AND type = ?4",
                    self.table,
                ),
                params![
                    JobStatus::Pending.as_str(),
                    now(),
                    JobStatus::Working.as_str(),
                    job_type,
                ],
            )?,
            None => conn.execute(
                &format!(
                    "UPDATE {} SET status = ?1, retries = 0, modified = ?2
                     WHERE status != ?3",
                    self.table,
                ),
                params![
                    JobStatus::Pending.as_str(),
                    now(),
                    JobStatus::Working.as_str(),
                ],
            )?,
        };
        Ok(())
    }

    async fn purge(&self, job_type: Option<&str>) -> Result<()> {
        let conn = self.conn.lock().await;
        match job_type {
            Some(job_type) => conn.execute(
                &format!(
                    "DELETE FROM {} WHERE status = ?1 AND type = ?2",
                    self.table,
                ),
                params![JobStatus::Failed.as_str(), job_type],
            )?,
            None => conn.execute(
                &format!("DELETE FROM {} WHERE status = ?1", self.table),
                params![JobStatus::Failed.as_str()],
            )?,
        };
        Ok(())
    }
}
