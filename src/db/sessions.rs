//! Session rows plus per-block completion state.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use turso::{Builder, Connection};

use super::DbResult;

/// Default retention for idle sessions, in days.
pub const DEFAULT_SESSION_MAX_AGE_DAYS: i64 = 7;

/// One resumable upload, keyed by the backend-issued upload id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadSession {
    pub upload_id: String,
    pub upload_url: String,
    pub file_name: String,
    pub file_size: u64,
    pub total_blocks: u32,
    pub content_type: String,
    pub cache_control: Option<String>,
    pub video_id: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A block the remote endpoint has acknowledged as staged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadedBlock {
    pub block_index: u32,
    pub block_id: String,
}

/// Get SQL for creating upload session tables
pub fn get_table_sql() -> &'static str {
    "
    -- Upload sessions tables
    CREATE TABLE IF NOT EXISTS upload_sessions (
        upload_id TEXT PRIMARY KEY,
        upload_url TEXT NOT NULL,
        file_name TEXT NOT NULL,
        file_size INTEGER NOT NULL,
        total_blocks INTEGER NOT NULL,
        content_type TEXT NOT NULL,
        cache_control TEXT,
        video_id TEXT,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS uploaded_blocks (
        upload_id TEXT NOT NULL,
        block_index INTEGER NOT NULL,
        block_id TEXT NOT NULL,
        uploaded_at INTEGER NOT NULL,
        PRIMARY KEY (upload_id, block_index),
        FOREIGN KEY (upload_id) REFERENCES upload_sessions(upload_id)
    );

    CREATE INDEX IF NOT EXISTS idx_upload_sessions_updated ON upload_sessions(updated_at);
    "
}

/// Handle to the local session database.
// Wrap Connection in Mutex to serialize database access; block completions
// arriving from concurrent workers must not interleave.
pub struct SessionStore {
    conn: Mutex<Connection>,
}

impl SessionStore {
    /// Open the session database at `db_path`, creating tables as needed.
    pub async fn open(db_path: &Path) -> DbResult<Self> {
        let path = db_path.to_str().ok_or("database path is not valid UTF-8")?;
        let db = Builder::new_local(path).build().await?;
        let conn = db.connect()?;

        // Enable foreign keys
        conn.execute("PRAGMA foreign_keys = ON;", ()).await?;
        conn.execute_batch(get_table_sql()).await?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create or replace a session row.
    pub async fn create_session(&self, session: &UploadSession) -> DbResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO upload_sessions
             (upload_id, upload_url, file_name, file_size, total_blocks,
              content_type, cache_control, video_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT (upload_id) DO UPDATE SET
                upload_url = ?2, file_name = ?3, file_size = ?4, total_blocks = ?5,
                content_type = ?6, cache_control = ?7, video_id = ?8, updated_at = ?10",
            turso::params![
                session.upload_id.clone(),
                session.upload_url.clone(),
                session.file_name.clone(),
                session.file_size as i64,
                session.total_blocks as i64,
                session.content_type.clone(),
                session.cache_control.clone(),
                session.video_id.clone(),
                session.created_at,
                session.updated_at,
            ],
        )
        .await?;
        Ok(())
    }

    /// Get a session by upload id.
    pub async fn get_session(&self, upload_id: &str) -> DbResult<Option<UploadSession>> {
        let conn = self.conn.lock().await;
        let mut rows = conn
            .query(
                "SELECT upload_id, upload_url, file_name, file_size, total_blocks,
                        content_type, cache_control, video_id, created_at, updated_at
                 FROM upload_sessions WHERE upload_id = ?1",
                turso::params![upload_id],
            )
            .await?;

        if let Some(row) = rows.next().await? {
            let file_size: i64 = row.get(3)?;
            let total_blocks: i64 = row.get(4)?;
            Ok(Some(UploadSession {
                upload_id: row.get(0)?,
                upload_url: row.get(1)?,
                file_name: row.get(2)?,
                file_size: file_size as u64,
                total_blocks: total_blocks as u32,
                content_type: row.get(5)?,
                cache_control: row.get(6)?,
                video_id: row.get(7)?,
                created_at: row.get(8)?,
                updated_at: row.get(9)?,
            }))
        } else {
            Ok(None)
        }
    }

    /// Record a block as staged. Idempotent per (upload, index).
    pub async fn record_uploaded_block(
        &self,
        upload_id: &str,
        block_index: u32,
        block_id: &str,
    ) -> DbResult<()> {
        let conn = self.conn.lock().await;
        let now = chrono::Utc::now().timestamp();
        conn.execute(
            "INSERT INTO uploaded_blocks (upload_id, block_index, block_id, uploaded_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (upload_id, block_index) DO UPDATE SET block_id = ?3, uploaded_at = ?4",
            turso::params![upload_id, block_index as i64, block_id, now],
        )
        .await?;

        // Touch the session so cleanup sees it as active
        conn.execute(
            "UPDATE upload_sessions SET updated_at = ?1 WHERE upload_id = ?2",
            turso::params![now, upload_id],
        )
        .await?;

        Ok(())
    }

    /// All staged blocks for a session, ordered by block index.
    pub async fn get_uploaded_blocks(&self, upload_id: &str) -> DbResult<Vec<UploadedBlock>> {
        let conn = self.conn.lock().await;
        let mut rows = conn
            .query(
                "SELECT block_index, block_id FROM uploaded_blocks
                 WHERE upload_id = ?1 ORDER BY block_index",
                turso::params![upload_id],
            )
            .await?;

        let mut blocks = Vec::new();
        while let Some(row) = rows.next().await? {
            let block_index: i64 = row.get(0)?;
            blocks.push(UploadedBlock {
                block_index: block_index as u32,
                block_id: row.get(1)?,
            });
        }
        Ok(blocks)
    }

    /// Delete a session and its block records.
    pub async fn delete_session(&self, upload_id: &str) -> DbResult<()> {
        let conn = self.conn.lock().await;

        // Delete blocks first due to the foreign key
        conn.execute(
            "DELETE FROM uploaded_blocks WHERE upload_id = ?1",
            turso::params![upload_id],
        )
        .await?;
        conn.execute(
            "DELETE FROM upload_sessions WHERE upload_id = ?1",
            turso::params![upload_id],
        )
        .await?;
        Ok(())
    }

    /// All sessions, most recently touched first.
    pub async fn get_pending_sessions(&self) -> DbResult<Vec<UploadSession>> {
        let conn = self.conn.lock().await;
        let mut rows = conn
            .query(
                "SELECT upload_id, upload_url, file_name, file_size, total_blocks,
                        content_type, cache_control, video_id, created_at, updated_at
                 FROM upload_sessions ORDER BY updated_at DESC",
                (),
            )
            .await?;

        let mut sessions = Vec::new();
        while let Some(row) = rows.next().await? {
            let file_size: i64 = row.get(3)?;
            let total_blocks: i64 = row.get(4)?;
            sessions.push(UploadSession {
                upload_id: row.get(0)?,
                upload_url: row.get(1)?,
                file_name: row.get(2)?,
                file_size: file_size as u64,
                total_blocks: total_blocks as u32,
                content_type: row.get(5)?,
                cache_control: row.get(6)?,
                video_id: row.get(7)?,
                created_at: row.get(8)?,
                updated_at: row.get(9)?,
            });
        }
        Ok(sessions)
    }

    /// Remove sessions idle for longer than `max_age_days`. Returns how many
    /// sessions were removed.
    pub async fn cleanup_old_sessions(&self, max_age_days: i64) -> DbResult<usize> {
        let conn = self.conn.lock().await;
        let cutoff = chrono::Utc::now().timestamp() - max_age_days * 24 * 60 * 60;

        // Step 1: Query session IDs to delete (libsql doesn't support subqueries in WHERE)
        let mut rows = conn
            .query(
                "SELECT upload_id FROM upload_sessions WHERE updated_at < ?1",
                turso::params![cutoff],
            )
            .await?;

        let mut upload_ids: Vec<String> = Vec::new();
        while let Some(row) = rows.next().await? {
            upload_ids.push(row.get(0)?);
        }

        // Step 2: Delete block records for each stale session
        for upload_id in &upload_ids {
            conn.execute(
                "DELETE FROM uploaded_blocks WHERE upload_id = ?1",
                turso::params![upload_id.clone()],
            )
            .await?;
        }

        // Step 3: Delete the sessions themselves
        for upload_id in &upload_ids {
            conn.execute(
                "DELETE FROM upload_sessions WHERE upload_id = ?1",
                turso::params![upload_id.clone()],
            )
            .await?;
        }

        Ok(upload_ids.len())
    }
}
