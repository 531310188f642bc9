// SQLite state owned by the native host thread

use crate::error::{NotifyError, StorageError};
use crate::notify::{Notification, PermissionState};
use crate::store::now_ms;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

const CURRENT_VERSION: u32 = 1;

/// Permission row name for notification display
const DISPLAY_PERMISSION: &str = "display";

/// Host database: preferences, pending notifications and permission state
pub(crate) struct HostDb {
    db: Connection,
    /// Answer the user gives the first time permission is requested
    prompt_answer: PermissionState,
}

impl HostDb {
    pub(crate) fn open(path: &Path, prompt_answer: PermissionState) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let db = Connection::open(path)?;
        let host = Self { db, prompt_answer };
        host.create_schema()?;
        host.write_version()?;

        debug!(path = ?path, "Native host database open");
        Ok(host)
    }

    fn create_schema(&self) -> Result<(), StorageError> {
        self.db.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS preferences (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS notifications (
                id INTEGER PRIMARY KEY,
                title TEXT NOT NULL,
                body TEXT NOT NULL,
                scheduled_at INTEGER NOT NULL,
                sound TEXT NOT NULL,
                small_icon TEXT NOT NULL,
                icon_color TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_notifications_scheduled_at ON notifications(scheduled_at);

            CREATE TABLE IF NOT EXISTS permissions (
                name TEXT PRIMARY KEY,
                state TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS host_metadata (
                name TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    fn write_version(&self) -> Result<(), StorageError> {
        self.db.execute(
            "INSERT OR IGNORE INTO host_metadata (name, value) VALUES ('version', ?1)",
            [CURRENT_VERSION.to_string()],
        )?;
        Ok(())
    }

    // ========================================================================
    // Preferences
    // ========================================================================

    pub(crate) fn pref_get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let value = self
            .db
            .query_row("SELECT value FROM preferences WHERE key = ?1", [key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    pub(crate) fn pref_set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.db.execute(
            "INSERT OR REPLACE INTO preferences (key, value, updated_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![key, value, now_ms()],
        )?;
        Ok(())
    }

    pub(crate) fn pref_remove(&self, key: &str) -> Result<(), StorageError> {
        self.db.execute("DELETE FROM preferences WHERE key = ?1", [key])?;
        Ok(())
    }

    pub(crate) fn pref_keys(&self) -> Result<Vec<String>, StorageError> {
        let mut stmt = self.db.prepare("SELECT key FROM preferences ORDER BY key")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut keys = Vec::new();
        for row in rows {
            keys.push(row?);
        }
        Ok(keys)
    }

    pub(crate) fn pref_clear(&self) -> Result<(), StorageError> {
        let removed = self.db.execute("DELETE FROM preferences", [])?;
        info!(removed, "Cleared native preferences");
        Ok(())
    }

    // ========================================================================
    // Notifications
    // ========================================================================

    fn permission_state(&self) -> Result<PermissionState, NotifyError> {
        let state: Option<String> = self
            .db
            .query_row(
                "SELECT state FROM permissions WHERE name = ?1",
                [DISPLAY_PERMISSION],
                |row| row.get(0),
            )
            .optional()?;

        Ok(state
            .as_deref()
            .and_then(PermissionState::parse)
            .unwrap_or(PermissionState::Prompt))
    }

    /// Resolve the display permission, prompting only while undecided
    pub(crate) fn request_permission(&self) -> Result<PermissionState, NotifyError> {
        let current = self.permission_state()?;
        if current != PermissionState::Prompt {
            return Ok(current);
        }

        let answer = self.prompt_answer;
        self.db.execute(
            "INSERT OR REPLACE INTO permissions (name, state, updated_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![DISPLAY_PERMISSION, answer.as_str(), now_ms()],
        )?;
        info!(state = answer.as_str(), "Notification permission decided");
        Ok(answer)
    }

    /// Insert `notification`, replacing a pending entry with the same id
    pub(crate) fn schedule(&mut self, n: &Notification) -> Result<(), NotifyError> {
        if self.permission_state()? == PermissionState::Denied {
            return Err(NotifyError::PermissionDenied);
        }

        let tx = self.db.transaction()?;
        let replaced = tx.execute("DELETE FROM notifications WHERE id = ?1", [n.id])?;
        tx.execute(
            "INSERT INTO notifications (id, title, body, scheduled_at, sound, small_icon, icon_color, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                n.id,
                n.title,
                n.body,
                n.scheduled_at.timestamp_millis(),
                n.sound,
                n.small_icon,
                n.icon_color,
                now_ms()
            ],
        )?;
        tx.commit()?;

        debug!(id = n.id, replaced = replaced > 0, "host: notification stored");
        Ok(())
    }

    pub(crate) fn cancel(&mut self, ids: &[i64]) -> Result<(), NotifyError> {
        let tx = self.db.transaction()?;
        for id in ids {
            tx.execute("DELETE FROM notifications WHERE id = ?1", [id])?;
        }
        tx.commit()?;
        Ok(())
    }

    pub(crate) fn cancel_all(&self) -> Result<(), NotifyError> {
        self.db.execute("DELETE FROM notifications", [])?;
        Ok(())
    }

    pub(crate) fn pending(&self) -> Result<Vec<Notification>, NotifyError> {
        select_notifications(
            &self.db,
            "SELECT * FROM notifications ORDER BY scheduled_at, id",
            rusqlite::params![],
        )
    }

    /// Remove and return every notification due at `now`
    ///
    /// Read and delete share one transaction, so a notification is claimed
    /// exactly once even with other processes cancelling concurrently.
    pub(crate) fn claim_due(&mut self, now: DateTime<Utc>) -> Result<Vec<Notification>, NotifyError> {
        let cutoff = now.timestamp_millis();
        let tx = self.db.transaction()?;
        let due = select_notifications(
            &tx,
            "SELECT * FROM notifications WHERE scheduled_at <= ?1 ORDER BY scheduled_at, id",
            [cutoff],
        )?;
        tx.execute("DELETE FROM notifications WHERE scheduled_at <= ?1", [cutoff])?;
        tx.commit()?;

        Ok(due)
    }

    pub(crate) fn next_due(&self) -> Result<Option<DateTime<Utc>>, NotifyError> {
        let ms: Option<i64> = self
            .db
            .query_row("SELECT MIN(scheduled_at) FROM notifications", [], |row| row.get(0))?;
        Ok(ms.and_then(DateTime::from_timestamp_millis))
    }
}

fn select_notifications<P: rusqlite::Params>(
    db: &Connection,
    sql: &str,
    params: P,
) -> Result<Vec<Notification>, NotifyError> {
    let mut stmt = db.prepare(sql)?;
    let rows = stmt.query_map(params, |row| {
        let scheduled_ms: i64 = row.get("scheduled_at")?;
        Ok(Notification {
            id: row.get("id")?,
            title: row.get("title")?,
            body: row.get("body")?,
            scheduled_at: DateTime::from_timestamp_millis(scheduled_ms).unwrap_or_default(),
            sound: row.get("sound")?,
            small_icon: row.get("small_icon")?,
            icon_color: row.get("icon_color")?,
        })
    })?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}
