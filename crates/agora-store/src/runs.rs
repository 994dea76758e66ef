//! Workflow run records, system settings and notifications.

use agora_core::Result;
use rusqlite::{OptionalExtension, params};

use crate::store::{SqliteStore, new_id, parse_ts, store_err, ts};
use crate::types::{Notification, RunStatus, WorkflowRunRecord};

/// Settings key holding the global scheduler pause flag.
pub const SCHEDULER_PAUSED_KEY: &str = "scheduler_paused";

impl SqliteStore {
    // ── Run records ────────────────────────────────────────────

    /// Append a run record. Records are never updated.
    pub fn append_run(&self, record: &WorkflowRunRecord) -> Result<()> {
        let data = serde_json::to_string(&record.data)?;
        self.db()
            .execute(
                "INSERT INTO workflow_runs
                    (id, workflow_key, status, message, trigger, started_at, finished_at, data, error)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    record.id,
                    record.workflow_key,
                    record.status.as_str(),
                    record.message,
                    record.trigger,
                    ts(record.started_at),
                    ts(record.finished_at),
                    data,
                    record.error
                ],
            )
            .map_err(store_err)?;
        Ok(())
    }

    /// Newest first.
    pub fn recent_runs(&self, limit: usize) -> Result<Vec<WorkflowRunRecord>> {
        self.query_runs(None, limit)
    }

    /// Newest first, for one workflow key.
    pub fn runs_for(&self, workflow_key: &str, limit: usize) -> Result<Vec<WorkflowRunRecord>> {
        self.query_runs(Some(workflow_key), limit)
    }

    fn query_runs(&self, key: Option<&str>, limit: usize) -> Result<Vec<WorkflowRunRecord>> {
        let db = self.db();
        let mut stmt = db
            .prepare(
                "SELECT id, workflow_key, status, message, trigger, started_at, finished_at, data, error
                 FROM workflow_runs
                 WHERE ?1 IS NULL OR workflow_key = ?1
                 ORDER BY started_at DESC, rowid DESC LIMIT ?2",
            )
            .map_err(store_err)?;
        let rows = stmt
            .query_map(params![key, limit as i64], |row| {
                let status: String = row.get(2)?;
                let data: String = row.get(7)?;
                Ok(WorkflowRunRecord {
                    id: row.get(0)?,
                    workflow_key: row.get(1)?,
                    status: RunStatus::parse(&status).unwrap_or(RunStatus::Error),
                    message: row.get(3)?,
                    trigger: row.get(4)?,
                    started_at: parse_ts(&row.get::<_, String>(5)?),
                    finished_at: parse_ts(&row.get::<_, String>(6)?),
                    data: serde_json::from_str(&data).unwrap_or(serde_json::Value::Null),
                    error: row.get(8)?,
                })
            })
            .map_err(store_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(store_err)?;
        Ok(rows)
    }

    pub fn run_count(&self) -> Result<u64> {
        self.db()
            .query_row("SELECT COUNT(*) FROM workflow_runs", [], |row| {
                row.get::<_, i64>(0)
            })
            .map(|n| n as u64)
            .map_err(store_err)
    }

    // ── System settings ────────────────────────────────────────

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        self.db()
            .query_row(
                "SELECT value FROM system_settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(store_err)
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.db()
            .execute(
                "INSERT INTO system_settings (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, value, ts(self.now())],
            )
            .map_err(store_err)?;
        Ok(())
    }

    /// Whether the scheduler is globally paused. Unset means running.
    pub fn is_paused(&self) -> Result<bool> {
        Ok(self
            .get_setting(SCHEDULER_PAUSED_KEY)?
            .is_some_and(|v| v == "true"))
    }

    pub fn set_paused(&self, paused: bool) -> Result<()> {
        self.set_setting(SCHEDULER_PAUSED_KEY, if paused { "true" } else { "false" })
    }

    // ── Notifications ──────────────────────────────────────────

    pub fn add_notification(
        &self,
        recipient_id: &str,
        kind: &str,
        actor_id: &str,
        target_id: &str,
    ) -> Result<Notification> {
        let id = new_id();
        let now = self.now();
        self.db()
            .execute(
                "INSERT INTO notifications (id, recipient_id, kind, actor_id, target_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![id, recipient_id, kind, actor_id, target_id, ts(now)],
            )
            .map_err(store_err)?;
        Ok(Notification {
            id,
            recipient_id: recipient_id.into(),
            kind: kind.into(),
            actor_id: actor_id.into(),
            target_id: target_id.into(),
            created_at: now,
        })
    }

    /// Newest first.
    pub fn notifications_for(&self, recipient_id: &str, limit: usize) -> Result<Vec<Notification>> {
        let db = self.db();
        let mut stmt = db
            .prepare(
                "SELECT id, recipient_id, kind, actor_id, target_id, created_at FROM notifications
                 WHERE recipient_id = ?1 ORDER BY created_at DESC, rowid DESC LIMIT ?2",
            )
            .map_err(store_err)?;
        let rows = stmt
            .query_map(params![recipient_id, limit as i64], |row| {
                Ok(Notification {
                    id: row.get(0)?,
                    recipient_id: row.get(1)?,
                    kind: row.get(2)?,
                    actor_id: row.get(3)?,
                    target_id: row.get(4)?,
                    created_at: parse_ts(&row.get::<_, String>(5)?),
                })
            })
            .map_err(store_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(store_err)?;
        Ok(rows)
    }
}
