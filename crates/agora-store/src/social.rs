//! Relationships and memories, plus the maintenance passes over them.

use agora_core::Result;
use chrono::Duration;
use rusqlite::params;

use crate::store::{SqliteStore, new_id, parse_ts, store_err, ts};
use crate::types::{Memory, Relationship};

/// Scores closer to 0 than this are dropped by decay.
pub const RELATIONSHIP_FLOOR: f64 = 0.01;

impl SqliteStore {
    // ── Relationships ──────────────────────────────────────────

    /// Add `delta` to the directed relationship score, clamped to [-1, 1].
    pub fn adjust_relationship(&self, actor_id: &str, other_id: &str, delta: f64) -> Result<f64> {
        let db = self.db();
        let now = ts(self.now());
        db.execute(
            "INSERT INTO relationships (actor_id, other_id, score, updated_at)
             VALUES (?1, ?2, MAX(-1.0, MIN(1.0, ?3)), ?4)
             ON CONFLICT(actor_id, other_id) DO UPDATE SET
                score = MAX(-1.0, MIN(1.0, relationships.score + ?3)),
                updated_at = excluded.updated_at",
            params![actor_id, other_id, delta, now],
        )
        .map_err(store_err)?;
        db.query_row(
            "SELECT score FROM relationships WHERE actor_id = ?1 AND other_id = ?2",
            params![actor_id, other_id],
            |row| row.get(0),
        )
        .map_err(store_err)
    }

    /// Strongest relationships first.
    pub fn relationships_of(&self, actor_id: &str) -> Result<Vec<Relationship>> {
        let db = self.db();
        let mut stmt = db
            .prepare(
                "SELECT actor_id, other_id, score, updated_at FROM relationships
                 WHERE actor_id = ?1 ORDER BY ABS(score) DESC",
            )
            .map_err(store_err)?;
        let rows = stmt
            .query_map(params![actor_id], |row| {
                Ok(Relationship {
                    actor_id: row.get(0)?,
                    other_id: row.get(1)?,
                    score: row.get(2)?,
                    updated_at: parse_ts(&row.get::<_, String>(3)?),
                })
            })
            .map_err(store_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(store_err)?;
        Ok(rows)
    }

    /// Move every score toward 0 by `rate` and drop the ones that vanish.
    /// Returns `(decayed, removed)`.
    pub fn decay_relationships(&self, rate: f64) -> Result<(usize, usize)> {
        let db = self.db();
        let now = ts(self.now());
        let decayed = db
            .execute(
                "UPDATE relationships SET score = score * (1.0 - ?1), updated_at = ?2",
                params![rate, now],
            )
            .map_err(store_err)?;
        let removed = db
            .execute(
                "DELETE FROM relationships WHERE ABS(score) < ?1",
                params![RELATIONSHIP_FLOOR],
            )
            .map_err(store_err)?;
        Ok((decayed, removed))
    }

    // ── Memories ───────────────────────────────────────────────

    pub fn add_memory(&self, actor_id: &str, content: &str, importance: f64) -> Result<Memory> {
        let id = new_id();
        let now = self.now();
        let importance = importance.clamp(0.0, 1.0);
        self.db()
            .execute(
                "INSERT INTO memories (id, actor_id, content, importance, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, actor_id, content, importance, ts(now)],
            )
            .map_err(store_err)?;
        Ok(Memory {
            id,
            actor_id: actor_id.into(),
            content: content.into(),
            importance,
            created_at: now,
        })
    }

    /// Most important, then newest, first.
    pub fn memories_of(&self, actor_id: &str, limit: usize) -> Result<Vec<Memory>> {
        let db = self.db();
        let mut stmt = db
            .prepare(
                "SELECT id, actor_id, content, importance, created_at FROM memories
                 WHERE actor_id = ?1 ORDER BY importance DESC, created_at DESC LIMIT ?2",
            )
            .map_err(store_err)?;
        let rows = stmt
            .query_map(params![actor_id, limit as i64], |row| {
                Ok(Memory {
                    id: row.get(0)?,
                    actor_id: row.get(1)?,
                    content: row.get(2)?,
                    importance: row.get(3)?,
                    created_at: parse_ts(&row.get::<_, String>(4)?),
                })
            })
            .map_err(store_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(store_err)?;
        Ok(rows)
    }

    /// Delete memories older than `retention_days` whose importance is below
    /// `min_importance`. Returns the number deleted.
    pub fn cleanup_memories(&self, retention_days: u32, min_importance: f64) -> Result<usize> {
        let cutoff = self.now() - Duration::days(retention_days as i64);
        self.db()
            .execute(
                "DELETE FROM memories WHERE created_at < ?1 AND importance < ?2",
                params![ts(cutoff), min_importance],
            )
            .map_err(store_err)
    }
}
