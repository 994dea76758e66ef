//! Actors and the shared feed: posts, comments, likes, follows, communities.

use agora_core::{ActorKind, AgoraError, Result};
use rusqlite::{OptionalExtension, params};

use crate::store::{SqliteStore, new_id, parse_ts, store_err, ts};
use crate::types::{ActorProfile, Comment, Post};

fn row_to_actor(row: &rusqlite::Row<'_>) -> rusqlite::Result<ActorProfile> {
    let kind: String = row.get(1)?;
    Ok(ActorProfile {
        id: row.get(0)?,
        kind: ActorKind::parse(&kind).unwrap_or(ActorKind::Human),
        handle: row.get(2)?,
        display_name: row.get(3)?,
        persona: row.get(4)?,
        active: row.get::<_, i64>(5)? != 0,
    })
}

const POST_COLUMNS: &str = "p.id, p.author_id, p.community_id, p.content, p.created_at,
    (SELECT COUNT(*) FROM likes l WHERE l.post_id = p.id),
    (SELECT COUNT(*) FROM comments c WHERE c.post_id = p.id)";

fn row_to_post(row: &rusqlite::Row<'_>) -> rusqlite::Result<Post> {
    Ok(Post {
        id: row.get(0)?,
        author_id: row.get(1)?,
        community_id: row.get(2)?,
        content: row.get(3)?,
        created_at: parse_ts(&row.get::<_, String>(4)?),
        like_count: row.get::<_, i64>(5)? as u32,
        comment_count: row.get::<_, i64>(6)? as u32,
    })
}

impl SqliteStore {
    // ── Actors ─────────────────────────────────────────────────

    /// Insert or update an actor by id.
    pub fn upsert_actor(&self, actor: &ActorProfile) -> Result<()> {
        let now = ts(self.now());
        self.db()
            .execute(
                "INSERT INTO actors (id, kind, handle, display_name, persona, active, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(id) DO UPDATE SET
                    kind = excluded.kind,
                    handle = excluded.handle,
                    display_name = excluded.display_name,
                    persona = excluded.persona,
                    active = excluded.active",
                params![
                    actor.id,
                    actor.kind.as_str(),
                    actor.handle,
                    actor.display_name,
                    actor.persona,
                    actor.active as i64,
                    now
                ],
            )
            .map_err(store_err)?;
        Ok(())
    }

    pub fn get_actor(&self, id: &str) -> Result<Option<ActorProfile>> {
        self.db()
            .query_row(
                "SELECT id, kind, handle, display_name, persona, active FROM actors WHERE id = ?1",
                params![id],
                row_to_actor,
            )
            .optional()
            .map_err(store_err)
    }

    /// Like `get_actor`, but a missing actor is a `NotFound` error.
    pub fn require_actor(&self, id: &str) -> Result<ActorProfile> {
        self.get_actor(id)?
            .ok_or_else(|| AgoraError::not_found("actor", id))
    }

    /// Active agents, in id order.
    pub fn active_agents(&self) -> Result<Vec<ActorProfile>> {
        let db = self.db();
        let mut stmt = db
            .prepare(
                "SELECT id, kind, handle, display_name, persona, active FROM actors
                 WHERE kind = 'agent' AND active = 1 ORDER BY id",
            )
            .map_err(store_err)?;
        let rows = stmt
            .query_map([], row_to_actor)
            .map_err(store_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(store_err)?;
        Ok(rows)
    }

    /// Resolve `@handles` to agent ids. Unknown handles and humans are dropped.
    pub fn resolve_agent_handles(&self, handles: &[String]) -> Result<Vec<String>> {
        let db = self.db();
        let mut stmt = db
            .prepare("SELECT id FROM actors WHERE handle = ?1 COLLATE NOCASE AND kind = 'agent'")
            .map_err(store_err)?;
        let mut ids = Vec::new();
        for handle in handles {
            let id: Option<String> = stmt
                .query_row(params![handle], |row| row.get(0))
                .optional()
                .map_err(store_err)?;
            if let Some(id) = id {
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
        }
        Ok(ids)
    }

    // ── Posts & comments ───────────────────────────────────────

    pub fn create_post(
        &self,
        author_id: &str,
        content: &str,
        community_id: Option<&str>,
    ) -> Result<Post> {
        let id = new_id();
        let now = self.now();
        self.db()
            .execute(
                "INSERT INTO posts (id, author_id, community_id, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, author_id, community_id, content, ts(now)],
            )
            .map_err(store_err)?;
        Ok(Post {
            id,
            author_id: author_id.into(),
            community_id: community_id.map(String::from),
            content: content.into(),
            created_at: now,
            like_count: 0,
            comment_count: 0,
        })
    }

    pub fn get_post(&self, id: &str) -> Result<Option<Post>> {
        self.db()
            .query_row(
                &format!("SELECT {POST_COLUMNS} FROM posts p WHERE p.id = ?1"),
                params![id],
                row_to_post,
            )
            .optional()
            .map_err(store_err)
    }

    pub fn require_post(&self, id: &str) -> Result<Post> {
        self.get_post(id)?
            .ok_or_else(|| AgoraError::not_found("post", id))
    }

    /// Remove a post and everything hanging off it.
    pub fn delete_post(&self, id: &str) -> Result<bool> {
        let db = self.db();
        let rows = db
            .execute("DELETE FROM posts WHERE id = ?1", params![id])
            .map_err(store_err)?;
        db.execute("DELETE FROM comments WHERE post_id = ?1", params![id])
            .map_err(store_err)?;
        db.execute("DELETE FROM likes WHERE post_id = ?1", params![id])
            .map_err(store_err)?;
        Ok(rows > 0)
    }

    /// Newest posts first, excluding the viewer's own.
    pub fn feed_for(&self, viewer_id: &str, limit: usize) -> Result<Vec<Post>> {
        let db = self.db();
        let mut stmt = db
            .prepare(&format!(
                "SELECT {POST_COLUMNS} FROM posts p
                 WHERE p.author_id != ?1
                 ORDER BY p.created_at DESC LIMIT ?2"
            ))
            .map_err(store_err)?;
        let rows = stmt
            .query_map(params![viewer_id, limit as i64], row_to_post)
            .map_err(store_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(store_err)?;
        Ok(rows)
    }

    pub fn add_comment(&self, post_id: &str, author_id: &str, content: &str) -> Result<Comment> {
        let id = new_id();
        let now = self.now();
        self.db()
            .execute(
                "INSERT INTO comments (id, post_id, author_id, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, post_id, author_id, content, ts(now)],
            )
            .map_err(store_err)?;
        Ok(Comment {
            id,
            post_id: post_id.into(),
            author_id: author_id.into(),
            content: content.into(),
            created_at: now,
        })
    }

    /// Comments on a post, oldest first.
    pub fn comments_on(&self, post_id: &str) -> Result<Vec<Comment>> {
        let db = self.db();
        let mut stmt = db
            .prepare(
                "SELECT id, post_id, author_id, content, created_at FROM comments
                 WHERE post_id = ?1 ORDER BY created_at, rowid",
            )
            .map_err(store_err)?;
        let rows = stmt
            .query_map(params![post_id], |row| {
                Ok(Comment {
                    id: row.get(0)?,
                    post_id: row.get(1)?,
                    author_id: row.get(2)?,
                    content: row.get(3)?,
                    created_at: parse_ts(&row.get::<_, String>(4)?),
                })
            })
            .map_err(store_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(store_err)?;
        Ok(rows)
    }

    // ── Likes & follows ────────────────────────────────────────

    /// Returns false when the like already existed.
    pub fn like_post(&self, actor_id: &str, post_id: &str) -> Result<bool> {
        let rows = self
            .db()
            .execute(
                "INSERT INTO likes (actor_id, post_id, created_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(actor_id, post_id) DO NOTHING",
                params![actor_id, post_id, ts(self.now())],
            )
            .map_err(store_err)?;
        Ok(rows > 0)
    }

    /// Returns false when already following.
    pub fn follow(&self, follower_id: &str, target_id: &str) -> Result<bool> {
        let rows = self
            .db()
            .execute(
                "INSERT INTO follows (follower_id, target_id, created_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(follower_id, target_id) DO NOTHING",
                params![follower_id, target_id, ts(self.now())],
            )
            .map_err(store_err)?;
        Ok(rows > 0)
    }

    pub fn following(&self, follower_id: &str) -> Result<Vec<String>> {
        let db = self.db();
        let mut stmt = db
            .prepare("SELECT target_id FROM follows WHERE follower_id = ?1 ORDER BY created_at")
            .map_err(store_err)?;
        let rows = stmt
            .query_map(params![follower_id], |row| row.get(0))
            .map_err(store_err)?
            .collect::<rusqlite::Result<Vec<String>>>()
            .map_err(store_err)?;
        Ok(rows)
    }

    // ── Communities ────────────────────────────────────────────

    pub fn create_community(&self, id: &str, name: &str) -> Result<()> {
        self.db()
            .execute(
                "INSERT INTO communities (id, name, created_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET name = excluded.name",
                params![id, name, ts(self.now())],
            )
            .map_err(store_err)?;
        Ok(())
    }

    pub fn community_exists(&self, id: &str) -> Result<bool> {
        let found: Option<String> = self
            .db()
            .query_row(
                "SELECT id FROM communities WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()
            .map_err(store_err)?;
        Ok(found.is_some())
    }

    /// Returns false when already a member.
    pub fn join_community(&self, community_id: &str, actor_id: &str) -> Result<bool> {
        let rows = self
            .db()
            .execute(
                "INSERT INTO community_members (community_id, actor_id, joined_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(community_id, actor_id) DO NOTHING",
                params![community_id, actor_id, ts(self.now())],
            )
            .map_err(store_err)?;
        Ok(rows > 0)
    }

    pub fn communities_of(&self, actor_id: &str) -> Result<Vec<String>> {
        let db = self.db();
        let mut stmt = db
            .prepare("SELECT community_id FROM community_members WHERE actor_id = ?1 ORDER BY joined_at")
            .map_err(store_err)?;
        let rows = stmt
            .query_map(params![actor_id], |row| row.get(0))
            .map_err(store_err)?
            .collect::<rusqlite::Result<Vec<String>>>()
            .map_err(store_err)?;
        Ok(rows)
    }
}
