use agora_core::{AgoraError, Clock, SystemClock};
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// The SQLite-backed world store.
///
/// Cheap to clone; clones share the connection.
#[derive(Clone)]
pub struct SqliteStore {
    db: Arc<Mutex<Connection>>,
    clock: Arc<dyn Clock>,
}

impl SqliteStore {
    /// Open or create the world database at the given path.
    pub fn open(path: &Path) -> agora_core::Result<Self> {
        Self::open_with_clock(path, Arc::new(SystemClock))
    }

    /// Open with an injected clock; every timestamp the store writes comes from it.
    pub fn open_with_clock(path: &Path, clock: Arc<dyn Clock>) -> agora_core::Result<Self> {
        info!(?path, "opening world store");

        let conn = Connection::open(path).map_err(store_err)?;

        // WAL for concurrent readers; foreign keys stay off, rows are referenced by id only.
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(store_err)?;

        conn.execute_batch(SCHEMA).map_err(store_err)?;

        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
            clock,
        })
    }

    /// Open an in-memory database (for tests).
    pub fn open_in_memory() -> agora_core::Result<Self> {
        Self::open(Path::new(":memory:"))
    }

    pub fn open_in_memory_with_clock(clock: Arc<dyn Clock>) -> agora_core::Result<Self> {
        Self::open_with_clock(Path::new(":memory:"), clock)
    }

    /// Get a reference to the raw database connection (for advanced queries).
    pub fn db(&self) -> parking_lot::MutexGuard<'_, Connection> {
        self.db.lock()
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS actors (
        id TEXT PRIMARY KEY,
        kind TEXT NOT NULL,
        handle TEXT NOT NULL UNIQUE,
        display_name TEXT NOT NULL,
        persona TEXT NOT NULL DEFAULT '',
        active INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS posts (
        id TEXT PRIMARY KEY,
        author_id TEXT NOT NULL,
        community_id TEXT,
        content TEXT NOT NULL,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS comments (
        id TEXT PRIMARY KEY,
        post_id TEXT NOT NULL,
        author_id TEXT NOT NULL,
        content TEXT NOT NULL,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS likes (
        actor_id TEXT NOT NULL,
        post_id TEXT NOT NULL,
        created_at TEXT NOT NULL,
        PRIMARY KEY (actor_id, post_id)
    );

    CREATE TABLE IF NOT EXISTS follows (
        follower_id TEXT NOT NULL,
        target_id TEXT NOT NULL,
        created_at TEXT NOT NULL,
        PRIMARY KEY (follower_id, target_id)
    );

    CREATE TABLE IF NOT EXISTS communities (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS community_members (
        community_id TEXT NOT NULL,
        actor_id TEXT NOT NULL,
        joined_at TEXT NOT NULL,
        PRIMARY KEY (community_id, actor_id)
    );

    CREATE TABLE IF NOT EXISTS conversations (
        id TEXT PRIMARY KEY,
        participant_a TEXT NOT NULL,
        participant_b TEXT NOT NULL,
        created_at TEXT NOT NULL,
        UNIQUE (participant_a, participant_b)
    );

    CREATE TABLE IF NOT EXISTS messages (
        id TEXT PRIMARY KEY,
        conversation_id TEXT NOT NULL,
        sender_id TEXT NOT NULL,
        recipient_id TEXT NOT NULL,
        content TEXT NOT NULL,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS refusal_events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        actor_id TEXT NOT NULL,
        requester_id TEXT NOT NULL,
        kind TEXT NOT NULL,
        level TEXT NOT NULL,
        request_kind TEXT,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS relationships (
        actor_id TEXT NOT NULL,
        other_id TEXT NOT NULL,
        score REAL NOT NULL,
        updated_at TEXT NOT NULL,
        PRIMARY KEY (actor_id, other_id)
    );

    CREATE TABLE IF NOT EXISTS memories (
        id TEXT PRIMARY KEY,
        actor_id TEXT NOT NULL,
        content TEXT NOT NULL,
        importance REAL NOT NULL DEFAULT 0.5,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS notifications (
        id TEXT PRIMARY KEY,
        recipient_id TEXT NOT NULL,
        kind TEXT NOT NULL,
        actor_id TEXT NOT NULL,
        target_id TEXT NOT NULL,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS heat_records (
        actor_id TEXT PRIMARY KEY,
        current_heat REAL NOT NULL,
        last_decay_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS heat_events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        actor_id TEXT NOT NULL,
        action_kind TEXT NOT NULL,
        target_id TEXT,
        amount INTEGER NOT NULL,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS workflow_runs (
        id TEXT PRIMARY KEY,
        workflow_key TEXT NOT NULL,
        status TEXT NOT NULL,
        message TEXT NOT NULL,
        trigger TEXT NOT NULL,
        started_at TEXT NOT NULL,
        finished_at TEXT NOT NULL,
        data TEXT NOT NULL DEFAULT '{}',
        error TEXT
    );

    CREATE TABLE IF NOT EXISTS system_settings (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_posts_created ON posts(created_at);
    CREATE INDEX IF NOT EXISTS idx_comments_post ON comments(post_id);
    CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id, created_at);
    CREATE INDEX IF NOT EXISTS idx_messages_pair ON messages(sender_id, recipient_id, created_at);
    CREATE INDEX IF NOT EXISTS idx_refusals_pair ON refusal_events(actor_id, requester_id, created_at);
    CREATE INDEX IF NOT EXISTS idx_memories_actor ON memories(actor_id);
    CREATE INDEX IF NOT EXISTS idx_notifications_recipient ON notifications(recipient_id, created_at);
    CREATE INDEX IF NOT EXISTS idx_runs_started ON workflow_runs(started_at);
";

pub(crate) fn store_err(e: rusqlite::Error) -> AgoraError {
    AgoraError::Store(e.to_string())
}

/// Fixed-width UTC timestamps so string comparison in SQL orders correctly.
pub(crate) fn ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_ts(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
