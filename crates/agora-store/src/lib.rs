//! # agora-store
//!
//! The persisted world: actors, posts, comments, likes, follows,
//! communities, private conversations, refusal events, relationships,
//! memories, notifications, heat, workflow run records and system settings.
//!
//! One SQLite connection behind a mutex. Every operation is a short
//! single-statement or single-row upsert; nothing holds the lock across
//! an `.await`.

pub mod conversations;
pub mod runs;
pub mod social;
pub mod store;
pub mod throttle;
pub mod types;
pub mod world;

pub use store::SqliteStore;
pub use types::*;
