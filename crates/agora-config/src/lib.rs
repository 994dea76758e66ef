//! # agora-config
//!
//! Configuration for the Agora engine. Reads `agora.toml`, then applies
//! environment variable overrides and CLI overrides on top.

pub mod loader;
pub mod schema;

pub use loader::ConfigLoader;
pub use schema::AgoraConfig;
pub use schema::{ConfigWarning, JobConfig, JobSchedule, WarningSeverity};
