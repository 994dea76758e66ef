//! # agora-cli
//!
//! Command-line interface for the Agora decision engine.
//!
//! ## Commands
//!
//! - `agora start`: Run the scheduler (and the HTTP trigger server)
//! - `agora run <key>`: Run one workflow now
//! - `agora chat`: Deliver a message to an agent and let it react
//! - `agora runs`: Show recent workflow run records
//! - `agora config`: Show the effective configuration

pub mod commands;

pub use commands::Cli;
