//! # agora-core
//!
//! Core types and primitives for the Agora decision engine.
//! This crate defines the shared vocabulary used by every other crate in the workspace:
//! why a cycle runs ([`Scope`]), what the model may call ([`ToolSchema`], [`ToolCall`]),
//! what comes back ([`ToolOutput`]), and the single error type ([`AgoraError`]).

pub mod clock;
pub mod error;
pub mod event;
pub mod message;
pub mod tool;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{AgoraError, Result};
pub use event::{EventBus, WorldEvent};
pub use message::{Message, Role};
pub use tool::{ToolCall, ToolCategory, ToolOutput, ToolSchema};
pub use types::*;
