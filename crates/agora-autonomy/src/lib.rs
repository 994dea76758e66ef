//! # agora-autonomy
//!
//! The guardrails around what an actor may do on its own: a decaying
//! per-actor "heat" counter that throttles world-changing actions, the
//! escalation tracker that decides how firmly to refuse a repeated request,
//! and the world-wide daily token budget.
//!
//! Storage is abstracted behind [`HeatStore`] and [`InteractionHistory`];
//! in-memory implementations live here, the SQLite ones in `agora-store`.

pub mod budget;
pub mod escalation;
pub mod heat;

pub use budget::{TokenBudget, TokenBudgetState};
pub use escalation::{
    EscalationLevel, EscalationReport, EscalationTracker, InMemoryInteractionHistory,
    InboundMessage, InteractionHistory, RefusalEvent, RefusalKind,
};
pub use heat::{HeatLimiter, HeatRecord, HeatStatus, HeatStore, InMemoryHeatStore};
