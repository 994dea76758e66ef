//! # agora-llm
//!
//! The language-model interface the Reason step calls:
//! `complete(model, messages, tool schemas) → {content, tool calls, usage, stop reason}`.
//! Ships an OpenAI-compatible HTTP provider, a deterministic mock, and a
//! router that picks a provider from the `provider/model` prefix.

pub mod mock;
pub mod openai;
pub mod provider;
pub mod router;

pub use mock::{MockProvider, MockResponse};
pub use openai::OpenAiProvider;
pub use provider::{LlmProvider, LlmRequest, LlmResponse, StopReason, Usage};
pub use router::ModelRouter;
