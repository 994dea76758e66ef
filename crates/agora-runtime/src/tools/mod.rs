//! Tool registry and the built-in tools.
//!
//! Data tools read the world and feed Observe. Action tools change it and
//! are only ever run by Act. Throttled action tools go through the heat
//! limiter first.

/// Wrap an async fn taking the env into a handler closure.
macro_rules! handler {
    ($env:expr, $f:path) => {{
        let env = $env.clone();
        move |input: serde_json::Value, ctx: $crate::tools::ToolContext| {
            let env = env.clone();
            async move { $f(&env, input, ctx).await }
        }
    }};
}
pub(crate) use handler;

mod data;
mod messaging;
mod notify;
mod refusal;
mod registry;
mod social;

pub use notify::{Notifier, extract_handles};
pub use registry::{ToolContext, ToolDefinition, ToolHandler, ToolRegistry};

pub(crate) use registry::{opt_str_arg, str_arg};

use agora_autonomy::EscalationTracker;
use agora_core::{Result, ToolCategory};
use agora_store::SqliteStore;

/// The closed set of built-in tool identities. Engine call sites use these
/// instead of string literals; the registry itself stays open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinTool {
    // Actions
    Like,
    Comment,
    CreatePost,
    Follow,
    JoinCommunity,
    Reply,
    SendMessage,
    Decline,
    Ignore,
    Remember,
    // Data
    GetProfile,
    GetFeed,
    GetPost,
    GetConversation,
    GetRelationships,
    CountSimilarRequests,
}

impl BuiltinTool {
    pub const ALL: [BuiltinTool; 16] = [
        BuiltinTool::Like,
        BuiltinTool::Comment,
        BuiltinTool::CreatePost,
        BuiltinTool::Follow,
        BuiltinTool::JoinCommunity,
        BuiltinTool::Reply,
        BuiltinTool::SendMessage,
        BuiltinTool::Decline,
        BuiltinTool::Ignore,
        BuiltinTool::Remember,
        BuiltinTool::GetProfile,
        BuiltinTool::GetFeed,
        BuiltinTool::GetPost,
        BuiltinTool::GetConversation,
        BuiltinTool::GetRelationships,
        BuiltinTool::CountSimilarRequests,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            BuiltinTool::Like => "like",
            BuiltinTool::Comment => "comment",
            BuiltinTool::CreatePost => "create_post",
            BuiltinTool::Follow => "follow",
            BuiltinTool::JoinCommunity => "join_community",
            BuiltinTool::Reply => "reply",
            BuiltinTool::SendMessage => "send_message",
            BuiltinTool::Decline => "decline",
            BuiltinTool::Ignore => "ignore",
            BuiltinTool::Remember => "remember",
            BuiltinTool::GetProfile => "get_profile",
            BuiltinTool::GetFeed => "get_feed",
            BuiltinTool::GetPost => "get_post",
            BuiltinTool::GetConversation => "get_conversation",
            BuiltinTool::GetRelationships => "get_relationships",
            BuiltinTool::CountSimilarRequests => "count_similar_requests",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name)
    }

    pub fn category(&self) -> ToolCategory {
        match self {
            BuiltinTool::GetProfile
            | BuiltinTool::GetFeed
            | BuiltinTool::GetPost
            | BuiltinTool::GetConversation
            | BuiltinTool::GetRelationships
            | BuiltinTool::CountSimilarRequests => ToolCategory::Data,
            _ => ToolCategory::Action,
        }
    }

    /// Actions that touch the shared world and cost heat.
    pub fn is_throttled(&self) -> bool {
        matches!(
            self,
            BuiltinTool::Like
                | BuiltinTool::Comment
                | BuiltinTool::CreatePost
                | BuiltinTool::Follow
                | BuiltinTool::JoinCommunity
                | BuiltinTool::Reply
                | BuiltinTool::SendMessage
        )
    }
}

impl std::fmt::Display for BuiltinTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// What built-in handlers close over.
#[derive(Clone)]
pub struct ToolEnv {
    pub store: SqliteStore,
    pub escalation: EscalationTracker,
    pub notifier: Notifier,
    /// Default lookback for `count_similar_requests`.
    pub escalation_window_hours: u32,
}

/// Register every built-in tool.
pub fn register_builtin_tools(registry: &mut ToolRegistry, env: &ToolEnv) {
    for def in social::definitions(env)
        .into_iter()
        .chain(messaging::definitions(env))
        .chain(refusal::definitions(env))
        .chain(data::definitions(env))
    {
        registry.register(def);
    }
}

/// A validated registry holding all built-ins.
pub fn builtin_registry(env: &ToolEnv) -> Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    register_builtin_tools(&mut registry, env);
    registry.validate()?;
    Ok(registry)
}
