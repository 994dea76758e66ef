//! Read-only tools the Observe step calls.

use agora_core::{AgoraError, Result, ToolOutput};
use serde_json::{Value, json};

use super::{BuiltinTool, ToolContext, ToolDefinition, ToolEnv, handler, opt_str_arg, str_arg};

const DEFAULT_FEED: usize = 10;
const MAX_FEED: usize = 50;
const DEFAULT_MESSAGES: usize = 20;
const MAX_MESSAGES: usize = 100;
const PROFILE_MEMORIES: usize = 10;

pub(super) fn definitions(env: &ToolEnv) -> Vec<ToolDefinition> {
    vec![
        ToolDefinition::builtin(
            BuiltinTool::GetProfile,
            "Profile of an actor, with communities, follows and top memories.",
            json!({
                "type": "object",
                "properties": {
                    "actor_id": { "type": "string", "description": "Defaults to yourself" }
                }
            }),
            handler!(env, get_profile),
        ),
        ToolDefinition::builtin(
            BuiltinTool::GetFeed,
            "Recent posts from everyone, followed actors and your communities first.",
            json!({
                "type": "object",
                "properties": {
                    "limit": { "type": "integer", "minimum": 1, "maximum": MAX_FEED }
                }
            }),
            handler!(env, get_feed),
        ),
        ToolDefinition::builtin(
            BuiltinTool::GetPost,
            "A post and its comment thread.",
            json!({
                "type": "object",
                "properties": {
                    "post_id": { "type": "string" }
                },
                "required": ["post_id"]
            }),
            handler!(env, get_post),
        ),
        ToolDefinition::builtin(
            BuiltinTool::GetConversation,
            "Recent messages of a conversation you take part in.",
            json!({
                "type": "object",
                "properties": {
                    "conversation_id": {
                        "type": "string",
                        "description": "Defaults to the conversation bound to this cycle"
                    },
                    "limit": { "type": "integer", "minimum": 1, "maximum": MAX_MESSAGES }
                }
            }),
            handler!(env, get_conversation),
        ),
        ToolDefinition::builtin(
            BuiltinTool::GetRelationships,
            "How you feel about the actors you have dealt with, strongest first.",
            json!({ "type": "object", "properties": {} }),
            handler!(env, get_relationships),
        ),
        ToolDefinition::builtin(
            BuiltinTool::CountSimilarRequests,
            "How often a requester repeated a request recently and how often you refused.",
            json!({
                "type": "object",
                "properties": {
                    "requester_id": { "type": "string" },
                    "request_kind": { "type": "string" },
                    "window_hours": { "type": "integer", "minimum": 1 }
                },
                "required": ["requester_id"]
            }),
            handler!(env, count_similar_requests),
        ),
    ]
}

fn limit_arg(input: &Value, default: usize, max: usize) -> usize {
    input
        .get("limit")
        .and_then(|v| v.as_u64())
        .map(|n| (n as usize).clamp(1, max))
        .unwrap_or(default)
}

async fn get_profile(env: &ToolEnv, input: Value, ctx: ToolContext) -> Result<ToolOutput> {
    let actor_id = opt_str_arg(&input, "actor_id").unwrap_or(&ctx.agent_id);
    let profile = env.store.require_actor(actor_id)?;
    let communities = env.store.communities_of(actor_id)?;
    let following = env.store.following(actor_id)?;
    // Memories are private.
    let memories = if actor_id == ctx.agent_id {
        env.store.memories_of(actor_id, PROFILE_MEMORIES)?
    } else {
        vec![]
    };
    Ok(ToolOutput::data(json!({
        "profile": profile,
        "communities": communities,
        "following": following,
        "memories": memories
    })))
}

async fn get_feed(env: &ToolEnv, input: Value, ctx: ToolContext) -> Result<ToolOutput> {
    let limit = limit_arg(&input, DEFAULT_FEED, MAX_FEED);
    let posts = env.store.feed_for(&ctx.agent_id, limit)?;
    Ok(ToolOutput::data(json!({ "posts": posts })))
}

async fn get_post(env: &ToolEnv, input: Value, _ctx: ToolContext) -> Result<ToolOutput> {
    let post_id = str_arg(&input, BuiltinTool::GetPost, "post_id")?;
    let post = env.store.require_post(post_id)?;
    let comments = env.store.comments_on(&post.id)?;
    Ok(ToolOutput::data(json!({ "post": post, "comments": comments })))
}

async fn get_conversation(env: &ToolEnv, input: Value, ctx: ToolContext) -> Result<ToolOutput> {
    let conversation_id = opt_str_arg(&input, "conversation_id")
        .or(ctx.conversation_id.as_deref())
        .ok_or_else(|| AgoraError::MissingParameter {
            tool: BuiltinTool::GetConversation.name().into(),
            param: "conversation_id".into(),
        })?;
    let conversation = env.store.require_conversation(conversation_id)?;
    let Some(other) = conversation.other_participant(&ctx.agent_id) else {
        return Err(AgoraError::InvalidToolInput {
            tool: BuiltinTool::GetConversation.name().into(),
            reason: format!("{} is not part of {conversation_id}", ctx.agent_id),
        });
    };
    let limit = limit_arg(&input, DEFAULT_MESSAGES, MAX_MESSAGES);
    let messages = env.store.recent_messages(&conversation.id, limit)?;
    Ok(ToolOutput::data(json!({
        "conversation_id": conversation.id,
        "with": other,
        "messages": messages
    })))
}

async fn get_relationships(env: &ToolEnv, _input: Value, ctx: ToolContext) -> Result<ToolOutput> {
    let relationships = env.store.relationships_of(&ctx.agent_id)?;
    Ok(ToolOutput::data(json!({ "relationships": relationships })))
}

async fn count_similar_requests(
    env: &ToolEnv,
    input: Value,
    ctx: ToolContext,
) -> Result<ToolOutput> {
    let requester_id = str_arg(&input, BuiltinTool::CountSimilarRequests, "requester_id")?;
    let request_kind = opt_str_arg(&input, "request_kind");
    let window_hours = input
        .get("window_hours")
        .and_then(|v| v.as_u64())
        .map(|h| h.clamp(1, u32::MAX as u64) as u32)
        .unwrap_or(env.escalation_window_hours);

    let report = env.escalation.count_similar_requests(
        &ctx.agent_id,
        requester_id,
        request_kind,
        window_hours,
    )?;
    Ok(ToolOutput::data(json!({
        "requester_id": requester_id,
        "window_hours": window_hours,
        "total_recent_messages": report.total_recent_messages,
        "similar_requests_count": report.similar_requests_count,
        "decline_count": report.decline_count,
        "persistence_level": report.persistence_level,
        "level": report.level.as_str(),
        "guidance": report.level.guidance()
    })))
}
