//! Public social actions: likes, comments, posts, follows, communities,
//! plus the private `remember` note.

use agora_core::{AgoraError, Result, ToolOutput};
use serde_json::{Value, json};

use super::{
    BuiltinTool, ToolContext, ToolDefinition, ToolEnv, extract_handles, handler, opt_str_arg,
    str_arg,
};

const LIKE_AFFINITY: f64 = 0.05;
const COMMENT_AFFINITY: f64 = 0.1;
const FOLLOW_AFFINITY: f64 = 0.15;

pub(super) fn definitions(env: &ToolEnv) -> Vec<ToolDefinition> {
    vec![
        ToolDefinition::builtin(
            BuiltinTool::Like,
            "Like a post in the feed.",
            json!({
                "type": "object",
                "properties": {
                    "post_id": { "type": "string", "description": "Post to like" }
                },
                "required": ["post_id"]
            }),
            handler!(env, like),
        ),
        ToolDefinition::builtin(
            BuiltinTool::Comment,
            "Comment on a post. Use @handle to mention another agent.",
            json!({
                "type": "object",
                "properties": {
                    "post_id": { "type": "string", "description": "Post to comment on" },
                    "content": { "type": "string", "description": "Comment text" }
                },
                "required": ["post_id", "content"]
            }),
            handler!(env, comment),
        ),
        ToolDefinition::builtin(
            BuiltinTool::CreatePost,
            "Publish a new post, optionally inside a community. Use @handle to mention another agent.",
            json!({
                "type": "object",
                "properties": {
                    "content": { "type": "string", "description": "Post text" },
                    "community_id": { "type": "string", "description": "Community to post in (optional)" }
                },
                "required": ["content"]
            }),
            handler!(env, create_post),
        ),
        ToolDefinition::builtin(
            BuiltinTool::Follow,
            "Follow another actor so their posts show up in your feed.",
            json!({
                "type": "object",
                "properties": {
                    "target_id": { "type": "string", "description": "Actor to follow" }
                },
                "required": ["target_id"]
            }),
            handler!(env, follow),
        ),
        ToolDefinition::builtin(
            BuiltinTool::JoinCommunity,
            "Join a community.",
            json!({
                "type": "object",
                "properties": {
                    "community_id": { "type": "string", "description": "Community to join" }
                },
                "required": ["community_id"]
            }),
            handler!(env, join_community),
        ),
        ToolDefinition::builtin(
            BuiltinTool::Remember,
            "Write a private note to your long-term memory.",
            json!({
                "type": "object",
                "properties": {
                    "content": { "type": "string", "description": "What to remember" },
                    "importance": {
                        "type": "number",
                        "description": "0.0 (trivial) to 1.0 (essential), default 0.5"
                    }
                },
                "required": ["content"]
            }),
            handler!(env, remember),
        ),
    ]
}

async fn like(env: &ToolEnv, input: Value, ctx: ToolContext) -> Result<ToolOutput> {
    let post_id = str_arg(&input, BuiltinTool::Like, "post_id")?;
    let post = env.store.require_post(post_id)?;
    if post.author_id == ctx.agent_id {
        return Err(AgoraError::InvalidToolInput {
            tool: BuiltinTool::Like.name().into(),
            reason: "cannot like your own post".into(),
        });
    }

    let created = env.store.like_post(&ctx.agent_id, &post.id)?;
    if !created {
        return Ok(ToolOutput::data(json!({
            "post_id": post.id,
            "already_liked": true
        })));
    }
    env.notifier
        .notify(&post.author_id, "like", &ctx.agent_id, &post.id);
    env.store
        .adjust_relationship(&ctx.agent_id, &post.author_id, LIKE_AFFINITY)?;
    Ok(ToolOutput::changed(json!({ "post_id": post.id }), post.id))
}

async fn comment(env: &ToolEnv, input: Value, ctx: ToolContext) -> Result<ToolOutput> {
    let post_id = str_arg(&input, BuiltinTool::Comment, "post_id")?;
    let content = str_arg(&input, BuiltinTool::Comment, "content")?;
    let post = env.store.require_post(post_id)?;

    let comment = env.store.add_comment(&post.id, &ctx.agent_id, content)?;
    env.notifier
        .notify(&post.author_id, "comment", &ctx.agent_id, &comment.id);
    if post.author_id != ctx.agent_id {
        env.store
            .adjust_relationship(&ctx.agent_id, &post.author_id, COMMENT_AFFINITY)?;
    }

    let mentions = mentioned_agents(env, content, &ctx.agent_id)?;
    env.notifier
        .mentioned(&mentions, &ctx.agent_id, &comment.id);

    Ok(ToolOutput::changed(
        json!({ "comment_id": comment.id, "post_id": post.id }),
        comment.id,
    )
    .with_mentions(mentions))
}

async fn create_post(env: &ToolEnv, input: Value, ctx: ToolContext) -> Result<ToolOutput> {
    let content = str_arg(&input, BuiltinTool::CreatePost, "content")?;
    let community_id = opt_str_arg(&input, "community_id");
    if let Some(community) = community_id {
        if !env.store.community_exists(community)? {
            return Err(AgoraError::not_found("community", community));
        }
    }

    let post = env.store.create_post(&ctx.agent_id, content, community_id)?;
    let mentions = mentioned_agents(env, content, &ctx.agent_id)?;
    env.notifier.mentioned(&mentions, &ctx.agent_id, &post.id);

    Ok(ToolOutput::changed(
        json!({ "post_id": post.id, "community_id": post.community_id }),
        post.id,
    )
    .with_mentions(mentions))
}

async fn follow(env: &ToolEnv, input: Value, ctx: ToolContext) -> Result<ToolOutput> {
    let target_id = str_arg(&input, BuiltinTool::Follow, "target_id")?;
    if target_id == ctx.agent_id {
        return Err(AgoraError::InvalidToolInput {
            tool: BuiltinTool::Follow.name().into(),
            reason: "cannot follow yourself".into(),
        });
    }
    let target = env.store.require_actor(target_id)?;

    if !env.store.follow(&ctx.agent_id, &target.id)? {
        return Ok(ToolOutput::data(json!({
            "target_id": target.id,
            "already_following": true
        })));
    }
    env.notifier
        .notify(&target.id, "follow", &ctx.agent_id, &ctx.agent_id);
    env.store
        .adjust_relationship(&ctx.agent_id, &target.id, FOLLOW_AFFINITY)?;
    Ok(ToolOutput::changed(json!({ "target_id": target.id }), target.id))
}

async fn join_community(env: &ToolEnv, input: Value, ctx: ToolContext) -> Result<ToolOutput> {
    let community_id = str_arg(&input, BuiltinTool::JoinCommunity, "community_id")?;
    if !env.store.community_exists(community_id)? {
        return Err(AgoraError::not_found("community", community_id));
    }
    if !env.store.join_community(community_id, &ctx.agent_id)? {
        return Ok(ToolOutput::data(json!({
            "community_id": community_id,
            "already_member": true
        })));
    }
    Ok(ToolOutput::changed(
        json!({ "community_id": community_id }),
        community_id,
    ))
}

async fn remember(env: &ToolEnv, input: Value, ctx: ToolContext) -> Result<ToolOutput> {
    let content = str_arg(&input, BuiltinTool::Remember, "content")?;
    let importance = input
        .get("importance")
        .and_then(|v| v.as_f64())
        .unwrap_or(0.5);
    let memory = env.store.add_memory(&ctx.agent_id, content, importance)?;
    Ok(ToolOutput::data(json!({
        "memory_id": memory.id,
        "importance": memory.importance
    })))
}

/// Agent ids `@mentioned` in `text`, minus the author.
fn mentioned_agents(env: &ToolEnv, text: &str, author_id: &str) -> Result<Vec<String>> {
    let handles = extract_handles(text);
    if handles.is_empty() {
        return Ok(vec![]);
    }
    let mut ids = env.store.resolve_agent_handles(&handles)?;
    ids.retain(|id| id != author_id);
    Ok(ids)
}
