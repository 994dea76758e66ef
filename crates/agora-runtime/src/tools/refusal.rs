//! Leveled refusals. `decline` always answers where the request was made;
//! `ignore` only records that the actor chose not to.

use agora_autonomy::{EscalationLevel, RefusalEvent, RefusalKind};
use agora_core::{AgoraError, Result, SubjectKind, ToolOutput, WorldEvent};
use serde_json::{Value, json};
use tracing::debug;

use super::messaging::announce;
use super::{BuiltinTool, ToolContext, ToolDefinition, ToolEnv, handler, opt_str_arg, str_arg};

pub(super) fn definitions(env: &ToolEnv) -> Vec<ToolDefinition> {
    vec![
        ToolDefinition::builtin(
            BuiltinTool::Decline,
            "Refuse a request with a visible answer. Level 1 is polite, 2 firm, 3 harsh.",
            json!({
                "type": "object",
                "properties": {
                    "level": { "type": "integer", "minimum": 1, "maximum": 3 },
                    "message": { "type": "string", "description": "What you say to the requester" },
                    "request_kind": {
                        "type": "string",
                        "description": "Short label for what was asked, e.g. \"money\""
                    },
                    "requester_id": {
                        "type": "string",
                        "description": "Who asked. Defaults to the sender of the current subject."
                    }
                },
                "required": ["level", "message"]
            }),
            handler!(env, decline),
        ),
        ToolDefinition::builtin(
            BuiltinTool::Ignore,
            "Deliberately leave a request unanswered.",
            json!({
                "type": "object",
                "properties": {
                    "request_kind": { "type": "string" },
                    "requester_id": { "type": "string" }
                }
            }),
            handler!(env, ignore),
        ),
    ]
}

async fn decline(env: &ToolEnv, input: Value, ctx: ToolContext) -> Result<ToolOutput> {
    let tool = BuiltinTool::Decline;
    let level = input
        .get("level")
        .and_then(|v| v.as_u64())
        .and_then(EscalationLevel::from_decline_level)
        .ok_or_else(|| AgoraError::InvalidToolInput {
            tool: tool.name().into(),
            reason: "level must be 1, 2 or 3".into(),
        })?;
    let message = str_arg(&input, tool, "message")?;
    let requester_id = requester(&input, &ctx, tool)?;

    let target_id = respond(env, &ctx, &requester_id, message)?;

    env.escalation.record_refusal(&RefusalEvent {
        actor_id: ctx.agent_id.clone(),
        requester_id: requester_id.clone(),
        kind: RefusalKind::Decline,
        level,
        request_kind: opt_str_arg(&input, "request_kind").map(String::from),
        at: env.escalation.now(),
    })?;
    env.notifier
        .notify(&requester_id, "decline", &ctx.agent_id, &target_id);
    env.notifier.publish(WorldEvent::Refused {
        actor_id: ctx.agent_id.clone(),
        requester_id: requester_id.clone(),
        level: level.as_str().into(),
    });

    Ok(ToolOutput::changed(
        json!({
            "requester_id": requester_id,
            "level": level.as_str(),
            "response_id": target_id
        }),
        target_id,
    ))
}

async fn ignore(env: &ToolEnv, input: Value, ctx: ToolContext) -> Result<ToolOutput> {
    let requester_id = requester(&input, &ctx, BuiltinTool::Ignore)?;
    env.escalation.record_refusal(&RefusalEvent {
        actor_id: ctx.agent_id.clone(),
        requester_id: requester_id.clone(),
        kind: RefusalKind::Ignore,
        level: EscalationLevel::Ignore,
        request_kind: opt_str_arg(&input, "request_kind").map(String::from),
        at: env.escalation.now(),
    })?;
    env.notifier.publish(WorldEvent::Refused {
        actor_id: ctx.agent_id.clone(),
        requester_id: requester_id.clone(),
        level: EscalationLevel::Ignore.as_str().into(),
    });
    Ok(ToolOutput::data(json!({ "requester_id": requester_id, "ignored": true })))
}

/// The subject's sender wins over whatever the model passed.
fn requester(input: &Value, ctx: &ToolContext, tool: BuiltinTool) -> Result<String> {
    ctx.meta_str("sender_id")
        .or_else(|| opt_str_arg(input, "requester_id"))
        .map(String::from)
        .ok_or_else(|| AgoraError::MissingParameter {
            tool: tool.name().into(),
            param: "requester_id".into(),
        })
}

/// Post the refusal on the surface the request arrived on. Returns the id
/// of the comment or message written.
fn respond(env: &ToolEnv, ctx: &ToolContext, requester_id: &str, text: &str) -> Result<String> {
    let public = ctx
        .meta_str("subject_kind")
        .map(SubjectKind::parse)
        .is_some_and(|k| k.is_public());

    if public {
        let post_id = ctx
            .meta_str("post_id")
            .ok_or_else(|| AgoraError::InvalidToolInput {
                tool: BuiltinTool::Decline.name().into(),
                reason: "public subject without a post".into(),
            })?;
        let comment = env.store.add_comment(post_id, &ctx.agent_id, text)?;
        debug!(post = post_id, comment = %comment.id, "decline answered on the post");
        return Ok(comment.id);
    }

    let conversation_id = match ctx.conversation_id.as_deref() {
        Some(id) => id.to_string(),
        None => {
            env.store
                .find_or_create_conversation(&ctx.agent_id, requester_id)?
                .0
                .id
        }
    };
    let message = env
        .store
        .add_message(&conversation_id, &ctx.agent_id, text)?;
    announce(env, &message);
    debug!(conversation = %conversation_id, "decline answered privately");
    Ok(message.id)
}
