//! Private exchanges between two actors.

use agora_core::{AgoraError, Result, ToolOutput, WorldEvent};
use agora_store::DirectMessage;
use serde_json::{Value, json};

use super::{BuiltinTool, ToolContext, ToolDefinition, ToolEnv, handler, str_arg};

const MESSAGE_AFFINITY: f64 = 0.05;

pub(super) fn definitions(env: &ToolEnv) -> Vec<ToolDefinition> {
    vec![
        ToolDefinition::builtin(
            BuiltinTool::Reply,
            "Reply in the conversation you are currently in.",
            json!({
                "type": "object",
                "properties": {
                    "content": { "type": "string", "description": "Reply text" }
                },
                "required": ["content"]
            }),
            handler!(env, reply),
        ),
        ToolDefinition::builtin(
            BuiltinTool::SendMessage,
            "Send a private message to another actor, opening a conversation if needed.",
            json!({
                "type": "object",
                "properties": {
                    "recipient_id": { "type": "string", "description": "Actor to message" },
                    "content": { "type": "string", "description": "Message text" }
                },
                "required": ["recipient_id", "content"]
            }),
            handler!(env, send_message),
        ),
    ]
}

async fn reply(env: &ToolEnv, input: Value, ctx: ToolContext) -> Result<ToolOutput> {
    let content = str_arg(&input, BuiltinTool::Reply, "content")?;
    // Only the bound conversation; the model never picks where a reply lands.
    let conversation_id = ctx
        .conversation_id
        .as_deref()
        .ok_or_else(|| AgoraError::InvalidToolInput {
            tool: BuiltinTool::Reply.name().into(),
            reason: "no conversation bound to this cycle".into(),
        })?;

    let message = env
        .store
        .add_message(conversation_id, &ctx.agent_id, content)?;
    announce(env, &message);
    Ok(ToolOutput::changed(
        json!({ "conversation_id": message.conversation_id, "message_id": message.id }),
        message.id,
    ))
}

async fn send_message(env: &ToolEnv, input: Value, ctx: ToolContext) -> Result<ToolOutput> {
    let recipient_id = str_arg(&input, BuiltinTool::SendMessage, "recipient_id")?;
    let content = str_arg(&input, BuiltinTool::SendMessage, "content")?;
    if recipient_id == ctx.agent_id {
        return Err(AgoraError::InvalidToolInput {
            tool: BuiltinTool::SendMessage.name().into(),
            reason: "cannot message yourself".into(),
        });
    }
    let recipient = env.store.require_actor(recipient_id)?;

    let (conversation, created) = env
        .store
        .find_or_create_conversation(&ctx.agent_id, &recipient.id)?;
    let message = env
        .store
        .add_message(&conversation.id, &ctx.agent_id, content)?;
    announce(env, &message);
    env.store
        .adjust_relationship(&ctx.agent_id, &recipient.id, MESSAGE_AFFINITY)?;

    Ok(ToolOutput::changed(
        json!({
            "conversation_id": conversation.id,
            "message_id": message.id,
            "created_conversation": created
        }),
        message.id,
    ))
}

/// Notification plus `MessageSent` for a message that was just stored.
pub(super) fn announce(env: &ToolEnv, message: &DirectMessage) {
    env.notifier.notify(
        &message.recipient_id,
        "message",
        &message.sender_id,
        &message.conversation_id,
    );
    env.notifier.publish(WorldEvent::MessageSent {
        conversation_id: message.conversation_id.clone(),
        sender_id: message.sender_id.clone(),
        recipient_id: message.recipient_id.clone(),
    });
}
