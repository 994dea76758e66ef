//! Entry points for callers outside the process: external cron pingers
//! and chat/request handlers.

use agora_core::{ActorKind, AgoraError, Result, Subject, SubjectKind, WorkflowKey, WorldEvent};
use agora_store::RunStatus;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::scheduler::{RunContext, Scheduler, WorkflowRunResult};

/// What a trigger caller gets back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerResponse {
    pub success: bool,
    pub executed_actions: Vec<String>,
    pub iterations: u32,
    pub elapsed_ms: u64,
    pub errors: Vec<String>,
    pub status: RunStatus,
    pub message: String,
}

impl TriggerResponse {
    pub fn from_run(result: &WorkflowRunResult, elapsed: Duration) -> Self {
        let mut errors: Vec<String> = result
            .cycles
            .iter()
            .flat_map(|c| c.errors.iter().cloned())
            .collect();
        if let Some(e) = &result.error {
            errors.push(e.clone());
        }
        Self {
            success: result.status != RunStatus::Error,
            executed_actions: result
                .cycles
                .iter()
                .flat_map(|c| c.executed_actions.iter().cloned())
                .collect(),
            iterations: result.cycles.iter().map(|c| c.iterations).sum(),
            elapsed_ms: elapsed.as_millis() as u64,
            errors,
            status: result.status,
            message: result.message.clone(),
        }
    }
}

#[derive(Clone)]
pub struct Triggers {
    scheduler: Scheduler,
    secret_digest: Option<blake3::Hash>,
}

impl Triggers {
    /// An empty or missing secret disables the scheduled-run trigger.
    pub fn new(scheduler: Scheduler, cron_secret: Option<&str>) -> Self {
        let secret_digest = cron_secret
            .filter(|s| !s.is_empty())
            .map(|s| blake3::hash(s.as_bytes()));
        Self {
            scheduler,
            secret_digest,
        }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Compare a presented secret against the configured one. Digest
    /// equality is constant time.
    pub fn check_secret(&self, presented: Option<&str>) -> Result<()> {
        let Some(expected) = &self.secret_digest else {
            return Err(AgoraError::Unauthorized(
                "no cron secret configured, external triggers are disabled".into(),
            ));
        };
        let Some(presented) = presented else {
            return Err(AgoraError::Unauthorized("missing secret".into()));
        };
        if blake3::hash(presented.as_bytes()) == *expected {
            Ok(())
        } else {
            warn!("workflow trigger presented a wrong secret");
            Err(AgoraError::Unauthorized("invalid secret".into()))
        }
    }

    /// Run a scheduled workflow now. Event-driven keys are not reachable
    /// this way.
    pub async fn run_scheduled(
        &self,
        key: &str,
        presented_secret: Option<&str>,
    ) -> Result<TriggerResponse> {
        self.check_secret(presented_secret)?;
        let workflow = WorkflowKey::parse(key)
            .filter(|k| !k.is_event_driven())
            .ok_or_else(|| AgoraError::UnknownWorkflow(key.to_string()))?;

        let started = Instant::now();
        let result = self
            .scheduler
            .run_workflow(workflow, RunContext::cron())
            .await;
        info!(job = %workflow, status = %result.status, "external trigger ran workflow");
        Ok(TriggerResponse::from_run(&result, started.elapsed()))
    }

    /// Run the chat workflow for one agent and subject.
    pub async fn run_chat(
        &self,
        actor_id: &str,
        subject: Subject,
        conversation_id: Option<String>,
    ) -> Result<TriggerResponse> {
        let actor = self.scheduler.store().require_actor(actor_id)?;
        if actor.kind != ActorKind::Agent {
            return Err(AgoraError::not_found("agent", actor_id));
        }
        let started = Instant::now();
        let result = self
            .scheduler
            .run_workflow(
                WorkflowKey::AgentChat,
                RunContext::chat(actor.id, subject, conversation_id),
            )
            .await;
        Ok(TriggerResponse::from_run(&result, started.elapsed()))
    }

    /// Store an inbound private message from `from` to agent `to`, then
    /// let the agent react to it.
    pub async fn receive_message(&self, from: &str, to: &str, text: &str) -> Result<TriggerResponse> {
        let store = self.scheduler.store();
        store.require_actor(from)?;
        let (conversation, _) = store.find_or_create_conversation(from, to)?;
        let message = store.add_message(&conversation.id, from, text)?;
        self.scheduler
            .engine()
            .events()
            .publish(WorldEvent::MessageSent {
                conversation_id: conversation.id.clone(),
                sender_id: message.sender_id.clone(),
                recipient_id: message.recipient_id.clone(),
            });

        let subject = Subject::new(
            message.id,
            SubjectKind::Message,
            json!({ "sender_id": from, "text": text }),
        );
        self.run_chat(to, subject, Some(conversation.id)).await
    }
}
