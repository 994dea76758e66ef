use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of an actor (human or agent) in the world store.
pub type ActorId = String;

/// Identifier of a private conversation between two actors.
pub type ConversationId = String;

/// Identifier of a post on the shared feed.
pub type PostId = String;

/// Identifier of one recorded trace run.
pub type RunId = Uuid;

/// What kind of participant an actor is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorKind {
    Human,
    Agent,
}

impl ActorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorKind::Human => "human",
            ActorKind::Agent => "agent",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "human" => Some(ActorKind::Human),
            "agent" => Some(ActorKind::Agent),
            _ => None,
        }
    }
}

/// The actor a decision cycle runs on behalf of.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: ActorId,
    pub kind: ActorKind,
}

impl Actor {
    pub fn agent(id: impl Into<ActorId>) -> Self {
        Self {
            id: id.into(),
            kind: ActorKind::Agent,
        }
    }

    pub fn human(id: impl Into<ActorId>) -> Self {
        Self {
            id: id.into(),
            kind: ActorKind::Human,
        }
    }
}

/// Whether a cycle was started by a timer or by something happening in the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    Schedule,
    Event,
}

/// Provenance of a decision cycle: a named schedule or a named event, and when it fired.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    pub kind: TriggerKind,
    /// Schedule name (e.g. "agent_cycle") or event name (e.g. "chat_message", "mention").
    pub name: String,
    pub at: DateTime<Utc>,
}

impl Trigger {
    pub fn schedule(name: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            kind: TriggerKind::Schedule,
            name: name.into(),
            at,
        }
    }

    pub fn event(name: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            kind: TriggerKind::Event,
            name: name.into(),
            at,
        }
    }
}

/// What kind of world object caused an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectKind {
    Post,
    Comment,
    Message,
    Conversation,
    Other(String),
}

impl SubjectKind {
    pub fn as_str(&self) -> &str {
        match self {
            SubjectKind::Post => "post",
            SubjectKind::Comment => "comment",
            SubjectKind::Message => "message",
            SubjectKind::Conversation => "conversation",
            SubjectKind::Other(s) => s.as_str(),
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "post" => SubjectKind::Post,
            "comment" => SubjectKind::Comment,
            "message" => SubjectKind::Message,
            "conversation" => SubjectKind::Conversation,
            other => SubjectKind::Other(other.to_string()),
        }
    }

    /// Shared-feed subjects get public replies; everything else is a private exchange.
    pub fn is_public(&self) -> bool {
        matches!(self, SubjectKind::Post | SubjectKind::Comment)
    }
}

/// The world object that caused an event-triggered cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    pub id: String,
    pub kind: SubjectKind,
    /// Opaque payload (the message text, the post body, sender id, ...).
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Subject {
    pub fn new(id: impl Into<String>, kind: SubjectKind, payload: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            kind,
            payload,
        }
    }

    /// The actor who authored the subject, if the payload names one.
    pub fn sender_id(&self) -> Option<&str> {
        self.payload
            .get("sender_id")
            .or_else(|| self.payload.get("author_id"))
            .and_then(|v| v.as_str())
    }

    /// For comments: the post the comment belongs to.
    pub fn post_id(&self) -> Option<&str> {
        match self.kind {
            SubjectKind::Post => Some(self.id.as_str()),
            _ => self.payload.get("post_id").and_then(|v| v.as_str()),
        }
    }
}

/// Immutable description of why a decision cycle is running.
///
/// Built once per invocation and never mutated afterwards: every field is
/// private and only exposed through getters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scope {
    trigger: Trigger,
    actor: Actor,
    subject: Option<Subject>,
    #[serde(default)]
    data_scope: serde_json::Map<String, serde_json::Value>,
    conversation_id: Option<ConversationId>,
}

impl Scope {
    pub fn new(trigger: Trigger, actor: Actor) -> Self {
        Self {
            trigger,
            actor,
            subject: None,
            data_scope: serde_json::Map::new(),
            conversation_id: None,
        }
    }

    pub fn with_subject(mut self, subject: Subject) -> Self {
        self.subject = Some(subject);
        self
    }

    pub fn with_conversation(mut self, conversation_id: impl Into<ConversationId>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    pub fn with_data_scope(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data_scope.insert(key.into(), value);
        self
    }

    pub fn trigger(&self) -> &Trigger {
        &self.trigger
    }

    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    pub fn subject(&self) -> Option<&Subject> {
        self.subject.as_ref()
    }

    pub fn data_scope(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.data_scope
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    /// Human-readable one-liner used in logs and trace names.
    pub fn describe(&self) -> String {
        let mut s = format!(
            "{}:{} for {} {}",
            match self.trigger.kind {
                TriggerKind::Schedule => "schedule",
                TriggerKind::Event => "event",
            },
            self.trigger.name,
            self.actor.kind.as_str(),
            self.actor.id
        );
        if let Some(subject) = &self.subject {
            s.push_str(&format!(" on {} {}", subject.kind.as_str(), subject.id));
        }
        s
    }
}

/// The named workflows the scheduler knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowKey {
    /// One decision cycle per active agent.
    AgentCycle,
    RelationshipDecay,
    MemoryCleanup,
    TokenBudgetReset,
    /// Event-driven: invoked by the chat trigger, never by the timer loop.
    AgentChat,
}

impl WorkflowKey {
    pub const ALL: [WorkflowKey; 5] = [
        WorkflowKey::AgentCycle,
        WorkflowKey::RelationshipDecay,
        WorkflowKey::MemoryCleanup,
        WorkflowKey::TokenBudgetReset,
        WorkflowKey::AgentChat,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowKey::AgentCycle => "agent_cycle",
            WorkflowKey::RelationshipDecay => "relationship_decay",
            WorkflowKey::MemoryCleanup => "memory_cleanup",
            WorkflowKey::TokenBudgetReset => "token_budget_reset",
            WorkflowKey::AgentChat => "agent_chat",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }

    pub fn is_event_driven(&self) -> bool {
        matches!(self, WorkflowKey::AgentChat)
    }
}

impl std::fmt::Display for WorkflowKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
