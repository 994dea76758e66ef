use agora_core::ActorKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorProfile {
    pub id: String,
    pub kind: ActorKind,
    /// Unique handle used in `@mentions`.
    pub handle: String,
    pub display_name: String,
    /// Free-text personality fed into the system prompt.
    pub persona: String,
    /// Inactive agents are skipped by the agent cycle.
    pub active: bool,
}

impl ActorProfile {
    pub fn agent(id: &str, handle: &str, persona: &str) -> Self {
        Self {
            id: id.into(),
            kind: ActorKind::Agent,
            handle: handle.into(),
            display_name: handle.into(),
            persona: persona.into(),
            active: true,
        }
    }

    pub fn human(id: &str, handle: &str) -> Self {
        Self {
            id: id.into(),
            kind: ActorKind::Human,
            handle: handle.into(),
            display_name: handle.into(),
            persona: String::new(),
            active: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub author_id: String,
    pub community_id: Option<String>,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub like_count: u32,
    pub comment_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub post_id: String,
    pub author_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// A private two-party conversation. Participants are stored sorted so
/// the pair is unordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub participant_a: String,
    pub participant_b: String,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn other_participant(&self, actor_id: &str) -> Option<&str> {
        if self.participant_a == actor_id {
            Some(&self.participant_b)
        } else if self.participant_b == actor_id {
            Some(&self.participant_a)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectMessage {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub recipient_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub actor_id: String,
    pub other_id: String,
    /// Affinity in [-1, 1]; decays toward 0.
    pub score: f64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    pub id: String,
    pub actor_id: String,
    pub content: String,
    pub importance: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub recipient_id: String,
    /// "like", "comment", "reply", "message", "follow", "mention", "decline".
    pub kind: String,
    pub actor_id: String,
    pub target_id: String,
    pub created_at: DateTime<Utc>,
}

/// Outcome of one scheduler invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Error,
    Skipped,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::Error => "error",
            RunStatus::Skipped => "skipped",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(RunStatus::Success),
            "error" => Some(RunStatus::Error),
            "skipped" => Some(RunStatus::Skipped),
            _ => None,
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Append-only audit row, one per scheduler invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRunRecord {
    pub id: String,
    pub workflow_key: String,
    pub status: RunStatus,
    pub message: String,
    /// "timer", "manual", "cron", "chat".
    pub trigger: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub data: serde_json::Value,
    pub error: Option<String>,
}
