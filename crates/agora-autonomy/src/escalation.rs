use agora_core::{Clock, Result};
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// How firmly an actor refuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EscalationLevel {
    Polite,
    Firm,
    Harsh,
    /// Stop answering at all.
    Ignore,
}

impl EscalationLevel {
    /// Map the number of prior refusals in the window to a level.
    pub fn from_persistence(prior_refusals: u32) -> Self {
        match prior_refusals {
            0 => EscalationLevel::Polite,
            1 => EscalationLevel::Firm,
            2 => EscalationLevel::Harsh,
            _ => EscalationLevel::Ignore,
        }
    }

    /// `decline` takes a numeric level: 1 = polite, 2 = firm, 3 = harsh.
    pub fn from_decline_level(level: u64) -> Option<Self> {
        match level {
            1 => Some(EscalationLevel::Polite),
            2 => Some(EscalationLevel::Firm),
            3 => Some(EscalationLevel::Harsh),
            _ => None,
        }
    }

    /// Numeric level stored with a refusal event. `Ignore` is stored as 0.
    pub fn as_u8(&self) -> u8 {
        match self {
            EscalationLevel::Polite => 1,
            EscalationLevel::Firm => 2,
            EscalationLevel::Harsh => 3,
            EscalationLevel::Ignore => 0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EscalationLevel::Polite => "polite",
            EscalationLevel::Firm => "firm",
            EscalationLevel::Harsh => "harsh",
            EscalationLevel::Ignore => "ignore",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "polite" => Some(EscalationLevel::Polite),
            "firm" => Some(EscalationLevel::Firm),
            "harsh" => Some(EscalationLevel::Harsh),
            "ignore" => Some(EscalationLevel::Ignore),
            _ => None,
        }
    }

    /// One line of guidance for the Reason step's system prompt.
    pub fn guidance(&self) -> &'static str {
        match self {
            EscalationLevel::Polite => {
                "If you do not want to do what is asked, decline politely (decline level 1)."
            }
            EscalationLevel::Firm => {
                "You already refused this once. If you refuse again, be firm (decline level 2)."
            }
            EscalationLevel::Harsh => {
                "You have refused this repeatedly. If you refuse again, be blunt (decline level 3)."
            }
            EscalationLevel::Ignore => {
                "This person keeps repeating a request you refused. You may ignore them entirely."
            }
        }
    }
}

impl std::fmt::Display for EscalationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefusalKind {
    Decline,
    Ignore,
}

impl RefusalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefusalKind::Decline => "decline",
            RefusalKind::Ignore => "ignore",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "decline" => Some(RefusalKind::Decline),
            "ignore" => Some(RefusalKind::Ignore),
            _ => None,
        }
    }
}

/// One refusal from `actor_id` toward `requester_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefusalEvent {
    pub actor_id: String,
    pub requester_id: String,
    pub kind: RefusalKind,
    pub level: EscalationLevel,
    pub request_kind: Option<String>,
    pub at: DateTime<Utc>,
}

/// A message the requester sent to the actor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub sender_id: String,
    pub recipient_id: String,
    pub text: String,
    pub at: DateTime<Utc>,
}

/// Read/write access to the interaction history the tracker needs.
///
/// All range queries are half-open: `since <= at < until`.
pub trait InteractionHistory: Send + Sync {
    fn messages_from(
        &self,
        sender_id: &str,
        recipient_id: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<InboundMessage>>;

    fn refusals_toward(
        &self,
        actor_id: &str,
        requester_id: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<RefusalEvent>>;

    fn record_refusal(&self, event: &RefusalEvent) -> Result<()>;
}

/// What the tracker found for one actor/requester pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationReport {
    pub total_recent_messages: u32,
    pub similar_requests_count: u32,
    pub decline_count: u32,
    /// Prior `decline` + `ignore` events in the window.
    pub persistence_level: u32,
    pub level: EscalationLevel,
}

/// Derives how persistently a requester has repeated an unwanted request.
#[derive(Clone)]
pub struct EscalationTracker {
    history: Arc<dyn InteractionHistory>,
    clock: Arc<dyn Clock>,
}

impl EscalationTracker {
    pub fn new(history: Arc<dyn InteractionHistory>, clock: Arc<dyn Clock>) -> Self {
        Self { history, clock }
    }

    /// Count what `requester_id` asked of `actor_id` in the last `window_hours`,
    /// and how often `actor_id` already refused.
    ///
    /// A message is "similar" when its text contains `request_kind`
    /// (case-insensitive); with no kind every message counts.
    pub fn count_similar_requests(
        &self,
        actor_id: &str,
        requester_id: &str,
        request_kind: Option<&str>,
        window_hours: u32,
    ) -> Result<EscalationReport> {
        let until = self.clock.now();
        let since = until - Duration::hours(window_hours as i64);

        let messages = self
            .history
            .messages_from(requester_id, actor_id, since, until)?;
        let needle = request_kind
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty());
        let similar = messages
            .iter()
            .filter(|m| match &needle {
                Some(k) => m.text.to_lowercase().contains(k.as_str()),
                None => true,
            })
            .count() as u32;

        let refusals = self
            .history
            .refusals_toward(actor_id, requester_id, since, until)?;
        let decline_count = refusals
            .iter()
            .filter(|r| r.kind == RefusalKind::Decline)
            .count() as u32;
        let persistence_level = refusals.len() as u32;

        Ok(EscalationReport {
            total_recent_messages: messages.len() as u32,
            similar_requests_count: similar,
            decline_count,
            persistence_level,
            level: EscalationLevel::from_persistence(persistence_level),
        })
    }

    pub fn record_refusal(&self, event: &RefusalEvent) -> Result<()> {
        self.history.record_refusal(event)
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

/// Interaction history kept in process memory.
#[derive(Default)]
pub struct InMemoryInteractionHistory {
    messages: RwLock<Vec<InboundMessage>>,
    refusals: RwLock<Vec<RefusalEvent>>,
}

impl InMemoryInteractionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_message(&self, message: InboundMessage) {
        self.messages.write().push(message);
    }
}

impl InteractionHistory for InMemoryInteractionHistory {
    fn messages_from(
        &self,
        sender_id: &str,
        recipient_id: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<InboundMessage>> {
        Ok(self
            .messages
            .read()
            .iter()
            .filter(|m| m.sender_id == sender_id && m.recipient_id == recipient_id)
            .filter(|m| m.at >= since && m.at < until)
            .cloned()
            .collect())
    }

    fn refusals_toward(
        &self,
        actor_id: &str,
        requester_id: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<RefusalEvent>> {
        Ok(self
            .refusals
            .read()
            .iter()
            .filter(|r| r.actor_id == actor_id && r.requester_id == requester_id)
            .filter(|r| r.at >= since && r.at < until)
            .cloned()
            .collect())
    }

    fn record_refusal(&self, event: &RefusalEvent) -> Result<()> {
        self.refusals.write().push(event.clone());
        Ok(())
    }
}
