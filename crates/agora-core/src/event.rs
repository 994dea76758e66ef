use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use std::sync::Arc;
use tokio::sync::broadcast;

/// Things that happened in the world, fanned out to anyone listening
/// (the server's live feed, tests, the chat trigger).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorldEvent {
    // ── Actions ────────────────────────────────────────────────
    ActionExecuted {
        actor_id: String,
        tool: String,
        target_id: Option<String>,
    },
    ActionBlocked {
        actor_id: String,
        tool: String,
        current_heat: u32,
    },
    MessageSent {
        conversation_id: String,
        sender_id: String,
        recipient_id: String,
    },
    Refused {
        actor_id: String,
        requester_id: String,
        level: String,
    },

    // ── Notifications ──────────────────────────────────────────
    Notification {
        recipient_id: String,
        notification_kind: String,
        actor_id: String,
        target_id: String,
    },
    Mentioned {
        agent_id: String,
        by: String,
        target_id: String,
    },

    // ── Scheduler ──────────────────────────────────────────────
    JobStarted {
        key: String,
        at: DateTime<Utc>,
    },
    JobFinished {
        key: String,
        status: String,
        at: DateTime<Utc>,
    },
    SchedulerPaused,
    SchedulerResumed,

    // ── System ─────────────────────────────────────────────────
    Shutdown,
}

/// A broadcast-based event bus for world-wide pub/sub.
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<WorldEvent>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn publish(&self, event: WorldEvent) {
        // No subscribers is fine.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorldEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(4096)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.sender.receiver_count())
            .finish()
    }
}
