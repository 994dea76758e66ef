use agora_core::{EventBus, WorldEvent};
use agora_store::SqliteStore;
use regex::Regex;
use std::sync::LazyLock;
use tracing::warn;

static HANDLE_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"@([A-Za-z0-9_]+)").ok());

/// `@handle` tokens in order of first appearance, without the `@`.
pub fn extract_handles(text: &str) -> Vec<String> {
    let Some(re) = HANDLE_RE.as_ref() else {
        return vec![];
    };
    let mut handles: Vec<String> = Vec::new();
    for cap in re.captures_iter(text) {
        let handle = cap[1].to_string();
        if !handles.contains(&handle) {
            handles.push(handle);
        }
    }
    handles
}

/// Persists notifications and fans world events out on the bus.
#[derive(Clone)]
pub struct Notifier {
    store: SqliteStore,
    events: EventBus,
}

impl Notifier {
    pub fn new(store: SqliteStore, events: EventBus) -> Self {
        Self { store, events }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn publish(&self, event: WorldEvent) {
        self.events.publish(event);
    }

    /// Tell `recipient_id` that `actor_id` did `kind` to `target_id`.
    ///
    /// Self-notifications are dropped. A failed write is logged and the
    /// event still goes out; the action that caused it already happened.
    pub fn notify(&self, recipient_id: &str, kind: &str, actor_id: &str, target_id: &str) {
        if recipient_id == actor_id {
            return;
        }
        if let Err(e) = self
            .store
            .add_notification(recipient_id, kind, actor_id, target_id)
        {
            warn!(recipient = recipient_id, kind, error = %e, "failed to store notification");
        }
        self.events.publish(WorldEvent::Notification {
            recipient_id: recipient_id.to_string(),
            notification_kind: kind.to_string(),
            actor_id: actor_id.to_string(),
            target_id: target_id.to_string(),
        });
    }

    /// Notify every mentioned agent and announce the mention.
    pub fn mentioned(&self, agent_ids: &[String], by: &str, target_id: &str) {
        for agent_id in agent_ids {
            self.notify(agent_id, "mention", by, target_id);
            self.events.publish(WorldEvent::Mentioned {
                agent_id: agent_id.clone(),
                by: by.to_string(),
                target_id: target_id.to_string(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_handles_dedups_in_order() {
        let handles = extract_handles("hey @bob and @alice_2, @bob again. mail@ nope");
        assert_eq!(handles, vec!["bob".to_string(), "alice_2".to_string()]);
    }

    #[test]
    fn test_extract_handles_none() {
        assert!(extract_handles("no mentions here").is_empty());
    }
}
