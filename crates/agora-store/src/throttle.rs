//! The store as backing for heat and escalation tracking.

use agora_autonomy::{
    EscalationLevel, HeatRecord, HeatStore, InboundMessage, InteractionHistory, RefusalEvent,
    RefusalKind,
};
use agora_core::Result;
use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, params};

use crate::store::{SqliteStore, parse_ts, store_err, ts};

impl HeatStore for SqliteStore {
    fn load_heat(&self, actor_id: &str) -> Result<Option<HeatRecord>> {
        self.db()
            .query_row(
                "SELECT actor_id, current_heat, last_decay_at FROM heat_records WHERE actor_id = ?1",
                params![actor_id],
                |row| {
                    Ok(HeatRecord {
                        actor_id: row.get(0)?,
                        current_heat: row.get(1)?,
                        last_decay_at: parse_ts(&row.get::<_, String>(2)?),
                    })
                },
            )
            .optional()
            .map_err(store_err)
    }

    fn save_heat(&self, record: &HeatRecord) -> Result<()> {
        self.db()
            .execute(
                "INSERT INTO heat_records (actor_id, current_heat, last_decay_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(actor_id) DO UPDATE SET
                    current_heat = excluded.current_heat,
                    last_decay_at = excluded.last_decay_at",
                params![record.actor_id, record.current_heat, ts(record.last_decay_at)],
            )
            .map_err(store_err)?;
        Ok(())
    }

    fn log_heat_event(
        &self,
        actor_id: &str,
        action_kind: &str,
        target_id: Option<&str>,
        amount: u32,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.db()
            .execute(
                "INSERT INTO heat_events (actor_id, action_kind, target_id, amount, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![actor_id, action_kind, target_id, amount as i64, ts(at)],
            )
            .map_err(store_err)?;
        Ok(())
    }
}

impl InteractionHistory for SqliteStore {
    fn messages_from(
        &self,
        sender_id: &str,
        recipient_id: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<InboundMessage>> {
        Ok(self
            .messages_between(sender_id, recipient_id, since, until)?
            .into_iter()
            .map(|m| InboundMessage {
                sender_id: m.sender_id,
                recipient_id: m.recipient_id,
                text: m.content,
                at: m.created_at,
            })
            .collect())
    }

    fn refusals_toward(
        &self,
        actor_id: &str,
        requester_id: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<RefusalEvent>> {
        let db = self.db();
        let mut stmt = db
            .prepare(
                "SELECT actor_id, requester_id, kind, level, request_kind, created_at
                 FROM refusal_events
                 WHERE actor_id = ?1 AND requester_id = ?2
                   AND created_at >= ?3 AND created_at < ?4
                 ORDER BY created_at, id",
            )
            .map_err(store_err)?;
        let rows = stmt
            .query_map(
                params![actor_id, requester_id, ts(since), ts(until)],
                |row| {
                    let kind: String = row.get(2)?;
                    let level: String = row.get(3)?;
                    Ok(RefusalEvent {
                        actor_id: row.get(0)?,
                        requester_id: row.get(1)?,
                        kind: RefusalKind::parse(&kind).unwrap_or(RefusalKind::Decline),
                        level: EscalationLevel::parse(&level).unwrap_or(EscalationLevel::Polite),
                        request_kind: row.get(4)?,
                        at: parse_ts(&row.get::<_, String>(5)?),
                    })
                },
            )
            .map_err(store_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(store_err)?;
        Ok(rows)
    }

    fn record_refusal(&self, event: &RefusalEvent) -> Result<()> {
        self.db()
            .execute(
                "INSERT INTO refusal_events (actor_id, requester_id, kind, level, request_kind, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    event.actor_id,
                    event.requester_id,
                    event.kind.as_str(),
                    event.level.as_str(),
                    event.request_kind,
                    ts(event.at)
                ],
            )
            .map_err(store_err)?;
        Ok(())
    }
}
