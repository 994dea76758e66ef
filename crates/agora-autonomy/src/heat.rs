//! Per-actor heat: a counter in `[0, max_heat]` that rises with every
//! throttled action and decays linearly with time.
//!
//! Decay is applied lazily whenever a record is read, so there is no
//! background timer. Checks never write. Two concurrent cycles for the
//! same actor may both pass a check before either applies heat; that
//! overshoot is bounded by one action's cost and is accepted.

use agora_config::schema::HeatConfig;
use agora_core::{Clock, Result};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Persisted heat for one actor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatRecord {
    pub actor_id: String,
    pub current_heat: f64,
    pub last_decay_at: DateTime<Utc>,
}

/// Result of a heat check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeatStatus {
    pub allowed: bool,
    /// Decayed heat, rounded up.
    pub current_heat: u32,
    /// Minutes until the check would pass. 0 when allowed.
    pub cooldown_minutes: u32,
}

/// Where heat records live.
pub trait HeatStore: Send + Sync {
    fn load_heat(&self, actor_id: &str) -> Result<Option<HeatRecord>>;

    /// Single-row upsert.
    fn save_heat(&self, record: &HeatRecord) -> Result<()>;

    /// Append an audit entry for one applied action.
    fn log_heat_event(
        &self,
        actor_id: &str,
        action_kind: &str,
        target_id: Option<&str>,
        amount: u32,
        at: DateTime<Utc>,
    ) -> Result<()>;
}

/// Throttles world-changing actions per actor.
#[derive(Clone)]
pub struct HeatLimiter {
    store: Arc<dyn HeatStore>,
    clock: Arc<dyn Clock>,
    config: HeatConfig,
}

impl HeatLimiter {
    pub fn new(store: Arc<dyn HeatStore>, clock: Arc<dyn Clock>, config: HeatConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &HeatConfig {
        &self.config
    }

    pub fn cost_of(&self, action_kind: &str) -> u32 {
        self.config.cost_of(action_kind)
    }

    /// Heat right now, with decay applied but not persisted.
    pub fn current_heat(&self, actor_id: &str) -> Result<f64> {
        let now = self.clock.now();
        Ok(self
            .store
            .load_heat(actor_id)?
            .map(|r| self.decayed(&r, now))
            .unwrap_or(0.0))
    }

    /// Is the actor below the block threshold at all?
    pub fn check_heat(&self, actor_id: &str) -> Result<HeatStatus> {
        let heat = self.current_heat(actor_id)?;
        let threshold = self.config.block_threshold as f64;
        let allowed = heat < threshold;
        let cooldown_minutes = if allowed {
            0
        } else {
            // Strictly below the threshold, so one minute past the exact crossing.
            self.minutes_to_shed(heat - threshold) + 1
        };
        Ok(HeatStatus {
            allowed,
            current_heat: heat.ceil() as u32,
            cooldown_minutes,
        })
    }

    /// Can the actor afford this particular action?
    ///
    /// Requires being under the block threshold and having room for the
    /// action's cost below `max_heat`.
    pub fn check_action(&self, actor_id: &str, action_kind: &str) -> Result<HeatStatus> {
        let base = self.check_heat(actor_id)?;
        let heat = self.current_heat(actor_id)?;
        let cost = self.cost_of(action_kind) as f64;
        let overflow = heat + cost - self.config.max_heat as f64;
        let fits = overflow <= 0.0;
        if base.allowed && fits {
            return Ok(base);
        }
        let cooldown_minutes = if fits {
            base.cooldown_minutes
        } else {
            base.cooldown_minutes.max(self.minutes_to_shed(overflow))
        };
        Ok(HeatStatus {
            allowed: false,
            current_heat: base.current_heat,
            cooldown_minutes,
        })
    }

    /// Add the action's cost to the actor's heat and persist it.
    ///
    /// Call only after the action succeeded.
    pub fn apply_heat(
        &self,
        actor_id: &str,
        action_kind: &str,
        target_id: Option<&str>,
    ) -> Result<HeatRecord> {
        let now = self.clock.now();
        let cost = self.cost_of(action_kind);
        let decayed = self
            .store
            .load_heat(actor_id)?
            .map(|r| self.decayed(&r, now))
            .unwrap_or(0.0);
        let record = HeatRecord {
            actor_id: actor_id.to_string(),
            current_heat: (decayed + cost as f64).clamp(0.0, self.config.max_heat as f64),
            last_decay_at: now,
        };
        self.store.save_heat(&record)?;
        self.store
            .log_heat_event(actor_id, action_kind, target_id, cost, now)?;
        debug!(
            actor = actor_id,
            action = action_kind,
            heat = record.current_heat,
            "heat applied"
        );
        Ok(record)
    }

    fn decayed(&self, record: &HeatRecord, now: DateTime<Utc>) -> f64 {
        let elapsed_ms = (now - record.last_decay_at).num_milliseconds().max(0) as f64;
        let minutes = elapsed_ms / 60_000.0;
        (record.current_heat - self.config.decay_per_minute * minutes)
            .clamp(0.0, self.config.max_heat as f64)
    }

    fn minutes_to_shed(&self, amount: f64) -> u32 {
        if amount <= 0.0 || self.config.decay_per_minute <= 0.0 {
            return 0;
        }
        (amount / self.config.decay_per_minute).ceil() as u32
    }
}

/// Heat records kept in process memory.
#[derive(Default)]
pub struct InMemoryHeatStore {
    records: DashMap<String, HeatRecord>,
    events: Mutex<Vec<(String, String, u32)>>,
}

impl InMemoryHeatStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(actor, action kind, amount)` for every applied action, oldest first.
    pub fn events(&self) -> Vec<(String, String, u32)> {
        self.events.lock().clone()
    }
}

impl HeatStore for InMemoryHeatStore {
    fn load_heat(&self, actor_id: &str) -> Result<Option<HeatRecord>> {
        Ok(self.records.get(actor_id).map(|r| r.clone()))
    }

    fn save_heat(&self, record: &HeatRecord) -> Result<()> {
        self.records
            .insert(record.actor_id.clone(), record.clone());
        Ok(())
    }

    fn log_heat_event(
        &self,
        actor_id: &str,
        action_kind: &str,
        _target_id: Option<&str>,
        amount: u32,
        _at: DateTime<Utc>,
    ) -> Result<()> {
        self.events
            .lock()
            .push((actor_id.to_string(), action_kind.to_string(), amount));
        Ok(())
    }
}
