//! Housekeeping jobs over the persisted world.

use agora_config::schema::MaintenanceConfig;
use agora_core::Result;
use agora_store::SqliteStore;
use serde_json::{Value, json};
use tracing::info;

/// Move every relationship score toward neutral and drop the ones that
/// got there.
pub fn relationship_decay(store: &SqliteStore, config: &MaintenanceConfig) -> Result<Value> {
    let rate = config.relationship_decay_rate.clamp(0.0, 1.0);
    let (decayed, removed) = store.decay_relationships(rate)?;
    info!(decayed, removed, rate, "relationships decayed");
    Ok(json!({ "decayed": decayed, "removed": removed, "rate": rate }))
}

/// Forget old, unimportant memories.
pub fn memory_cleanup(store: &SqliteStore, config: &MaintenanceConfig) -> Result<Value> {
    let deleted =
        store.cleanup_memories(config.memory_retention_days, config.memory_min_importance)?;
    info!(
        deleted,
        retention_days = config.memory_retention_days,
        "old memories cleaned up"
    );
    Ok(json!({
        "deleted": deleted,
        "retention_days": config.memory_retention_days,
        "min_importance": config.memory_min_importance
    }))
}
