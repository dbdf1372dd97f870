//! One-shot upgrade of the legacy learned-id list into the status snapshot.

use lectern_store::TieredStore;
use lectern_store::types::LearningStatus;
use lectern_store::types::StatusSnapshot;
use serde_json::Value;

use crate::keys;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Ids found in the legacy list.
    pub legacy: usize,
    /// Ids that had no status and were marked learned.
    pub migrated: usize,
}

/// Mark every legacy learned id that has no status yet as `learned`.
///
/// Existing statuses are never touched, the snapshot is rewritten only when
/// something changed, and the legacy key is left in place, so running this
/// on every boot is safe.
pub fn migrate_legacy_learned(kv: &TieredStore) -> MigrationReport {
    let ids = match kv.get(keys::LEGACY_LEARNED) {
        Some(Value::Array(ids)) => ids,
        Some(other) => {
            tracing::warn!("migrate: ignoring legacy learned list of unexpected shape: {other}");
            return MigrationReport::default();
        }
        None => return MigrationReport::default(),
    };

    let mut snapshot = kv
        .get_as::<StatusSnapshot>(keys::LEARNING_STATUS)
        .unwrap_or_default();
    let mut report = MigrationReport::default();
    for id in ids.iter().filter_map(Value::as_str) {
        report.legacy += 1;
        if !snapshot.contains_key(id) {
            snapshot.insert(id.to_string(), LearningStatus::Learned);
            report.migrated += 1;
        }
    }

    if report.migrated > 0 {
        kv.set_as(keys::LEARNING_STATUS, &snapshot);
        tracing::info!(
            "migrate: marked {} of {} legacy learned items",
            report.migrated,
            report.legacy
        );
    }
    report
}
