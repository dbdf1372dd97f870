//! Tri-state learning status per outline item.

use lectern_store::types::LearningStatus;
use lectern_store::types::StatusSnapshot;

use crate::companion::Stores;
use crate::keys;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    pub total: usize,
    pub learned: usize,
    pub mastered: usize,
}

impl Progress {
    /// Share of items that are at least learned, in percent.
    pub fn percent(&self) -> u32 {
        if self.total == 0 {
            return 0;
        }
        (((self.learned + self.mastered) * 100) / self.total) as u32
    }
}

/// In-memory status snapshot, replaced whole on every load and written whole
/// on every change.
#[derive(Debug, Default)]
pub struct StatusTracker {
    snapshot: StatusSnapshot,
}

impl StatusTracker {
    /// Seed from the flat-table fast path so `get` works before `load_all`.
    pub fn new(stores: &Stores) -> Self {
        Self {
            snapshot: stores
                .kv
                .peek_as::<StatusSnapshot>(keys::LEARNING_STATUS)
                .unwrap_or_default(),
        }
    }

    pub fn get(&self, item_id: &str) -> LearningStatus {
        self.snapshot.get(item_id).copied().unwrap_or_default()
    }

    pub fn snapshot(&self) -> &StatusSnapshot {
        &self.snapshot
    }

    /// Move `item_id` one step along the cycle and persist the whole snapshot.
    pub fn advance(&mut self, stores: &Stores, item_id: &str) -> LearningStatus {
        let next = self.get(item_id).next();
        self.snapshot.insert(item_id.to_string(), next);
        self.persist(stores);
        next
    }

    /// Reload from the authoritative copy: the folder when granted and
    /// readable, the key/value store otherwise. A folder read also refreshes
    /// the key/value backup.
    pub fn load_all(&mut self, stores: &Stores) -> StatusSnapshot {
        if let Some(folder) = &stores.folder {
            match folder.load_status_snapshot() {
                Ok(Some(snapshot)) => {
                    stores.kv.set_as(keys::LEARNING_STATUS, &snapshot);
                    self.snapshot = snapshot;
                    return self.snapshot.clone();
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!("status: folder copy unreadable, using local store: {e}");
                }
            }
        }
        self.snapshot = stores
            .kv
            .get_as::<StatusSnapshot>(keys::LEARNING_STATUS)
            .unwrap_or_default();
        self.snapshot.clone()
    }

    pub fn progress<'a>(&self, item_ids: impl IntoIterator<Item = &'a str>) -> Progress {
        let mut progress = Progress::default();
        for id in item_ids {
            progress.total += 1;
            match self.get(id) {
                LearningStatus::Learned => progress.learned += 1,
                LearningStatus::Mastered => progress.mastered += 1,
                LearningStatus::Unlearned => {}
            }
        }
        progress
    }

    fn persist(&self, stores: &Stores) {
        stores.kv.set_as(keys::LEARNING_STATUS, &self.snapshot);
        if let Some(folder) = &stores.folder
            && let Err(e) = folder.save_status_snapshot(&self.snapshot)
        {
            tracing::warn!("status: folder write failed, kept local copy only: {e}");
        }
    }
}
