//! The process-wide key/value store: one primary backend chosen at startup
//! plus the flat table as fallback and synchronous read path.

use std::collections::BTreeSet;
use std::sync::Mutex;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::kv::KeyValueStore;
use crate::kv::flat::FlatFileStore;

/// Flat-table entry listing keys whose newest value lives only in the flat
/// table. Persisted so the next session reads those keys from there too.
const DEGRADED_KEYS: &str = "lectern.kv.degradedKeys";

/// Outcome of a write. Writes never raise; callers surface `Lost` to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ack {
    /// Written to the active backend.
    Stored,
    /// The structured backend failed and the flat table took the write.
    Degraded,
    /// Every backend failed.
    Lost { reason: String },
}

impl Ack {
    pub fn is_lost(&self) -> bool {
        matches!(self, Ack::Lost { .. })
    }
}

pub struct TieredStore {
    /// Structured backend, if the probe succeeded.
    primary: Option<Box<dyn KeyValueStore>>,
    flat: FlatFileStore,
    /// User-facing warnings for lost writes, drained by the front end.
    notices: Mutex<Vec<String>>,
}

impl TieredStore {
    pub fn new(primary: Option<Box<dyn KeyValueStore>>, flat: FlatFileStore) -> Self {
        Self {
            primary,
            flat,
            notices: Mutex::new(Vec::new()),
        }
    }

    /// Flat table only.
    pub fn flat(flat: FlatFileStore) -> Self {
        Self::new(None, flat)
    }

    /// Name of the backend that receives writes first.
    pub fn backend_name(&self) -> &'static str {
        match &self.primary {
            Some(p) => p.name(),
            None => self.flat.name(),
        }
    }

    /// Read a value. Keys written during a degraded period are read from the
    /// flat table first; otherwise a structured-backend error or miss falls
    /// through to it.
    pub fn get(&self, key: &str) -> Option<Value> {
        if let Some(primary) = &self.primary {
            if self.degraded_keys().contains(key)
                && let Ok(Some(v)) = self.flat.get(key)
            {
                return Some(v);
            }
            match primary.get(key) {
                Ok(Some(v)) => return Some(v),
                Ok(None) => {}
                Err(e) => {
                    tracing::debug!(
                        "kv: {} read of {key} failed, using flat table: {e}",
                        primary.name()
                    );
                }
            }
        }
        match self.flat.get(key) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("kv: flat read of {key} failed: {e}");
                None
            }
        }
    }

    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        decode(key, self.get(key)?)
    }

    /// Synchronous fast path over the flat table. May lag behind `get` while a
    /// structured write has not been mirrored yet.
    pub fn peek(&self, key: &str) -> Option<Value> {
        self.flat.get(key).ok().flatten()
    }

    pub fn peek_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        decode(key, self.peek(key)?)
    }

    pub fn set(&self, key: &str, value: &Value) -> Ack {
        if let Some(primary) = &self.primary {
            match primary.set(key, value) {
                Ok(()) => {
                    match self.flat.set(key, value) {
                        Ok(()) => self.mark_degraded(key, false),
                        Err(e) => tracing::debug!("kv: mirror of {key} to flat table failed: {e}"),
                    }
                    return Ack::Stored;
                }
                Err(e) => {
                    tracing::debug!(
                        "kv: {} write of {key} failed, retrying on flat table: {e}",
                        primary.name()
                    );
                    return match self.flat.set(key, value) {
                        Ok(()) => {
                            self.mark_degraded(key, true);
                            // Drop the stale copy so even an unmarked read misses it.
                            if let Err(e) = primary.remove(key) {
                                tracing::debug!("kv: invalidating {key} failed: {e}");
                            }
                            Ack::Degraded
                        }
                        Err(flat_err) => self.lost(key, format!("{e}; {flat_err}")),
                    };
                }
            }
        }
        match self.flat.set(key, value) {
            Ok(()) => Ack::Stored,
            Err(e) => self.lost(key, e.to_string()),
        }
    }

    pub fn set_as<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Ack {
        match serde_json::to_value(value) {
            Ok(v) => self.set(key, &v),
            Err(e) => self.lost(key, format!("serialize: {e}")),
        }
    }

    /// Fire-and-forget delete from every table.
    pub fn remove(&self, key: &str) {
        if let Some(primary) = &self.primary
            && let Err(e) = primary.remove(key)
        {
            tracing::debug!("kv: {} remove of {key} failed: {e}", primary.name());
        }
        if let Err(e) = self.flat.remove(key) {
            tracing::debug!("kv: flat remove of {key} failed: {e}");
        }
        if self.primary.is_some() {
            self.mark_degraded(key, false);
        }
    }

    /// Drain pending warnings about writes that reached no backend.
    pub fn take_notices(&self) -> Vec<String> {
        match self.notices.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }

    fn degraded_keys(&self) -> BTreeSet<String> {
        self.flat
            .get(DEGRADED_KEYS)
            .ok()
            .flatten()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default()
    }

    fn mark_degraded(&self, key: &str, degraded: bool) {
        let mut keys = self.degraded_keys();
        let changed = if degraded {
            keys.insert(key.to_string())
        } else {
            keys.remove(key)
        };
        if !changed {
            return;
        }
        let result = if keys.is_empty() {
            self.flat.remove(DEGRADED_KEYS)
        } else {
            serde_json::to_value(&keys)
                .map_err(anyhow::Error::from)
                .and_then(|v| self.flat.set(DEGRADED_KEYS, &v))
        };
        if let Err(e) = result {
            tracing::warn!("kv: recording degraded state of {key} failed: {e}");
        }
    }

    fn lost(&self, key: &str, reason: String) -> Ack {
        tracing::warn!("kv: write of {key} lost: {reason}");
        let notice = format!("could not save {key}: {reason}");
        match self.notices.lock() {
            Ok(mut guard) => guard.push(notice),
            Err(poisoned) => poisoned.into_inner().push(notice),
        }
        Ack::Lost { reason }
    }
}

fn decode<T: DeserializeOwned>(key: &str, value: Value) -> Option<T> {
    match serde_json::from_value(value) {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!("kv: value under {key} has an unexpected shape: {e}");
            None
        }
    }
}
