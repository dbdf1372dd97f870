use serde_json::Value;

/// Physical key/value table. Implementations report every failure; the
/// tiered wrapper decides what to do with it.
pub trait KeyValueStore: Send + Sync {
    fn name(&self) -> &'static str;
    fn get(&self, key: &str) -> anyhow::Result<Option<Value>>;
    fn set(&self, key: &str, value: &Value) -> anyhow::Result<()>;
    fn remove(&self, key: &str) -> anyhow::Result<()>;
}

pub mod flat;
#[cfg(feature = "sqlite")]
pub mod sqlite;
