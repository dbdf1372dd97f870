use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use lectern_store::Ack;
use lectern_store::TieredStore;
use lectern_store::factory::Backend;
use lectern_store::factory::open_store;
use lectern_store::kv::KeyValueStore;
use lectern_store::kv::flat::FlatFileStore;
use pretty_assertions::assert_eq;
use serde_json::Value;
use serde_json::json;

fn backends() -> Vec<Backend> {
    #[cfg(feature = "sqlite")]
    {
        vec![Backend::Flat, Backend::Sqlite]
    }
    #[cfg(not(feature = "sqlite"))]
    {
        vec![Backend::Flat]
    }
}

/// Structured backend that fails every operation.
struct BrokenStore;

impl KeyValueStore for BrokenStore {
    fn name(&self) -> &'static str {
        "broken"
    }
    fn get(&self, _key: &str) -> anyhow::Result<Option<Value>> {
        anyhow::bail!("disk on fire")
    }
    fn set(&self, _key: &str, _value: &Value) -> anyhow::Result<()> {
        anyhow::bail!("disk on fire")
    }
    fn remove(&self, _key: &str) -> anyhow::Result<()> {
        anyhow::bail!("disk on fire")
    }
}

/// In-memory structured backend whose writes can be switched to fail.
/// Clones share the same table and switch, like two handles on one database.
#[derive(Clone, Default)]
struct FlakyStore {
    table: Arc<Mutex<HashMap<String, Value>>>,
    failing_sets: Arc<AtomicBool>,
    failing_removes: Arc<AtomicBool>,
}

impl FlakyStore {
    fn fail_writes(&self, failing: bool) {
        self.failing_sets.store(failing, Ordering::SeqCst);
        self.failing_removes.store(failing, Ordering::SeqCst);
    }

    fn check(flag: &AtomicBool) -> anyhow::Result<()> {
        if flag.load(Ordering::SeqCst) {
            anyhow::bail!("database is locked");
        }
        Ok(())
    }
}

impl KeyValueStore for FlakyStore {
    fn name(&self) -> &'static str {
        "flaky"
    }
    fn get(&self, key: &str) -> anyhow::Result<Option<Value>> {
        Ok(self.table.lock().unwrap().get(key).cloned())
    }
    fn set(&self, key: &str, value: &Value) -> anyhow::Result<()> {
        Self::check(&self.failing_sets)?;
        self.table.lock().unwrap().insert(key.to_string(), value.clone());
        Ok(())
    }
    fn remove(&self, key: &str) -> anyhow::Result<()> {
        Self::check(&self.failing_removes)?;
        self.table.lock().unwrap().remove(key);
        Ok(())
    }
}

#[test]
fn get_set_remove_for_every_backend() {
    for be in backends() {
        let home = tempfile::tempdir().unwrap();
        let store = open_store(home.path(), Some(be));

        assert_eq!(store.get("missing"), None);

        let ack = store.set("status", &json!({"1.1": "learned"}));
        assert_eq!(ack, Ack::Stored);
        assert_eq!(store.get("status"), Some(json!({"1.1": "learned"})));

        store.set("status", &json!({"1.1": "mastered"}));
        assert_eq!(store.get("status"), Some(json!({"1.1": "mastered"})));

        store.remove("status");
        assert_eq!(store.get("status"), None);
    }
}

#[test]
fn values_survive_reopen() {
    for be in backends() {
        let home = tempfile::tempdir().unwrap();
        open_store(home.path(), Some(be)).set("page", &json!(42));
        let reopened = open_store(home.path(), Some(be));
        assert_eq!(reopened.get_as::<u32>("page"), Some(42));
    }
}

#[test]
fn peek_sees_mirrored_writes() {
    for be in backends() {
        let home = tempfile::tempdir().unwrap();
        let store = open_store(home.path(), Some(be));
        store.set("k", &json!("v"));
        assert_eq!(store.peek("k"), Some(json!("v")));
    }
}

#[test]
fn failed_primary_write_lands_in_flat_table() {
    let dir = tempfile::tempdir().unwrap();
    let flat = FlatFileStore::new(dir.path().join("kv.json"));
    let store = TieredStore::new(Some(Box::new(BrokenStore)), flat.clone());

    assert_eq!(store.set("k", &json!([1, 2, 3])), Ack::Degraded);
    assert_eq!(flat.get("k").unwrap(), Some(json!([1, 2, 3])));
    // Reads fall through to the flat table when the primary errors.
    assert_eq!(store.get("k"), Some(json!([1, 2, 3])));
    assert_eq!(store.backend_name(), "broken");
}

#[test]
fn degraded_write_is_not_shadowed_by_older_primary_value() {
    let dir = tempfile::tempdir().unwrap();
    let flat = FlatFileStore::new(dir.path().join("kv.json"));
    let primary = FlakyStore::default();
    let store = TieredStore::new(Some(Box::new(primary.clone())), flat.clone());

    assert_eq!(store.set("status", &json!({"1.1": "learned"})), Ack::Stored);
    primary.fail_writes(true);
    assert_eq!(store.set("status", &json!({"1.1": "mastered"})), Ack::Degraded);

    // The primary still holds the older value because invalidating it failed too.
    assert_eq!(
        primary.get("status").unwrap(),
        Some(json!({"1.1": "learned"}))
    );
    assert_eq!(store.get("status"), Some(json!({"1.1": "mastered"})));
    assert_eq!(store.peek("status"), Some(json!({"1.1": "mastered"})));

    // A later session over the same tables sees the degraded write as well.
    let next_session = TieredStore::new(Some(Box::new(primary.clone())), flat.clone());
    assert_eq!(next_session.get("status"), Some(json!({"1.1": "mastered"})));

    // Once the primary recovers, a successful write makes it authoritative again.
    primary.fail_writes(false);
    assert_eq!(next_session.set("status", &json!({"1.1": "reviewed"})), Ack::Stored);
    flat.set("status", &json!("edited behind the store's back")).unwrap();
    assert_eq!(next_session.get("status"), Some(json!({"1.1": "reviewed"})));
}

#[test]
fn degraded_write_invalidates_primary_copy() {
    let dir = tempfile::tempdir().unwrap();
    let flat = FlatFileStore::new(dir.path().join("kv.json"));
    let primary = FlakyStore::default();
    let store = TieredStore::new(Some(Box::new(primary.clone())), flat.clone());

    assert_eq!(store.set("page", &json!(3)), Ack::Stored);
    // Upserts fail while deletes still go through.
    primary.failing_sets.store(true, Ordering::SeqCst);
    assert_eq!(store.set("page", &json!(7)), Ack::Degraded);

    assert_eq!(primary.get("page").unwrap(), None);
    assert_eq!(store.get_as::<u32>("page"), Some(7));

    store.remove("page");
    assert_eq!(store.get("page"), None);
}

#[test]
fn write_is_lost_when_every_backend_fails() {
    let dir = tempfile::tempdir().unwrap();
    // A directory where the flat table file should be makes the flat table unusable.
    let blocker = dir.path().join("kv.json");
    std::fs::create_dir(&blocker).unwrap();
    let store = TieredStore::new(Some(Box::new(BrokenStore)), FlatFileStore::new(&blocker));

    let ack = store.set("k", &json!(1));
    assert!(ack.is_lost());
    assert_eq!(store.get("k"), None);
    let notices = store.take_notices();
    assert_eq!(notices.len(), 1);
    assert!(notices[0].contains("could not save k"));
    assert!(store.take_notices().is_empty());
    // Removing never panics or raises.
    store.remove("k");
}

#[test]
fn mistyped_value_reads_as_none() {
    let home = tempfile::tempdir().unwrap();
    let store = open_store(home.path(), Some(Backend::Flat));
    store.set("page", &json!("not a number"));
    assert_eq!(store.get_as::<u32>("page"), None);
}

#[cfg(feature = "sqlite")]
#[test]
fn unusable_database_falls_back_to_flat_table() {
    let home = tempfile::tempdir().unwrap();
    // Occupy the database path with a directory so opening it fails.
    std::fs::create_dir_all(home.path().join("store").join("kv.db")).unwrap();
    let store = open_store(home.path(), Some(Backend::Sqlite));
    assert_eq!(store.backend_name(), "flat");
    assert_eq!(store.set("k", &json!(true)), Ack::Stored);
    assert_eq!(store.get("k"), Some(json!(true)));
}
