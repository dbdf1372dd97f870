use std::path::Path;
use std::path::PathBuf;

use crate::kv::flat::FlatFileStore;
#[cfg(feature = "sqlite")]
use crate::kv::sqlite::SqliteKvStore;
use crate::tiered::TieredStore;

/// Backend selection for key/value persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Flat,
    #[cfg(feature = "sqlite")]
    Sqlite,
}

/// Preferred backend: the structured one when compiled in.
pub fn default_backend() -> Backend {
    #[cfg(feature = "sqlite")]
    {
        Backend::Sqlite
    }
    #[cfg(not(feature = "sqlite"))]
    {
        Backend::Flat
    }
}

/// Choose backend using env `LECTERN_STORE_BACKEND` if present: `sqlite` or `flat`.
/// Anything else (or `sqlite` without the feature) yields the default.
pub fn choose_backend_from_env() -> Backend {
    let v = std::env::var("LECTERN_STORE_BACKEND").unwrap_or_default();
    match v.as_str() {
        "flat" | "FLAT" => Backend::Flat,
        #[cfg(feature = "sqlite")]
        "sqlite" | "SQLITE" => Backend::Sqlite,
        _ => default_backend(),
    }
}

/// Open the tiered store under `<home>/store/`. The backend is chosen once:
/// the structured database is probed and, if it cannot be opened, the flat
/// table is used for the rest of the process.
/// Paths can be overridden via env:
/// - `LECTERN_STORE_DB` for the SQLite file path
/// - `LECTERN_STORE_FLAT` for the flat table path
pub fn open_store(home: &Path, backend: Option<Backend>) -> TieredStore {
    let base = home.join("store");
    let flat_path = std::env::var("LECTERN_STORE_FLAT")
        .map(PathBuf::from)
        .unwrap_or_else(|_| base.join("kv.json"));
    let flat = FlatFileStore::new(flat_path);
    let be = backend.unwrap_or_else(choose_backend_from_env);
    match be {
        Backend::Flat => TieredStore::flat(flat),
        #[cfg(feature = "sqlite")]
        Backend::Sqlite => {
            let db_path = std::env::var("LECTERN_STORE_DB")
                .map(PathBuf::from)
                .unwrap_or_else(|_| base.join("kv.db"));
            match SqliteKvStore::open(&db_path) {
                Ok(db) => TieredStore::new(Some(Box::new(db)), flat),
                Err(e) => {
                    tracing::debug!(
                        "kv: structured backend unavailable at {}, using flat table: {e}",
                        db_path.display()
                    );
                    TieredStore::flat(flat)
                }
            }
        }
    }
}
