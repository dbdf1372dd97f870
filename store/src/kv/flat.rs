use std::io::Write as _;
use std::path::Path;
use std::path::PathBuf;

use serde_json::Map;
use serde_json::Value;

use super::KeyValueStore;

/// Flat table kept as a single JSON object on disk. Always available, so it
/// is both the fallback backend and the target of the synchronous read path.
#[derive(Debug, Clone)]
pub struct FlatFileStore {
    path: PathBuf,
}

impl FlatFileStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> anyhow::Result<Map<String, Value>> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(e.into()),
        };
        if data.trim().is_empty() {
            return Ok(Map::new());
        }
        match serde_json::from_str::<Value>(&data)? {
            Value::Object(map) => Ok(map),
            other => anyhow::bail!(
                "flat table {} is not a JSON object (found {})",
                self.path.display(),
                kind_of(&other)
            ),
        }
    }

    fn write_all(&self, map: &Map<String, Value>) -> anyhow::Result<()> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;
        // Replace the table in one rename so a crash never leaves half a file.
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        serde_json::to_writer(&mut tmp, map)?;
        tmp.flush()?;
        tmp.persist(&self.path)?;
        Ok(())
    }
}

impl KeyValueStore for FlatFileStore {
    fn name(&self) -> &'static str {
        "flat"
    }

    fn get(&self, key: &str) -> anyhow::Result<Option<Value>> {
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: &Value) -> anyhow::Result<()> {
        let mut map = self.read_all()?;
        map.insert(key.to_string(), value.clone());
        self.write_all(&map)
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        let mut map = self.read_all()?;
        if map.remove(key).is_some() {
            self.write_all(&map)?;
        }
        Ok(())
    }
}

fn kind_of(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FlatFileStore::new(dir.path().join("nested").join("kv.json"));
        assert_eq!(store.get("anything").unwrap(), None);
    }

    #[test]
    fn set_get_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = FlatFileStore::new(dir.path().join("kv.json"));
        store.set("a", &json!({"x": 1})).unwrap();
        store.set("b", &json!([1, 2])).unwrap();
        assert_eq!(store.get("a").unwrap(), Some(json!({"x": 1})));
        store.remove("a").unwrap();
        assert_eq!(store.get("a").unwrap(), None);
        assert_eq!(store.get("b").unwrap(), Some(json!([1, 2])));
    }

    #[test]
    fn non_object_table_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kv.json");
        std::fs::write(&path, "[1,2,3]").unwrap();
        let store = FlatFileStore::new(&path);
        let err = store.get("a").unwrap_err();
        assert!(err.to_string().contains("not a JSON object"));
    }
}
