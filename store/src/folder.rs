//! User-granted folder holding one JSON document per logical record.
//!
//! The grant is session scoped: callers reacquire it every run through a
//! [`FolderPicker`] and only descriptive [`FolderMeta`] is ever persisted.

use std::io::Write as _;
use std::path::Path;
use std::path::PathBuf;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use wildmatch::WildMatch;

use crate::types::ExportDocument;
use crate::types::SnapshotInfo;
use crate::types::StatusSnapshot;

pub const CREDENTIAL_FILE: &str = "api_key.json";
pub const STATUS_FILE: &str = "learning_status.json";
const SNAPSHOT_PATTERN: &str = "chat_*.json";

/// Interactive source of a folder grant. `Ok(None)` means the user cancelled.
pub trait FolderPicker {
    fn pick(&self) -> anyhow::Result<Option<PathBuf>>;
}

/// Descriptive metadata about the last grant; not a reusable handle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FolderMeta {
    pub name: String,
    pub granted_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderEntry {
    pub name: String,
    pub path: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CredentialFile {
    api_key: String,
    #[serde(default)]
    saved_at: i64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusFile {
    #[serde(default)]
    saved_at: i64,
    statuses: StatusSnapshot,
}

#[derive(Debug, Clone)]
pub struct FolderStore {
    root: PathBuf,
    granted_at: i64,
}

impl FolderStore {
    /// Whether this platform can hold a folder grant at all.
    pub fn is_supported() -> bool {
        cfg!(any(unix, windows))
    }

    /// Ask the picker for a folder. Cancellation is not an error.
    pub fn select(picker: &dyn FolderPicker) -> anyhow::Result<Option<Self>> {
        if !Self::is_supported() {
            anyhow::bail!("folder access is not supported on this platform");
        }
        match picker.pick()? {
            Some(dir) => Ok(Some(Self::open(dir)?)),
            None => Ok(None),
        }
    }

    pub fn open<P: AsRef<Path>>(root: P) -> anyhow::Result<Self> {
        let root = root.as_ref().to_path_buf();
        let meta = std::fs::metadata(&root)
            .map_err(|e| anyhow::anyhow!("cannot use folder {}: {e}", root.display()))?;
        if !meta.is_dir() {
            anyhow::bail!("{} is not a directory", root.display());
        }
        Ok(Self {
            root,
            granted_at: Utc::now().timestamp_millis(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn meta(&self) -> FolderMeta {
        let name = self
            .root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.root.display().to_string());
        FolderMeta {
            name,
            granted_at: self.granted_at,
        }
    }

    /// Read one document. A missing file is `Ok(None)`.
    pub fn read_file(&self, name: &str) -> anyhow::Result<Option<Value>> {
        let path = self.root.join(name);
        let data = match std::fs::read_to_string(&path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let value = serde_json::from_str(&data)
            .map_err(|e| anyhow::anyhow!("{} is not valid JSON: {e}", path.display()))?;
        Ok(Some(value))
    }

    fn read_as<T: DeserializeOwned>(&self, name: &str) -> anyhow::Result<Option<T>> {
        match self.read_file(name)? {
            Some(v) => Ok(Some(serde_json::from_value(v)?)),
            None => Ok(None),
        }
    }

    /// Create or replace a whole document.
    pub fn write_file(&self, name: &str, value: &Value) -> anyhow::Result<()> {
        let tmp = self.stage(value)?;
        tmp.persist(self.root.join(name))?;
        Ok(())
    }

    fn stage(&self, value: &Value) -> anyhow::Result<tempfile::NamedTempFile> {
        let mut tmp = tempfile::NamedTempFile::new_in(&self.root)?;
        serde_json::to_writer_pretty(&mut tmp, value)?;
        tmp.flush()?;
        Ok(tmp)
    }

    /// Files whose name matches a wildcard pattern (`*`, `?`), sorted by name.
    pub fn list_files(&self, pattern: &str) -> anyhow::Result<Vec<FolderEntry>> {
        let matcher = WildMatch::new(pattern);
        let mut out = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if matcher.matches(&name) {
                out.push(FolderEntry {
                    name,
                    path: entry.path(),
                });
            }
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    pub fn save_credential(&self, api_key: &str) -> anyhow::Result<()> {
        let doc = CredentialFile {
            api_key: api_key.to_string(),
            saved_at: Utc::now().timestamp_millis(),
        };
        self.write_file(CREDENTIAL_FILE, &serde_json::to_value(doc)?)
    }

    pub fn load_credential(&self) -> anyhow::Result<Option<String>> {
        Ok(self
            .read_as::<CredentialFile>(CREDENTIAL_FILE)?
            .map(|c| c.api_key)
            .filter(|k| !k.is_empty()))
    }

    pub fn save_status_snapshot(&self, statuses: &StatusSnapshot) -> anyhow::Result<()> {
        let doc = StatusFile {
            saved_at: Utc::now().timestamp_millis(),
            statuses: statuses.clone(),
        };
        self.write_file(STATUS_FILE, &serde_json::to_value(doc)?)
    }

    pub fn load_status_snapshot(&self) -> anyhow::Result<Option<StatusSnapshot>> {
        Ok(self.read_as::<StatusFile>(STATUS_FILE)?.map(|f| f.statuses))
    }

    /// Write a new snapshot file for `doc.object_id`. Never replaces an
    /// existing file: on a name clash a numeric suffix is appended.
    pub fn save_history_snapshot(&self, doc: &ExportDocument) -> anyhow::Result<String> {
        let stem = snapshot_stem(&doc.object_id, doc.export_time);
        let mut tmp = self.stage(&serde_json::to_value(doc)?)?;
        for n in 0..1000u32 {
            let name = if n == 0 {
                format!("{stem}.json")
            } else {
                format!("{stem}-{n}.json")
            };
            match tmp.persist_noclobber(self.root.join(&name)) {
                Ok(_) => return Ok(name),
                Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => {
                    tmp = e.file;
                }
                Err(e) => return Err(e.error.into()),
            }
        }
        anyhow::bail!("could not find a free snapshot name for {stem}")
    }

    /// Snapshot files for one item, most recent first.
    pub fn list_history_snapshots(&self, item_id: &str) -> anyhow::Result<Vec<SnapshotInfo>> {
        let pattern = format!("chat_{}_*.json", sanitize_id(item_id));
        let mut out = Vec::new();
        for entry in self.list_files(&pattern)? {
            let doc = match self.read_as::<ExportDocument>(&entry.name) {
                Ok(Some(doc)) => doc,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!("folder: skipping unreadable snapshot {}: {e}", entry.name);
                    continue;
                }
            };
            if doc.object_id != item_id {
                continue;
            }
            out.push(SnapshotInfo {
                filename: entry.name,
                message_count: doc.messages.len(),
                saved_at: doc.export_time,
            });
        }
        out.sort_by(|a, b| {
            b.saved_at
                .cmp(&a.saved_at)
                .then_with(|| b.filename.cmp(&a.filename))
        });
        Ok(out)
    }

    /// Only bare `chat_*.json` names inside the folder are accepted.
    pub fn load_history_snapshot(&self, filename: &str) -> anyhow::Result<Option<Value>> {
        let bare = !filename.contains(['/', '\\']);
        if !bare || !WildMatch::new(SNAPSHOT_PATTERN).matches(filename) {
            anyhow::bail!("{filename} is not a chat snapshot name");
        }
        self.read_file(filename)
    }
}

/// `chat_<itemId>_<timestamp>` where the ISO 8601 timestamp has `:` and `.`
/// replaced by `-`.
pub fn snapshot_stem(item_id: &str, saved_at_ms: i64) -> String {
    let ts = DateTime::<Utc>::from_timestamp_millis(saved_at_ms)
        .unwrap_or_default()
        .to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
        .replace([':', '.'], "-");
    format!("chat_{}_{ts}", sanitize_id(item_id))
}

fn sanitize_id(item_id: &str) -> String {
    item_id
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_whitespace() => '_',
            c => c,
        })
        .collect()
}
