//! Application state: owns the stores and every component built on them.

use chrono::Utc;
use lectern_store::Ack;
use lectern_store::FolderPicker;
use lectern_store::FolderStore;
use lectern_store::TieredStore;
use lectern_store::folder::FolderMeta;
use lectern_store::types::ChatMessage;
use lectern_store::types::ExportDocument;
use lectern_store::types::LearningStatus;
use lectern_store::types::Role;
use lectern_store::types::SnapshotInfo;
use lectern_store::types::StatusSnapshot;
use tokio_util::sync::CancellationToken;

use crate::chat::ChatOutcome;
use crate::chat::ChatRequest;
use crate::chat::ChatSurface;
use crate::chat::ChatTransport;
use crate::chat::RetryingClient;
use crate::chat::context::ContextLimits;
use crate::chat::context::PageTextSource;
use crate::chat::context::build_messages;
use crate::config::Config;
use crate::error::ChatError;
use crate::error::ImportError;
use crate::export;
use crate::history::HistoryStore;
use crate::keys;
use crate::migrate::MigrationReport;
use crate::migrate::migrate_legacy_learned;
use crate::outline::Outline;
use crate::outline::OutlineItem;
use crate::status::Progress;
use crate::status::StatusTracker;

/// The key/value store plus the folder, when one has been granted this session.
pub struct Stores {
    pub kv: TieredStore,
    pub folder: Option<FolderStore>,
}

impl Stores {
    pub fn new(kv: TieredStore) -> Self {
        Self { kv, folder: None }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportOutcome {
    Merged { added: usize },
    /// The document belongs to another item and the user declined.
    Declined { object_id: String },
}

pub struct Companion {
    config: Config,
    outline: Outline,
    pages: Box<dyn PageTextSource + Send + Sync>,
    stores: Stores,
    status: StatusTracker,
    history: HistoryStore,
    migration: MigrationReport,
}

impl Companion {
    /// Run the legacy migration, then load status and history.
    pub fn boot(
        config: Config,
        kv: TieredStore,
        outline: Outline,
        pages: Box<dyn PageTextSource + Send + Sync>,
    ) -> Self {
        let migration = migrate_legacy_learned(&kv);
        let stores = Stores::new(kv);
        let mut status = StatusTracker::new(&stores);
        status.load_all(&stores);
        let mut history = HistoryStore::default();
        history.load_all(&stores);
        Self {
            config,
            outline,
            pages,
            stores,
            status,
            history,
            migration,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn outline(&self) -> &Outline {
        &self.outline
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    pub fn migration(&self) -> MigrationReport {
        self.migration
    }

    /// Warnings about writes that reached no backend since the last call.
    pub fn take_notices(&self) -> Vec<String> {
        self.stores.kv.take_notices()
    }

    /// Metadata for `id`, falling back to a placeholder for ids outside the outline.
    pub fn item(&self, id: &str) -> OutlineItem {
        self.outline
            .find(id)
            .map(|found| found.item.clone())
            .unwrap_or_else(|| OutlineItem::unknown(id))
    }

    /// Ask the picker for a folder and attach it. Returns `false` when the
    /// user cancelled.
    pub fn grant_folder(&mut self, picker: &dyn FolderPicker) -> anyhow::Result<bool> {
        match FolderStore::select(picker)? {
            Some(folder) => {
                self.attach_folder(folder);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Use `folder` for the rest of the session and reload status from it.
    pub fn attach_folder(&mut self, folder: FolderStore) {
        self.stores.kv.set_as(keys::FOLDER_META, &folder.meta());
        self.stores.folder = Some(folder);
        self.status.load_all(&self.stores);
    }

    pub fn folder(&self) -> Option<&FolderStore> {
        self.stores.folder.as_ref()
    }

    /// Metadata of the most recent grant, possibly from an earlier session.
    pub fn last_folder_meta(&self) -> Option<FolderMeta> {
        self.stores.kv.get_as(keys::FOLDER_META)
    }

    pub fn status(&self, id: &str) -> LearningStatus {
        self.status.get(id)
    }

    pub fn advance_status(&mut self, id: &str) -> LearningStatus {
        self.status.advance(&self.stores, id)
    }

    pub fn statuses(&mut self) -> StatusSnapshot {
        self.status.load_all(&self.stores)
    }

    pub fn progress(&self) -> Progress {
        self.status.progress(self.outline.item_ids())
    }

    pub fn history(&self, id: &str) -> &[ChatMessage] {
        self.history.messages(id)
    }

    pub fn export_history(&self, id: &str) -> ExportDocument {
        export::to_document(&self.item(id), self.history.messages(id), now_ms())
    }

    /// Validate `text` as an export document and merge it into `selected`.
    /// A document for another item is merged only if `confirm(object_id,
    /// selected)` agrees.
    pub fn import_history(
        &mut self,
        selected: &str,
        text: &str,
        confirm: impl FnOnce(&str, &str) -> bool,
    ) -> Result<ImportOutcome, ImportError> {
        let doc = export::parse(text)?;
        if doc.object_id != selected && !confirm(&doc.object_id, selected) {
            return Ok(ImportOutcome::Declined {
                object_id: doc.object_id,
            });
        }
        let added = self
            .history
            .merge_external(&self.stores, selected, export::messages(&doc));
        Ok(ImportOutcome::Merged { added })
    }

    pub fn save_snapshot(&self, id: &str) -> anyhow::Result<String> {
        let folder = self.require_folder()?;
        folder.save_history_snapshot(&self.export_history(id))
    }

    pub fn snapshots(&self, id: &str) -> anyhow::Result<Vec<SnapshotInfo>> {
        self.require_folder()?.list_history_snapshots(id)
    }

    /// Merge a snapshot file back into `id`. The file itself is left alone.
    pub fn restore_snapshot(&mut self, id: &str, filename: &str) -> anyhow::Result<usize> {
        let value = self
            .require_folder()?
            .load_history_snapshot(filename)?
            .ok_or_else(|| anyhow::anyhow!("snapshot {filename} not found"))?;
        let doc = export::validate(&value)?;
        if doc.object_id != id {
            anyhow::bail!("snapshot {filename} belongs to {}, not {id}", doc.object_id);
        }
        Ok(self
            .history
            .merge_external(&self.stores, id, export::messages(&doc)))
    }

    /// Store the API key locally and, when granted, in the folder.
    pub fn save_credential(&mut self, api_key: &str) -> Ack {
        let ack = self.stores.kv.set_as(keys::API_KEY, api_key);
        if let Some(folder) = &self.stores.folder
            && let Err(e) = folder.save_credential(api_key)
        {
            tracing::warn!("credential: folder write failed, kept local copy only: {e}");
        }
        ack
    }

    /// The folder copy wins when readable; the local copy is refreshed from it.
    pub fn credential(&self) -> Option<String> {
        if let Some(folder) = &self.stores.folder {
            match folder.load_credential() {
                Ok(Some(key)) => {
                    self.stores.kv.set_as(keys::API_KEY, &key);
                    return Some(key);
                }
                Ok(None) => {}
                Err(e) => tracing::warn!("credential: folder copy unreadable: {e}"),
            }
        }
        self.stores
            .kv
            .get_as::<String>(keys::API_KEY)
            .filter(|k| !k.is_empty())
    }

    pub fn last_page(&self) -> Option<u32> {
        self.stores.kv.get_as(keys::LAST_PAGE)
    }

    pub fn set_last_page(&mut self, page: u32) -> Ack {
        self.stores.kv.set_as(keys::LAST_PAGE, &page)
    }

    /// Ask about item `id`. On success both the question and the reply are
    /// appended to the item's history.
    pub async fn ask<T: ChatTransport>(
        &mut self,
        client: &RetryingClient<T>,
        id: &str,
        question: &str,
        surface: &mut dyn ChatSurface,
        cancel: &CancellationToken,
    ) -> Result<ChatOutcome, ChatError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        let item = self.item(id);
        let learned: Vec<&str> = self
            .status
            .snapshot()
            .iter()
            .filter(|(_, s)| **s != LearningStatus::Unlearned)
            .map(|(id, _)| id.as_str())
            .collect();
        let limits = ContextLimits {
            history_window: self.config.history_window,
            page_chars: self.config.context_char_limit,
        };
        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: build_messages(
                &limits,
                Some(&item),
                self.pages.as_ref(),
                &learned,
                self.history.messages(id),
                question,
            ),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };
        let asked_at = self.history.stamp(id, now_ms());

        let outcome = client.send(&request, question, surface, cancel).await?;

        let user = ChatMessage::new(Role::User, question, asked_at);
        let replied_at = now_ms().max(asked_at + 1);
        let reply = ChatMessage::new(Role::Assistant, outcome.reply.clone(), replied_at);
        self.history.record_exchange(&self.stores, id, user, reply);
        Ok(outcome)
    }

    fn require_folder(&self) -> anyhow::Result<&FolderStore> {
        self.stores
            .folder
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("no folder granted; pass --folder <DIR>"))
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
