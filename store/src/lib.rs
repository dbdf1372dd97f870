//! Persistence for Lectern: the tiered key/value store and the optional
//! user-granted folder store.

pub mod factory;
pub mod folder;
pub mod kv;
pub mod tiered;
pub mod types;

pub use factory::Backend;
pub use factory::open_store;
pub use folder::FolderPicker;
pub use folder::FolderStore;
pub use tiered::Ack;
pub use tiered::TieredStore;
