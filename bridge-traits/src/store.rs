//! File Store Abstraction
//!
//! The durable note vault as seen by the card set engine: a flat listing of
//! file records, lazy content and metadata reads, and a typed change stream.
//!
//! Paths are `/`-separated strings and act as the unique key of a file. The
//! engine never writes through this trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::broadcast;

use crate::error::Result;

/// Parsed metadata of a note, read lazily from the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteMetadata {
    /// Tags without the leading `#`
    pub tags: Vec<String>,
    /// Heading texts in document order
    pub headings: Vec<String>,
    /// Frontmatter key/value pairs
    pub frontmatter: BTreeMap<String, serde_json::Value>,
}

impl NoteMetadata {
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty() && self.headings.is_empty() && self.frontmatter.is_empty()
    }
}

/// A single file of the store.
///
/// Records are immutable snapshots; a modification in the store produces a
/// new record delivered through [`FileStoreEvent::Modified`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Store-relative path, unique key
    pub path: String,
    /// Basename without extension
    pub display_name: String,
    /// Creation time (unix epoch millis)
    pub created_at: i64,
    /// Last modification time (unix epoch millis)
    pub modified_at: i64,
    /// Size of the file body
    pub size_bytes: u64,
    /// Tags, headings and frontmatter, when already read
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<NoteMetadata>,
}

impl FileRecord {
    pub fn new(path: impl Into<String>, created_at: i64, modified_at: i64, size_bytes: u64) -> Self {
        let path = path.into();
        let display_name = display_name_of(&path).to_string();
        Self {
            path,
            display_name,
            created_at,
            modified_at,
            size_bytes,
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: NoteMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Last path component, including the extension.
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// Lowercased extension, if the file name has one.
    pub fn extension(&self) -> Option<String> {
        let name = self.file_name();
        match name.rfind('.') {
            Some(0) | None => None,
            Some(idx) => Some(name[idx + 1..].to_ascii_lowercase()),
        }
    }
}

fn display_name_of(path: &str) -> &str {
    let name = path.rsplit('/').next().unwrap_or(path);
    match name.rfind('.') {
        Some(0) | None => name,
        Some(idx) => &name[..idx],
    }
}

/// Change notifications published by the store.
///
/// One tagged union replaces per-kind string event names, so a subscriber
/// matches exhaustively on what it cares about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FileStoreEvent {
    Created { file: FileRecord },
    Modified { file: FileRecord },
    Deleted { file: FileRecord },
    Renamed { file: FileRecord, old_path: String },
    /// The file focused in the host editor changed.
    ActiveFileChanged { path: Option<String> },
}

impl FileStoreEvent {
    /// Path the event is about, if any.
    pub fn path(&self) -> Option<&str> {
        match self {
            FileStoreEvent::Created { file }
            | FileStoreEvent::Modified { file }
            | FileStoreEvent::Deleted { file }
            | FileStoreEvent::Renamed { file, .. } => Some(&file.path),
            FileStoreEvent::ActiveFileChanged { path } => path.as_deref(),
        }
    }
}

/// Read/list/subscribe access to the note vault.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::store::FileStore;
///
/// async fn count_notes(store: &dyn FileStore) -> Result<usize> {
///     Ok(store.list_files(true).await?.len())
/// }
/// ```
#[async_trait]
pub trait FileStore: Send + Sync {
    /// List files of the store
    ///
    /// With `eligible_only` the store drops file types it cannot render as
    /// cards (attachments, canvases, ...).
    async fn list_files(&self, eligible_only: bool) -> Result<Vec<FileRecord>>;

    /// Read the full body of a file
    async fn read_content(&self, path: &str) -> Result<String>;

    /// Read parsed tags, headings and frontmatter of a file
    async fn read_metadata(&self, path: &str) -> Result<NoteMetadata>;

    /// Check whether a folder exists
    async fn folder_exists(&self, path: &str) -> Result<bool>;

    /// Path of the file currently focused in the host, if any
    async fn active_file(&self) -> Result<Option<String>>;

    /// Subscribe to change notifications
    ///
    /// Every call returns an independent receiver; past events are not
    /// replayed.
    fn subscribe(&self) -> broadcast::Receiver<FileStoreEvent>;
}
