//! Shared fixtures for the card set integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::{FileRecord, FileStore, FileStoreEvent, NoteMetadata, SettingsStore};
use core_cards::{CardSet, CardSetManager, SelectionConfig};
use core_runtime::config::CoreConfig;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

// ============================================================================
// In-memory File Store
// ============================================================================

#[derive(Default)]
struct Vault {
    files: BTreeMap<String, FileRecord>,
    contents: HashMap<String, String>,
    metadata: HashMap<String, NoteMetadata>,
    active: Option<String>,
}

/// File store backed by a map, publishing change events like a host vault.
pub struct MemoryFileStore {
    vault: Mutex<Vault>,
    events: broadcast::Sender<FileStoreEvent>,
    list_delay: Mutex<Duration>,
    failing_lists: AtomicUsize,
    list_calls: AtomicUsize,
}

impl MemoryFileStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            vault: Mutex::new(Vault::default()),
            events,
            list_delay: Mutex::new(Duration::ZERO),
            failing_lists: AtomicUsize::new(0),
            list_calls: AtomicUsize::new(0),
        }
    }

    /// Store holding `paths` with increasing modification times.
    pub fn with_files(paths: &[&str]) -> Self {
        let store = Self::new();
        for (idx, path) in paths.iter().enumerate() {
            store.insert(note(path, idx as i64 + 1), "");
        }
        store
    }

    /// Adds a file without publishing an event.
    pub fn insert(&self, file: FileRecord, content: &str) {
        let mut vault = self.vault.lock().unwrap();
        vault.contents.insert(file.path.clone(), content.to_string());
        vault.files.insert(file.path.clone(), file);
    }

    pub fn set_metadata(&self, path: &str, metadata: NoteMetadata) {
        self.vault
            .lock()
            .unwrap()
            .metadata
            .insert(path.to_string(), metadata);
    }

    pub fn create(&self, file: FileRecord) {
        self.insert(file.clone(), "");
        let _ = self.events.send(FileStoreEvent::Created { file });
    }

    pub fn delete(&self, path: &str) {
        let removed = self.vault.lock().unwrap().files.remove(path);
        if let Some(file) = removed {
            let _ = self.events.send(FileStoreEvent::Deleted { file });
        }
    }

    pub fn focus(&self, path: Option<&str>) {
        self.vault.lock().unwrap().active = path.map(str::to_string);
        let _ = self.events.send(FileStoreEvent::ActiveFileChanged {
            path: path.map(str::to_string),
        });
    }

    pub fn set_list_delay(&self, delay: Duration) {
        *self.list_delay.lock().unwrap() = delay;
    }

    /// The next `count` listings fail with an I/O error.
    pub fn fail_next_lists(&self, count: usize) {
        self.failing_lists.store(count, Ordering::SeqCst);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FileStore for MemoryFileStore {
    async fn list_files(&self, eligible_only: bool) -> BridgeResult<Vec<FileRecord>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);

        let failing = self.failing_lists.load(Ordering::SeqCst);
        let listing = if failing > 0 {
            self.failing_lists.store(failing - 1, Ordering::SeqCst);
            Err(BridgeError::OperationFailed("vault busy".to_string()))
        } else {
            let vault = self.vault.lock().unwrap();
            Ok(vault
                .files
                .values()
                .filter(|file| !eligible_only || file.extension().as_deref() == Some("md"))
                .cloned()
                .collect())
        };

        // Snapshot first: a delayed listing is stale when it returns.
        let delay = *self.list_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        listing
    }

    async fn read_content(&self, path: &str) -> BridgeResult<String> {
        self.vault
            .lock()
            .unwrap()
            .contents
            .get(path)
            .cloned()
            .ok_or_else(|| BridgeError::NotFound(path.to_string()))
    }

    async fn read_metadata(&self, path: &str) -> BridgeResult<NoteMetadata> {
        Ok(self
            .vault
            .lock()
            .unwrap()
            .metadata
            .get(path)
            .cloned()
            .unwrap_or_default())
    }

    async fn folder_exists(&self, path: &str) -> BridgeResult<bool> {
        let prefix = format!("{}/", path.trim_end_matches('/'));
        Ok(self
            .vault
            .lock()
            .unwrap()
            .files
            .keys()
            .any(|file| file.starts_with(&prefix)))
    }

    async fn active_file(&self) -> BridgeResult<Option<String>> {
        Ok(self.vault.lock().unwrap().active.clone())
    }

    fn subscribe(&self) -> broadcast::Receiver<FileStoreEvent> {
        self.events.subscribe()
    }
}

// ============================================================================
// Settings
// ============================================================================

#[derive(Default)]
pub struct MapSettings {
    values: Mutex<HashMap<String, String>>,
}

impl MapSettings {
    pub fn get(&self, key: &str) -> Option<String> {
        self.values.lock().unwrap().get(key).cloned()
    }

    pub fn put(&self, key: &str, value: &str) {
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
    }
}

#[async_trait]
impl SettingsStore for MapSettings {
    async fn set_string(&self, key: &str, value: &str) -> BridgeResult<()> {
        self.put(key, value);
        Ok(())
    }

    async fn get_string(&self, key: &str) -> BridgeResult<Option<String>> {
        Ok(self.get(key))
    }

    async fn delete(&self, key: &str) -> BridgeResult<()> {
        self.values.lock().unwrap().remove(key);
        Ok(())
    }
}

// ============================================================================
// Builders & Helpers
// ============================================================================

pub fn note(path: &str, modified_at: i64) -> FileRecord {
    FileRecord::new(path, modified_at, modified_at, 10)
}

pub struct Harness {
    pub store: Arc<MemoryFileStore>,
    pub settings: Option<Arc<MapSettings>>,
    pub watch: bool,
    pub config: SelectionConfig,
}

impl Harness {
    pub fn new(store: MemoryFileStore) -> Self {
        Self {
            store: Arc::new(store),
            settings: None,
            watch: false,
            config: SelectionConfig {
                initial_backoff_ms: 1,
                ..SelectionConfig::default()
            },
        }
    }

    pub fn watching(mut self) -> Self {
        self.watch = true;
        self
    }

    pub fn with_settings(mut self, settings: Arc<MapSettings>) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn with_config(mut self, config: SelectionConfig) -> Self {
        self.config = config;
        self
    }

    pub async fn build(&self) -> Arc<CardSetManager> {
        let mut builder = CoreConfig::builder()
            .file_store(self.store.clone())
            .watch_file_store(self.watch);
        if let Some(settings) = &self.settings {
            builder = builder.settings_store(settings.clone()).persist_options(true);
        }
        let core = builder.build().unwrap();
        Arc::new(CardSetManager::new(&core, self.config.clone()).await.unwrap())
    }

    pub async fn start(&self) -> Arc<CardSetManager> {
        let manager = self.build().await;
        manager.initialize().await.unwrap();
        manager
    }
}

pub fn paths(card_set: &CardSet) -> Vec<String> {
    card_set.paths().into_iter().map(str::to_string).collect()
}

/// Polls `condition` until it holds or one second passes.
pub async fn eventually<F>(mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
