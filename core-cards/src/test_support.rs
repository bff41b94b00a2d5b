//! Shared fixtures for unit tests.

use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::{Clock, FileRecord, FileStore, FileStoreEvent, NoteMetadata};
use chrono::{DateTime, TimeZone, Utc};
use mockall::mock;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::config::SelectionConfig;
use crate::provider::ProviderContext;

mock! {
    pub FileStore {}

    #[async_trait]
    impl FileStore for FileStore {
        async fn list_files(&self, eligible_only: bool) -> BridgeResult<Vec<FileRecord>>;
        async fn read_content(&self, path: &str) -> BridgeResult<String>;
        async fn read_metadata(&self, path: &str) -> BridgeResult<NoteMetadata>;
        async fn folder_exists(&self, path: &str) -> BridgeResult<bool>;
        async fn active_file(&self) -> BridgeResult<Option<String>>;
        fn subscribe(&self) -> broadcast::Receiver<FileStoreEvent>;
    }
}

/// Clock advancing one millisecond per reading.
#[derive(Default)]
pub struct TickingClock {
    millis: AtomicI64,
}

impl Clock for TickingClock {
    fn now(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.unix_timestamp_millis())
            .single()
            .unwrap_or_else(Utc::now)
    }

    fn unix_timestamp_millis(&self) -> i64 {
        self.millis.fetch_add(1, Ordering::SeqCst) + 1
    }
}

pub fn record(path: &str) -> FileRecord {
    FileRecord::new(path, 1, 1, 10)
}

pub fn context(store: MockFileStore) -> ProviderContext {
    context_with(store, SelectionConfig::default())
}

pub fn context_with(store: MockFileStore, config: SelectionConfig) -> ProviderContext {
    ProviderContext::new(
        Arc::new(store),
        Arc::new(TickingClock::default()),
        Arc::new(SelectionConfig {
            initial_backoff_ms: 1,
            ..config
        }),
        None,
    )
}

/// Mock listing `files` and answering existence checks for every folder.
pub fn listing_store(files: Vec<FileRecord>) -> MockFileStore {
    let mut store = MockFileStore::new();
    store
        .expect_list_files()
        .returning(move |_| Ok(files.clone()));
    store.expect_folder_exists().returning(|_| Ok(true));
    store
        .expect_read_metadata()
        .returning(|_| Ok(NoteMetadata::default()));
    store.expect_subscribe().returning(|| broadcast::channel(16).1);
    store
}
