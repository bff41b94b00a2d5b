//! # Content Cache
//!
//! Request-coalescing cache of note bodies and metadata for query matching.
//!
//! ## Overview
//!
//! Entries are keyed by path and stamped with the record's
//! `(modified_at, size_bytes)`. A lookup whose stamp matches the cached one
//! is served from memory; any other stamp triggers a fresh read. Concurrent
//! lookups for the same path and stamp share one in-flight read through
//! [`futures::future::Shared`], so a scan racing a file change never reads
//! the same body twice.
//!
//! ```text
//!   get(a.md@t1) ──┐
//!                  ├──> in_flight[a.md] ──> read_content + read_metadata
//!   get(a.md@t1) ──┘                                │
//!                                                   v
//!                                         entries[a.md] = (t1, body)
//! ```
//!
//! Invalidation drops both the cached entry and any in-flight read; a read
//! that completes after its invalidation is not stored.

use bridge_traits::{FileRecord, FileStore, NoteMetadata};
use core_runtime::logging::strip_path;
use futures::future::{self, BoxFuture, FutureExt, Shared};
use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::trace;

use crate::error::Result;

/// Body and metadata of one note at one stamp.
#[derive(Debug, Clone)]
pub struct CachedNote {
    pub modified_at: i64,
    pub size_bytes: u64,
    pub content: Arc<str>,
    pub metadata: Arc<NoteMetadata>,
}

impl CachedNote {
    fn stamp(&self) -> Stamp {
        (self.modified_at, self.size_bytes)
    }
}

type Stamp = (i64, u64);
type NoteFuture = Shared<BoxFuture<'static, Result<CachedNote>>>;

struct CacheState {
    entries: LruCache<String, CachedNote>,
    in_flight: HashMap<String, (Stamp, NoteFuture)>,
}

pub struct ContentCache {
    store: Arc<dyn FileStore>,
    state: Mutex<CacheState>,
}

impl ContentCache {
    /// Create a cache holding at most `capacity` notes (minimum 1).
    pub fn new(store: Arc<dyn FileStore>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            store,
            state: Mutex::new(CacheState {
                entries: LruCache::new(capacity),
                in_flight: HashMap::new(),
            }),
        }
    }

    /// Body and metadata for `file`, read at most once per stamp.
    pub async fn get(&self, file: &FileRecord) -> Result<CachedNote> {
        let stamp = (file.modified_at, file.size_bytes);

        let pending = {
            let mut state = self.lock();

            if let Some(cached) = state.entries.get(&file.path) {
                if cached.stamp() == stamp {
                    trace!(path = %strip_path(&file.path), "Content cache hit");
                    return Ok(cached.clone());
                }
            }

            match state.in_flight.get(&file.path) {
                Some((in_flight_stamp, pending)) if *in_flight_stamp == stamp => pending.clone(),
                _ => {
                    let pending = self.read(file.path.clone(), stamp);
                    state
                        .in_flight
                        .insert(file.path.clone(), (stamp, pending.clone()));
                    pending
                }
            }
        };

        let result = pending.clone().await;

        let mut state = self.lock();
        let still_current = state
            .in_flight
            .get(&file.path)
            .map_or(false, |(_, current)| current.ptr_eq(&pending));
        if still_current {
            state.in_flight.remove(&file.path);
            if let Ok(note) = &result {
                state.entries.put(file.path.clone(), note.clone());
            }
        }

        result
    }

    fn read(&self, path: String, stamp: Stamp) -> NoteFuture {
        let store = Arc::clone(&self.store);
        async move {
            trace!(path = %strip_path(&path), "Reading note for content cache");
            let (content, metadata) =
                future::try_join(store.read_content(&path), store.read_metadata(&path)).await?;
            Ok(CachedNote {
                modified_at: stamp.0,
                size_bytes: stamp.1,
                content: Arc::from(content),
                metadata: Arc::new(metadata),
            })
        }
        .boxed()
        .shared()
    }

    /// Forget a path, including a read still in flight.
    pub fn invalidate(&self, path: &str) {
        let mut state = self.lock();
        state.entries.pop(path);
        state.in_flight.remove(path);
    }

    pub fn clear(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.in_flight.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
