//! Folder of the file focused in the host editor.
//!
//! The provider follows `ActiveFileChanged` notifications on its own. When
//! the focused file moves to another folder it runs a full load and hands the
//! result to its change subscribers. The manager takes that as the signal to
//! refresh this mode if it is still active.

use async_trait::async_trait;
use bridge_traits::{FileRecord, FileStoreEvent};
use core_runtime::logging::strip_path;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::helpers;
use super::{ProviderContext, ProviderCore, SelectionProvider};
use crate::card_set::CardSet;
use crate::error::Result;
use crate::models::CardSetMode;
use crate::paths::{is_in_scope, normalize_dir, parent_dir};

/// Cheap to clone; clones share anchor, options and subscribers.
#[derive(Clone)]
pub struct ActiveLocationProvider {
    inner: Arc<Inner>,
}

struct Inner {
    core: ProviderCore,
    /// Parent folder of the focused file; `None` while nothing is focused
    anchor: RwLock<Option<String>>,
    /// Stops the active-file listener
    listener: Mutex<Option<CancellationToken>>,
}

impl ActiveLocationProvider {
    pub fn new(ctx: ProviderContext) -> Self {
        Self {
            inner: Arc::new(Inner {
                core: ProviderCore::new(CardSetMode::ActiveLocation, ctx),
                anchor: RwLock::new(None),
                listener: Mutex::new(None),
            }),
        }
    }

    /// Parent folder of the focused file.
    pub fn anchor(&self) -> Option<String> {
        self.inner
            .anchor
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Stores the anchor derived from `active_path`; returns whether it moved.
    fn update_anchor(&self, active_path: Option<&str>) -> bool {
        let next = active_path.map(|path| parent_dir(path).to_string());
        let mut anchor = self.inner.anchor.write().unwrap_or_else(PoisonError::into_inner);
        if *anchor == next {
            return false;
        }
        *anchor = next;
        true
    }

    async fn resolve_anchor(&self) {
        let ctx = self.inner.core.ctx();
        let active = helpers::with_read_retry(ctx, None, "active_file", || async {
            Ok(ctx.file_store.active_file().await?)
        })
        .await;

        match active {
            Ok(path) => {
                self.update_anchor(path.as_deref());
            }
            Err(err) => self.inner.core.report("resolve_anchor", &err),
        }
    }

    async fn scan(&self, anchor: &str, cancel: &CancellationToken) -> Result<Vec<FileRecord>> {
        let ctx = self.inner.core.ctx();
        let options = self.inner.core.options();
        let candidates: Vec<FileRecord> = helpers::list_candidates(ctx, cancel)
            .await?
            .into_iter()
            .filter(|file| {
                helpers::passes_base_rules(ctx, &options, file)
                    && is_in_scope(&file.path, anchor, options.include_subdirectories)
            })
            .collect();

        debug!(
            folder = %strip_path(anchor),
            candidates = candidates.len(),
            "Scanning active folder"
        );
        helpers::collect_included(self, candidates, cancel).await
    }

    async fn load(&self, cancel: &CancellationToken) -> CardSet {
        let Some(anchor) = self.anchor() else {
            debug!("No active file, active location card set is empty");
            return self.inner.core.empty_set(None);
        };
        let outcome = self.scan(&anchor, cancel).await;
        helpers::settle_load(&self.inner.core, Some(anchor), outcome)
    }

    async fn on_active_file_changed(&self, path: Option<&str>, cancel: &CancellationToken) {
        if !self.update_anchor(path) {
            return;
        }

        info!(
            file = path.map(strip_path).unwrap_or("<none>"),
            "Active folder changed, reloading"
        );
        let card_set = self.load(cancel).await;
        if cancel.is_cancelled() {
            return;
        }
        self.inner.core.subscribers().notify(&card_set);
    }

    async fn listen(
        self,
        mut events: tokio::sync::broadcast::Receiver<FileStoreEvent>,
        cancel: CancellationToken,
    ) {
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.recv() => event,
            };

            match event {
                Ok(FileStoreEvent::ActiveFileChanged { path }) => {
                    self.on_active_file_changed(path.as_deref(), &cancel).await;
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Active file listener lagged, re-reading focus");
                    let before = self.anchor();
                    self.resolve_anchor().await;
                    if self.anchor() != before {
                        let card_set = self.load(&cancel).await;
                        if !cancel.is_cancelled() {
                            self.inner.core.subscribers().notify(&card_set);
                        }
                    }
                }
                Err(RecvError::Closed) => {
                    debug!("File store event stream closed");
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl SelectionProvider for ActiveLocationProvider {
    fn core(&self) -> &ProviderCore {
        &self.inner.core
    }

    async fn initialize(&self) -> Result<()> {
        let cancel = {
            let mut listener = self
                .inner
                .listener
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if listener.is_some() {
                return Ok(());
            }
            let token = CancellationToken::new();
            *listener = Some(token.clone());
            token
        };

        let events = self.inner.core.ctx().file_store.subscribe();
        self.resolve_anchor().await;
        tokio::spawn(self.clone().listen(events, cancel));
        Ok(())
    }

    async fn load_card_set(&self, cancel: &CancellationToken) -> CardSet {
        if self.anchor().is_none() {
            self.resolve_anchor().await;
        }
        self.load(cancel).await
    }

    async fn refresh_card_set(&self, current: &CardSet, cancel: &CancellationToken) -> CardSet {
        let anchor = current
            .source()
            .map(|s| normalize_dir(s).to_string())
            .or_else(|| self.anchor());
        let Some(anchor) = anchor else {
            return current.clone();
        };
        let outcome = self.scan(&anchor, cancel).await;
        helpers::settle_refresh(&self.inner.core, current, Some(anchor), outcome)
    }

    async fn evaluate_inclusion(&self, file: &FileRecord) -> Result<bool> {
        let Some(anchor) = self.anchor() else {
            return Ok(false);
        };
        let ctx = self.inner.core.ctx();
        let options = self.inner.core.options();
        if !helpers::passes_base_rules(ctx, &options, file)
            || !is_in_scope(&file.path, &anchor, options.include_subdirectories)
        {
            return Ok(false);
        }
        helpers::passes_filters(ctx, &options, file).await
    }

    async fn destroy(&self) -> Result<()> {
        let token = self
            .inner
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(token) = token {
            token.cancel();
        }
        self.inner.core.subscribers().clear();
        Ok(())
    }
}
