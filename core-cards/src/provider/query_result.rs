//! Files matching a text query.
//!
//! A file matches when the query (case-insensitive) occurs in its path, body,
//! tags, headings or frontmatter. Path matches short-circuit; everything else
//! goes through the [`ContentCache`], so repeated scans only read notes whose
//! `(modified_at, size_bytes)` changed.

use async_trait::async_trait;
use bridge_traits::{FileRecord, NoteMetadata};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::helpers;
use super::{ProviderContext, ProviderCore, SelectionProvider};
use crate::card_set::CardSet;
use crate::content_cache::ContentCache;
use crate::error::{CardError, Result};
use crate::models::{CardSetMode, FileChange};

pub struct QueryResultProvider {
    core: ProviderCore,
    cache: ContentCache,
}

impl QueryResultProvider {
    pub fn new(ctx: ProviderContext) -> Self {
        let cache = ContentCache::new(
            Arc::clone(&ctx.file_store),
            ctx.config.content_cache_capacity,
        );
        Self {
            core: ProviderCore::new(CardSetMode::QueryResult, ctx),
            cache,
        }
    }

    /// Trimmed query text, if any.
    fn query(&self) -> Option<String> {
        self.core.options().source_text().map(str::to_string)
    }

    async fn scan(&self, cancel: &CancellationToken) -> Result<Vec<FileRecord>> {
        let ctx = self.core.ctx();
        let options = self.core.options();
        let timeout_secs = ctx.config.query_scan_timeout_secs;

        let scan = async {
            let candidates: Vec<FileRecord> = helpers::list_candidates(ctx, cancel)
                .await?
                .into_iter()
                .filter(|file| helpers::passes_base_rules(ctx, &options, file))
                .collect();
            debug!(candidates = candidates.len(), "Scanning for query matches");
            helpers::collect_included(self, candidates, cancel).await
        };

        match tokio::time::timeout(Duration::from_secs(timeout_secs), scan).await {
            Ok(outcome) => outcome,
            Err(_) => Err(CardError::ScanTimeout(timeout_secs)),
        }
    }

    /// The record to run filters against when `file` matches, carrying the
    /// metadata read for the match.
    async fn match_query(&self, file: &FileRecord, query: &str) -> Result<Option<FileRecord>> {
        let needle = query.to_lowercase();
        if file.path.to_lowercase().contains(&needle) {
            return Ok(Some(file.clone()));
        }

        let ctx = self.core.ctx();
        let note =
            helpers::with_read_retry(ctx, None, "read_content", || self.cache.get(file)).await?;

        let matched = note.content.to_lowercase().contains(&needle)
            || metadata_contains(&note.metadata, &needle);
        if !matched {
            return Ok(None);
        }

        let candidate = match file.metadata {
            Some(_) => file.clone(),
            None => file.clone().with_metadata(note.metadata.as_ref().clone()),
        };
        Ok(Some(candidate))
    }
}

fn metadata_contains(metadata: &NoteMetadata, needle: &str) -> bool {
    let contains = |text: &str| text.to_lowercase().contains(needle);

    metadata.tags.iter().any(|tag| contains(tag.as_str()))
        || metadata.headings.iter().any(|heading| contains(heading.as_str()))
        || metadata.frontmatter.iter().any(|(key, value)| {
            contains(key.as_str())
                || match value {
                    serde_json::Value::String(text) => contains(text.as_str()),
                    other => contains(&other.to_string()),
                }
        })
}

#[async_trait]
impl SelectionProvider for QueryResultProvider {
    fn core(&self) -> &ProviderCore {
        &self.core
    }

    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn load_card_set(&self, cancel: &CancellationToken) -> CardSet {
        let Some(query) = self.query() else {
            return self.core.empty_set(None);
        };
        let outcome = self.scan(cancel).await;
        helpers::settle_load(&self.core, Some(query), outcome)
    }

    async fn refresh_card_set(&self, current: &CardSet, cancel: &CancellationToken) -> CardSet {
        let Some(query) = self.query() else {
            return self.core.empty_set(None);
        };
        let outcome = self.scan(cancel).await;
        helpers::settle_refresh(&self.core, current, Some(query), outcome)
    }

    async fn evaluate_inclusion(&self, file: &FileRecord) -> Result<bool> {
        let Some(query) = self.query() else {
            return Ok(false);
        };
        let ctx = self.core.ctx();
        let options = self.core.options();
        if !helpers::passes_base_rules(ctx, &options, file) {
            return Ok(false);
        }

        match self.match_query(file, &query).await? {
            Some(candidate) => helpers::passes_filters(ctx, &options, &candidate).await,
            None => Ok(false),
        }
    }

    async fn handle_file_change(&self, change: &FileChange, current: &CardSet) -> Option<CardSet> {
        match change {
            FileChange::Delete { path } => self.cache.invalidate(path),
            FileChange::Rename { old_path, .. } => self.cache.invalidate(old_path),
            // Modify re-reads only when the stamp changed
            FileChange::Create(_) | FileChange::Modify(_) => {}
        }
        helpers::reconcile(self, change, current).await
    }

    async fn destroy(&self) -> Result<()> {
        self.cache.clear();
        self.core.subscribers().clear();
        Ok(())
    }
}
