//! Notes under one configured folder, optionally including subfolders.

use async_trait::async_trait;
use bridge_traits::FileRecord;
use core_runtime::logging::strip_path;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::helpers;
use super::{ProviderContext, ProviderCore, SelectionProvider};
use crate::card_set::CardSet;
use crate::error::{CardError, Result};
use crate::models::CardSetMode;
use crate::paths::{is_in_scope, normalize_dir};

/// Files of a folder chosen by the user (`SelectionOptions::source`).
pub struct FixedLocationProvider {
    core: ProviderCore,
}

impl FixedLocationProvider {
    pub fn new(ctx: ProviderContext) -> Self {
        Self {
            core: ProviderCore::new(CardSetMode::FixedLocation, ctx),
        }
    }

    /// Configured folder in canonical form.
    fn folder(&self) -> Option<String> {
        self.core
            .options()
            .source_text()
            .map(|folder| normalize_dir(folder).to_string())
    }

    async fn scan(&self, folder: &str, cancel: &CancellationToken) -> Result<Vec<FileRecord>> {
        let ctx = self.core.ctx();

        let exists = helpers::with_read_retry(ctx, Some(cancel), "folder_exists", || async {
            Ok(ctx.file_store.folder_exists(folder).await?)
        })
        .await?;
        if !exists {
            return Err(CardError::NotFound(folder.to_string()));
        }

        let options = self.core.options();
        let candidates: Vec<FileRecord> = helpers::list_candidates(ctx, cancel)
            .await?
            .into_iter()
            .filter(|file| {
                helpers::passes_base_rules(ctx, &options, file)
                    && is_in_scope(&file.path, folder, options.include_subdirectories)
            })
            .collect();

        debug!(
            folder = %strip_path(folder),
            candidates = candidates.len(),
            "Scanning fixed folder"
        );
        helpers::collect_included(self, candidates, cancel).await
    }
}

#[async_trait]
impl SelectionProvider for FixedLocationProvider {
    fn core(&self) -> &ProviderCore {
        &self.core
    }

    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn load_card_set(&self, cancel: &CancellationToken) -> CardSet {
        let Some(folder) = self.folder() else {
            debug!("No folder configured");
            return self.core.empty_set(None);
        };
        let outcome = self.scan(&folder, cancel).await;
        helpers::settle_load(&self.core, Some(folder), outcome)
    }

    async fn refresh_card_set(&self, current: &CardSet, cancel: &CancellationToken) -> CardSet {
        let folder = self
            .folder()
            .or_else(|| current.source().map(|s| normalize_dir(s).to_string()));
        let Some(folder) = folder else {
            return current.clone();
        };
        let outcome = self.scan(&folder, cancel).await;
        helpers::settle_refresh(&self.core, current, Some(folder), outcome)
    }

    async fn evaluate_inclusion(&self, file: &FileRecord) -> Result<bool> {
        let Some(folder) = self.folder() else {
            return Ok(false);
        };
        let ctx = self.core.ctx();
        let options = self.core.options();
        if !helpers::passes_base_rules(ctx, &options, file)
            || !is_in_scope(&file.path, &folder, options.include_subdirectories)
        {
            return Ok(false);
        }
        helpers::passes_filters(ctx, &options, file).await
    }

    async fn destroy(&self) -> Result<()> {
        self.core.subscribers().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SelectionOptions;
    use crate::test_support::{context, listing_store, record, MockFileStore};

    fn files() -> Vec<FileRecord> {
        vec![
            record("/notes/a.md"),
            record("/notes/b.md"),
            record("/notes/sub/c.md"),
            record("/other/d.md"),
        ]
    }

    fn provider_for(folder: &str, include_sub: bool) -> FixedLocationProvider {
        let provider = FixedLocationProvider::new(context(listing_store(files())));
        provider.set_options(
            SelectionOptions::for_mode(CardSetMode::FixedLocation)
                .with_source(folder)
                .with_subdirectories(include_sub),
        );
        provider
    }

    #[tokio::test]
    async fn test_load_direct_children() {
        let provider = provider_for("/notes", false);
        let cs = provider.load_card_set(&CancellationToken::new()).await;

        assert_eq!(cs.paths(), vec!["/notes/a.md", "/notes/b.md"]);
        assert_eq!(cs.source(), Some("/notes"));
    }

    #[tokio::test]
    async fn test_load_with_subdirectories() {
        let provider = provider_for("/notes/", true);
        let cs = provider.load_card_set(&CancellationToken::new()).await;

        assert_eq!(cs.len(), 3);
        assert_eq!(cs.source(), Some("/notes"));
    }

    #[tokio::test]
    async fn test_missing_folder_yields_empty_set() {
        let mut store = MockFileStore::new();
        store.expect_folder_exists().returning(|_| Ok(false));
        store.expect_list_files().never();
        let provider = FixedLocationProvider::new(context(store));
        provider.set_options(
            SelectionOptions::for_mode(CardSetMode::FixedLocation).with_source("/gone"),
        );

        let cs = provider.load_card_set(&CancellationToken::new()).await;
        assert!(cs.is_empty());
        assert_eq!(cs.source(), Some("/gone"));
    }

    #[tokio::test]
    async fn test_no_folder_configured() {
        let provider = FixedLocationProvider::new(context(MockFileStore::new()));
        let cs = provider.load_card_set(&CancellationToken::new()).await;
        assert!(cs.is_empty());
        assert!(!provider.is_file_included(&record("/notes/a.md")).await);
    }

    #[tokio::test]
    async fn test_refresh_falls_back_to_current_source() {
        let provider = FixedLocationProvider::new(context(listing_store(files())));
        let current = CardSet::empty(CardSetMode::FixedLocation, Some("/other".to_string()), 0);

        let refreshed = provider
            .refresh_card_set(&current, &CancellationToken::new())
            .await;
        assert_eq!(refreshed.paths(), vec!["/other/d.md"]);
    }

    #[tokio::test]
    async fn test_inclusion() {
        let provider = provider_for("/notes", false);
        assert!(provider.is_file_included(&record("/notes/new.md")).await);
        assert!(!provider.is_file_included(&record("/notes/sub/new.md")).await);
        assert!(!provider.is_file_included(&record("/notes/image.png")).await);
        assert!(!provider.is_file_included(&record("/notes/.hidden.md")).await);
    }
}
