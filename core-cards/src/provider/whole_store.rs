//! Every eligible, visible note in the store.

use async_trait::async_trait;
use bridge_traits::FileRecord;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::helpers;
use super::{ProviderContext, ProviderCore, SelectionProvider};
use crate::card_set::CardSet;
use crate::error::Result;
use crate::models::CardSetMode;

/// Every eligible, visible file of the store.
pub struct WholeStoreProvider {
    core: ProviderCore,
}

impl WholeStoreProvider {
    pub fn new(ctx: ProviderContext) -> Self {
        Self {
            core: ProviderCore::new(CardSetMode::WholeStore, ctx),
        }
    }

    async fn scan(&self, cancel: &CancellationToken) -> Result<Vec<FileRecord>> {
        let ctx = self.core.ctx();
        let options = self.core.options();
        let candidates: Vec<FileRecord> = helpers::list_candidates(ctx, cancel)
            .await?
            .into_iter()
            .filter(|file| helpers::passes_base_rules(ctx, &options, file))
            .collect();
        debug!(candidates = candidates.len(), "Scanning whole store");
        helpers::collect_included(self, candidates, cancel).await
    }
}

#[async_trait]
impl SelectionProvider for WholeStoreProvider {
    fn core(&self) -> &ProviderCore {
        &self.core
    }

    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn load_card_set(&self, cancel: &CancellationToken) -> CardSet {
        let outcome = self.scan(cancel).await;
        helpers::settle_load(&self.core, None, outcome)
    }

    async fn refresh_card_set(&self, current: &CardSet, cancel: &CancellationToken) -> CardSet {
        let outcome = self.scan(cancel).await;
        helpers::settle_refresh(&self.core, current, None, outcome)
    }

    async fn evaluate_inclusion(&self, file: &FileRecord) -> Result<bool> {
        let ctx = self.core.ctx();
        let options = self.core.options();
        if !helpers::passes_base_rules(ctx, &options, file) {
            return Ok(false);
        }
        helpers::passes_filters(ctx, &options, file).await
    }

    async fn destroy(&self) -> Result<()> {
        self.core.subscribers().clear();
        Ok(())
    }
}
