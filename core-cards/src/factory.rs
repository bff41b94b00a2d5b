//! Construction of the concrete provider for a mode.

use std::sync::Arc;
use tracing::error;

use crate::error::{CardError, Result};
use crate::models::CardSetMode;
use crate::provider::{
    ActiveLocationProvider, FixedLocationProvider, ProviderContext, QueryResultProvider,
    SelectionProvider, WholeStoreProvider,
};

pub struct ProviderFactory {
    ctx: ProviderContext,
}

impl ProviderFactory {
    pub fn new(ctx: ProviderContext) -> Self {
        Self { ctx }
    }

    /// Builds the provider for `mode`.
    ///
    /// # Errors
    ///
    /// [`CardError::UnsupportedMode`] when the mode is disabled in the
    /// selection configuration.
    pub fn try_create_provider(&self, mode: CardSetMode) -> Result<Arc<dyn SelectionProvider>> {
        if !self.ctx.config.is_mode_enabled(mode) {
            return Err(CardError::UnsupportedMode(mode.to_string()));
        }

        let ctx = self.ctx.clone();
        let provider: Arc<dyn SelectionProvider> = match mode {
            CardSetMode::ActiveLocation => Arc::new(ActiveLocationProvider::new(ctx)),
            CardSetMode::FixedLocation => Arc::new(FixedLocationProvider::new(ctx)),
            CardSetMode::WholeStore => Arc::new(WholeStoreProvider::new(ctx)),
            CardSetMode::QueryResult => Arc::new(QueryResultProvider::new(ctx)),
        };
        Ok(provider)
    }

    /// Like [`try_create_provider`](Self::try_create_provider), logging the
    /// error and returning `None` for unsupported modes.
    pub fn create_provider(&self, mode: CardSetMode) -> Option<Arc<dyn SelectionProvider>> {
        match self.try_create_provider(mode) {
            Ok(provider) => Some(provider),
            Err(e) => {
                error!(%mode, error = %e, "Cannot create selection provider");
                None
            }
        }
    }

    /// Resolves a mode name (`"fixed_location"`, `"search"`, ...) and builds
    /// its provider.
    pub fn create_provider_by_name(&self, name: &str) -> Option<Arc<dyn SelectionProvider>> {
        match name.parse::<CardSetMode>() {
            Ok(mode) => self.create_provider(mode),
            Err(e) => {
                error!(name, error = %e, "Cannot create selection provider");
                None
            }
        }
    }
}
