//! # Provider Registry
//!
//! One provider instance per [`CardSetMode`].
//!
//! The registry is a plain value owned by the card set manager. Bulk
//! lifecycle calls never stop at the first failing provider: each failure is
//! logged and the remaining providers still run.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use crate::models::CardSetMode;
use crate::provider::SelectionProvider;

#[derive(Default)]
pub struct ProviderRegistry {
    providers: RwLock<HashMap<CardSetMode, Arc<dyn SelectionProvider>>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `provider` under its mode, destroying the provider it
    /// replaces.
    pub async fn register_provider(&self, provider: Arc<dyn SelectionProvider>) {
        let mode = provider.mode();
        let replaced = self.providers.write().await.insert(mode, provider);

        if let Some(old) = replaced {
            info!(%mode, "Replacing registered provider");
            if let Err(e) = old.destroy().await {
                error!(%mode, error = %e, "Failed to destroy replaced provider");
            }
        } else {
            debug!(%mode, "Registered provider");
        }
    }

    pub async fn get_provider(&self, mode: CardSetMode) -> Option<Arc<dyn SelectionProvider>> {
        self.providers.read().await.get(&mode).cloned()
    }

    /// All providers, ordered by mode.
    pub async fn get_all_providers(&self) -> Vec<Arc<dyn SelectionProvider>> {
        let providers = self.providers.read().await;
        let mut all: Vec<_> = providers.values().cloned().collect();
        all.sort_by_key(|provider| provider.mode());
        all
    }

    pub async fn get_registered_modes(&self) -> Vec<CardSetMode> {
        let mut modes: Vec<CardSetMode> = self.providers.read().await.keys().copied().collect();
        modes.sort();
        modes
    }

    /// Returns the number of providers that initialized successfully.
    pub async fn initialize_all_providers(&self) -> usize {
        let mut initialized = 0;
        for provider in self.get_all_providers().await {
            match provider.initialize().await {
                Ok(()) => initialized += 1,
                Err(e) => error!(mode = %provider.mode(), error = %e, "Provider failed to initialize"),
            }
        }
        initialized
    }

    /// Destroys every provider and empties the registry.
    pub async fn cleanup_all_providers(&self) {
        let providers: Vec<_> = {
            let mut map = self.providers.write().await;
            let mut drained: Vec<_> = map.drain().map(|(_, provider)| provider).collect();
            drained.sort_by_key(|provider| provider.mode());
            drained
        };

        for provider in providers {
            if let Err(e) = provider.destroy().await {
                error!(mode = %provider.mode(), error = %e, "Provider failed to clean up");
            }
        }
    }
}
