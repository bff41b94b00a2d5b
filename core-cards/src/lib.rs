//! # Card Set Engine
//!
//! Keeps an ordered collection of note files (a *card set*) in sync with a
//! note vault according to a selection mode.
//!
//! ## Overview
//!
//! - [`provider`] - one [`SelectionProvider`] strategy per [`CardSetMode`]
//!   deciding which files belong to the set
//! - [`registry`] / [`factory`] - provider lookup and construction
//! - [`state`] - the single current card set, its ordering and subscribers
//! - [`manager`] - the [`CardSetManager`] facade tying everything together:
//!   mode switches, file change reconciliation, the vault watcher and options
//!   persistence
//!
//! Card sets are immutable values; every change produces a new [`CardSet`].
//! Hosts inject vault access through `bridge_traits::FileStore` and observe
//! the engine through subscriptions or the `core_runtime` event bus.

pub mod card_set;
pub mod config;
pub mod content_cache;
pub mod error;
pub mod factory;
pub mod manager;
pub mod models;
pub mod path_lock;
pub mod paths;
pub mod provider;
pub mod registry;
pub mod state;
pub mod subscribers;

#[cfg(test)]
mod test_support;

pub use card_set::{CardGroup, CardSet};
pub use config::SelectionConfig;
pub use content_cache::{CachedNote, ContentCache};
pub use error::{CardError, Result};
pub use factory::ProviderFactory;
pub use manager::{CardSetManager, OPTIONS_SETTINGS_KEY};
pub use models::{
    CardSetId, CardSetMode, FileChange, FilterOption, GroupOption, SelectionOptions,
    SortDirection, SortField, SortOption, SubscriptionId,
};
pub use provider::{
    ActiveLocationProvider, FixedLocationProvider, ProviderContext, ProviderCore,
    QueryResultProvider, SelectionProvider, WholeStoreProvider,
};
pub use registry::ProviderRegistry;
pub use state::{LoadAdoption, StateManager};
pub use subscribers::CardSetCallback;
