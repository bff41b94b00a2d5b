//! # Selection Providers
//!
//! One strategy per [`CardSetMode`], all behind [`SelectionProvider`].
//!
//! ## Overview
//!
//! A provider computes the card set of its mode from the file store and
//! reconciles file changes against a card set it produced earlier. Providers
//! never own the current card set; the state manager does. A provider only
//! keeps its anchor (active folder, fixed folder or query) and its options.
//!
//! | Provider | Membership |
//! |---|---|
//! | [`ActiveLocationProvider`] | folder of the file focused in the host |
//! | [`FixedLocationProvider`] | configured folder |
//! | [`WholeStoreProvider`] | every eligible file |
//! | [`QueryResultProvider`] | path, body, tags, headings or frontmatter match |
//!
//! Every provider also drops ineligible file types, hidden paths (unless
//! `include_hidden`) and files failing the configured filters.
//!
//! ## Failure Handling
//!
//! Provider operations do not return errors to callers. Failures go through
//! [`crate::error::report`] and the operation degrades: a failed load yields
//! an empty card set tagged with the mode, a failed refresh keeps the current
//! set and a failed membership check counts as "not included".

mod active_location;
mod fixed_location;
pub mod helpers;
mod query_result;
mod whole_store;

pub use active_location::ActiveLocationProvider;
pub use fixed_location::FixedLocationProvider;
pub use query_result::QueryResultProvider;
pub use whole_store::WholeStoreProvider;

use async_trait::async_trait;
use bridge_traits::{Clock, FileRecord, FileStore};
use core_runtime::events::EventBus;
use std::sync::{Arc, PoisonError, RwLock};
use tokio_util::sync::CancellationToken;

use crate::card_set::CardSet;
use crate::config::SelectionConfig;
use crate::error::{self, CardError, Result};
use crate::models::{CardSetMode, FileChange, SelectionOptions, SubscriptionId};
use crate::subscribers::{CardSetCallback, SubscriberList};

// ============================================================================
// Shared Context
// ============================================================================

/// Collaborators every provider needs.
#[derive(Clone)]
pub struct ProviderContext {
    pub file_store: Arc<dyn FileStore>,
    pub clock: Arc<dyn Clock>,
    pub config: Arc<SelectionConfig>,
    pub event_bus: Option<EventBus>,
}

impl ProviderContext {
    pub fn new(
        file_store: Arc<dyn FileStore>,
        clock: Arc<dyn Clock>,
        config: Arc<SelectionConfig>,
        event_bus: Option<EventBus>,
    ) -> Self {
        Self {
            file_store,
            clock,
            config,
            event_bus,
        }
    }

    pub fn now(&self) -> i64 {
        self.clock.unix_timestamp_millis()
    }

    pub fn report(&self, mode: CardSetMode, operation: &str, err: &CardError) {
        error::report(self.event_bus.as_ref(), mode.as_str(), operation, err);
    }
}

/// State common to all providers: mode, options and change subscribers.
pub struct ProviderCore {
    mode: CardSetMode,
    ctx: ProviderContext,
    options: RwLock<SelectionOptions>,
    subscribers: SubscriberList,
}

impl ProviderCore {
    pub fn new(mode: CardSetMode, ctx: ProviderContext) -> Self {
        let options = SelectionOptions {
            mode,
            ..ctx.config.default_options.clone()
        };
        Self {
            mode,
            ctx,
            options: RwLock::new(options),
            subscribers: SubscriberList::new(),
        }
    }

    pub fn mode(&self) -> CardSetMode {
        self.mode
    }

    pub fn ctx(&self) -> &ProviderContext {
        &self.ctx
    }

    pub fn options(&self) -> SelectionOptions {
        self.options
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_options(&self, options: SelectionOptions) {
        *self.options.write().unwrap_or_else(PoisonError::into_inner) = options;
    }

    pub fn subscribers(&self) -> &SubscriberList {
        &self.subscribers
    }

    pub fn report(&self, operation: &str, err: &CardError) {
        self.ctx.report(self.mode, operation, err);
    }

    pub fn empty_set(&self, source: Option<String>) -> CardSet {
        CardSet::empty(self.mode, source, self.ctx.now())
    }
}

// ============================================================================
// Strategy Interface
// ============================================================================

/// Strategy computing and maintaining the card set of one mode.
///
/// Implementors provide [`core`](SelectionProvider::core), the lifecycle
/// hooks, the two load operations and
/// [`evaluate_inclusion`](SelectionProvider::evaluate_inclusion). Everything
/// else has a default built on those.
#[async_trait]
pub trait SelectionProvider: Send + Sync {
    fn core(&self) -> &ProviderCore;

    fn mode(&self) -> CardSetMode {
        self.core().mode()
    }

    /// Register for the store events the strategy needs. Idempotent.
    async fn initialize(&self) -> Result<()>;

    /// Full computation from the store.
    ///
    /// Never fails: on error the failure is reported and an empty card set
    /// tagged with this mode is returned. A cancelled load also returns an
    /// empty set, which the caller discards.
    async fn load_card_set(&self, cancel: &CancellationToken) -> CardSet;

    /// Recompute anchored at `current`'s source. Falls back to `current`.
    async fn refresh_card_set(&self, current: &CardSet, cancel: &CancellationToken) -> CardSet;

    /// Membership test of the strategy, with errors.
    async fn evaluate_inclusion(&self, file: &FileRecord) -> Result<bool>;

    /// Membership test; failures are reported and count as excluded.
    async fn is_file_included(&self, file: &FileRecord) -> bool {
        match self.evaluate_inclusion(file).await {
            Ok(included) => included,
            Err(err) => {
                self.report_failure("is_file_included", &err);
                false
            }
        }
    }

    async fn contains_file(&self, file: &FileRecord) -> bool {
        self.is_file_included(file).await
    }

    /// Reconcile one change against `current`. `None` means nothing changed.
    async fn handle_file_change(&self, change: &FileChange, current: &CardSet) -> Option<CardSet> {
        helpers::reconcile(self, change, current).await
    }

    fn report_failure(&self, operation: &str, err: &CardError) {
        self.core().report(operation, err);
    }

    fn set_options(&self, options: SelectionOptions) {
        self.core().set_options(options);
    }

    fn options(&self) -> SelectionOptions {
        self.core().options()
    }

    /// Stop listeners and drop subscribers.
    async fn destroy(&self) -> Result<()>;

    /// Subscribe to card sets the provider computes on its own initiative.
    fn subscribe_to_changes(&self, callback: CardSetCallback) -> SubscriptionId {
        self.core().subscribers().subscribe(callback)
    }

    fn unsubscribe_from_changes(&self, id: SubscriptionId) -> bool {
        self.core().subscribers().unsubscribe(id)
    }
}
