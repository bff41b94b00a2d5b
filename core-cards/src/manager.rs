//! # Card Set Manager
//!
//! Single entry point for consumers of the card set engine.
//!
//! ## Overview
//!
//! The manager owns the provider registry and the state manager and wires
//! them together:
//!
//! ```text
//!  FileStore events ──> watcher ──> handle_file_change ──> active provider
//!                                        │ (per-path lock)        │
//!                                        v                        v
//!  UI ──> set_mode / set_options ──> load / refresh ──> StateManager ──> subscribers
//!                                   (generation + token)   (sort, CAS)
//! ```
//!
//! - Mode switches and option changes cancel the previous load and start a
//!   new generation; only the newest load of the active mode is adopted.
//! - File changes are serialized per path and adopted with compare-and-swap
//!   against the card set they were computed from, retrying on conflict.
//! - Changes that arrive while a load runs are logged and replayed onto the
//!   load result before it is adopted, so a slow load never resurrects a
//!   deleted file.
//! - Providers that reload on their own (active location) signal through
//!   their change subscription; while their mode is active the manager
//!   answers with a tracked refresh.
//!
//! ## Usage
//!
//! ```ignore
//! use core_cards::{CardSetManager, CardSetMode, SelectionConfig, SelectionOptions};
//! use std::sync::Arc;
//!
//! let manager = Arc::new(CardSetManager::new(&core_config, SelectionConfig::default()).await?);
//! manager.initialize().await?;
//!
//! manager.subscribe_to_changes(Arc::new(|cards| render(cards)));
//! manager
//!     .set_mode(
//!         CardSetMode::FixedLocation,
//!         Some(SelectionOptions::for_mode(CardSetMode::FixedLocation).with_source("/notes")),
//!     )
//!     .await?;
//! ```

use bridge_traits::{FileRecord, FileStoreEvent, SettingsStore};
use core_runtime::config::{CoreConfig, FeatureFlags};
use core_runtime::events::{CoreEvent, EngineEvent, EventBus, Receiver, SelectionEvent};
use core_runtime::logging::strip_path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::card_set::CardSet;
use crate::config::SelectionConfig;
use crate::error::{CardError, Result};
use crate::factory::ProviderFactory;
use crate::models::{CardSetMode, FileChange, SelectionOptions, SortOption, SubscriptionId};
use crate::path_lock::PathLocks;
use crate::provider::{ProviderContext, SelectionProvider};
use crate::registry::ProviderRegistry;
use crate::state::{LoadAdoption, StateManager};
use crate::subscribers::CardSetCallback;

/// Settings key holding the JSON-encoded [`SelectionOptions`].
pub const OPTIONS_SETTINGS_KEY: &str = "card_set.selection_options";

/// Reconciliation attempts before a change is dropped under contention.
const MAX_RECONCILE_ATTEMPTS: usize = 8;

pub struct CardSetManager {
    ctx: ProviderContext,
    registry: ProviderRegistry,
    state: Arc<StateManager>,
    path_locks: PathLocks,
    event_bus: EventBus,
    settings_store: Option<Arc<dyn SettingsStore>>,
    features: FeatureFlags,
    /// Parent of every load token and of the watcher
    shutdown: CancellationToken,
    load_token: Mutex<CancellationToken>,
    initialized: AtomicBool,
    watching: AtomicBool,
    destroyed: AtomicBool,
}

impl CardSetManager {
    /// Builds the manager and registers one provider per enabled mode.
    ///
    /// # Errors
    ///
    /// [`CardError::InvalidConfig`] when `selection` fails validation.
    pub async fn new(core: &CoreConfig, selection: SelectionConfig) -> Result<Self> {
        selection.validate()?;

        let event_bus = EventBus::new(core.event_buffer_size);
        let ctx = ProviderContext::new(
            Arc::clone(&core.file_store),
            Arc::clone(&core.clock),
            Arc::new(selection),
            Some(event_bus.clone()),
        );
        let state = Arc::new(StateManager::new(
            ctx.config.default_options.clone(),
            Some(event_bus.clone()),
        ));

        let factory = ProviderFactory::new(ctx.clone());
        let registry = ProviderRegistry::new();
        for mode in CardSetMode::ALL {
            if !ctx.config.is_mode_enabled(mode) {
                continue;
            }
            if let Some(provider) = factory.create_provider(mode) {
                registry.register_provider(provider).await;
            }
        }

        let shutdown = CancellationToken::new();
        Ok(Self {
            ctx,
            registry,
            state,
            path_locks: PathLocks::new(),
            event_bus,
            settings_store: core.settings_store.clone(),
            features: core.features,
            load_token: Mutex::new(shutdown.child_token()),
            shutdown,
            initialized: AtomicBool::new(false),
            watching: AtomicBool::new(false),
            destroyed: AtomicBool::new(false),
        })
    }

    /// Restores persisted options, initializes every provider, starts the
    /// file store watcher (when enabled) and loads the initial card set.
    /// Later calls are no-ops.
    #[instrument(skip(self))]
    pub async fn initialize(self: &Arc<Self>) -> Result<()> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            debug!("Card set engine already initialized");
            return Ok(());
        }

        let mut options = self
            .restore_options()
            .await
            .unwrap_or_else(|| self.ctx.config.default_options.clone());
        if self.registry.get_provider(options.mode).await.is_none() {
            warn!(mode = %options.mode, "Selection mode is not available, using defaults");
            options = self.ctx.config.default_options.clone();
        }

        for provider in self.registry.get_all_providers().await {
            self.follow_provider_reloads(provider.as_ref());
        }
        let provider_count = self.registry.initialize_all_providers().await;
        if self.features.watch_file_store {
            self.start_watching();
        }

        info!(provider_count, mode = %options.mode, "Card set engine started");
        let _ = self
            .event_bus
            .emit(CoreEvent::Engine(EngineEvent::Started { provider_count }));

        self.activate(options).await
    }

    // ========================================================================
    // Mode & Options
    // ========================================================================

    /// Switches the selection mode.
    ///
    /// A no-op when `mode` is already active and no options are given. With
    /// options for the active mode this behaves like
    /// [`set_options`](Self::set_options).
    ///
    /// # Errors
    ///
    /// [`CardError::UnsupportedMode`] when no provider is registered for
    /// `mode`.
    #[instrument(skip(self, options))]
    pub async fn set_mode(&self, mode: CardSetMode, options: Option<SelectionOptions>) -> Result<()> {
        let current = self.state.mode();
        match options {
            None if current == Some(mode) => {
                debug!("Mode already active");
                Ok(())
            }
            Some(options) if current == Some(mode) => {
                self.set_options(SelectionOptions { mode, ..options }).await
            }
            options => {
                let options = SelectionOptions {
                    mode,
                    ..options.unwrap_or_else(|| self.state.options())
                };
                self.activate(options).await
            }
        }
    }

    /// Stores new options, hands them to every provider and refreshes the
    /// active one. Options naming another mode switch to it.
    #[instrument(skip(self, options), fields(mode = %options.mode))]
    pub async fn set_options(&self, options: SelectionOptions) -> Result<()> {
        if self.state.mode() != Some(options.mode) {
            return self.activate(options).await;
        }

        let provider = self.provider_for(options.mode).await?;
        self.state.set_options(options.clone());
        for provider in self.registry.get_all_providers().await {
            provider.set_options(options.clone());
        }
        self.persist_options(&options).await;

        let token = self.next_load_token();
        let generation = self.state.begin_load();
        let current = self.state.current_card_set();
        let card_set = if current.mode() == options.mode {
            provider.refresh_card_set(&current, &token).await
        } else {
            provider.load_card_set(&token).await
        };

        if token.is_cancelled() {
            debug!(generation, "Refresh superseded");
            return Ok(());
        }
        self.adopt_load(provider.as_ref(), generation, card_set).await;
        Ok(())
    }

    /// Re-sorts the current card set and republishes it.
    #[instrument(skip(self))]
    pub async fn set_sort_option(&self, sort_option: SortOption) {
        self.state.set_sort_option(sort_option);
        self.state.resort();
        self.persist_options(&self.state.options()).await;
    }

    /// Full reload of the active mode.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<()> {
        let Some(mode) = self.state.mode() else {
            debug!("No active mode to refresh");
            return Ok(());
        };
        let provider = self.provider_for(mode).await?;
        let generation = self.state.begin_load();
        self.load_into_state(provider, generation).await;
        Ok(())
    }

    async fn activate(&self, options: SelectionOptions) -> Result<()> {
        let mode = options.mode;
        let provider = self.provider_for(mode).await?;
        provider.set_options(options.clone());

        let (previous, generation) = self.state.switch_mode(options.clone());
        if previous != Some(mode) {
            info!(from = ?previous, to = %mode, "Selection mode changed");
            let _ = self
                .event_bus
                .emit(CoreEvent::Selection(SelectionEvent::ModeChanged {
                    from: previous.map(|m| m.to_string()),
                    to: mode.to_string(),
                }));
        }
        self.persist_options(&options).await;

        self.load_into_state(provider, generation).await;
        Ok(())
    }

    async fn load_into_state(&self, provider: Arc<dyn SelectionProvider>, generation: u64) {
        let token = self.next_load_token();
        let card_set = provider.load_card_set(&token).await;
        if token.is_cancelled() {
            debug!(generation, "Load superseded");
            return;
        }
        self.adopt_load(provider.as_ref(), generation, card_set).await;
    }

    /// Replays the changes logged while the load ran onto its result, then
    /// adopts it. Returns whether the result was adopted.
    async fn adopt_load(
        &self,
        provider: &dyn SelectionProvider,
        generation: u64,
        mut card_set: CardSet,
    ) -> bool {
        let mut replayed = 0;
        loop {
            let Some(changes) = self.state.pending_changes(generation, replayed) else {
                debug!(generation, "Load superseded");
                return false;
            };
            for change in &changes {
                if let Some(next) = provider.handle_file_change(change, &card_set).await {
                    card_set = next;
                }
            }
            replayed += changes.len();

            match self.state.adopt_load(generation, card_set.clone(), replayed) {
                LoadAdoption::Adopted => {
                    debug!(generation, replayed, "Load adopted");
                    return true;
                }
                LoadAdoption::Stale => return false,
                LoadAdoption::Pending => {}
            }
        }
    }

    /// Provider-computed card sets carry no generation and are never adopted
    /// as they are: they trigger a tracked reload of their mode instead.
    fn follow_provider_reloads(self: &Arc<Self>, provider: &dyn SelectionProvider) {
        let mode = provider.mode();
        let manager = Arc::downgrade(self);
        provider.subscribe_to_changes(Arc::new(move |_: &CardSet| {
            let Some(manager) = manager.upgrade() else {
                return;
            };
            if manager.mode() != Some(mode) {
                return;
            }
            tokio::spawn(async move {
                if manager.mode() != Some(mode) {
                    return;
                }
                if let Err(e) = manager.refresh().await {
                    error!(%mode, error = %e, "Reload after provider change failed");
                }
            });
        }));
    }

    /// Cancels the running load and hands out the token for the next one.
    fn next_load_token(&self) -> CancellationToken {
        let next = self.shutdown.child_token();
        let previous = std::mem::replace(
            &mut *self.load_token.lock().unwrap_or_else(PoisonError::into_inner),
            next.clone(),
        );
        previous.cancel();
        next
    }

    async fn provider_for(&self, mode: CardSetMode) -> Result<Arc<dyn SelectionProvider>> {
        self.registry.get_provider(mode).await.ok_or_else(|| {
            let err = CardError::UnsupportedMode(mode.to_string());
            error!(%mode, "No provider registered for mode");
            err
        })
    }

    // ========================================================================
    // File Changes
    // ========================================================================

    /// Reconciles one change against the current card set.
    ///
    /// Only the active provider sees the change. Returns whether a new card
    /// set was adopted.
    #[instrument(skip(self, change), fields(kind = change.kind()))]
    pub async fn handle_file_change(&self, change: FileChange) -> bool {
        let paths = change.paths();
        let _guard = self.path_locks.lock(&paths).await;
        self.state.note_change(&change);

        for attempt in 1..=MAX_RECONCILE_ATTEMPTS {
            let Some(mode) = self.state.mode() else {
                return false;
            };
            let Some(provider) = self.registry.get_provider(mode).await else {
                return false;
            };

            let (revision, current) = self.state.snapshot();
            if current.mode() != mode {
                debug!(%mode, "Load pending, change will be replayed onto its result");
                return false;
            }

            let Some(next) = provider.handle_file_change(&change, &current).await else {
                return false;
            };

            if self.state.compare_and_set(revision, next) {
                debug!(
                    file = %strip_path(paths.last().copied().unwrap_or_default()),
                    attempt,
                    "Card set reconciled"
                );
                return true;
            }
            debug!(attempt, "Card set changed during reconciliation, retrying");
        }

        warn!(
            attempts = MAX_RECONCILE_ATTEMPTS,
            "Dropping file change after repeated conflicts"
        );
        false
    }

    pub async fn add_file(&self, file: FileRecord) -> bool {
        self.handle_file_change(FileChange::Create(file)).await
    }

    pub async fn remove_file(&self, path: &str) -> bool {
        self.handle_file_change(FileChange::Delete {
            path: path.to_string(),
        })
        .await
    }

    /// Starts forwarding file store events to
    /// [`handle_file_change`](Self::handle_file_change). Idempotent.
    ///
    /// Events are ignored while `auto_refresh` is off. A lagging event stream
    /// triggers a full refresh, since changes were lost.
    pub fn start_watching(self: &Arc<Self>) {
        if self.watching.swap(true, Ordering::SeqCst) {
            return;
        }
        let events = self.ctx.file_store.subscribe();
        let token = self.shutdown.child_token();
        tokio::spawn(Self::pump_events(Arc::downgrade(self), events, token));
        debug!("File store watcher started");
    }

    async fn pump_events(
        manager: Weak<Self>,
        mut events: Receiver<FileStoreEvent>,
        token: CancellationToken,
    ) {
        loop {
            let event = tokio::select! {
                _ = token.cancelled() => break,
                event = events.recv() => event,
            };
            if matches!(event, Err(RecvError::Closed)) {
                break;
            }
            let Some(manager) = manager.upgrade() else {
                break;
            };
            if !manager.state.options().auto_refresh {
                continue;
            }

            match event {
                Ok(event) => {
                    if let Some(change) = FileChange::from_store_event(event) {
                        manager.handle_file_change(change).await;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "File store watcher lagged, refreshing");
                    if let Err(e) = manager.refresh().await {
                        error!(error = %e, "Refresh after lag failed");
                    }
                }
                Err(RecvError::Closed) => break,
            }
        }
        debug!("File store watcher stopped");
    }

    // ========================================================================
    // Subscriptions & Accessors
    // ========================================================================

    pub fn subscribe_to_changes(&self, callback: CardSetCallback) -> SubscriptionId {
        self.state.subscribe_to_changes(callback)
    }

    pub fn unsubscribe_from_changes(&self, id: SubscriptionId) -> bool {
        self.state.unsubscribe_from_changes(id)
    }

    pub fn get_current_card_set(&self) -> CardSet {
        self.state.current_card_set()
    }

    pub fn mode(&self) -> Option<CardSetMode> {
        self.state.mode()
    }

    pub fn options(&self) -> SelectionOptions {
        self.state.options()
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Engine event bus (mode changes, adopted card sets, failures).
    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn subscribe_events(&self) -> Receiver<CoreEvent> {
        self.event_bus.subscribe()
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    async fn restore_options(&self) -> Option<SelectionOptions> {
        if !self.features.persist_options {
            return None;
        }
        let store = self.settings_store.as_ref()?;

        let raw = match store.get_string(OPTIONS_SETTINGS_KEY).await {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(error = %e, "Failed to read persisted selection options");
                return None;
            }
        };

        match serde_json::from_str::<SelectionOptions>(&raw) {
            Ok(options) => {
                debug!(mode = %options.mode, "Restored selection options");
                Some(options)
            }
            Err(e) => {
                let err = CardError::Settings(e.to_string());
                warn!(error = %err, "Ignoring malformed persisted selection options");
                None
            }
        }
    }

    async fn persist_options(&self, options: &SelectionOptions) {
        if !self.features.persist_options {
            return;
        }
        let Some(store) = &self.settings_store else {
            return;
        };

        let outcome = match serde_json::to_string(options) {
            Ok(json) => store
                .set_string(OPTIONS_SETTINGS_KEY, &json)
                .await
                .map_err(|e| CardError::Settings(e.to_string())),
            Err(e) => Err(CardError::Settings(e.to_string())),
        };
        if let Err(e) = outcome {
            warn!(error = %e, "Failed to persist selection options");
        }
    }

    // ========================================================================
    // Teardown
    // ========================================================================

    /// Stops the watcher and running loads, destroys every provider and
    /// drops all subscribers. Idempotent.
    #[instrument(skip(self))]
    pub async fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.shutdown.cancel();
        self.registry.cleanup_all_providers().await;
        self.state.clear_subscribers();

        info!("Card set engine stopped");
        let _ = self.event_bus.emit(CoreEvent::Engine(EngineEvent::Stopped));
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }
}

impl Drop for CardSetManager {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
