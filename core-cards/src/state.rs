//! # State Manager
//!
//! Owner of the current card set and of the selection state around it.
//!
//! ## Overview
//!
//! The state manager never touches the file store. It holds the active mode,
//! the selection and sort options, the current card set and the ordered
//! subscriber list, and it decides whether a computed card set may still be
//! adopted:
//!
//! - **Loads** carry the generation returned by [`StateManager::begin_load`].
//!   Starting a new load invalidates every older generation, so a slow scan
//!   for a previous mode or query can never overwrite a newer result.
//! - While a load is in flight every file change is also written to a
//!   pending log. [`StateManager::adopt_load`] only accepts the load result
//!   once the caller has replayed the whole log onto it, so a change that
//!   landed after the scan took its listing is never lost.
//! - **Reconciliations** carry the revision of the card set they were computed
//!   from. [`StateManager::compare_and_set`] only adopts when no other update
//!   landed in between; the caller re-runs the reconciliation otherwise.
//!
//! Every adopted card set is sorted with the current sort option and handed
//! to subscribers synchronously, in registration order.

use core_runtime::events::{CoreEvent, EventBus, SelectionEvent};
use std::sync::{PoisonError, RwLock, RwLockWriteGuard};
use tracing::debug;

use crate::card_set::CardSet;
use crate::error::CardError;
use crate::models::{CardSetMode, FileChange, SelectionOptions, SortOption, SubscriptionId};
use crate::subscribers::{CardSetCallback, SubscriberList};

struct StateInner {
    mode: Option<CardSetMode>,
    options: SelectionOptions,
    sort_option: SortOption,
    current: CardSet,
    /// Bumped on every adopted card set
    revision: u64,
    /// Bumped on every load start
    generation: u64,
    /// Generation of the load not adopted yet
    in_flight: Option<u64>,
    /// Changes seen since `in_flight` started
    pending: Vec<FileChange>,
}

/// Outcome of [`StateManager::adopt_load`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadAdoption {
    Adopted,
    /// A newer load started or the mode changed
    Stale,
    /// Changes arrived that the result does not reflect yet
    Pending,
}

pub struct StateManager {
    inner: RwLock<StateInner>,
    subscribers: SubscriberList,
    event_bus: Option<EventBus>,
}

impl StateManager {
    pub fn new(options: SelectionOptions, event_bus: Option<EventBus>) -> Self {
        let current = CardSet::empty(options.mode, None, 0);
        Self {
            inner: RwLock::new(StateInner {
                mode: None,
                sort_option: options.sort_option,
                options,
                current,
                revision: 0,
                generation: 0,
                in_flight: None,
                pending: Vec::new(),
            }),
            subscribers: SubscriberList::new(),
            event_bus,
        }
    }

    fn read<R>(&self, f: impl FnOnce(&StateInner) -> R) -> R {
        f(&self.inner.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn write(&self) -> RwLockWriteGuard<'_, StateInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn mode(&self) -> Option<CardSetMode> {
        self.read(|state| state.mode)
    }

    pub fn options(&self) -> SelectionOptions {
        self.read(|state| state.options.clone())
    }

    pub fn sort_option(&self) -> SortOption {
        self.read(|state| state.sort_option)
    }

    pub fn current_card_set(&self) -> CardSet {
        self.read(|state| state.current.clone())
    }

    /// Current card set with the revision to pass to
    /// [`compare_and_set`](Self::compare_and_set).
    pub fn snapshot(&self) -> (u64, CardSet) {
        self.read(|state| (state.revision, state.current.clone()))
    }

    // ========================================================================
    // Setters
    // ========================================================================

    /// Returns the previous mode.
    pub fn set_mode(&self, mode: CardSetMode) -> Option<CardSetMode> {
        let mut state = self.write();
        state.options.mode = mode;
        state.mode.replace(mode)
    }

    pub fn set_options(&self, options: SelectionOptions) {
        let mut state = self.write();
        state.sort_option = options.sort_option;
        state.options = options;
    }

    pub fn set_sort_option(&self, sort_option: SortOption) {
        let mut state = self.write();
        state.sort_option = sort_option;
        state.options.sort_option = sort_option;
    }

    // ========================================================================
    // Adoption
    // ========================================================================

    /// Replaces the current card set unconditionally and notifies subscribers.
    pub fn set_current_card_set(&self, card_set: CardSet) {
        let adopted = {
            let mut state = self.write();
            Self::install(&mut state, card_set)
        };
        self.publish(&adopted);
    }

    /// Switches mode and options and starts a load in one step, so a load
    /// started for another mode concurrently can never be adopted.
    ///
    /// Returns the previous mode and the generation of the new load.
    pub fn switch_mode(&self, options: SelectionOptions) -> (Option<CardSetMode>, u64) {
        let mut state = self.write();
        let previous = state.mode.replace(options.mode);
        state.sort_option = options.sort_option;
        state.options = options;
        (previous, Self::start_generation(&mut state))
    }

    /// Starts a load: invalidates older generations and returns the new one.
    pub fn begin_load(&self) -> u64 {
        Self::start_generation(&mut self.write())
    }

    fn start_generation(state: &mut StateInner) -> u64 {
        state.generation += 1;
        state.in_flight = Some(state.generation);
        state.pending.clear();
        state.generation
    }

    pub fn is_current_generation(&self, generation: u64) -> bool {
        self.read(|state| state.generation == generation)
    }

    /// Records a change for the load in flight, if any.
    pub fn note_change(&self, change: &FileChange) {
        let mut state = self.write();
        if state.in_flight.is_some() {
            state.pending.push(change.clone());
        }
    }

    /// Changes logged for `generation` starting at index `from`, or `None`
    /// when `generation` is no longer the load in flight.
    pub fn pending_changes(&self, generation: u64, from: usize) -> Option<Vec<FileChange>> {
        self.read(|state| {
            if state.in_flight != Some(generation) {
                return None;
            }
            Some(state.pending.get(from..).map(<[FileChange]>::to_vec).unwrap_or_default())
        })
    }

    /// Adopts a load result that has the first `replayed` pending changes
    /// applied.
    ///
    /// A result sharing entries with the current card set ends the load
    /// without notifying subscribers.
    pub fn adopt_load(&self, generation: u64, card_set: CardSet, replayed: usize) -> LoadAdoption {
        let adopted = {
            let mut state = self.write();
            if state.in_flight != Some(generation) || state.mode != Some(card_set.mode()) {
                debug!(
                    generation,
                    current_generation = state.generation,
                    mode = %card_set.mode(),
                    "Discarding stale card set"
                );
                return LoadAdoption::Stale;
            }
            if state.pending.len() != replayed {
                return LoadAdoption::Pending;
            }

            state.in_flight = None;
            state.pending.clear();
            if card_set.shares_entries(&state.current) {
                return LoadAdoption::Adopted;
            }
            Self::install(&mut state, card_set)
        };
        self.publish(&adopted);
        LoadAdoption::Adopted
    }

    pub fn is_loading(&self) -> bool {
        self.read(|state| state.in_flight.is_some())
    }

    /// Adopts `card_set` only if the current revision is still `expected`.
    pub fn compare_and_set(&self, expected: u64, card_set: CardSet) -> bool {
        let adopted = {
            let mut state = self.write();
            if state.revision != expected || state.mode != Some(card_set.mode()) {
                return false;
            }
            Self::install(&mut state, card_set)
        };
        self.publish(&adopted);
        true
    }

    /// Re-sorts the current card set with the current sort option.
    pub fn resort(&self) {
        let adopted = {
            let mut state = self.write();
            let current = state.current.clone();
            Self::install(&mut state, current)
        };
        self.publish(&adopted);
    }

    fn install(state: &mut StateInner, card_set: CardSet) -> CardSet {
        let sorted = card_set.sorted(&state.sort_option);
        state.current = sorted.clone();
        state.revision += 1;
        sorted
    }

    fn publish(&self, card_set: &CardSet) {
        let failures = self.subscribers.notify(card_set);

        if let Some(bus) = &self.event_bus {
            for failure in failures {
                if let CardError::ListenerFailure {
                    subscription_id,
                    message,
                } = failure
                {
                    let _ = bus.emit(CoreEvent::Selection(SelectionEvent::ListenerFailed {
                        subscription_id,
                        message,
                    }));
                }
            }
            let _ = bus.emit(CoreEvent::Selection(SelectionEvent::CardSetUpdated {
                mode: card_set.mode().to_string(),
                source: card_set.source().map(str::to_string),
                entry_count: card_set.len(),
            }));
        }
    }

    // ========================================================================
    // Subscribers
    // ========================================================================

    pub fn subscribe_to_changes(&self, callback: CardSetCallback) -> SubscriptionId {
        self.subscribers.subscribe(callback)
    }

    pub fn unsubscribe_from_changes(&self, id: SubscriptionId) -> bool {
        self.subscribers.unsubscribe(id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn clear_subscribers(&self) {
        self.subscribers.clear();
    }
}
