//! Ordered subscriber list with panic isolation.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::warn;

use crate::card_set::CardSet;
use crate::error::CardError;
use crate::models::SubscriptionId;

/// Callback receiving every adopted card set.
pub type CardSetCallback = Arc<dyn Fn(&CardSet) + Send + Sync>;

#[derive(Default)]
pub struct SubscriberList {
    next_id: AtomicU64,
    entries: Mutex<Vec<(SubscriptionId, CardSetCallback)>>,
}

impl SubscriberList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, callback: CardSetCallback) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, callback));
        id
    }

    /// Returns `false` when the id was unknown.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|(existing, _)| *existing != id);
        entries.len() != before
    }

    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Calls every subscriber in registration order.
    ///
    /// Callbacks run outside the lock, so a callback may subscribe or
    /// unsubscribe. A panicking callback is skipped and reported in the
    /// returned list; the others still run.
    pub fn notify(&self, card_set: &CardSet) -> Vec<CardError> {
        let snapshot: Vec<(SubscriptionId, CardSetCallback)> = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut failures = Vec::new();
        for (id, callback) in snapshot {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| callback(card_set))) {
                let message = panic_message(payload.as_ref());
                warn!(subscription = %id, %message, "Card set subscriber panicked");
                failures.push(CardError::ListenerFailure {
                    subscription_id: id.value(),
                    message,
                });
            }
        }
        failures
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "subscriber panicked".to_string()
    }
}
