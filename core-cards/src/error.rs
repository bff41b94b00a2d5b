use bridge_traits::BridgeError;
use core_runtime::events::{CoreEvent, EventBus, SelectionEvent};
use thiserror::Error;
use tracing::{debug, error, warn};

/// Errors produced inside the card set engine.
///
/// Provider operations never hand these to consumers; they are reported
/// through the provider's failure hook and the previous card set is kept.
/// `Clone` is required because coalesced content reads share one result
/// between every waiter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CardError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unsupported selection mode: {0}")]
    UnsupportedMode(String),

    #[error("Read failure: {0}")]
    ReadFailure(String),

    #[error("Subscriber {subscription_id} failed: {message}")]
    ListenerFailure { subscription_id: u64, message: String },

    #[error("Query scan timed out after {0} seconds")]
    ScanTimeout(u64),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl CardError {
    /// Whether a bounded retry may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CardError::ReadFailure(_))
    }
}

impl From<BridgeError> for CardError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::NotFound(path) => CardError::NotFound(path),
            other => CardError::ReadFailure(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, CardError>;

/// Central failure reporter for provider operations.
///
/// Cancellation is expected during mode switches and only logged at debug
/// level. Everything else is logged and, when a bus is attached, published as
/// [`SelectionEvent::ProviderFailed`].
pub fn report(bus: Option<&EventBus>, mode: &str, operation: &str, err: &CardError) {
    match err {
        CardError::Cancelled => {
            debug!(mode, operation, "Provider operation cancelled");
            return;
        }
        CardError::NotFound(_) => warn!(mode, operation, error = %err, "Provider operation failed"),
        _ => error!(mode, operation, error = %err, "Provider operation failed"),
    }

    if let Some(bus) = bus {
        let _ = bus.emit(CoreEvent::Selection(SelectionEvent::ProviderFailed {
            mode: mode.to_string(),
            operation: operation.to_string(),
            message: err.to_string(),
        }));
    }
}
