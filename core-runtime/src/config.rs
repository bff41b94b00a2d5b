//! # Core Configuration Module
//!
//! Bridge injection and engine-wide settings.
//!
//! ## Overview
//!
//! The builder collects the host bridges the engine needs and validates them
//! before anything is constructed, so a missing capability fails at startup
//! with an actionable message rather than as a silent empty card view.
//!
//! ## Required Dependencies
//!
//! - `FileStore` - the note vault the card sets are selected from
//!
//! ## Optional Dependencies
//!
//! - `SettingsStore` - persists selection options across restarts
//! - `Clock` - time source for card set timestamps (default: system clock)
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .file_store(Arc::new(VaultAdapter::new(app)))
//!     .settings_store(Arc::new(PluginSettings::new(app)))
//!     .persist_options(true)
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_BUFFER_SIZE;
use bridge_traits::{Clock, FileStore, SettingsStore, SystemClock};
use std::sync::Arc;

/// Upper bound for the event bus buffer.
const MAX_EVENT_BUFFER_SIZE: usize = 65_536;

/// Engine configuration holding injected bridges.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Note vault access (required)
    pub file_store: Arc<dyn FileStore>,

    /// Preferences storage for selection options (optional)
    pub settings_store: Option<Arc<dyn SettingsStore>>,

    /// Time source for card set timestamps
    pub clock: Arc<dyn Clock>,

    /// Per-subscriber buffer of the engine event bus
    pub event_buffer_size: usize,

    pub features: FeatureFlags,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("file_store", &"FileStore { ... }")
            .field(
                "settings_store",
                &self.settings_store.as_ref().map(|_| "SettingsStore { ... }"),
            )
            .field("event_buffer_size", &self.event_buffer_size)
            .field("features", &self.features)
            .finish()
    }
}

/// Feature flags control optional functionality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureFlags {
    /// Follow the file store change stream automatically after `initialize`
    pub watch_file_store: bool,

    /// Write selection options to the `SettingsStore` whenever they change
    /// (requires a SettingsStore)
    pub persist_options: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            watch_file_store: true,
            persist_options: false,
        }
    }
}

impl CoreConfig {
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration.
    ///
    /// This checks:
    /// - Event buffer size is within (0, 65536]
    /// - Feature flags are consistent with the injected bridges
    pub fn validate(&self) -> Result<()> {
        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        if self.event_buffer_size > MAX_EVENT_BUFFER_SIZE {
            return Err(Error::Config(format!(
                "Event buffer size exceeds maximum of {}",
                MAX_EVENT_BUFFER_SIZE
            )));
        }

        if self.features.persist_options && self.settings_store.is_none() {
            return Err(Error::Config(
                "Option persistence enabled but no SettingsStore provided. \
                 Disable the feature or inject a SettingsStore implementation."
                    .to_string(),
            ));
        }

        Ok(())
    }
}

fn file_store_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "FileStore".to_string(),
        message: "FileStore implementation is required to select cards. \
                  Inject the host vault adapter with CoreConfig::builder().file_store(..)."
            .to_string(),
    }
}

/// Builder for [`CoreConfig`].
#[derive(Default)]
pub struct CoreConfigBuilder {
    file_store: Option<Arc<dyn FileStore>>,
    settings_store: Option<Arc<dyn SettingsStore>>,
    clock: Option<Arc<dyn Clock>>,
    event_buffer_size: Option<usize>,
    features: FeatureFlags,
}

impl CoreConfigBuilder {
    pub fn file_store(mut self, store: Arc<dyn FileStore>) -> Self {
        self.file_store = Some(store);
        self
    }

    pub fn settings_store(mut self, store: Arc<dyn SettingsStore>) -> Self {
        self.settings_store = Some(store);
        self
    }

    /// Sets the time source. Default: [`SystemClock`].
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Sets the event bus buffer size. Default: 100.
    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    pub fn watch_file_store(mut self, enable: bool) -> Self {
        self.features.watch_file_store = enable;
        self
    }

    pub fn persist_options(mut self, enable: bool) -> Self {
        self.features.persist_options = enable;
        self
    }

    /// Builds and validates the configuration.
    ///
    /// # Errors
    ///
    /// - [`Error::CapabilityMissing`] when no `FileStore` was injected
    /// - [`Error::Config`] when validation fails
    pub fn build(self) -> Result<CoreConfig> {
        let file_store = self.file_store.ok_or_else(file_store_missing_error)?;

        let config = CoreConfig {
            file_store,
            settings_store: self.settings_store,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
            features: self.features,
        };

        config.validate()?;
        Ok(config)
    }
}
