//! # Core Runtime Module
//!
//! Foundational runtime infrastructure for the card set engine:
//! - Logging and tracing infrastructure
//! - Configuration management and bridge injection
//! - Event bus for selection lifecycle notifications
//!
//! ## Overview
//!
//! This crate holds the utilities every engine crate depends on. It fixes the
//! logging conventions, the way host bridges are handed to the engine, and
//! the broadcast channel used to observe mode switches and failures without
//! subscribing to card set contents.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{CoreConfig, CoreConfigBuilder, FeatureFlags};
pub use error::{Error, Result};
pub use events::{CoreEvent, EventBus, EventStream, SelectionEvent};
