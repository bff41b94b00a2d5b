//! # Host Bridge Traits
//!
//! Contracts between the card set engine and the host application.
//!
//! ## Overview
//!
//! The engine never touches storage directly. Everything it knows about the
//! note vault (listing files, reading bodies and parsed metadata, following
//! change notifications) comes through the traits defined here, and each host
//! ships its own adapter.
//!
//! ## Traits
//!
//! ### File store
//! - [`FileStore`](store::FileStore) - Listing, content/metadata reads, typed change stream
//!
//! ### Settings
//! - [`SettingsStore`](storage::SettingsStore) - Key-value preferences storage
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Adapters should
//! convert platform-specific failures into it and include the offending path
//! in the message where there is one.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so adapters can be shared across
//! async tasks behind an `Arc`.
//!
//! ## Example
//!
//! ```ignore
//! use bridge_traits::store::{FileStore, FileRecord, FileStoreEvent, NoteMetadata};
//! use bridge_traits::error::Result;
//! use async_trait::async_trait;
//!
//! pub struct VaultAdapter { /* host handles */ }
//!
//! #[async_trait]
//! impl FileStore for VaultAdapter {
//!     async fn list_files(&self, eligible_only: bool) -> Result<Vec<FileRecord>> {
//!         todo!()
//!     }
//!     // ...
//! }
//! ```

pub mod error;
pub mod storage;
pub mod store;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use storage::SettingsStore;
pub use store::{FileRecord, FileStore, FileStoreEvent, NoteMetadata};
pub use time::{Clock, ConsoleLogger, LogEntry, LogLevel, LoggerSink, SystemClock};
