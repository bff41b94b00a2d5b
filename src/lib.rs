//! Workspace facade crate.
//!
//! Host applications can depend on `cardset-workspace` with the `engine`
//! feature instead of wiring `core-cards` and `core-runtime` individually.

#[cfg(feature = "engine")]
pub use core_cards as cards;

#[cfg(feature = "engine")]
pub use core_runtime as runtime;
