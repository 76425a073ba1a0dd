//! Access to the kernel statistics registry.
//!
//! # Architecture
//!
//! ```text
//!          ┌──────────────┐      ┌──────────────┐
//!          │ ChainTracker │      │ RecordDecoder│
//!          └──────┬───────┘      └──────┬───────┘
//!                 │ chain_id / chain    │ snapshot
//!                 └──────────┬──────────┘
//!                     ┌──────▼──────┐
//!                     │ KstatSource │ (trait)
//!                     └──────┬──────┘
//!                 ┌──────────┴──────────┐
//!          ┌──────▼───────┐      ┌──────▼──────┐
//!          │ IllumosKstat │      │  MockKstat  │
//!          │ (libkstat)   │      │  (Testing)  │
//!          └──────────────┘      └─────────────┘
//! ```
//!
//! `IllumosKstat` is only built on illumos and Solaris. `MockKstat` is
//! behind the `mock` feature, enabled by default.

#[cfg(any(target_os = "illumos", target_os = "solaris"))]
mod ffi;
#[cfg(any(target_os = "illumos", target_os = "solaris"))]
mod illumos;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
mod traits;

#[cfg(any(target_os = "illumos", target_os = "solaris"))]
pub use illumos::IllumosKstat;
pub use traits::{ChainId, Descriptor, KstatSource, Snapshot, StatHandle, StatKind};
