//! kstat-core — reader engine for illumos kernel statistics.
//!
//! Provides:
//! - `filter` — module/class/name/instance predicate and argument parsing
//! - `source` — the `KstatSource` trait, the libkstat adapter and a mock
//! - `chain` — generation-aware tracking of the filtered chain
//! - `decode` — payload decoders for named, io, intr, timer and raw kstats
//! - `reader` — `KstatReader`, the open/read/close entry point
//! - `record`, `value` — decoded results and their value tree
//!
//! With `mock` feature (default):
//! - `source::mock` — in-memory registry and pre-built scenarios
//!
//! # Example
//!
//! ```
//! use kstat_core::{Filter, KstatReader};
//! use kstat_core::source::mock::MockKstat;
//!
//! let mut reader = KstatReader::with_source(
//!     MockKstat::typical_system(),
//!     Filter::any().module("cpu").name("sys"),
//! );
//! let records = reader.read(&Filter::any().instance(0)).unwrap();
//! assert_eq!(records.len(), 1);
//! assert!(records[0].field("cpu_nsec_idle").is_some());
//! ```

pub mod chain;
pub mod decode;
pub mod error;
pub mod filter;
pub mod reader;
pub mod record;
pub mod source;
pub mod value;

pub use chain::{ChainTracker, Refresh, TrackerState};
pub use error::KstatError;
pub use filter::Filter;
pub use reader::KstatReader;
pub use record::{Payload, Record};
pub use source::{Descriptor, KstatSource, Snapshot, StatHandle, StatKind};
pub use value::{Value, ValueMap};
