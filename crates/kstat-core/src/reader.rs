//! `KstatReader`: open, read and close a filtered view of the kstat chain.

use std::io;

use serde_json::Value as JsonValue;
use tracing::debug;

use crate::chain::ChainTracker;
use crate::decode;
use crate::error::KstatError;
use crate::filter::Filter;
use crate::record::Record;
use crate::source::KstatSource;

/// Reads point-in-time snapshots of the statistics matching a filter.
///
/// The reader filter is fixed at construction; each read may narrow it
/// further. A statistic that fails to snapshot is returned with an inline
/// error instead of failing the read.
#[derive(Debug)]
pub struct KstatReader<S> {
    tracker: ChainTracker<S>,
}

#[cfg(any(target_os = "illumos", target_os = "solaris"))]
impl KstatReader<crate::source::IllumosKstat> {
    /// Opens the running kernel's kstat chain.
    pub fn open(filter: Filter) -> Result<Self, KstatError> {
        Self::open_with(filter, crate::source::IllumosKstat::open)
    }
}

impl<S: KstatSource> KstatReader<S> {
    /// Creates a reader over the source returned by `opener`.
    ///
    /// An opener failure is reported as `ConnectionFailed`.
    pub fn open_with<F>(filter: Filter, opener: F) -> Result<Self, KstatError>
    where
        F: FnOnce() -> io::Result<S>,
    {
        let source = opener().map_err(KstatError::ConnectionFailed)?;
        Ok(Self::with_source(source, filter))
    }

    /// Creates a reader over any source.
    pub fn with_source(source: S, filter: Filter) -> Self {
        debug!(filter = %filter, "Created kstat reader");
        Self {
            tracker: ChainTracker::new(source, filter),
        }
    }

    /// Creates a reader from loosely typed constructor arguments.
    pub fn with_source_args(source: S, args: &[JsonValue]) -> Result<Self, KstatError> {
        let filter = Filter::from_args(args)?;
        Ok(Self::with_source(source, filter))
    }

    /// Reads every tracked statistic that also matches `filter`.
    ///
    /// Records come back in chain order.
    pub fn read(&mut self, filter: &Filter) -> Result<Vec<Record>, KstatError> {
        if self.tracker.is_closed() {
            return Err(KstatError::AlreadyClosed);
        }
        self.tracker.refresh()?;

        let effective = self.tracker.filter().combined(filter);
        let (source, tracked) = self.tracker.parts_mut()?;

        let mut records = Vec::new();
        for desc in tracked.iter().filter(|d| effective.matches(d)) {
            let record = decode::decode(source, desc)?;
            if let Some(error) = record.error() {
                debug!(
                    module = %desc.module,
                    instance = desc.instance,
                    name = %desc.name,
                    error,
                    "Failed to read kstat"
                );
            }
            records.push(record);
        }
        Ok(records)
    }

    /// Reads every tracked statistic.
    pub fn read_all(&mut self) -> Result<Vec<Record>, KstatError> {
        self.read(&Filter::any())
    }

    /// Reads with a filter built from loosely typed call arguments.
    ///
    /// A malformed specifier fails before the chain is touched.
    pub fn read_with_args(&mut self, args: &[JsonValue]) -> Result<Vec<Record>, KstatError> {
        let filter = Filter::from_args(args)?;
        self.read(&filter)
    }

    /// Releases the connection. Every later call fails with `AlreadyClosed`.
    pub fn close(&mut self) -> Result<(), KstatError> {
        self.tracker.close()
    }

    pub fn is_closed(&self) -> bool {
        self.tracker.is_closed()
    }

    /// Number of statistics currently tracked by the reader filter.
    pub fn tracked_len(&self) -> usize {
        self.tracker.tracked().len()
    }

    pub fn filter(&self) -> &Filter {
        self.tracker.filter()
    }

    pub fn source(&self) -> Option<&S> {
        self.tracker.source()
    }
}
