//! Abstractions over the kernel statistics registry.
//!
//! The `KstatSource` trait lets the chain tracker and the decoder work
//! against libkstat on illumos or against an in-memory registry in tests.

use std::fmt;
use std::io;

/// Chain-generation id reported by the registry (`kid_t`).
pub type ChainId = i32;

/// Type of a statistic's payload (`ks_type`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatKind {
    /// Opaque fixed-layout blob, identified by the statistic's name.
    Raw,
    /// Self-describing list of typed name/value pairs.
    Named,
    /// Interrupt counters.
    Interrupt,
    /// I/O queue and throughput accumulators.
    Io,
    /// Event timer.
    Timer,
}

impl StatKind {
    /// Maps a `KSTAT_TYPE_*` value. Unknown types are treated as raw blobs.
    pub fn from_type_id(id: u8) -> Self {
        match id {
            1 => StatKind::Named,
            2 => StatKind::Interrupt,
            3 => StatKind::Io,
            4 => StatKind::Timer,
            _ => StatKind::Raw,
        }
    }

    /// The `KSTAT_TYPE_*` value for this kind.
    pub fn type_id(self) -> u8 {
        match self {
            StatKind::Raw => 0,
            StatKind::Named => 1,
            StatKind::Interrupt => 2,
            StatKind::Io => 3,
            StatKind::Timer => 4,
        }
    }
}

impl fmt::Display for StatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StatKind::Raw => "raw",
            StatKind::Named => "named",
            StatKind::Interrupt => "intr",
            StatKind::Io => "io",
            StatKind::Timer => "timer",
        };
        f.write_str(s)
    }
}

/// Non-owning reference to one statistic in the registry.
///
/// Only valid for the chain generation it was issued under. Sources must
/// refuse handles from another generation instead of dereferencing them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatHandle {
    chain_id: ChainId,
    slot: usize,
}

impl StatHandle {
    /// Creates a handle. Only sources should call this.
    pub fn new(chain_id: ChainId, slot: usize) -> Self {
        Self { chain_id, slot }
    }

    /// Generation this handle was issued under.
    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    /// Source-specific slot (chain index or address).
    pub fn slot(&self) -> usize {
        self.slot
    }
}

/// Identity and metadata of one statistic on the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    pub module: String,
    pub class: String,
    pub name: String,
    pub instance: i32,
    pub kind: StatKind,
    /// Size of the data section at chain-walk time. May change on snapshot.
    pub data_size: usize,
    pub handle: StatHandle,
}

/// Data captured by one successful snapshot of a statistic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    /// Nanoseconds since boot at which the data was captured.
    pub snaptime: u64,
    /// Nanoseconds since boot at which the statistic was created.
    pub crtime: u64,
    /// Number of records in `data` (`ks_ndata`).
    pub ndata: u32,
    /// Copy of the data section in native byte order.
    ///
    /// For named statistics, string values carry an offset into this buffer
    /// in place of the kernel pointer.
    pub data: Vec<u8>,
}

/// Connection to a statistics registry.
///
/// Dropping the source releases the connection.
pub trait KstatSource {
    /// Synchronizes with the registry and returns the current chain id.
    fn chain_id(&mut self) -> io::Result<ChainId>;

    /// Returns every statistic on the chain, head to tail.
    fn chain(&self) -> io::Result<Vec<Descriptor>>;

    /// Reads the current data of one statistic.
    fn snapshot(&mut self, handle: StatHandle) -> io::Result<Snapshot>;
}

impl<S: KstatSource + ?Sized> KstatSource for Box<S> {
    fn chain_id(&mut self) -> io::Result<ChainId> {
        (**self).chain_id()
    }

    fn chain(&self) -> io::Result<Vec<Descriptor>> {
        (**self).chain()
    }

    fn snapshot(&mut self, handle: StatHandle) -> io::Result<Snapshot> {
        (**self).snapshot(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stat_kind_type_ids() {
        for kind in [
            StatKind::Raw,
            StatKind::Named,
            StatKind::Interrupt,
            StatKind::Io,
            StatKind::Timer,
        ] {
            assert_eq!(StatKind::from_type_id(kind.type_id()), kind);
        }
        assert_eq!(StatKind::from_type_id(42), StatKind::Raw);
    }

    #[test]
    fn test_handle_accessors() {
        let handle = StatHandle::new(7, 3);
        assert_eq!(handle.chain_id(), 7);
        assert_eq!(handle.slot(), 3);
    }
}
