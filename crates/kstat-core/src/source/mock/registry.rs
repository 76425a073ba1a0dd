//! In-memory kstat registry for testing without illumos.
//!
//! `MockKstat` keeps a list of statistics with their encoded data sections
//! and a chain-generation id that changes whenever a statistic is added or
//! removed, the same way `kstat_chain_update(3KSTAT)` reports membership
//! changes.

use std::cell::Cell;
use std::io;

use crate::decode::{NamedBuilder, layout_for_stat, raw};
use crate::source::traits::{ChainId, Descriptor, KstatSource, Snapshot, StatHandle, StatKind};
use crate::value::Value;

/// `ENXIO`; returned for handles from an older generation.
const ENXIO: i32 = 6;

/// Creation time given to statistics added without an explicit one.
const DEFAULT_CRTIME: u64 = 1_000_000;

/// Snapshot clock step in nanoseconds.
const DEFAULT_TICK: u64 = 1_000_000_000;

#[derive(Debug, Clone)]
struct MockStat {
    module: String,
    class: String,
    name: String,
    instance: i32,
    kind: StatKind,
    crtime: u64,
    ndata: u32,
    data: Vec<u8>,
    /// errno returned instead of data.
    fail: Option<i32>,
}

/// I/O accumulators for [`MockKstat::add_io`], in `kstat_io_t` order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MockIo {
    pub nread: u64,
    pub nwritten: u64,
    pub reads: u32,
    pub writes: u32,
    pub wtime: i64,
    pub wlentime: i64,
    pub wlastupdate: i64,
    pub rtime: i64,
    pub rlentime: i64,
    pub rlastupdate: i64,
    pub wcnt: u32,
    pub rcnt: u32,
}

impl MockIo {
    fn to_bytes(self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(80);
        buf.extend_from_slice(&self.nread.to_ne_bytes());
        buf.extend_from_slice(&self.nwritten.to_ne_bytes());
        buf.extend_from_slice(&self.reads.to_ne_bytes());
        buf.extend_from_slice(&self.writes.to_ne_bytes());
        for t in [
            self.wtime,
            self.wlentime,
            self.wlastupdate,
            self.rtime,
            self.rlentime,
            self.rlastupdate,
        ] {
            buf.extend_from_slice(&t.to_ne_bytes());
        }
        buf.extend_from_slice(&self.wcnt.to_ne_bytes());
        buf.extend_from_slice(&self.rcnt.to_ne_bytes());
        buf
    }
}

/// Event timer for [`MockKstat::add_timer`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MockTimer {
    pub name: String,
    pub num_events: u64,
    pub elapsed_time: u64,
    pub min_time: u64,
    pub max_time: u64,
    pub start_time: u64,
    pub stop_time: u64,
}

impl MockTimer {
    fn to_bytes(&self) -> Vec<u8> {
        let mut buf = vec![0u8; 32];
        let n = self.name.len().min(30);
        buf[..n].copy_from_slice(&self.name.as_bytes()[..n]);
        for v in [
            self.num_events,
            self.elapsed_time,
            self.min_time,
            self.max_time,
            self.start_time,
            self.stop_time,
        ] {
            buf.extend_from_slice(&v.to_ne_bytes());
        }
        buf
    }
}

/// In-memory statistics registry.
#[derive(Debug)]
pub struct MockKstat {
    stats: Vec<MockStat>,
    generation: ChainId,
    /// errno for the next `chain_id()` call.
    chain_failure: Option<i32>,
    now: u64,
    tick: u64,
    chain_walks: Cell<usize>,
    snapshots: usize,
}

impl Default for MockKstat {
    fn default() -> Self {
        Self {
            stats: Vec::new(),
            generation: 1,
            chain_failure: None,
            now: DEFAULT_CRTIME,
            tick: DEFAULT_TICK,
            chain_walks: Cell::new(0),
            snapshots: 0,
        }
    }
}

impl MockKstat {
    /// Creates an empty registry at generation 1.
    pub fn new() -> Self {
        Self::default()
    }

    fn push(
        &mut self,
        module: &str,
        class: &str,
        name: &str,
        instance: i32,
        kind: StatKind,
        ndata: u32,
        data: Vec<u8>,
    ) -> &mut Self {
        self.stats.push(MockStat {
            module: module.to_string(),
            class: class.to_string(),
            name: name.to_string(),
            instance,
            kind,
            crtime: DEFAULT_CRTIME,
            ndata,
            data,
            fail: None,
        });
        self.generation += 1;
        self
    }

    fn find_mut(&mut self, module: &str, instance: i32, name: &str) -> Option<&mut MockStat> {
        self.stats
            .iter_mut()
            .find(|s| s.module == module && s.instance == instance && s.name == name)
    }

    /// Adds a named statistic.
    pub fn add_named(
        &mut self,
        module: &str,
        class: &str,
        name: &str,
        instance: i32,
        fields: NamedBuilder,
    ) -> &mut Self {
        let ndata = fields.ndata();
        let data = fields.build();
        self.push(module, class, name, instance, StatKind::Named, ndata, data)
    }

    /// Adds an I/O statistic.
    pub fn add_io(
        &mut self,
        module: &str,
        class: &str,
        name: &str,
        instance: i32,
        io: MockIo,
    ) -> &mut Self {
        self.push(module, class, name, instance, StatKind::Io, 1, io.to_bytes())
    }

    /// Adds an interrupt statistic (hard, soft, watchdog, spurious, multsvc).
    pub fn add_intr(
        &mut self,
        module: &str,
        class: &str,
        name: &str,
        instance: i32,
        counts: [u32; 5],
    ) -> &mut Self {
        let data = counts.iter().flat_map(|c| c.to_ne_bytes()).collect();
        self.push(module, class, name, instance, StatKind::Interrupt, 1, data)
    }

    /// Adds a timer statistic.
    pub fn add_timer(
        &mut self,
        module: &str,
        class: &str,
        name: &str,
        instance: i32,
        timer: MockTimer,
    ) -> &mut Self {
        self.push(module, class, name, instance, StatKind::Timer, 1, timer.to_bytes())
    }

    /// Adds a raw statistic with an arbitrary data section.
    pub fn add_raw(
        &mut self,
        module: &str,
        class: &str,
        name: &str,
        instance: i32,
        data: Vec<u8>,
    ) -> &mut Self {
        self.push(module, class, name, instance, StatKind::Raw, 1, data)
    }

    /// Adds a raw statistic encoded with the known layout for `name`.
    ///
    /// Fields not listed are zero. Names without a layout get an empty
    /// data section.
    pub fn add_raw_struct(
        &mut self,
        module: &str,
        class: &str,
        name: &str,
        instance: i32,
        values: &[(&str, Value)],
    ) -> &mut Self {
        let data = layout_for_stat(module, name)
            .map(|layout| raw::encode(layout, values))
            .unwrap_or_default();
        self.add_raw(module, class, name, instance, data)
    }

    /// Replaces the fields of a named statistic without changing the chain.
    pub fn set_named(
        &mut self,
        module: &str,
        instance: i32,
        name: &str,
        fields: NamedBuilder,
    ) -> bool {
        match self.find_mut(module, instance, name) {
            Some(stat) => {
                stat.ndata = fields.ndata();
                stat.data = fields.build();
                true
            }
            None => false,
        }
    }

    /// Overrides the creation time of a statistic.
    pub fn set_crtime(&mut self, module: &str, instance: i32, name: &str, crtime: u64) -> bool {
        match self.find_mut(module, instance, name) {
            Some(stat) => {
                stat.crtime = crtime;
                true
            }
            None => false,
        }
    }

    /// Removes a statistic from the chain.
    pub fn remove(&mut self, module: &str, instance: i32, name: &str) -> bool {
        let before = self.stats.len();
        self.stats
            .retain(|s| !(s.module == module && s.instance == instance && s.name == name));
        let removed = self.stats.len() != before;
        if removed {
            self.generation += 1;
        }
        removed
    }

    /// Makes every snapshot of a statistic fail with `errno`.
    pub fn fail_snapshot(&mut self, module: &str, instance: i32, name: &str, errno: i32) -> bool {
        match self.find_mut(module, instance, name) {
            Some(stat) => {
                stat.fail = Some(errno);
                true
            }
            None => false,
        }
    }

    /// Makes the next `chain_id()` call fail with `errno`.
    pub fn fail_next_chain_update(&mut self, errno: i32) {
        self.chain_failure = Some(errno);
    }

    /// Moves the snapshot clock forward.
    pub fn advance(&mut self, nanos: u64) {
        self.now += nanos;
    }

    /// Current chain-generation id.
    pub fn generation(&self) -> ChainId {
        self.generation
    }

    /// Number of full chain walks performed so far.
    pub fn chain_walks(&self) -> usize {
        self.chain_walks.get()
    }

    /// Number of snapshot calls so far, failed ones included.
    pub fn snapshots(&self) -> usize {
        self.snapshots
    }

    pub fn len(&self) -> usize {
        self.stats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }
}

impl KstatSource for MockKstat {
    fn chain_id(&mut self) -> io::Result<ChainId> {
        if let Some(errno) = self.chain_failure.take() {
            return Err(io::Error::from_raw_os_error(errno));
        }
        Ok(self.generation)
    }

    fn chain(&self) -> io::Result<Vec<Descriptor>> {
        self.chain_walks.set(self.chain_walks.get() + 1);
        Ok(self
            .stats
            .iter()
            .enumerate()
            .map(|(slot, s)| Descriptor {
                module: s.module.clone(),
                class: s.class.clone(),
                name: s.name.clone(),
                instance: s.instance,
                kind: s.kind,
                data_size: s.data.len(),
                handle: StatHandle::new(self.generation, slot),
            })
            .collect())
    }

    fn snapshot(&mut self, handle: StatHandle) -> io::Result<Snapshot> {
        self.snapshots += 1;
        if handle.chain_id() != self.generation {
            return Err(io::Error::from_raw_os_error(ENXIO));
        }
        let stat = self
            .stats
            .get(handle.slot())
            .ok_or_else(|| io::Error::from_raw_os_error(ENXIO))?;
        if let Some(errno) = stat.fail {
            return Err(io::Error::from_raw_os_error(errno));
        }

        self.now += self.tick;
        Ok(Snapshot {
            snaptime: self.now,
            crtime: stat.crtime,
            ndata: stat.ndata,
            data: stat.data.clone(),
        })
    }
}
