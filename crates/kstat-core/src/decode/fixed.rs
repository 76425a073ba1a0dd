//! Fixed-layout kinds: `kstat_io_t`, `kstat_intr_t` and `kstat_timer_t`.

use std::io;

use crate::error::KstatError;
use crate::source::StatKind;
use crate::value::{Value, ValueMap};

use super::layout::LayoutReader;
use super::truncated;

pub const IO_SIZE: usize = 80;
pub const INTR_SIZE: usize = 20;
pub const TIMER_SIZE: usize = 80;

pub const INTR_KEYS: [&str; 5] = [
    "KSTAT_INTR_HARD",
    "KSTAT_INTR_SOFT",
    "KSTAT_INTR_WATCHDOG",
    "KSTAT_INTR_SPURIOUS",
    "KSTAT_INTR_MULTSVC",
];

fn check(kind: StatKind, expected: usize, data: &[u8]) -> Result<(), KstatError> {
    if data.len() < expected {
        return Err(truncated(kind, expected, data.len()));
    }
    Ok(())
}

pub(crate) fn decode_io(data: &[u8]) -> Result<Value, KstatError> {
    check(StatKind::Io, IO_SIZE, data)?;
    read_io(data).map_err(|_| truncated(StatKind::Io, IO_SIZE, data.len()))
}

fn read_io(data: &[u8]) -> io::Result<Value> {
    let mut r = LayoutReader::new(data);
    let mut map = ValueMap::with_capacity(12);

    map.insert("nread", Value::U64(r.u64()?));
    map.insert("nwritten", Value::U64(r.u64()?));
    map.insert("reads", Value::U32(r.u32()?));
    map.insert("writes", Value::U32(r.u32()?));
    // Accumulated times are hrtime_t; they never go negative.
    for key in [
        "wtime",
        "wlentime",
        "wlastupdate",
        "rtime",
        "rlentime",
        "rlastupdate",
    ] {
        map.insert(key, Value::U64(r.i64()? as u64));
    }
    map.insert("wcnt", Value::U64(r.u32()?.into()));
    map.insert("rcnt", Value::U64(r.u32()?.into()));

    Ok(Value::Map(map))
}

pub(crate) fn decode_intr(data: &[u8]) -> Result<Value, KstatError> {
    check(StatKind::Interrupt, INTR_SIZE, data)?;
    let mut r = LayoutReader::new(data);
    let mut map = ValueMap::with_capacity(INTR_KEYS.len());
    for key in INTR_KEYS {
        let v = r
            .u32()
            .map_err(|_| truncated(StatKind::Interrupt, INTR_SIZE, data.len()))?;
        map.insert(key, Value::U32(v));
    }
    Ok(Value::Map(map))
}

pub(crate) fn decode_timer(data: &[u8]) -> Result<Value, KstatError> {
    check(StatKind::Timer, TIMER_SIZE, data)?;
    read_timer(data).map_err(|_| truncated(StatKind::Timer, TIMER_SIZE, data.len()))
}

fn read_timer(data: &[u8]) -> io::Result<Value> {
    let mut r = LayoutReader::new(data);
    let mut map = ValueMap::with_capacity(7);

    map.insert("name", Value::String(r.chars(31)?));
    r.skip(1);
    for key in [
        "num_events",
        "elapsed_time",
        "min_time",
        "max_time",
        "start_time",
        "stop_time",
    ] {
        map.insert(key, Value::U64(r.u64()?));
    }

    Ok(Value::Map(map))
}
