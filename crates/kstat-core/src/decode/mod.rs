//! Turns one statistic's snapshot into a [`Record`].
//!
//! ```text
//! Descriptor ──► KstatSource::snapshot ──┬── Err ──► Payload::Error
//!                                        │
//!                                        └── Ok ───► match kind
//!                                                    ├─ Named ► named::decode
//!                                                    ├─ Io    ► fixed::decode_io
//!                                                    ├─ Intr  ► fixed::decode_intr
//!                                                    ├─ Timer ► fixed::decode_timer
//!                                                    └─ Raw   ► raw::decode
//! ```
//!
//! Payloads are read in native byte order with natural C alignment.

mod fixed;
mod layout;
pub mod named;
pub mod raw;

#[cfg(any(target_os = "illumos", target_os = "solaris"))]
pub(crate) use layout::c_string;

pub use fixed::{INTR_KEYS, INTR_SIZE, IO_SIZE, TIMER_SIZE};
#[cfg(any(test, feature = "mock"))]
pub use named::NamedBuilder;
pub use named::NAMED_ENTRY_SIZE;
pub use raw::{Field, RAW_LAYOUTS, RawLayout, layout_for, layout_for_stat};

use std::io;

use crate::error::KstatError;
use crate::record::{Payload, Record};
use crate::source::{Descriptor, KstatSource, Snapshot, StatKind};
use crate::value::Value;

pub(crate) fn truncated(kind: StatKind, expected: usize, actual: usize) -> KstatError {
    KstatError::TruncatedPayload {
        kind,
        expected,
        actual,
    }
}

/// Reads and decodes one statistic.
///
/// A failed snapshot is returned as a record carrying the OS error text.
/// Only a payload that cannot be decoded is an `Err`.
pub fn decode<S: KstatSource + ?Sized>(
    source: &mut S,
    desc: &Descriptor,
) -> Result<Record, KstatError> {
    let snap = match source.snapshot(desc.handle) {
        Ok(snap) => snap,
        Err(e) => return Ok(Record::new(desc, Payload::Error(os_error_text(&e)))),
    };

    let data = decode_snapshot(desc, &snap)?;
    Ok(Record::new(
        desc,
        Payload::Data {
            snaptime: snap.snaptime,
            crtime: snap.crtime,
            data,
        },
    ))
}

/// The OS message for `e`, without the ` (os error N)` suffix std appends.
fn os_error_text(e: &io::Error) -> String {
    let mut text = e.to_string();
    if let Some(code) = e.raw_os_error() {
        let suffix = format!(" (os error {})", code);
        if text.ends_with(&suffix) {
            text.truncate(text.len() - suffix.len());
        }
    }
    text
}

/// Decodes an already captured snapshot according to the descriptor's kind.
pub fn decode_snapshot(desc: &Descriptor, snap: &Snapshot) -> Result<Value, KstatError> {
    match desc.kind {
        StatKind::Named => named::decode(desc, snap),
        StatKind::Io => fixed::decode_io(&snap.data),
        StatKind::Interrupt => fixed::decode_intr(&snap.data),
        StatKind::Timer => fixed::decode_timer(&snap.data),
        StatKind::Raw => Ok(raw::decode(desc, &snap.data)),
    }
}
