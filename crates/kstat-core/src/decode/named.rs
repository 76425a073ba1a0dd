//! `KSTAT_TYPE_NAMED` payloads: a table of `kstat_named_t` entries.

use crate::error::KstatError;
use crate::source::{Descriptor, Snapshot, StatKind};
use crate::value::{Value, ValueMap};

use super::layout::{LayoutReader, c_string};
use super::truncated;

/// Size of one `kstat_named_t`.
pub const NAMED_ENTRY_SIZE: usize = 48;
const NAME_LEN: usize = 31;
const VALUE_OFFSET: usize = 32;

pub const DATA_CHAR: u8 = 0;
pub const DATA_INT32: u8 = 1;
pub const DATA_UINT32: u8 = 2;
pub const DATA_INT64: u8 = 3;
pub const DATA_UINT64: u8 = 4;
pub const DATA_STRING: u8 = 9;

pub(crate) fn decode(desc: &Descriptor, snap: &Snapshot) -> Result<Value, KstatError> {
    let count = snap.ndata as usize;
    let expected = count * NAMED_ENTRY_SIZE;
    if snap.data.len() < expected {
        return Err(truncated(StatKind::Named, expected, snap.data.len()));
    }

    let mut map = ValueMap::with_capacity(count);
    for i in 0..count {
        let base = i * NAMED_ENTRY_SIZE;
        let entry = &snap.data[base..base + NAMED_ENTRY_SIZE];
        let field = c_string(&entry[..NAME_LEN]);
        let type_id = entry[NAME_LEN];

        let value = decode_value(desc, &snap.data, base + VALUE_OFFSET, &field, type_id)?;
        map.insert(field, value);
    }

    Ok(Value::Map(map))
}

fn decode_value(
    desc: &Descriptor,
    data: &[u8],
    offset: usize,
    field: &str,
    type_id: u8,
) -> Result<Value, KstatError> {
    let mut r = LayoutReader::at(data, offset);
    let short = |_| truncated(StatKind::Named, offset + 16, data.len());

    let value = match type_id {
        // `char` is signed on illumos x86.
        DATA_CHAR => Value::I8(r.u8().map_err(short)? as i8),
        DATA_INT32 => Value::I32(r.i32().map_err(short)?),
        DATA_UINT32 => Value::U32(r.u32().map_err(short)?),
        DATA_INT64 => Value::I64(r.i64().map_err(short)?),
        DATA_UINT64 => Value::U64(r.u64().map_err(short)?),
        DATA_STRING => {
            let str_offset = r.u64().map_err(short)? as usize;
            let len = r.u32().map_err(short)? as usize;
            Value::String(string_at(data, str_offset, len)?)
        }
        _ => {
            return Err(KstatError::UnrecognizedFieldType {
                type_id,
                field: field.to_string(),
                module: desc.module.clone(),
                class: desc.class.clone(),
                name: desc.name.clone(),
                instance: desc.instance,
            });
        }
    };
    Ok(value)
}

/// Resolves a string value stored as `(offset, len)` into the data buffer.
fn string_at(data: &[u8], offset: usize, len: usize) -> Result<String, KstatError> {
    if len == 0 {
        return Ok(String::new());
    }
    let end = offset
        .checked_add(len)
        .filter(|&end| end <= data.len())
        .ok_or_else(|| truncated(StatKind::Named, offset.saturating_add(len), data.len()))?;
    Ok(c_string(&data[offset..end]))
}

/// Rewrites the string value at `value` from a pointer into an offset in
/// `data`, the copied data section that lived at `base..base + size`.
///
/// Strings outside the section are appended using `external(addr, len)`.
/// A null or empty string becomes offset 0, length 0.
#[cfg(any(test, target_os = "illumos", target_os = "solaris"))]
pub(crate) fn relocate_string<F>(
    data: &mut Vec<u8>,
    value: usize,
    base: usize,
    size: usize,
    external: F,
) where
    F: FnOnce(usize, usize) -> Vec<u8>,
{
    if value + 12 > data.len() {
        return;
    }
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&data[value..value + 8]);
    let addr = u64::from_ne_bytes(raw) as usize;
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&data[value + 8..value + 12]);
    let len = u32::from_ne_bytes(raw) as usize;

    let offset = if addr == 0 || len == 0 {
        data[value + 8..value + 12].copy_from_slice(&0u32.to_ne_bytes());
        0
    } else if addr >= base && addr.saturating_add(len) <= base + size {
        addr - base
    } else {
        let offset = data.len();
        let body = external(addr, len);
        data.extend_from_slice(&body);
        offset
    };
    data[value..value + 8].copy_from_slice(&(offset as u64).to_ne_bytes());
}

/// Builds one `kstat_named_t` image. Strings go through [`NamedBuilder`].
#[cfg(any(test, feature = "mock"))]
pub(crate) fn entry(name: &str, type_id: u8, value: [u8; 16]) -> [u8; NAMED_ENTRY_SIZE] {
    let mut out = [0u8; NAMED_ENTRY_SIZE];
    let n = name.len().min(NAME_LEN - 1);
    out[..n].copy_from_slice(&name.as_bytes()[..n]);
    out[NAME_LEN] = type_id;
    out[VALUE_OFFSET..].copy_from_slice(&value);
    out
}

/// Lays out a named payload the way a snapshot presents it: the entry table
/// followed by string bodies, with string values rewritten to offsets.
#[cfg(any(test, feature = "mock"))]
#[derive(Debug, Default, Clone)]
pub struct NamedBuilder {
    entries: Vec<[u8; NAMED_ENTRY_SIZE]>,
    strings: Vec<(usize, Vec<u8>)>,
}

#[cfg(any(test, feature = "mock"))]
impl NamedBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, name: &str, type_id: u8, bytes: &[u8]) -> Self {
        let mut value = [0u8; 16];
        value[..bytes.len()].copy_from_slice(bytes);
        self.entries.push(entry(name, type_id, value));
        self
    }

    pub fn char(self, name: &str, v: i8) -> Self {
        self.push(name, DATA_CHAR, &v.to_ne_bytes())
    }

    pub fn i32(self, name: &str, v: i32) -> Self {
        self.push(name, DATA_INT32, &v.to_ne_bytes())
    }

    pub fn u32(self, name: &str, v: u32) -> Self {
        self.push(name, DATA_UINT32, &v.to_ne_bytes())
    }

    pub fn i64(self, name: &str, v: i64) -> Self {
        self.push(name, DATA_INT64, &v.to_ne_bytes())
    }

    pub fn u64(self, name: &str, v: u64) -> Self {
        self.push(name, DATA_UINT64, &v.to_ne_bytes())
    }

    pub fn string(mut self, name: &str, v: &str) -> Self {
        let idx = self.entries.len();
        let mut body = v.as_bytes().to_vec();
        body.push(0);
        self.strings.push((idx, body));
        self.push(name, DATA_STRING, &[])
    }

    /// An entry with an arbitrary type id, for exercising decode errors.
    pub fn raw_type(self, name: &str, type_id: u8) -> Self {
        self.push(name, type_id, &[])
    }

    pub fn ndata(&self) -> u32 {
        self.entries.len() as u32
    }

    pub fn build(&self) -> Vec<u8> {
        let mut data: Vec<u8> = self.entries.iter().flatten().copied().collect();
        for (idx, body) in &self.strings {
            let offset = data.len() as u64;
            let len = body.len() as u32;
            let at = idx * NAMED_ENTRY_SIZE + VALUE_OFFSET;
            data[at..at + 8].copy_from_slice(&offset.to_ne_bytes());
            data[at + 8..at + 12].copy_from_slice(&len.to_ne_bytes());
            data.extend_from_slice(body);
        }
        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::StatHandle;

    fn descriptor() -> Descriptor {
        Descriptor {
            module: "unix".into(),
            class: "misc".into(),
            name: "system_misc".into(),
            instance: 0,
            kind: StatKind::Named,
            data_size: 0,
            handle: StatHandle::new(1, 0),
        }
    }

    fn snapshot(b: &NamedBuilder) -> Snapshot {
        Snapshot {
            snaptime: 2,
            crtime: 1,
            ndata: b.ndata(),
            data: b.build(),
        }
    }

    #[test]
    fn test_decode_preserves_declared_order() {
        let b = NamedBuilder::new().i32("a", 5).string("b", "x");
        let value = decode(&descriptor(), &snapshot(&b)).unwrap();
        let map = value.as_map().unwrap();

        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(map.get("a"), Some(&Value::I32(5)));
        assert_eq!(map.get("b"), Some(&Value::String("x".into())));
    }

    #[test]
    fn test_decode_all_scalar_types() {
        let b = NamedBuilder::new()
            .char("c", b'Z' as i8)
            .char("neg", -56)
            .i32("i32", -7)
            .u32("u32", u32::MAX)
            .i64("i64", i64::MIN)
            .u64("u64", u64::MAX)
            .string("s", "")
            .string("t", "global");
        let value = decode(&descriptor(), &snapshot(&b)).unwrap();
        let map = value.as_map().unwrap();

        assert_eq!(map.get("c"), Some(&Value::I8(b'Z' as i8)));
        assert_eq!(map.get("neg"), Some(&Value::I8(-56)));
        assert_eq!(map.get("i32"), Some(&Value::I32(-7)));
        assert_eq!(map.get("u32"), Some(&Value::U32(u32::MAX)));
        assert_eq!(map.get("i64"), Some(&Value::I64(i64::MIN)));
        assert_eq!(map.get("u64"), Some(&Value::U64(u64::MAX)));
        assert_eq!(map.get("s"), Some(&Value::String(String::new())));
        assert_eq!(map.get("t"), Some(&Value::String("global".into())));
    }

    #[test]
    fn test_duplicate_names_replace_in_place() {
        let b = NamedBuilder::new().u32("x", 1).u32("y", 2).u32("x", 3);
        let value = decode(&descriptor(), &snapshot(&b)).unwrap();
        let map = value.as_map().unwrap();

        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["x", "y"]);
        assert_eq!(map.get("x"), Some(&Value::U32(3)));
    }

    #[test]
    fn test_unrecognized_type() {
        let b = NamedBuilder::new().u32("ok", 1).raw_type("bogus", 6);
        let err = decode(&descriptor(), &snapshot(&b)).unwrap_err();

        match err {
            KstatError::UnrecognizedFieldType {
                type_id,
                field,
                module,
                name,
                ..
            } => {
                assert_eq!(type_id, 6);
                assert_eq!(field, "bogus");
                assert_eq!(module, "unix");
                assert_eq!(name, "system_misc");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_truncated_table() {
        let b = NamedBuilder::new().u32("a", 1).u32("b", 2);
        let mut snap = snapshot(&b);
        snap.data.truncate(NAMED_ENTRY_SIZE + 10);

        assert!(matches!(
            decode(&descriptor(), &snap),
            Err(KstatError::TruncatedPayload {
                kind: StatKind::Named,
                expected: 96,
                actual: 58,
            })
        ));
    }

    #[test]
    fn test_string_offset_out_of_range() {
        let b = NamedBuilder::new().string("s", "hello");
        let mut snap = snapshot(&b);
        snap.data.truncate(NAMED_ENTRY_SIZE + 2);

        assert!(matches!(
            decode(&descriptor(), &snap),
            Err(KstatError::TruncatedPayload { .. })
        ));
    }

    #[test]
    fn test_empty_table() {
        let snap = Snapshot::default();
        let value = decode(&descriptor(), &snap).unwrap();
        assert!(value.as_map().unwrap().is_empty());
    }

    fn pointer_entry(name: &str, addr: u64, len: u32) -> [u8; NAMED_ENTRY_SIZE] {
        let mut value = [0u8; 16];
        value[..8].copy_from_slice(&addr.to_ne_bytes());
        value[8..12].copy_from_slice(&len.to_ne_bytes());
        entry(name, DATA_STRING, value)
    }

    #[test]
    fn test_relocate_string_pointers() {
        let base = 0x1000;
        let table = 3 * NAMED_ENTRY_SIZE;
        let mut data = Vec::new();
        data.extend_from_slice(&pointer_entry("nil", 0, 5));
        data.extend_from_slice(&pointer_entry("inside", (base + table) as u64, 3));
        data.extend_from_slice(&pointer_entry("outside", 0xdead_0000, 4));
        data.extend_from_slice(b"abc");
        let size = data.len();

        for i in 0..2 {
            relocate_string(&mut data, i * NAMED_ENTRY_SIZE + VALUE_OFFSET, base, size, |_, _| {
                panic!("string is inside the data section")
            });
        }
        relocate_string(
            &mut data,
            2 * NAMED_ENTRY_SIZE + VALUE_OFFSET,
            base,
            size,
            |addr, len| {
                assert_eq!((addr, len), (0xdead_0000, 4));
                b"ext!".to_vec()
            },
        );

        let len_field = VALUE_OFFSET + 8..VALUE_OFFSET + 12;
        assert_eq!(&data[len_field], &0u32.to_ne_bytes());

        let snap = Snapshot {
            snaptime: 2,
            crtime: 1,
            ndata: 3,
            data,
        };
        let value = decode(&descriptor(), &snap).unwrap();
        let map = value.as_map().unwrap();
        assert_eq!(map.get("nil"), Some(&Value::String(String::new())));
        assert_eq!(map.get("inside"), Some(&Value::String("abc".into())));
        assert_eq!(map.get("outside"), Some(&Value::String("ext!".into())));
    }
}
