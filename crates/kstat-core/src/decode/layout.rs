//! Cursor over a native-endian, naturally aligned C struct image.

use std::io::{self, Cursor, Read};

use byteorder::{NativeEndian, ReadBytesExt};

/// Reads C scalars and fixed-size character arrays from a byte buffer.
///
/// Every read aligns the position to the scalar's natural alignment first,
/// the same way a C compiler lays out struct members.
pub(crate) struct LayoutReader<'a> {
    cursor: Cursor<&'a [u8]>,
}

impl<'a> LayoutReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(buf),
        }
    }

    /// Starts reading at `offset` bytes into the buffer.
    pub fn at(buf: &'a [u8], offset: usize) -> Self {
        let mut reader = Self::new(buf);
        reader.cursor.set_position(offset as u64);
        reader
    }

    pub fn position(&self) -> usize {
        self.cursor.position() as usize
    }

    pub fn align_to(&mut self, align: usize) {
        let pos = self.position();
        let aligned = align_up(pos, align);
        self.cursor.set_position(aligned as u64);
    }

    pub fn skip(&mut self, n: usize) {
        let pos = self.position() + n;
        self.cursor.set_position(pos as u64);
    }

    pub fn u8(&mut self) -> io::Result<u8> {
        self.cursor.read_u8()
    }

    pub fn u32(&mut self) -> io::Result<u32> {
        self.align_to(4);
        self.cursor.read_u32::<NativeEndian>()
    }

    pub fn i32(&mut self) -> io::Result<i32> {
        self.align_to(4);
        self.cursor.read_i32::<NativeEndian>()
    }

    pub fn u64(&mut self) -> io::Result<u64> {
        self.align_to(8);
        self.cursor.read_u64::<NativeEndian>()
    }

    pub fn i64(&mut self) -> io::Result<i64> {
        self.align_to(8);
        self.cursor.read_i64::<NativeEndian>()
    }

    /// Reads a `char[n]` member and returns its contents up to the first NUL.
    pub fn chars(&mut self, n: usize) -> io::Result<String> {
        let mut raw = vec![0u8; n];
        self.cursor.read_exact(&mut raw)?;
        Ok(c_string(&raw))
    }
}

pub(crate) fn align_up(pos: usize, align: usize) -> usize {
    pos.div_ceil(align) * align
}

/// Decodes a NUL-terminated (or full-width) C string, replacing invalid UTF-8.
pub(crate) fn c_string(raw: &[u8]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_natural_alignment() {
        let mut buf = vec![0u8; 24];
        buf[0] = 7;
        buf[4..8].copy_from_slice(&42u32.to_ne_bytes());
        buf[8..16].copy_from_slice(&(-5i64).to_ne_bytes());
        buf[16..20].copy_from_slice(&(-1i32).to_ne_bytes());

        let mut r = LayoutReader::new(&buf);
        assert_eq!(r.u8().unwrap(), 7);
        assert_eq!(r.u32().unwrap(), 42);
        assert_eq!(r.i64().unwrap(), -5);
        assert_eq!(r.i32().unwrap(), -1);
        assert_eq!(r.position(), 20);
    }

    #[test]
    fn test_chars_stop_at_nul() {
        let mut buf = vec![0u8; 12];
        buf[..3].copy_from_slice(b"sd0");
        buf[8..12].copy_from_slice(&9u32.to_ne_bytes());

        let mut r = LayoutReader::new(&buf);
        assert_eq!(r.chars(5).unwrap(), "sd0");
        assert_eq!(r.u32().unwrap(), 9);
    }

    #[test]
    fn test_short_buffer_is_error() {
        let buf = [0u8; 6];
        let mut r = LayoutReader::at(&buf, 4);
        assert!(r.u32().is_err());
    }

    #[test]
    fn test_c_string_without_nul() {
        assert_eq!(c_string(b"abc"), "abc");
        assert_eq!(c_string(b""), "");
        assert_eq!(align_up(5, 4), 8);
        assert_eq!(align_up(8, 8), 8);
    }
}
