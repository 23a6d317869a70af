//! Primitive wire codec for graph descriptions.
//!
//! Fixed-width little-endian integers, floats by bit pattern, strings as
//! u32-length-prefixed UTF-8, optional presence as an explicit flag byte.
//! Higher-level tagging (sections, node entries) lives in the graph crate;
//! this module only moves primitives and enforces bounds.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    #[error("Unexpected end of buffer: needed {needed} bytes, {remaining} remain")]
    UnexpectedEof { needed: usize, remaining: usize },

    #[error("String field is not valid UTF-8")]
    InvalidUtf8,

    #[error("Invalid presence flag byte {0:#04x}")]
    InvalidPresenceFlag(u8),

    #[error("Unsupported wire version {0}")]
    UnsupportedVersion(u32),

    #[error("Malformed section: {0}")]
    MalformedSection(&'static str),
}

pub type WireResult<T> = std::result::Result<T, WireError>;

/// Append-only writer over a growable byte buffer.
#[derive(Debug, Default)]
pub struct WireWriter {
    bytes: Vec<u8>,
}

impl WireWriter {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.bytes.len()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn write_u8(&mut self, value: u8) {
        self.bytes.push(value);
    }

    pub fn write_u32(&mut self, value: u32) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u64(&mut self, value: u64) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_f32(&mut self, value: f32) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_f64(&mut self, value: f64) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_bool(&mut self, value: bool) {
        self.write_u8(value as u8);
    }

    pub fn write_str(&mut self, value: &str) {
        self.write_u32(value.len() as u32);
        self.bytes.extend_from_slice(value.as_bytes());
    }

    pub fn write_option_u64(&mut self, value: Option<u64>) {
        match value {
            Some(v) => {
                self.write_u8(1);
                self.write_u64(v);
            }
            None => self.write_u8(0),
        }
    }

    /// Overwrites a previously written u32 (section sizes, header flags
    /// patched after the payload is known).
    pub fn patch_u32(&mut self, at: usize, value: u32) {
        self.bytes[at..at + 4].copy_from_slice(&value.to_le_bytes());
    }
}

/// Bounds-checked reader over a byte slice.
#[derive(Debug)]
pub struct WireReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.offset
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, needed: usize) -> WireResult<&'a [u8]> {
        if self.remaining() < needed {
            return Err(WireError::UnexpectedEof {
                needed,
                remaining: self.remaining(),
            });
        }
        let slice = &self.bytes[self.offset..self.offset + needed];
        self.offset += needed;
        Ok(slice)
    }

    pub fn skip(&mut self, count: usize) -> WireResult<()> {
        self.take(count).map(|_| ())
    }

    pub fn read_u8(&mut self) -> WireResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u32(&mut self) -> WireResult<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_u64(&mut self) -> WireResult<u64> {
        let bytes = self.take(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(buf))
    }

    pub fn read_f32(&mut self) -> WireResult<f32> {
        Ok(f32::from_le_bytes(self.read_u32()?.to_le_bytes()))
    }

    pub fn read_f64(&mut self) -> WireResult<f64> {
        Ok(f64::from_le_bytes(self.read_u64()?.to_le_bytes()))
    }

    pub fn read_bool(&mut self) -> WireResult<bool> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(WireError::InvalidPresenceFlag(other)),
        }
    }

    pub fn read_str(&mut self) -> WireResult<String> {
        let len = self.read_u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| WireError::InvalidUtf8)
    }

    pub fn read_option_u64(&mut self) -> WireResult<Option<u64>> {
        match self.read_u8()? {
            0 => Ok(None),
            1 => Ok(Some(self.read_u64()?)),
            other => Err(WireError::InvalidPresenceFlag(other)),
        }
    }

    /// Sub-reader over the next `len` bytes, advancing past them.
    pub fn sub_reader(&mut self, len: usize) -> WireResult<WireReader<'a>> {
        Ok(WireReader::new(self.take(len)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_primitive_roundtrip() {
        let mut writer = WireWriter::new();
        writer.write_u8(7);
        writer.write_u32(0xDEAD_BEEF);
        writer.write_u64(u64::MAX - 1);
        writer.write_f32(-0.25);
        writer.write_f64(std::f64::consts::PI);
        writer.write_bool(true);
        writer.write_str("lowpass");
        writer.write_option_u64(Some(42));
        writer.write_option_u64(None);

        let bytes = writer.into_bytes();
        let mut reader = WireReader::new(&bytes);
        assert_eq!(reader.read_u8().unwrap(), 7);
        assert_eq!(reader.read_u32().unwrap(), 0xDEAD_BEEF);
        assert_eq!(reader.read_u64().unwrap(), u64::MAX - 1);
        assert_eq!(reader.read_f32().unwrap(), -0.25);
        assert_eq!(reader.read_f64().unwrap(), std::f64::consts::PI);
        assert!(reader.read_bool().unwrap());
        assert_eq!(reader.read_str().unwrap(), "lowpass");
        assert_eq!(reader.read_option_u64().unwrap(), Some(42));
        assert_eq!(reader.read_option_u64().unwrap(), None);
        assert!(reader.is_empty());
    }

    #[test]
    fn test_truncated_read_fails() {
        let mut writer = WireWriter::new();
        writer.write_u64(1234);
        let bytes = writer.into_bytes();
        let mut reader = WireReader::new(&bytes[..5]);
        assert!(matches!(
            reader.read_u64(),
            Err(WireError::UnexpectedEof { needed: 8, remaining: 5 })
        ));
    }

    #[test]
    fn test_bad_presence_flag() {
        let mut reader = WireReader::new(&[3]);
        assert_eq!(
            reader.read_option_u64(),
            Err(WireError::InvalidPresenceFlag(3))
        );
    }

    #[test]
    fn test_patch_u32() {
        let mut writer = WireWriter::new();
        let at = writer.position();
        writer.write_u32(0);
        writer.write_u8(0xAB);
        writer.patch_u32(at, 99);
        let bytes = writer.into_bytes();
        let mut reader = WireReader::new(&bytes);
        assert_eq!(reader.read_u32().unwrap(), 99);
    }

    proptest! {
        #[test]
        fn prop_string_roundtrip(s in ".*") {
            let mut writer = WireWriter::new();
            writer.write_str(&s);
            let bytes = writer.into_bytes();
            let mut reader = WireReader::new(&bytes);
            prop_assert_eq!(reader.read_str().unwrap(), s);
        }

        #[test]
        fn prop_integers_roundtrip(a: u32, b: u64, c: f32) {
            let mut writer = WireWriter::new();
            writer.write_u32(a);
            writer.write_u64(b);
            writer.write_f32(c);
            let bytes = writer.into_bytes();
            let mut reader = WireReader::new(&bytes);
            prop_assert_eq!(reader.read_u32().unwrap(), a);
            prop_assert_eq!(reader.read_u64().unwrap(), b);
            prop_assert_eq!(reader.read_f32().unwrap().to_bits(), c.to_bits());
        }
    }
}
