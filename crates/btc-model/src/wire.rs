//! Little-endian wire framing.
//!
//! Integers are little-endian; counts and byte-string lengths use the
//! compact-size encoding (1, 3, 5 or 9 bytes depending on magnitude).

use crate::{CodecError, CodecResult, Hash, HASH_LENGTH};

/// Accumulates an entity's encoded form.
#[derive(Debug, Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    /// Create an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume the writer, yielding the encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn write_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Compact-size integer: values below 0xfd inline, larger values behind
    /// a width marker byte (0xfd/0xfe/0xff).
    pub fn write_var_int(&mut self, v: u64) {
        match v {
            0..=0xfc => self.buf.push(v as u8),
            0xfd..=0xffff => {
                self.buf.push(0xfd);
                self.buf.extend_from_slice(&(v as u16).to_le_bytes());
            }
            0x1_0000..=0xffff_ffff => {
                self.buf.push(0xfe);
                self.buf.extend_from_slice(&(v as u32).to_le_bytes());
            }
            _ => {
                self.buf.push(0xff);
                self.buf.extend_from_slice(&v.to_le_bytes());
            }
        }
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Length-prefixed byte string.
    pub fn write_var_bytes(&mut self, bytes: &[u8]) {
        self.write_var_int(bytes.len() as u64);
        self.buf.extend_from_slice(bytes);
    }

    /// Length-prefixed UTF-8 string. Empty encodes as a single zero byte.
    pub fn write_var_string(&mut self, s: &str) {
        self.write_var_bytes(s.as_bytes());
    }

    pub fn write_hash(&mut self, h: &Hash) {
        self.buf.extend_from_slice(h.as_bytes());
    }
}

/// Walks an entity's encoded form.
#[derive(Debug)]
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Current read offset.
    pub fn position(&self) -> usize {
        self.pos
    }

    fn take(&mut self, n: usize) -> CodecResult<&'a [u8]> {
        if self.pos + n > self.data.len() {
            return Err(CodecError::UnexpectedEnd(self.pos));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> CodecResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> CodecResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_u32(&mut self) -> CodecResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_u64(&mut self) -> CodecResult<u64> {
        let b = self.take(8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(b);
        Ok(u64::from_le_bytes(arr))
    }

    pub fn read_i64(&mut self) -> CodecResult<i64> {
        let b = self.take(8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(b);
        Ok(i64::from_le_bytes(arr))
    }

    pub fn read_var_int(&mut self) -> CodecResult<u64> {
        let marker = self.read_u8()?;
        match marker {
            0xfd => Ok(self.read_u16()? as u64),
            0xfe => Ok(self.read_u32()? as u64),
            0xff => self.read_u64(),
            v => Ok(v as u64),
        }
    }

    pub fn read_bytes(&mut self, n: usize) -> CodecResult<Vec<u8>> {
        Ok(self.take(n)?.to_vec())
    }

    pub fn read_var_bytes(&mut self) -> CodecResult<Vec<u8>> {
        let len = self.read_var_int()?;
        if len > self.data.len() as u64 {
            return Err(CodecError::Length(format!(
                "declared length {} exceeds input of {} bytes",
                len,
                self.data.len()
            )));
        }
        self.read_bytes(len as usize)
    }

    pub fn read_var_string(&mut self) -> CodecResult<String> {
        let bytes = self.read_var_bytes()?;
        String::from_utf8(bytes).map_err(|e| CodecError::Invalid(e.to_string()))
    }

    pub fn read_hash(&mut self) -> CodecResult<Hash> {
        let bytes = self.take(HASH_LENGTH)?;
        Hash::from_slice(bytes)
    }

    /// Assert the input is fully consumed.
    pub fn finish(self) -> CodecResult<()> {
        let remaining = self.data.len() - self.pos;
        if remaining != 0 {
            return Err(CodecError::Trailing(remaining));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn var_int_widths() {
        for (value, width) in [
            (0u64, 1usize),
            (0xfc, 1),
            (0xfd, 3),
            (0xffff, 3),
            (0x1_0000, 5),
            (0xffff_ffff, 5),
            (0x1_0000_0000, 9),
        ] {
            let mut w = Writer::new();
            w.write_var_int(value);
            let bytes = w.into_bytes();
            assert_eq!(bytes.len(), width, "width of {value:#x}");
            let mut r = Reader::new(&bytes);
            assert_eq!(r.read_var_int().unwrap(), value);
            r.finish().unwrap();
        }
    }

    #[test]
    fn truncated_input_is_detected() {
        let mut w = Writer::new();
        w.write_u64(42);
        let bytes = w.into_bytes();
        let mut r = Reader::new(&bytes[..5]);
        assert!(matches!(r.read_u64(), Err(CodecError::UnexpectedEnd(_))));
    }

    #[test]
    fn oversized_var_bytes_rejected() {
        // Declares 1000 bytes but carries none.
        let mut w = Writer::new();
        w.write_var_int(1000);
        let bytes = w.into_bytes();
        let mut r = Reader::new(&bytes);
        assert!(r.read_var_bytes().is_err());
    }

    proptest! {
        #[test]
        fn scalar_round_trip(a in any::<u32>(), b in any::<u64>(), c in any::<i64>(), s in ".{0,64}") {
            let mut w = Writer::new();
            w.write_u32(a);
            w.write_u64(b);
            w.write_i64(c);
            w.write_var_string(&s);
            let bytes = w.into_bytes();

            let mut r = Reader::new(&bytes);
            prop_assert_eq!(r.read_u32().unwrap(), a);
            prop_assert_eq!(r.read_u64().unwrap(), b);
            prop_assert_eq!(r.read_i64().unwrap(), c);
            prop_assert_eq!(r.read_var_string().unwrap(), s);
            r.finish().unwrap();
        }
    }
}
