use crate::error::{Result, SnapshotError};

/// Growable little-endian byte sink.
///
/// The builder style keeps field order visible at the call site, which is the
/// whole layout contract for a delimiter-free format.
#[derive(Debug, Default)]
pub struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn u8(mut self, v: u8) -> Self {
        self.buf.push(v);
        self
    }

    pub fn u16(mut self, v: u16) -> Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn u32(mut self, v: u32) -> Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn u64(mut self, v: u64) -> Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn i32(mut self, v: i32) -> Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn bool(self, v: bool) -> Self {
        self.u8(v as u8)
    }

    pub fn bytes(mut self, b: &[u8]) -> Self {
        self.buf.extend_from_slice(b);
        self
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }

    /// Copy the encoded bytes into the front of `dest` and return the count.
    ///
    /// Fails without touching `dest` when it is too small, so callers can
    /// size a destination region from the error and retry.
    pub fn finish_into(self, dest: &mut [u8]) -> Result<usize> {
        if self.buf.len() > dest.len() {
            return Err(SnapshotError::BoundsExceeded {
                needed: self.buf.len(),
                available: dest.len(),
            });
        }
        dest[..self.buf.len()].copy_from_slice(&self.buf);
        Ok(self.buf.len())
    }
}

/// Bounds-checked cursor over an encoded region.
///
/// Every read advances the cursor; [`Decoder::position`] after a section is
/// the byte count the parent codec uses to locate the next section.
#[derive(Debug)]
pub struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(SnapshotError::BoundsExceeded {
                needed: self.pos.saturating_add(len),
                available: self.buf.len(),
            });
        }
        let bytes = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn u64(&mut self) -> Result<u64> {
        let b = self.take(8)?;
        Ok(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    pub fn i32(&mut self) -> Result<i32> {
        let b = self.take(4)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn bool(&mut self) -> Result<bool> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(SnapshotError::Corrupt("invalid bool encoding")),
        }
    }

    pub fn bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        self.take(len)
    }

    /// Assert that the region was consumed exactly.
    pub fn finish(self) -> Result<()> {
        if self.remaining() != 0 {
            return Err(SnapshotError::Corrupt("trailing bytes after record"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn scalar_roundtrip() {
        let bytes = Encoder::new()
            .u8(0xAB)
            .u16(0xBEEF)
            .u32(0xDEAD_BEEF)
            .u64(0x0123_4567_89AB_CDEF)
            .i32(-1000)
            .bool(true)
            .bytes(&[1, 2, 3])
            .finish();

        let mut d = Decoder::new(&bytes);
        assert_eq!(d.u8().unwrap(), 0xAB);
        assert_eq!(d.u16().unwrap(), 0xBEEF);
        assert_eq!(d.u32().unwrap(), 0xDEAD_BEEF);
        assert_eq!(d.u64().unwrap(), 0x0123_4567_89AB_CDEF);
        assert_eq!(d.i32().unwrap(), -1000);
        assert!(d.bool().unwrap());
        assert_eq!(d.bytes(3).unwrap(), &[1, 2, 3]);
        assert_eq!(d.position(), bytes.len());
        d.finish().unwrap();
    }

    #[test]
    fn read_past_end_is_bounds_exceeded() {
        let mut d = Decoder::new(&[1, 2]);
        let err = d.u32().unwrap_err();
        assert_eq!(
            err,
            SnapshotError::BoundsExceeded {
                needed: 4,
                available: 2
            }
        );
        // A failed read must not advance the cursor.
        assert_eq!(d.position(), 0);
        assert_eq!(d.u16().unwrap(), 0x0201);
    }

    #[test]
    fn trailing_bytes_rejected_by_finish() {
        let mut d = Decoder::new(&[0, 0, 0]);
        d.u16().unwrap();
        assert_eq!(
            d.finish().unwrap_err(),
            SnapshotError::Corrupt("trailing bytes after record")
        );
    }

    #[test]
    fn finish_into_leaves_small_dest_untouched() {
        let enc = Encoder::new().u64(7);
        let mut dest = [0xEE; 4];
        let err = enc.finish_into(&mut dest).unwrap_err();
        assert_eq!(
            err,
            SnapshotError::BoundsExceeded {
                needed: 8,
                available: 4
            }
        );
        assert_eq!(dest, [0xEE; 4]);
    }

    #[test]
    fn finish_into_writes_prefix_only() {
        let enc = Encoder::new().u16(0x0102);
        let mut dest = [0u8; 4];
        assert_eq!(enc.finish_into(&mut dest).unwrap(), 2);
        assert_eq!(dest, [0x02, 0x01, 0, 0]);
    }

    proptest! {
        // Arbitrary input must never panic the cursor, only error.
        #[test]
        fn decoder_never_panics(data in proptest::collection::vec(any::<u8>(), 0..256)) {
            let mut d = Decoder::new(&data);
            while d.u32().is_ok() {}
            let _ = d.u8();
            let _ = d.bytes(usize::MAX);
        }
    }
}
