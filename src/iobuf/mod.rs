use heapless::Vec;
use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[error("Didn't write")]
pub struct DidntWrite;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[error("Didn't read")]
pub struct DidntRead;

pub trait Writer {
    fn write_exact(&mut self, bytes: &[u8]) -> Result<(), DidntWrite>;

    fn write_u8(&mut self, byte: u8) -> Result<(), DidntWrite> {
        self.write_exact(core::slice::from_ref(&byte))
    }
}

pub trait Reader {
    fn read_exact(&mut self, into: &mut [u8]) -> Result<(), DidntRead>;

    fn remaining(&self) -> usize;

    fn can_read(&self) -> bool {
        self.remaining() > 0
    }

    fn read_u8(&mut self) -> Result<u8, DidntRead> {
        let mut byte = 0;
        self.read_exact(core::slice::from_mut(&mut byte))?;
        Ok(byte)
    }
}

/// Unbounded scratch space, used to encode a message before deciding whether it has
/// to be fragmented.
impl Writer for std::vec::Vec<u8> {
    fn write_exact(&mut self, bytes: &[u8]) -> Result<(), DidntWrite> {
        self.extend_from_slice(bytes);
        Ok(())
    }
}

/// A bounded byte buffer with independent write and read cursors.
///
/// Writes append at the end, reads consume from the front. A buffer is used for one
/// encode or decode pass and then [`IoBuf::clear`]ed.
pub struct IoBuf<const N: usize> {
    vec: Vec<u8, N>,
    r_pos: usize,
}

impl<const N: usize> Default for IoBuf<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> IoBuf<N> {
    pub const fn new() -> Self {
        IoBuf {
            vec: Vec::new(),
            r_pos: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        N
    }

    /// Bytes written and not yet read.
    pub fn readable(&self) -> &[u8] {
        &self.vec[self.r_pos..]
    }

    pub fn as_slice(&self) -> &[u8] {
        self.vec.as_slice()
    }

    pub fn len(&self) -> usize {
        self.vec.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vec.is_empty()
    }

    pub fn space_left(&self) -> usize {
        N - self.vec.len()
    }

    pub fn clear(&mut self) {
        self.vec.clear();
        self.r_pos = 0;
    }

    /// A zero-copy reader over the unread part of the buffer.
    pub fn reader(&self) -> ZSlice<'_> {
        ZSlice::new(self.readable())
    }

    /// Overwrites two already written bytes at `pos` with `value` in little-endian order.
    pub fn patch_u16_le(&mut self, pos: usize, value: u16) -> Result<(), DidntWrite> {
        let dst = self.vec.get_mut(pos..pos + 2).ok_or(DidntWrite)?;
        dst.copy_from_slice(&value.to_le_bytes());
        Ok(())
    }
}

impl<const N: usize> Writer for IoBuf<N> {
    fn write_exact(&mut self, bytes: &[u8]) -> Result<(), DidntWrite> {
        self.vec.extend_from_slice(bytes).map_err(|_| DidntWrite)
    }
}

impl<const N: usize> Reader for IoBuf<N> {
    fn read_exact(&mut self, into: &mut [u8]) -> Result<(), DidntRead> {
        let len = into.len();
        if len > self.remaining() {
            return Err(DidntRead);
        }
        into.copy_from_slice(&self.vec[self.r_pos..self.r_pos + len]);
        self.r_pos += len;
        Ok(())
    }

    fn remaining(&self) -> usize {
        self.vec.len() - self.r_pos
    }
}

/// Cursor over borrowed bytes. Decoded messages borrow their payloads from the
/// underlying slice instead of copying them.
#[derive(Debug, Clone, Copy)]
pub struct ZSlice<'a> {
    bytes: &'a [u8],
    idx: usize,
}

impl<'a> ZSlice<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        ZSlice { bytes, idx: 0 }
    }

    pub fn read_slice(&mut self, len: usize) -> Result<&'a [u8], DidntRead> {
        if len > self.remaining() {
            return Err(DidntRead);
        }
        let slice = &self.bytes[self.idx..self.idx + len];
        self.idx += len;
        Ok(slice)
    }

    /// Consumes everything left.
    pub fn read_to_end(&mut self) -> &'a [u8] {
        let slice = &self.bytes[self.idx..];
        self.idx = self.bytes.len();
        slice
    }

    pub fn position(&self) -> usize {
        self.idx
    }
}

impl Reader for ZSlice<'_> {
    fn read_exact(&mut self, into: &mut [u8]) -> Result<(), DidntRead> {
        let src = self.read_slice(into.len())?;
        into.copy_from_slice(src);
        Ok(())
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.idx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursors_are_independent() {
        let mut buf = IoBuf::<8>::new();
        buf.write_exact(&[1, 2, 3]).unwrap();
        assert_eq!(buf.read_u8().unwrap(), 1);
        buf.write_u8(4).unwrap();
        assert_eq!(buf.readable(), &[2, 3, 4]);
        assert_eq!(buf.len(), 4);
        assert_eq!(buf.space_left(), 4);
    }

    #[test]
    fn write_past_capacity_fails() {
        let mut buf = IoBuf::<4>::new();
        buf.write_exact(&[0; 3]).unwrap();
        assert_eq!(buf.write_exact(&[0; 2]), Err(DidntWrite));
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn read_past_end_fails_without_consuming() {
        let mut s = ZSlice::new(&[1, 2]);
        assert_eq!(s.read_slice(3), Err(DidntRead));
        assert_eq!(s.read_slice(2).unwrap(), &[1, 2]);
        assert_eq!(s.read_u8(), Err(DidntRead));
    }

    #[test]
    fn patch_u16_le_overwrites_prefix() {
        let mut buf = IoBuf::<8>::new();
        buf.write_exact(&[0, 0, 9]).unwrap();
        buf.patch_u16_le(0, 0x0102).unwrap();
        assert_eq!(buf.as_slice(), &[0x02, 0x01, 9]);
        assert!(buf.patch_u16_le(2, 1).is_err());
    }
}
