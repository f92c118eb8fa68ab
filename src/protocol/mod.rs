use num_traits::{PrimInt, Unsigned};

use crate::{
    iobuf::{Reader, Writer, ZSlice},
    result::{ZError, ZResult},
};

pub mod core;
pub mod transport;
pub mod whatami;
pub mod zenoh;

/// Low 5 bits of a header carry the message id, the high 3 bits its flags.
pub const MID_MASK: u8 = 0x1f;

#[inline]
pub const fn mid(header: u8) -> u8 {
    header & MID_MASK
}

#[inline]
pub const fn has_flag(header: u8, flag: u8) -> bool {
    header & flag == flag
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ZenohID([u8; ZenohID::MAX_SIZE]);

impl ZenohID {
    pub const MAX_SIZE: usize = u128::BITS as usize / 8;

    /// Number of significant bytes, at least one.
    #[inline]
    pub fn size(&self) -> usize {
        let size = Self::MAX_SIZE - (u128::from_le_bytes(self.0).leading_zeros() as usize / 8);
        size.max(1)
    }

    #[inline]
    pub fn to_le_bytes(&self) -> [u8; ZenohID::MAX_SIZE] {
        self.0
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.0[..self.size()]
    }

    pub fn try_from_slice(bytes: &[u8]) -> ZResult<Self> {
        if bytes.is_empty() || bytes.len() > Self::MAX_SIZE {
            return Err(ZError::ParseBytes);
        }
        let mut id = [0u8; Self::MAX_SIZE];
        id[..bytes.len()].copy_from_slice(bytes);
        Ok(ZenohID(id))
    }

    pub fn rand() -> Self {
        use rand::{rngs::SmallRng, Rng, SeedableRng};

        let seed = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default();
        let id: u128 = SmallRng::seed_from_u64(seed ^ u64::from(std::process::id())).random();
        ZenohID::from(id | 1)
    }
}

impl From<u128> for ZenohID {
    fn from(id: u128) -> Self {
        ZenohID(id.to_le_bytes())
    }
}

impl ::core::fmt::Display for ZenohID {
    fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
        for b in self.as_slice().iter().rev() {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

/// Variable-length unsigned integers: groups of 7 data bits, least significant group
/// first, the high bit of each byte set while more groups follow.
pub(crate) struct Varint<T> {
    _p: ::core::marker::PhantomData<T>,
}

impl<T> Varint<T>
where
    T: PrimInt + Unsigned + Into<u64>,
{
    /// Longest encoding of a `u64`.
    pub const MAX_LEN: usize = 10;

    pub fn encode<W: Writer>(writer: &mut W, value: T) -> ZResult<()> {
        let mut value: u64 = value.into();
        loop {
            let byte = (value & 0x7f) as u8;
            value >>= 7;
            if value == 0 {
                writer.write_u8(byte)?;
                return Ok(());
            }
            writer.write_u8(byte | 0x80)?;
        }
    }

    pub fn decode<R: Reader>(reader: &mut R) -> ZResult<T> {
        let mut value: u64 = 0;
        let mut shift = 0u32;
        for _ in 0..Self::MAX_LEN {
            let byte = reader.read_u8().map_err(|_| ZError::ParseZInt)?;
            let bits = u64::from(byte & 0x7f);
            if shift == 63 && bits > 1 {
                return Err(ZError::ParseZInt);
            }
            value |= bits << shift;
            if byte & 0x80 == 0 {
                return <T as num_traits::NumCast>::from(value).ok_or(ZError::ParseZInt);
            }
            shift += 7;
        }

        Err(ZError::ParseZInt)
    }

    pub fn encoded_len(value: T) -> usize {
        let bits = 64 - value.into().leading_zeros() as usize;
        bits.div_ceil(7).max(1)
    }
}

pub(crate) fn encode_u8<W: Writer>(writer: &mut W, byte: u8) -> ZResult<()> {
    writer.write_u8(byte)?;
    Ok(())
}

pub(crate) fn decode_u8<R: Reader>(reader: &mut R) -> ZResult<u8> {
    reader.read_u8().map_err(|_| ZError::ParseUint8)
}

pub(crate) fn encode_zint<W: Writer>(writer: &mut W, value: u64) -> ZResult<()> {
    Varint::<u64>::encode(writer, value)
}

pub(crate) fn decode_zint<R: Reader>(reader: &mut R) -> ZResult<u64> {
    Varint::<u64>::decode(reader)
}

pub(crate) fn encode_bytes<W: Writer>(writer: &mut W, bytes: &[u8]) -> ZResult<()> {
    encode_zint(writer, bytes.len() as u64)?;
    writer.write_exact(bytes)?;
    Ok(())
}

/// The length prefix is bounded by what is left in `reader` before anything is sliced.
pub(crate) fn decode_bytes<'a>(reader: &mut ZSlice<'a>) -> ZResult<&'a [u8]> {
    let len = decode_zint(reader).map_err(|_| ZError::ParseBytes)?;
    if len > reader.remaining() as u64 {
        return Err(ZError::ParseBytes);
    }
    reader.read_slice(len as usize).map_err(|_| ZError::ParseBytes)
}

pub(crate) fn encode_str<W: Writer>(writer: &mut W, s: &str) -> ZResult<()> {
    encode_bytes(writer, s.as_bytes())
}

pub(crate) fn decode_str<'a>(reader: &mut ZSlice<'a>) -> ZResult<&'a str> {
    let bytes = decode_bytes(reader).map_err(|_| ZError::ParseString)?;
    ::core::str::from_utf8(bytes).map_err(|_| ZError::ParseString)
}
