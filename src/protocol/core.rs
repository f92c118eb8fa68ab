//! Field types shared by the zenoh messages, with their codecs.
//!
//! Each decoder reports failures with the error of the field it was decoding, so a
//! truncated subscriber mode is a [`ZError::ParseSubmode`] and not a bare zint error.

use crate::{
    iobuf::{Reader, Writer, ZSlice},
    protocol::{decode_bytes, decode_str, decode_u8, decode_zint, encode_bytes, encode_str, encode_zint},
    result::{ZError, ZResult},
};

/// Resource id 0 is reserved for "no resource": the key is the suffix alone.
pub const NO_RESOURCE_ID: u64 = 0;

/// A key as it travels on the wire: a declared resource id, an optional suffix, or both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ResKey<'a> {
    pub rid: u64,
    pub suffix: Option<&'a str>,
}

impl<'a> ResKey<'a> {
    pub const fn name(key: &'a str) -> Self {
        ResKey {
            rid: NO_RESOURCE_ID,
            suffix: Some(key),
        }
    }

    pub const fn rid(rid: u64) -> Self {
        ResKey { rid, suffix: None }
    }

    pub fn has_suffix(&self) -> bool {
        self.suffix.is_some()
    }

    /// The suffix is only written when the `K` flag of the enclosing header is set.
    pub fn encode<W: Writer>(&self, writer: &mut W) -> ZResult<()> {
        encode_zint(writer, self.rid)?;
        if let Some(suffix) = self.suffix {
            encode_str(writer, suffix)?;
        }
        Ok(())
    }

    pub fn decode(reader: &mut ZSlice<'a>, with_suffix: bool) -> ZResult<Self> {
        let rid = decode_zint(reader).map_err(|_| ZError::ParseResourceKey)?;
        let suffix = if with_suffix {
            Some(decode_str(reader).map_err(|_| ZError::ParseResourceKey)?)
        } else {
            None
        };
        if rid == NO_RESOURCE_ID && suffix.is_none() {
            return Err(ZError::ParseResourceKey);
        }
        Ok(ResKey { rid, suffix })
    }
}

/// Delivery guarantee of the channel a message travels on.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Reliability {
    #[default]
    Reliable,
    BestEffort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Property<'a> {
    pub key: u64,
    pub value: &'a [u8],
}

pub mod property {
    pub const USER: u64 = 0x50;
    pub const PASSWORD: u64 = 0x51;
}

/// Encodes a property list: a count followed by `(key, value)` pairs.
pub fn encode_properties<W: Writer>(writer: &mut W, props: &[Property<'_>]) -> ZResult<()> {
    encode_zint(writer, props.len() as u64)?;
    for p in props {
        encode_zint(writer, p.key)?;
        encode_bytes(writer, p.value)?;
    }
    Ok(())
}

fn decode_property<'a>(reader: &mut ZSlice<'a>) -> ZResult<Property<'a>> {
    let key = decode_zint(reader).map_err(|_| ZError::ParseProperty)?;
    let value = decode_bytes(reader).map_err(|_| ZError::ParseProperty)?;
    Ok(Property { key, value })
}

/// Decodes a property list into a bounded vector; more than `N` entries is a
/// [`ZError::ParseProperties`].
pub fn decode_properties<'a, const N: usize>(
    reader: &mut ZSlice<'a>,
) -> ZResult<heapless::Vec<Property<'a>, N>> {
    let count = decode_zint(reader).map_err(|_| ZError::ParseProperties)?;
    if count > N as u64 {
        return Err(ZError::ParseProperties);
    }
    let mut props = heapless::Vec::new();
    for _ in 0..count {
        let p = decode_property(reader)?;
        props.push(p).map_err(|_| ZError::ParseProperties)?;
    }
    Ok(props)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Timestamp<'a> {
    pub time: u64,
    pub id: &'a [u8],
}

impl<'a> Timestamp<'a> {
    pub fn encode<W: Writer>(&self, writer: &mut W) -> ZResult<()> {
        encode_zint(writer, self.time)?;
        encode_bytes(writer, self.id)
    }

    pub fn decode(reader: &mut ZSlice<'a>) -> ZResult<Self> {
        let time = decode_zint(reader).map_err(|_| ZError::ParseTimestamp)?;
        let id = decode_bytes(reader).map_err(|_| ZError::ParseTimestamp)?;
        Ok(Timestamp { time, id })
    }
}

/// Optional metadata attached to a Data message.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DataInfo<'a> {
    pub kind: Option<u64>,
    pub encoding: Option<u64>,
    pub timestamp: Option<Timestamp<'a>>,
}

mod data_info_flag {
    pub const KIND: u64 = 1 << 0;
    pub const ENCODING: u64 = 1 << 1;
    pub const TIMESTAMP: u64 = 1 << 2;
}

impl<'a> DataInfo<'a> {
    pub fn is_empty(&self) -> bool {
        self.kind.is_none() && self.encoding.is_none() && self.timestamp.is_none()
    }

    pub fn encode<W: Writer>(&self, writer: &mut W) -> ZResult<()> {
        let mut flags = 0;
        if self.kind.is_some() {
            flags |= data_info_flag::KIND;
        }
        if self.encoding.is_some() {
            flags |= data_info_flag::ENCODING;
        }
        if self.timestamp.is_some() {
            flags |= data_info_flag::TIMESTAMP;
        }
        encode_zint(writer, flags)?;
        if let Some(kind) = self.kind {
            encode_zint(writer, kind)?;
        }
        if let Some(encoding) = self.encoding {
            encode_zint(writer, encoding)?;
        }
        if let Some(ts) = &self.timestamp {
            ts.encode(writer)?;
        }
        Ok(())
    }

    pub fn decode(reader: &mut ZSlice<'a>) -> ZResult<Self> {
        let flags = decode_zint(reader)?;
        let mut info = DataInfo::default();
        if flags & data_info_flag::KIND != 0 {
            info.kind = Some(decode_zint(reader)?);
        }
        if flags & data_info_flag::ENCODING != 0 {
            info.encoding = Some(decode_zint(reader)?);
        }
        if flags & data_info_flag::TIMESTAMP != 0 {
            info.timestamp = Some(Timestamp::decode(reader)?);
        }
        Ok(info)
    }
}

#[repr(u8)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SubMode {
    #[default]
    Push = 0,
    Pull = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Period {
    pub origin: u64,
    pub period: u64,
    pub duration: u64,
}

impl Period {
    pub fn encode<W: Writer>(&self, writer: &mut W) -> ZResult<()> {
        encode_zint(writer, self.origin)?;
        encode_zint(writer, self.period)?;
        encode_zint(writer, self.duration)
    }

    pub fn decode(reader: &mut ZSlice<'_>) -> ZResult<Self> {
        let mut field = || decode_zint(reader).map_err(|_| ZError::ParsePeriod);
        Ok(Period {
            origin: field()?,
            period: field()?,
            duration: field()?,
        })
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SubInfo {
    pub mode: SubMode,
    pub period: Option<Period>,
}

const SUBMODE_PERIOD: u8 = 0x80;
const SUBMODE_MASK: u8 = 0x7f;

impl SubInfo {
    /// Only the default push mode without a period may be left off the wire.
    pub fn is_default(&self) -> bool {
        self.mode == SubMode::Push && self.period.is_none()
    }

    pub fn encode<W: Writer>(&self, writer: &mut W) -> ZResult<()> {
        let mut byte = self.mode as u8;
        if self.period.is_some() {
            byte |= SUBMODE_PERIOD;
        }
        writer.write_u8(byte)?;
        if let Some(period) = &self.period {
            period.encode(writer)?;
        }
        Ok(())
    }

    pub fn decode(reader: &mut ZSlice<'_>) -> ZResult<Self> {
        let byte = decode_u8(reader).map_err(|_| ZError::ParseSubmode)?;
        let mode = match byte & SUBMODE_MASK {
            0 => SubMode::Push,
            1 => SubMode::Pull,
            _ => return Err(ZError::ParseSubmode),
        };
        let period = if byte & SUBMODE_PERIOD != 0 {
            Some(Period::decode(reader)?)
        } else {
            None
        };
        Ok(SubInfo { mode, period })
    }
}

#[repr(u8)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConsolidationMode {
    None = 0,
    Lazy = 1,
    #[default]
    Full = 2,
}

impl ConsolidationMode {
    fn from_bits(bits: u8) -> ZResult<Self> {
        match bits {
            0 => Ok(Self::None),
            1 => Ok(Self::Lazy),
            2 => Ok(Self::Full),
            _ => Err(ZError::ParseConsolidation),
        }
    }
}

/// Consolidation applied at the first routers, the last router and the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct QueryConsolidation {
    pub first_routers: ConsolidationMode,
    pub last_router: ConsolidationMode,
    pub reception: ConsolidationMode,
}

impl Default for QueryConsolidation {
    fn default() -> Self {
        QueryConsolidation {
            first_routers: ConsolidationMode::Lazy,
            last_router: ConsolidationMode::Lazy,
            reception: ConsolidationMode::Full,
        }
    }
}

impl QueryConsolidation {
    pub fn encode<W: Writer>(&self, writer: &mut W) -> ZResult<()> {
        let byte = ((self.first_routers as u8) << 4)
            | ((self.last_router as u8) << 2)
            | self.reception as u8;
        writer.write_u8(byte)?;
        Ok(())
    }

    pub fn decode<R: Reader>(reader: &mut R) -> ZResult<Self> {
        let byte = reader.read_u8().map_err(|_| ZError::ParseConsolidation)?;
        if byte & 0xc0 != 0 {
            return Err(ZError::ParseConsolidation);
        }
        Ok(QueryConsolidation {
            first_routers: ConsolidationMode::from_bits((byte >> 4) & 0x03)?,
            last_router: ConsolidationMode::from_bits((byte >> 2) & 0x03)?,
            reception: ConsolidationMode::from_bits(byte & 0x03)?,
        })
    }
}
