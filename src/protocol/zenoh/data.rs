//! # Data message
//!
//! ```text
//!  7 6 5 4 3 2 1 0
//! +-+-+-+-+-+-+-+-+
//! |K|I|D|  DATA   |
//! +-+-+-+---------+
//! ~    ResKey     ~ if K==1 then the key carries a suffix
//! +---------------+
//! ~    DataInfo   ~ if I==1
//! +---------------+
//! ~    Payload    ~
//! +---------------+
//! ```

use crate::{
    iobuf::{Writer, ZSlice},
    protocol::{
        core::{DataInfo, ResKey},
        decode_bytes, encode_bytes, has_flag,
    },
    result::{ZError, ZResult},
};

use super::FLAG_K;

pub(crate) const Z_MID_DATA: u8 = 0x0c;

pub mod flag {
    pub const D: u8 = 1 << 5; // 0x20 Dropping      if D==1 then the message can be dropped
    pub const I: u8 = 1 << 6; // 0x40 DataInfo      if I==1 then DataInfo is present
    pub const K: u8 = super::FLAG_K; // 0x80 ResourceKey   if K==1 then the key has a suffix
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Data<'a> {
    pub key: ResKey<'a>,
    pub info: Option<DataInfo<'a>>,
    pub payload: &'a [u8],
    pub droppable: bool,
}

impl<'a> Data<'a> {
    pub fn new(key: ResKey<'a>, payload: &'a [u8]) -> Self {
        Data {
            key,
            info: None,
            payload,
            droppable: false,
        }
    }

    pub fn header(&self) -> u8 {
        let mut header = Z_MID_DATA;
        if self.droppable {
            header |= flag::D;
        }
        if self.info.is_some() {
            header |= flag::I;
        }
        if self.key.has_suffix() {
            header |= FLAG_K;
        }
        header
    }

    pub fn encode<W: Writer>(&self, writer: &mut W) -> ZResult<()> {
        writer.write_u8(self.header())?;
        self.key.encode(writer)?;
        if let Some(info) = &self.info {
            info.encode(writer)?;
        }
        encode_bytes(writer, self.payload)
    }

    pub fn decode(reader: &mut ZSlice<'a>, header: u8) -> ZResult<Self> {
        let key = ResKey::decode(reader, has_flag(header, flag::K))?;
        let info = if has_flag(header, flag::I) {
            Some(DataInfo::decode(reader)?)
        } else {
            None
        };
        let payload = decode_bytes(reader).map_err(|_| ZError::ParsePayload)?;

        Ok(Data {
            key,
            info,
            payload,
            droppable: has_flag(header, flag::D),
        })
    }
}
