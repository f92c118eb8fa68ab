//! # Reply message
//!
//! ```text
//!  7 6 5 4 3 2 1 0
//! +-+-+-+-+-+-+-+-+
//! |K|X|F|  REPLY  |
//! +-+-+-+---------+
//! %      qid      %
//! +---------------+
//! ~    ResKey     ~ if F==0
//! +---------------+
//! ~    Payload    ~ if F==0
//! +---------------+
//! ```
//!
//! A final reply (F==1) carries no data: it tells the querier no more replies will
//! follow for `qid`.

use crate::{
    iobuf::{Writer, ZSlice},
    protocol::{core::ResKey, decode_bytes, decode_zint, encode_bytes, encode_zint, has_flag},
    result::{ZError, ZResult},
};

use super::FLAG_K;

pub(crate) const Z_MID_REPLY: u8 = 0x0f;

pub mod flag {
    pub const F: u8 = 1 << 5; // 0x20 Final         if F==1 then this is the final reply
    pub const K: u8 = super::FLAG_K; // 0x80 ResourceKey   if K==1 then the key has a suffix
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ReplyData<'a> {
    pub key: ResKey<'a>,
    pub payload: &'a [u8],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Reply<'a> {
    pub qid: u64,
    /// `None` for the final reply.
    pub data: Option<ReplyData<'a>>,
}

impl<'a> Reply<'a> {
    pub fn new(qid: u64, key: ResKey<'a>, payload: &'a [u8]) -> Self {
        Reply {
            qid,
            data: Some(ReplyData { key, payload }),
        }
    }

    pub fn final_for(qid: u64) -> Self {
        Reply { qid, data: None }
    }

    pub fn is_final(&self) -> bool {
        self.data.is_none()
    }

    pub fn header(&self) -> u8 {
        match &self.data {
            None => Z_MID_REPLY | flag::F,
            Some(d) if d.key.has_suffix() => Z_MID_REPLY | FLAG_K,
            Some(_) => Z_MID_REPLY,
        }
    }

    pub fn encode<W: Writer>(&self, writer: &mut W) -> ZResult<()> {
        writer.write_u8(self.header())?;
        encode_zint(writer, self.qid)?;
        if let Some(d) = &self.data {
            d.key.encode(writer)?;
            encode_bytes(writer, d.payload)?;
        }
        Ok(())
    }

    pub fn decode(reader: &mut ZSlice<'a>, header: u8) -> ZResult<Self> {
        let qid = decode_zint(reader)?;
        if has_flag(header, flag::F) {
            return Ok(Reply::final_for(qid));
        }
        let key = ResKey::decode(reader, has_flag(header, flag::K))?;
        let payload = decode_bytes(reader).map_err(|_| ZError::ParsePayload)?;
        Ok(Reply::new(qid, key, payload))
    }
}
