//! # Query message
//!
//! ```text
//!  7 6 5 4 3 2 1 0
//! +-+-+-+-+-+-+-+-+
//! |K|T|X|  QUERY  |
//! +-+-+-+---------+
//! ~    ResKey     ~ if K==1 then the key carries a suffix
//! +---------------+
//! ~   predicate   ~
//! +---------------+
//! %      qid      %
//! +---------------+
//! %     target    % if T==1
//! +---------------+
//! ~ consolidation ~
//! +---------------+
//! ```
//!
//! Replies to a query carry its `qid`.

use crate::{
    iobuf::{Writer, ZSlice},
    protocol::{
        core::{QueryConsolidation, ResKey},
        decode_str, decode_zint, encode_str, encode_zint, has_flag,
    },
    result::ZResult,
};

use super::FLAG_K;

pub(crate) const Z_MID_QUERY: u8 = 0x0d;

pub mod flag {
    pub const T: u8 = 1 << 6; // 0x40 QueryTarget   if T==1 then the query target is present
    pub const K: u8 = super::FLAG_K; // 0x80 ResourceKey   if K==1 then the key has a suffix
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Query<'a> {
    pub key: ResKey<'a>,
    pub predicate: &'a str,
    pub qid: u64,
    pub target: Option<u64>,
    pub consolidation: QueryConsolidation,
}

impl<'a> Query<'a> {
    pub fn header(&self) -> u8 {
        let mut header = Z_MID_QUERY;
        if self.target.is_some() {
            header |= flag::T;
        }
        if self.key.has_suffix() {
            header |= FLAG_K;
        }
        header
    }

    pub fn encode<W: Writer>(&self, writer: &mut W) -> ZResult<()> {
        writer.write_u8(self.header())?;
        self.key.encode(writer)?;
        encode_str(writer, self.predicate)?;
        encode_zint(writer, self.qid)?;
        if let Some(target) = self.target {
            encode_zint(writer, target)?;
        }
        self.consolidation.encode(writer)
    }

    pub fn decode(reader: &mut ZSlice<'a>, header: u8) -> ZResult<Self> {
        let key = ResKey::decode(reader, has_flag(header, flag::K))?;
        let predicate = decode_str(reader)?;
        let qid = decode_zint(reader)?;
        let target = if has_flag(header, flag::T) {
            Some(decode_zint(reader)?)
        } else {
            None
        };
        let consolidation = QueryConsolidation::decode(reader)?;

        Ok(Query {
            key,
            predicate,
            qid,
            target,
            consolidation,
        })
    }
}
