//! # Pull message
//!
//! Asks the router for the samples buffered for a pull-mode subscription.
//!
//! ```text
//!  7 6 5 4 3 2 1 0
//! +-+-+-+-+-+-+-+-+
//! |K|N|F|  PULL   |
//! +-+-+-+---------+
//! ~    ResKey     ~ if K==1 then the key carries a suffix
//! +---------------+
//! %    pull_id    %
//! +---------------+
//! %  max_samples  % if N==1
//! +---------------+
//! ```

use crate::{
    iobuf::{Writer, ZSlice},
    protocol::{core::ResKey, decode_zint, encode_zint, has_flag},
    result::ZResult,
};

use super::FLAG_K;

pub(crate) const Z_MID_PULL: u8 = 0x0e;

pub mod flag {
    pub const F: u8 = 1 << 5; // 0x20 Final         if F==1 then it is the final pull
    pub const N: u8 = 1 << 6; // 0x40 MaxSamples    if N==1 then max_samples is present
    pub const K: u8 = super::FLAG_K; // 0x80 ResourceKey   if K==1 then the key has a suffix
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Pull<'a> {
    pub key: ResKey<'a>,
    pub pull_id: u64,
    pub max_samples: Option<u64>,
    pub is_final: bool,
}

impl<'a> Pull<'a> {
    pub fn header(&self) -> u8 {
        let mut header = Z_MID_PULL;
        if self.is_final {
            header |= flag::F;
        }
        if self.max_samples.is_some() {
            header |= flag::N;
        }
        if self.key.has_suffix() {
            header |= FLAG_K;
        }
        header
    }

    pub fn encode<W: Writer>(&self, writer: &mut W) -> ZResult<()> {
        writer.write_u8(self.header())?;
        self.key.encode(writer)?;
        encode_zint(writer, self.pull_id)?;
        if let Some(n) = self.max_samples {
            encode_zint(writer, n)?;
        }
        Ok(())
    }

    pub fn decode(reader: &mut ZSlice<'a>, header: u8) -> ZResult<Self> {
        let key = ResKey::decode(reader, has_flag(header, flag::K))?;
        let pull_id = decode_zint(reader)?;
        let max_samples = if has_flag(header, flag::N) {
            Some(decode_zint(reader)?)
        } else {
            None
        };
        Ok(Pull {
            key,
            pull_id,
            max_samples,
            is_final: has_flag(header, flag::F),
        })
    }
}
