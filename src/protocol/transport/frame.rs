//! # Frame message
//!
//! A FRAME carries zenoh messages on one channel, stamped with the channel's sequence
//! number. A message too large for one batch is split over several FRAMEs with the F
//! flag set; the last of them also has the E flag.
//!
//! ```text
//!  7 6 5 4 3 2 1 0
//! +-+-+-+-+-+-+-+-+
//! |E|F|R|  FRAME  |
//! +-+-+-+---------+
//! %      SN       %
//! +---------------+
//! %    offset     % if Flag(F)==1 -- position of the fragment in the whole message
//! +---------------+
//! ~  [FramePayload] ~ -- up to the end of the batch
//! +---------------+
//! ```
//!
//! - if F==0 the payload is a sequence of zenoh messages;
//! - if F==1 the payload is a fragment of one serialized zenoh message.

use crate::{
    iobuf::{Writer, ZSlice},
    protocol::{core::Reliability, decode_zint, encode_zint, has_flag, zenoh::ZenohMessages, Varint},
    result::ZResult,
};

pub(crate) const Z_MID_T_FRAME: u8 = 0x0a;

pub mod flag {
    pub const R: u8 = 1 << 5; // 0x20 Reliable      if R==1 then the frame is reliable
    pub const F: u8 = 1 << 6; // 0x40 Fragment      if F==1 then the frame is a fragment
    pub const E: u8 = 1 << 7; // 0x80 End           if E==1 then it is the last fragment
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FramePayload<'a> {
    /// Serialized zenoh messages, back to back.
    Messages(&'a [u8]),
    Fragment {
        offset: u64,
        last: bool,
        data: &'a [u8],
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Frame<'a> {
    pub reliability: Reliability,
    pub sn: u64,
    pub payload: FramePayload<'a>,
}

impl<'a> Frame<'a> {
    /// Bytes needed in front of the payload in the worst case.
    pub const MAX_HEADER_LEN: usize = 1 + 2 * Varint::<u64>::MAX_LEN;

    pub fn header(&self) -> u8 {
        let fragment = match self.payload {
            FramePayload::Messages(_) => None,
            FramePayload::Fragment { last, .. } => Some(last),
        };
        Self::header_for(self.reliability, fragment)
    }

    fn header_for(reliability: Reliability, fragment: Option<bool>) -> u8 {
        let mut header = Z_MID_T_FRAME;
        if reliability == Reliability::Reliable {
            header |= flag::R;
        }
        match fragment {
            Some(true) => header |= flag::F | flag::E,
            Some(false) => header |= flag::F,
            None => {}
        }
        header
    }

    /// Writes everything but the payload, so zenoh messages can be serialized
    /// directly after it.
    pub fn encode_header<W: Writer>(
        writer: &mut W,
        reliability: Reliability,
        sn: u64,
        fragment: Option<(u64, bool)>,
    ) -> ZResult<()> {
        writer.write_u8(Self::header_for(reliability, fragment.map(|(_, last)| last)))?;
        encode_zint(writer, sn)?;
        if let Some((offset, _)) = fragment {
            encode_zint(writer, offset)?;
        }
        Ok(())
    }

    pub fn encode<W: Writer>(&self, writer: &mut W) -> ZResult<()> {
        match self.payload {
            FramePayload::Messages(bytes) => {
                Self::encode_header(writer, self.reliability, self.sn, None)?;
                writer.write_exact(bytes)?;
            }
            FramePayload::Fragment { offset, last, data } => {
                Self::encode_header(writer, self.reliability, self.sn, Some((offset, last)))?;
                writer.write_exact(data)?;
            }
        }
        Ok(())
    }

    pub fn decode(reader: &mut ZSlice<'a>, header: u8) -> ZResult<Self> {
        let reliability = if has_flag(header, flag::R) {
            Reliability::Reliable
        } else {
            Reliability::BestEffort
        };
        let sn = decode_zint(reader)?;
        let payload = if has_flag(header, flag::F) {
            let offset = decode_zint(reader)?;
            FramePayload::Fragment {
                offset,
                last: has_flag(header, flag::E),
                data: reader.read_to_end(),
            }
        } else {
            FramePayload::Messages(reader.read_to_end())
        };

        Ok(Frame {
            reliability,
            sn,
            payload,
        })
    }

    /// The zenoh messages of a non-fragmented frame; empty for a fragment.
    pub fn messages(&self) -> ZenohMessages<'a> {
        match self.payload {
            FramePayload::Messages(bytes) => ZenohMessages::new(bytes),
            FramePayload::Fragment { .. } => ZenohMessages::new(&[]),
        }
    }
}
