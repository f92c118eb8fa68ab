//! # Close and KeepAlive messages
//!
//! ```text
//!  7 6 5 4 3 2 1 0
//! +-+-+-+-+-+-+-+-+
//! |X|K|I|  CLOSE  |
//! +-+-+-+---------+
//! ~      pid      ~ if Flag(I)==1 -- PeerID of the entity sending the CLOSE message
//! +---------------+
//! |     reason    |
//! +---------------+
//!
//!  7 6 5 4 3 2 1 0
//! +-+-+-+-+-+-+-+-+
//! |X|X|I|  K_ALIVE|
//! +-+-+-+---------+
//! ~      pid      ~ if Flag(I)==1 -- PeerID of the entity sending the KEEP_ALIVE message
//! +---------------+
//! ```
//!
//! A KEEP_ALIVE only exists to refresh the lease of the receiver when the sender has
//! had nothing else to transmit.

use crate::{
    iobuf::{Writer, ZSlice},
    protocol::{decode_bytes, decode_u8, encode_bytes, encode_u8, has_flag},
    result::ZResult,
};

pub(crate) const Z_MID_T_CLOSE: u8 = 0x05;
pub(crate) const Z_MID_T_KEEP_ALIVE: u8 = 0x08;

pub mod flag {
    pub const I: u8 = 1 << 5; // 0x20 PeerID      if I==1 then the PeerID is present
    pub const K: u8 = 1 << 6; // 0x40 CloseLink   if K==1 then close the transport link only
}

pub mod reason {
    pub const GENERIC: u8 = 0x00;
    pub const UNSUPPORTED: u8 = 0x01;
    pub const INVALID: u8 = 0x02;
    pub const MAX_SESSIONS: u8 = 0x03;
    pub const MAX_LINKS: u8 = 0x04;
    pub const EXPIRED: u8 = 0x05;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Close<'a> {
    pub pid: Option<&'a [u8]>,
    pub reason: u8,
    pub link_only: bool,
}

impl<'a> Close<'a> {
    pub fn header(&self) -> u8 {
        let mut header = Z_MID_T_CLOSE;
        if self.pid.is_some() {
            header |= flag::I;
        }
        if self.link_only {
            header |= flag::K;
        }
        header
    }

    pub fn encode<W: Writer>(&self, writer: &mut W) -> ZResult<()> {
        writer.write_u8(self.header())?;
        if let Some(pid) = self.pid {
            encode_bytes(writer, pid)?;
        }
        encode_u8(writer, self.reason)
    }

    pub fn decode(reader: &mut ZSlice<'a>, header: u8) -> ZResult<Self> {
        let pid = if has_flag(header, flag::I) {
            Some(decode_bytes(reader)?)
        } else {
            None
        };
        let reason = decode_u8(reader)?;
        Ok(Close {
            pid,
            reason,
            link_only: has_flag(header, flag::K),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct KeepAlive<'a> {
    pub pid: Option<&'a [u8]>,
}

impl<'a> KeepAlive<'a> {
    pub fn header(&self) -> u8 {
        if self.pid.is_some() {
            Z_MID_T_KEEP_ALIVE | flag::I
        } else {
            Z_MID_T_KEEP_ALIVE
        }
    }

    pub fn encode<W: Writer>(&self, writer: &mut W) -> ZResult<()> {
        writer.write_u8(self.header())?;
        if let Some(pid) = self.pid {
            encode_bytes(writer, pid)?;
        }
        Ok(())
    }

    pub fn decode(reader: &mut ZSlice<'a>, header: u8) -> ZResult<Self> {
        let pid = if has_flag(header, flag::I) {
            Some(decode_bytes(reader)?)
        } else {
            None
        };
        Ok(KeepAlive { pid })
    }
}
