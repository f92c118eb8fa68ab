//! # Scout and Hello messages
//!
//! A SCOUT asks the nodes reachable on a locator to identify themselves; each node
//! whose role matches `what` answers with a HELLO.
//!
//! ```text
//!  7 6 5 4 3 2 1 0
//! +-+-+-+-+-+-+-+-+
//! |X|W|I|  SCOUT  |
//! +-+-+-+---------+
//! ~     what      ~ if Flag(W)==1 -- bitmask of the roles to be scouted
//! +---------------+
//!
//!  7 6 5 4 3 2 1 0
//! +-+-+-+-+-+-+-+-+
//! |L|W|I|  HELLO  |
//! +-+-+-+---------+
//! ~      pid      ~ if Flag(I)==1 -- ZenohID of the replier
//! +---------------+
//! ~    whatami    ~ if Flag(W)==1 -- role of the replier
//! +---------------+
//! ~   [Locators]  ~ if Flag(L)==1 -- locators the replier can be reached on
//! +---------------+
//! ```

use heapless::Vec;

use crate::{
    iobuf::{Writer, ZSlice},
    protocol::{
        decode_bytes, decode_str, decode_zint, encode_bytes, encode_str, encode_zint, has_flag,
        whatami::{WhatAmI, WhatAmIMatcher},
    },
    result::{ZError, ZResult},
};

use super::Z_HELLO_MAX_LOCATORS;

pub(crate) const Z_MID_T_SCOUT: u8 = 0x01;
pub(crate) const Z_MID_T_HELLO: u8 = 0x02;

pub mod flag {
    pub const I: u8 = 1 << 5; // 0x20 PeerID      if I==1 then the PeerID is requested/present
    pub const W: u8 = 1 << 6; // 0x40 WhatAmI     if W==1 then WhatAmI is present
    pub const L: u8 = 1 << 7; // 0x80 Locators    if L==1 then Locators are present
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Scout {
    pub what: Option<WhatAmIMatcher>,
    pub pid_request: bool,
}

impl Scout {
    pub fn header(&self) -> u8 {
        let mut header = Z_MID_T_SCOUT;
        if self.pid_request {
            header |= flag::I;
        }
        if self.what.is_some() {
            header |= flag::W;
        }
        header
    }

    pub fn encode<W: Writer>(&self, writer: &mut W) -> ZResult<()> {
        writer.write_u8(self.header())?;
        if let Some(what) = self.what {
            encode_zint(writer, u64::from(what.0))?;
        }
        Ok(())
    }

    pub fn decode(reader: &mut ZSlice<'_>, header: u8) -> ZResult<Self> {
        let what = if has_flag(header, flag::W) {
            let what = decode_zint(reader)?;
            Some(WhatAmIMatcher(u8::try_from(what).map_err(|_| ZError::ParseZInt)?))
        } else {
            None
        };
        Ok(Scout {
            what,
            pid_request: has_flag(header, flag::I),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Hello<'a> {
    pub pid: Option<&'a [u8]>,
    pub whatami: Option<WhatAmI>,
    pub locators: Vec<&'a str, Z_HELLO_MAX_LOCATORS>,
}

impl<'a> Hello<'a> {
    pub fn header(&self) -> u8 {
        let mut header = Z_MID_T_HELLO;
        if self.pid.is_some() {
            header |= flag::I;
        }
        if self.whatami.is_some() {
            header |= flag::W;
        }
        if !self.locators.is_empty() {
            header |= flag::L;
        }
        header
    }

    pub fn encode<W: Writer>(&self, writer: &mut W) -> ZResult<()> {
        writer.write_u8(self.header())?;
        if let Some(pid) = self.pid {
            encode_bytes(writer, pid)?;
        }
        if let Some(whatami) = self.whatami {
            encode_zint(writer, whatami as u64)?;
        }
        if !self.locators.is_empty() {
            encode_zint(writer, self.locators.len() as u64)?;
            for l in &self.locators {
                encode_str(writer, l)?;
            }
        }
        Ok(())
    }

    pub fn decode(reader: &mut ZSlice<'a>, header: u8) -> ZResult<Self> {
        let pid = if has_flag(header, flag::I) {
            Some(decode_bytes(reader)?)
        } else {
            None
        };
        let whatami = if has_flag(header, flag::W) {
            Some(WhatAmI::try_from_u64(decode_zint(reader)?)?)
        } else {
            None
        };
        let mut locators = Vec::new();
        if has_flag(header, flag::L) {
            let n = decode_zint(reader)?;
            for _ in 0..n {
                let l = decode_str(reader)?;
                locators.push(l).map_err(|_| ZError::ParseTransportMessage)?;
            }
        }
        Ok(Hello {
            pid,
            whatami,
            locators,
        })
    }
}
