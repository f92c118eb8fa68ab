//! # Open message
//!
//! NOTE: 16 bits (2 bytes) may be prepended to the serialized message indicating the total length
//!       in bytes of the message, resulting in the maximum length of a message being 65_535 bytes.
//!       This is necessary in those stream-oriented transports (e.g., TCP) that do not preserve
//!       the boundary of the serialized messages. The length is encoded as little-endian.
//!       In any case, the length of a message must not exceed 65_535 bytes.
//!
//! The OPEN message is sent on a link to open a session with the peer reachable on it. The
//! initiator MUST send an OPEN message with the A flag set to 0. If the peer deems appropriate
//! to open the session it MUST reply with an OPEN message with the A flag set to 1, called
//! ACCEPT, otherwise it MAY reply with a [`super::Close`].
//!
//! ```text
//!     A                   B
//!     |       OPEN        |
//!     |------------------>|
//!     |                   |
//!     |      ACCEPT       |
//!     |<------------------|
//!     |                   |
//! ```
//!
//! Flags:
//! - A Accept        if A==1 then the message is an Accept, otherwise an Open
//! - T Lease period  if T==1 then the lease period is in seconds else in milliseconds
//! - S SN Resolution if S==1 then the sequence number resolution is present
//!
//! ```text
//!  7 6 5 4 3 2 1 0          7 6 5 4 3 2 1 0
//! +-+-+-+-+-+-+-+-+        +-+-+-+-+-+-+-+-+
//! |S|T|0|   OPEN  |        |S|T|1|   OPEN  |
//! +-+-+-+---------+        +-+-+-+---------+
//! |    version    |        %    whatami    %
//! +---------------+        +---------------+
//! %    whatami    %        ~     opid      ~ -- PeerID of the Open sender
//! +---------------+        +---------------+
//! ~      pid      ~        ~     apid      ~ -- PeerID of the Accept sender
//! +---------------+        +---------------+
//! %     lease     %        %     lease     %
//! +---------------+        +---------------+
//! %  initial_sn   %        %  initial_sn   %
//! +---------------+        +---------------+
//! % sn_resolution % if S   % sn_resolution % if S
//! +---------------+        +---------------+
//! ~  [Property]   ~
//! +---------------+
//! ```
//!
//! The sequence number resolution in the ACCEPT MUST be less than or equal to the one proposed
//! in the OPEN. The initial SN MUST be lower than the agreed resolution.

use heapless::Vec;

use crate::{
    iobuf::{Writer, ZSlice},
    protocol::{
        core::{decode_properties, encode_properties, Property},
        decode_bytes, decode_u8, decode_zint, encode_bytes, encode_u8, encode_zint, has_flag,
        whatami::WhatAmI,
    },
    result::{ZError, ZResult},
    Z_SN_RESOLUTION,
};

use super::Z_OPEN_MAX_PROPERTIES;

pub(crate) const Z_MID_T_OPEN: u8 = 0x04;

pub mod flag {
    pub const A: u8 = 1 << 5; // 0x20 Accept        if A==1 then the message is an Accept
    pub const T: u8 = 1 << 6; // 0x40 Lease period  if T==1 then the lease period is in seconds else in milliseconds
    pub const S: u8 = 1 << 7; // 0x80 SN Resolution if S==1 then the SN resolution is present
}

fn lease_flag(lease: u64) -> u8 {
    if lease % 1000 == 0 {
        flag::T
    } else {
        0
    }
}

fn encode_lease<W: Writer>(writer: &mut W, header: u8, lease: u64) -> ZResult<()> {
    if has_flag(header, flag::T) {
        encode_zint(writer, lease / 1000)
    } else {
        encode_zint(writer, lease)
    }
}

fn decode_lease(reader: &mut ZSlice<'_>, header: u8) -> ZResult<u64> {
    let lease = decode_zint(reader)?;
    if has_flag(header, flag::T) {
        lease.checked_mul(1000).ok_or(ZError::ParseZInt)
    } else {
        Ok(lease)
    }
}

fn decode_whatami(reader: &mut ZSlice<'_>) -> ZResult<WhatAmI> {
    WhatAmI::try_from_u64(decode_zint(reader)?)
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Open<'a> {
    pub version: u8,
    pub whatami: WhatAmI,
    pub pid: &'a [u8],
    /// Milliseconds.
    pub lease: u64,
    pub initial_sn: u64,
    pub sn_resolution: u64,
    pub properties: Vec<Property<'a>, Z_OPEN_MAX_PROPERTIES>,
}

impl<'a> Open<'a> {
    pub fn header(&self) -> u8 {
        let mut header = Z_MID_T_OPEN | lease_flag(self.lease);
        if self.sn_resolution != Z_SN_RESOLUTION {
            header |= flag::S;
        }
        header
    }

    pub fn encode<W: Writer>(&self, writer: &mut W) -> ZResult<()> {
        zdebug!("Encoding _Z_MID_T_OPEN");

        let header = self.header();
        writer.write_u8(header)?;

        encode_u8(writer, self.version)?;
        encode_zint(writer, self.whatami as u64)?;
        encode_bytes(writer, self.pid)?;
        encode_lease(writer, header, self.lease)?;
        encode_zint(writer, self.initial_sn)?;
        if has_flag(header, flag::S) {
            encode_zint(writer, self.sn_resolution)?;
        }
        encode_properties(writer, &self.properties)?;

        Ok(())
    }

    pub fn decode(reader: &mut ZSlice<'a>, header: u8) -> ZResult<Self> {
        zdebug!("Decoding _Z_MID_T_OPEN");

        let version = decode_u8(reader)?;
        let whatami = decode_whatami(reader)?;
        let pid = decode_bytes(reader)?;
        let lease = decode_lease(reader, header)?;
        let initial_sn = decode_zint(reader)?;
        let sn_resolution = if has_flag(header, flag::S) {
            decode_zint(reader)?
        } else {
            Z_SN_RESOLUTION
        };
        let properties = decode_properties(reader)?;

        Ok(Open {
            version,
            whatami,
            pid,
            lease,
            initial_sn,
            sn_resolution,
            properties,
        })
    }

    pub fn property(&self, key: u64) -> Option<&'a [u8]> {
        self.properties.iter().find(|p| p.key == key).map(|p| p.value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Accept<'a> {
    pub whatami: WhatAmI,
    pub opid: &'a [u8],
    pub apid: &'a [u8],
    /// Milliseconds.
    pub lease: u64,
    pub initial_sn: u64,
    pub sn_resolution: u64,
}

impl<'a> Accept<'a> {
    pub fn header(&self) -> u8 {
        let mut header = Z_MID_T_OPEN | flag::A | lease_flag(self.lease);
        if self.sn_resolution != Z_SN_RESOLUTION {
            header |= flag::S;
        }
        header
    }

    pub fn encode<W: Writer>(&self, writer: &mut W) -> ZResult<()> {
        zdebug!("Encoding _Z_MID_T_ACCEPT");

        let header = self.header();
        writer.write_u8(header)?;

        encode_zint(writer, self.whatami as u64)?;
        encode_bytes(writer, self.opid)?;
        encode_bytes(writer, self.apid)?;
        encode_lease(writer, header, self.lease)?;
        encode_zint(writer, self.initial_sn)?;
        if has_flag(header, flag::S) {
            encode_zint(writer, self.sn_resolution)?;
        }

        Ok(())
    }

    pub fn decode(reader: &mut ZSlice<'a>, header: u8) -> ZResult<Self> {
        zdebug!("Decoding _Z_MID_T_ACCEPT");

        let whatami = decode_whatami(reader)?;
        let opid = decode_bytes(reader)?;
        let apid = decode_bytes(reader)?;
        let lease = decode_lease(reader, header)?;
        let initial_sn = decode_zint(reader)?;
        let sn_resolution = if has_flag(header, flag::S) {
            decode_zint(reader)?
        } else {
            Z_SN_RESOLUTION
        };

        Ok(Accept {
            whatami,
            opid,
            apid,
            lease,
            initial_sn,
            sn_resolution,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iobuf::IoBuf;
    use crate::protocol::core::property;
    use crate::protocol::transport::{TransportBody, TransportMessage};
    use crate::Z_PROTO_VERSION;

    fn open(lease: u64, sn_resolution: u64) -> Open<'static> {
        let mut properties = Vec::new();
        properties
            .push(Property {
                key: property::USER,
                value: b"user",
            })
            .unwrap();
        Open {
            version: Z_PROTO_VERSION,
            whatami: WhatAmI::Client,
            pid: &[1, 2, 3],
            lease,
            initial_sn: 42,
            sn_resolution,
            properties,
        }
    }

    #[test]
    fn open_lease_in_seconds_uses_t_flag() {
        let msg = open(10_000, Z_SN_RESOLUTION);
        assert!(has_flag(msg.header(), flag::T));
        assert!(!has_flag(msg.header(), flag::S));

        let mut buf = IoBuf::<64>::new();
        msg.encode(&mut buf).unwrap();
        let decoded = TransportMessage::decode(&mut buf.reader()).unwrap();
        assert_eq!(decoded.body, TransportBody::Open(msg));
    }

    #[test]
    fn open_with_custom_resolution_and_odd_lease() {
        let msg = open(1_500, 1 << 16);
        assert!(!has_flag(msg.header(), flag::T));
        assert!(has_flag(msg.header(), flag::S));

        let mut buf = IoBuf::<64>::new();
        msg.encode(&mut buf).unwrap();
        match TransportMessage::decode(&mut buf.reader()).unwrap().body {
            TransportBody::Open(o) => {
                assert_eq!(o.lease, 1_500);
                assert_eq!(o.sn_resolution, 1 << 16);
                assert_eq!(o.property(property::USER), Some(&b"user"[..]));
                assert_eq!(o.property(property::PASSWORD), None);
            }
            other => panic!("unexpected {other:?}"),
        };
    }

    #[test]
    fn accept_is_distinguished_by_a_flag() {
        let msg = Accept {
            whatami: WhatAmI::Router,
            opid: &[1, 2, 3],
            apid: &[9],
            lease: 10_000,
            initial_sn: 7,
            sn_resolution: Z_SN_RESOLUTION,
        };
        let mut buf = IoBuf::<64>::new();
        msg.encode(&mut buf).unwrap();
        assert_eq!(
            TransportMessage::decode(&mut buf.reader()).unwrap().body,
            TransportBody::Accept(msg)
        );
    }

    #[test]
    fn truncated_open_fails() {
        let msg = open(10_000, Z_SN_RESOLUTION);
        let mut buf = IoBuf::<64>::new();
        msg.encode(&mut buf).unwrap();
        let bytes = buf.as_slice();
        for cut in 1..bytes.len() {
            assert!(TransportMessage::decode(&mut ZSlice::new(&bytes[..cut])).is_err());
        }
    }
}
