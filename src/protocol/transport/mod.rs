//! Session-control messages exchanged between two transports.
//!
//! A batch on the wire is a sequence of transport messages. A [`Frame`] always
//! extends to the end of its batch, so it is the last message of any batch it is in.

use crate::{
    iobuf::{Reader, Writer, ZSlice},
    protocol::{decode_u8, mid},
    result::{ZError, ZResult},
};

pub mod close;
pub mod frame;
pub mod open;
pub mod scout;

pub use close::{Close, KeepAlive};
pub use frame::{Frame, FramePayload};
pub use open::{Accept, Open};
pub use scout::{Hello, Scout};

use close::{Z_MID_T_CLOSE, Z_MID_T_KEEP_ALIVE};
use frame::Z_MID_T_FRAME;
use open::Z_MID_T_OPEN;
use scout::{Z_MID_T_HELLO, Z_MID_T_SCOUT};

/// Upper bound on locators carried by one Hello.
pub const Z_HELLO_MAX_LOCATORS: usize = 8;
/// Upper bound on properties carried by one Open.
pub const Z_OPEN_MAX_PROPERTIES: usize = 4;

#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportBody<'a> {
    Scout(Scout),
    Hello(Hello<'a>),
    Open(Open<'a>),
    Accept(Accept<'a>),
    Close(Close<'a>),
    KeepAlive(KeepAlive<'a>),
    Frame(Frame<'a>),
}

#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TransportMessage<'a> {
    pub body: TransportBody<'a>,
}

impl<'a> From<TransportBody<'a>> for TransportMessage<'a> {
    fn from(body: TransportBody<'a>) -> Self {
        TransportMessage { body }
    }
}

impl<'a> TransportMessage<'a> {
    pub fn encode<W: Writer>(&self, writer: &mut W) -> ZResult<()> {
        match &self.body {
            TransportBody::Scout(m) => m.encode(writer),
            TransportBody::Hello(m) => m.encode(writer),
            TransportBody::Open(m) => m.encode(writer),
            TransportBody::Accept(m) => m.encode(writer),
            TransportBody::Close(m) => m.encode(writer),
            TransportBody::KeepAlive(m) => m.encode(writer),
            TransportBody::Frame(m) => m.encode(writer),
        }
    }

    pub fn decode(reader: &mut ZSlice<'a>) -> ZResult<Self> {
        let header = decode_u8(reader)?;

        let body = match mid(header) {
            Z_MID_T_SCOUT => TransportBody::Scout(Scout::decode(reader, header)?),
            Z_MID_T_HELLO => TransportBody::Hello(Hello::decode(reader, header)?),
            Z_MID_T_OPEN => {
                if header & open::flag::A == open::flag::A {
                    TransportBody::Accept(Accept::decode(reader, header)?)
                } else {
                    TransportBody::Open(Open::decode(reader, header)?)
                }
            }
            Z_MID_T_CLOSE => TransportBody::Close(Close::decode(reader, header)?),
            Z_MID_T_KEEP_ALIVE => TransportBody::KeepAlive(KeepAlive::decode(reader, header)?),
            Z_MID_T_FRAME => TransportBody::Frame(Frame::decode(reader, header)?),
            _ => {
                zwarn!("Unknown transport message id {}", mid(header));
                return Err(ZError::ParseTransportMessage);
            }
        };

        Ok(TransportMessage { body })
    }
}

/// Iterates over the transport messages of one batch.
pub struct TransportMessages<'a> {
    reader: ZSlice<'a>,
    failed: bool,
}

impl<'a> TransportMessages<'a> {
    pub fn new(batch: &'a [u8]) -> Self {
        TransportMessages {
            reader: ZSlice::new(batch),
            failed: false,
        }
    }
}

impl<'a> Iterator for TransportMessages<'a> {
    type Item = ZResult<TransportMessage<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || !self.reader.can_read() {
            return None;
        }
        let msg = TransportMessage::decode(&mut self.reader);
        self.failed = msg.is_err();
        Some(msg)
    }
}
