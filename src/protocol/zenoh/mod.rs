//! Data and declaration messages, carried inside frames.

use crate::{
    iobuf::{Reader, Writer, ZSlice},
    protocol::{decode_u8, mid},
    result::{ZError, ZResult},
};

pub mod data;
pub mod declare;
pub mod pull;
pub mod query;
pub mod reply;

pub use data::Data;
pub use declare::{Declaration, Declare};
pub use pull::Pull;
pub use query::Query;
pub use reply::{Reply, ReplyData};

use data::Z_MID_DATA;
use declare::Z_MID_DECLARE;
use pull::Z_MID_PULL;
use query::Z_MID_QUERY;
use reply::Z_MID_REPLY;

/// Flag shared by every message carrying a [`crate::protocol::core::ResKey`]: the
/// key has a suffix string.
pub const FLAG_K: u8 = 1 << 7;

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ZenohBody<'a> {
    Declare(Declare<'a>),
    Data(Data<'a>),
    Query(Query<'a>),
    Reply(Reply<'a>),
    Pull(Pull<'a>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ZenohMessage<'a> {
    pub body: ZenohBody<'a>,
}

impl<'a> From<ZenohBody<'a>> for ZenohMessage<'a> {
    fn from(body: ZenohBody<'a>) -> Self {
        ZenohMessage { body }
    }
}

macro_rules! impl_from_body {
    ($($variant:ident),*) => {
        $(impl<'a> From<$variant<'a>> for ZenohMessage<'a> {
            fn from(m: $variant<'a>) -> Self {
                ZenohMessage {
                    body: ZenohBody::$variant(m),
                }
            }
        })*
    };
}

impl_from_body!(Declare, Data, Query, Reply, Pull);

impl<'a> ZenohMessage<'a> {
    pub fn encode<W: Writer>(&self, writer: &mut W) -> ZResult<()> {
        match &self.body {
            ZenohBody::Declare(m) => m.encode(writer),
            ZenohBody::Data(m) => m.encode(writer),
            ZenohBody::Query(m) => m.encode(writer),
            ZenohBody::Reply(m) => m.encode(writer),
            ZenohBody::Pull(m) => m.encode(writer),
        }
    }

    pub fn decode(reader: &mut ZSlice<'a>) -> ZResult<Self> {
        let header = decode_u8(reader)?;

        let body = match mid(header) {
            Z_MID_DECLARE => ZenohBody::Declare(Declare::decode(reader, header)?),
            Z_MID_DATA => ZenohBody::Data(Data::decode(reader, header)?),
            Z_MID_QUERY => ZenohBody::Query(Query::decode(reader, header)?),
            Z_MID_REPLY => ZenohBody::Reply(Reply::decode(reader, header)?),
            Z_MID_PULL => ZenohBody::Pull(Pull::decode(reader, header)?),
            _ => {
                zwarn!("Unknown zenoh message id {}", mid(header));
                return Err(ZError::ParseZenohMessage);
            }
        };

        Ok(ZenohMessage { body })
    }
}

/// Iterates over zenoh messages serialized back to back.
pub struct ZenohMessages<'a> {
    reader: ZSlice<'a>,
    failed: bool,
}

impl<'a> ZenohMessages<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        ZenohMessages {
            reader: ZSlice::new(bytes),
            failed: false,
        }
    }
}

impl<'a> Iterator for ZenohMessages<'a> {
    type Item = ZResult<ZenohMessage<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || !self.reader.can_read() {
            return None;
        }
        let msg = ZenohMessage::decode(&mut self.reader);
        self.failed = msg.is_err();
        Some(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::core::ResKey;

    #[test]
    fn several_messages_back_to_back() {
        let mut bytes = std::vec::Vec::new();
        Data::new(ResKey::name("a/b"), b"one").encode(&mut bytes).unwrap();
        Reply::final_for(3).encode(&mut bytes).unwrap();

        let msgs: std::vec::Vec<_> = ZenohMessages::new(&bytes)
            .collect::<ZResult<_>>()
            .unwrap();
        assert_eq!(msgs.len(), 2);
        assert!(matches!(&msgs[0].body, ZenohBody::Data(d) if d.payload == b"one"));
        assert_eq!(msgs[1].body, ZenohBody::Reply(Reply::final_for(3)));
    }

    #[test]
    fn transport_id_inside_a_frame_is_rejected() {
        let bytes = [0x0a, 0x00];
        assert_eq!(
            ZenohMessage::decode(&mut ZSlice::new(&bytes)),
            Err(ZError::ParseZenohMessage)
        );
    }
}
