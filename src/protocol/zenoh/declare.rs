//! # Declare message
//!
//! ```text
//!  7 6 5 4 3 2 1 0
//! +-+-+-+-+-+-+-+-+
//! |X|X|X| DECLARE |
//! +-+-+-+---------+
//! ~ [Declaration] ~
//! +---------------+
//! ```
//!
//! Each declaration starts with its own header byte whose low 5 bits give its kind:
//!
//! ```text
//!  7 6 5 4 3 2 1 0
//! +-+-+-+-+-+-+-+-+
//! |K|S|X|  SUB    |
//! +-+-+-+---------+
//! ~    ResKey     ~ if K==1 then the key carries a suffix
//! +---------------+
//! ~    SubInfo    ~ if S==1, otherwise push mode without period
//! +---------------+
//! ```

use heapless::Vec;

use crate::{
    iobuf::{Writer, ZSlice},
    protocol::{
        core::{ResKey, SubInfo},
        decode_u8, decode_zint, encode_zint, has_flag, mid,
    },
    result::{ZError, ZResult},
};

use super::FLAG_K;

pub(crate) const Z_MID_DECLARE: u8 = 0x0b;

/// Declarations carried by a single Declare message.
pub const Z_DECLARE_MAX_DECLARATIONS: usize = 8;

pub mod id {
    pub const RESOURCE: u8 = 0x01;
    pub const PUBLISHER: u8 = 0x02;
    pub const SUBSCRIBER: u8 = 0x03;
    pub const QUERYABLE: u8 = 0x04;
    pub const FORGET_RESOURCE: u8 = 0x11;
    pub const FORGET_PUBLISHER: u8 = 0x12;
    pub const FORGET_SUBSCRIBER: u8 = 0x13;
    pub const FORGET_QUERYABLE: u8 = 0x14;
}

pub mod flag {
    pub const S: u8 = 1 << 6; // 0x40 SubMode       if S==1 then the subscription mode is present
    pub const K: u8 = super::FLAG_K; // 0x80 ResourceKey   if K==1 then the key has a suffix
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Declaration<'a> {
    Resource { rid: u64, key: ResKey<'a> },
    Publisher { key: ResKey<'a> },
    Subscriber { key: ResKey<'a>, info: SubInfo },
    Queryable { key: ResKey<'a>, kind: u64 },
    ForgetResource { rid: u64 },
    ForgetPublisher { key: ResKey<'a> },
    ForgetSubscriber { key: ResKey<'a> },
    ForgetQueryable { key: ResKey<'a> },
}

fn key_flag(key: &ResKey<'_>) -> u8 {
    if key.has_suffix() {
        FLAG_K
    } else {
        0
    }
}

impl<'a> Declaration<'a> {
    pub fn header(&self) -> u8 {
        match self {
            Declaration::Resource { key, .. } => id::RESOURCE | key_flag(key),
            Declaration::Publisher { key } => id::PUBLISHER | key_flag(key),
            Declaration::Subscriber { key, info } => {
                let mut header = id::SUBSCRIBER | key_flag(key);
                if !info.is_default() {
                    header |= flag::S;
                }
                header
            }
            Declaration::Queryable { key, .. } => id::QUERYABLE | key_flag(key),
            Declaration::ForgetResource { .. } => id::FORGET_RESOURCE,
            Declaration::ForgetPublisher { key } => id::FORGET_PUBLISHER | key_flag(key),
            Declaration::ForgetSubscriber { key } => id::FORGET_SUBSCRIBER | key_flag(key),
            Declaration::ForgetQueryable { key } => id::FORGET_QUERYABLE | key_flag(key),
        }
    }

    pub fn encode<W: Writer>(&self, writer: &mut W) -> ZResult<()> {
        let header = self.header();
        writer.write_u8(header)?;

        match self {
            Declaration::Resource { rid, key } => {
                encode_zint(writer, *rid)?;
                key.encode(writer)
            }
            Declaration::Subscriber { key, info } => {
                key.encode(writer)?;
                if has_flag(header, flag::S) {
                    info.encode(writer)?;
                }
                Ok(())
            }
            Declaration::Queryable { key, kind } => {
                key.encode(writer)?;
                encode_zint(writer, *kind)
            }
            Declaration::ForgetResource { rid } => encode_zint(writer, *rid),
            Declaration::Publisher { key }
            | Declaration::ForgetPublisher { key }
            | Declaration::ForgetSubscriber { key }
            | Declaration::ForgetQueryable { key } => key.encode(writer),
        }
    }

    pub fn decode(reader: &mut ZSlice<'a>) -> ZResult<Self> {
        let header = decode_u8(reader).map_err(|_| ZError::ParseDeclaration)?;
        let with_suffix = has_flag(header, flag::K);

        let decl = match mid(header) {
            id::RESOURCE => {
                let rid = decode_zint(reader).map_err(|_| ZError::ParseDeclaration)?;
                Declaration::Resource {
                    rid,
                    key: ResKey::decode(reader, with_suffix)?,
                }
            }
            id::PUBLISHER => Declaration::Publisher {
                key: ResKey::decode(reader, with_suffix)?,
            },
            id::SUBSCRIBER => {
                let key = ResKey::decode(reader, with_suffix)?;
                let info = if has_flag(header, flag::S) {
                    SubInfo::decode(reader)?
                } else {
                    SubInfo::default()
                };
                Declaration::Subscriber { key, info }
            }
            id::QUERYABLE => {
                let key = ResKey::decode(reader, with_suffix)?;
                let kind = decode_zint(reader).map_err(|_| ZError::ParseDeclaration)?;
                Declaration::Queryable { key, kind }
            }
            id::FORGET_RESOURCE => Declaration::ForgetResource {
                rid: decode_zint(reader).map_err(|_| ZError::ParseDeclaration)?,
            },
            id::FORGET_PUBLISHER => Declaration::ForgetPublisher {
                key: ResKey::decode(reader, with_suffix)?,
            },
            id::FORGET_SUBSCRIBER => Declaration::ForgetSubscriber {
                key: ResKey::decode(reader, with_suffix)?,
            },
            id::FORGET_QUERYABLE => Declaration::ForgetQueryable {
                key: ResKey::decode(reader, with_suffix)?,
            },
            _ => {
                zwarn!("Unknown declaration id {}", mid(header));
                return Err(ZError::ParseDeclaration);
            }
        };

        Ok(decl)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Declare<'a> {
    pub declarations: Vec<Declaration<'a>, Z_DECLARE_MAX_DECLARATIONS>,
}

impl<'a> Declare<'a> {
    pub fn single(decl: Declaration<'a>) -> Self {
        let mut declarations = Vec::new();
        // A fresh vector always has room for one element.
        let _ = declarations.push(decl);
        Declare { declarations }
    }

    pub fn header(&self) -> u8 {
        Z_MID_DECLARE
    }

    pub fn encode<W: Writer>(&self, writer: &mut W) -> ZResult<()> {
        writer.write_u8(self.header())?;
        encode_zint(writer, self.declarations.len() as u64)?;
        for d in &self.declarations {
            d.encode(writer)?;
        }
        Ok(())
    }

    pub fn decode(reader: &mut ZSlice<'a>, _header: u8) -> ZResult<Self> {
        let count = decode_zint(reader).map_err(|_| ZError::ParseDeclaration)?;
        if count > Z_DECLARE_MAX_DECLARATIONS as u64 {
            return Err(ZError::ParseDeclaration);
        }
        let mut declarations = Vec::new();
        for _ in 0..count {
            let d = Declaration::decode(reader)?;
            declarations.push(d).map_err(|_| ZError::ParseDeclaration)?;
        }
        Ok(Declare { declarations })
    }
}
