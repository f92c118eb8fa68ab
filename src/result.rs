use thiserror::Error;

use crate::iobuf::DidntWrite;

/// Every error the stack can surface.
///
/// The set is closed: parse failures are classified by the field that could not be
/// decoded, transport failures by the step that failed, and a terminated session
/// records one of these as its cause.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ZError {
    #[error("Invalid locator")]
    InvalidLocator,
    #[error("Unsupported locator scheme")]
    UnsupportedScheme,

    #[error("Failed to parse u8")]
    ParseUint8,
    #[error("Failed to parse zint")]
    ParseZInt,
    #[error("Failed to parse bytes")]
    ParseBytes,
    #[error("Failed to parse string")]
    ParseString,

    #[error("Failed to open transport")]
    TransportOpenFailed,
    #[error("Generic I/O error")]
    IoGeneric,
    #[error("No space left in buffer")]
    NoBufferSpace,
    #[error("Connection closed")]
    TxConnection,

    #[error("Failed to parse consolidation")]
    ParseConsolidation,
    #[error("Failed to parse declaration")]
    ParseDeclaration,
    #[error("Failed to parse payload")]
    ParsePayload,
    #[error("Failed to parse period")]
    ParsePeriod,
    #[error("Failed to parse properties")]
    ParseProperties,
    #[error("Failed to parse property")]
    ParseProperty,
    #[error("Failed to parse resource key")]
    ParseResourceKey,
    #[error("Failed to parse transport message")]
    ParseTransportMessage,
    #[error("Failed to parse submode")]
    ParseSubmode,
    #[error("Failed to parse timestamp")]
    ParseTimestamp,
    #[error("Failed to parse zenoh message")]
    ParseZenohMessage,
    #[error("Unexpected message")]
    UnexpectedMessage,
    #[error("Resource declaration failed")]
    ResourceDeclarationFailed,

    #[error("Lease expired")]
    LeaseExpired,
}

pub type ZResult<T> = core::result::Result<T, ZError>;

impl From<DidntWrite> for ZError {
    fn from(_: DidntWrite) -> Self {
        ZError::NoBufferSpace
    }
}

impl ZError {
    /// True for failures caused by malformed input rather than by the local side.
    pub fn is_parse_error(&self) -> bool {
        matches!(
            self,
            ZError::ParseUint8
                | ZError::ParseZInt
                | ZError::ParseBytes
                | ZError::ParseString
                | ZError::ParseConsolidation
                | ZError::ParseDeclaration
                | ZError::ParsePayload
                | ZError::ParsePeriod
                | ZError::ParseProperties
                | ZError::ParseProperty
                | ZError::ParseResourceKey
                | ZError::ParseTransportMessage
                | ZError::ParseSubmode
                | ZError::ParseTimestamp
                | ZError::ParseZenohMessage
        )
    }
}
