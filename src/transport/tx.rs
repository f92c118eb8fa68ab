//! Outgoing batches.
//!
//! Every write to a link is one batch. Streamed links prefix it with its length as a
//! little-endian `u16`. A zenoh message that does not fit in a batch is split over
//! several fragment frames, each taking the next sequence number of its channel.

use crate::{
    iobuf::{IoBuf, Writer},
    link::Link,
    platform::Platform,
    protocol::{
        core::Reliability,
        transport::{Frame, TransportMessage},
        zenoh::ZenohMessage,
    },
    result::{ZError, ZResult},
    Z_BATCH_SIZE, Z_FRAG_MAX_SIZE,
};

use super::seq::SnGenerator;

const STREAM_LEN_PREFIX: usize = 2;
pub(crate) const TX_BUF_SIZE: usize = Z_BATCH_SIZE + STREAM_LEN_PREFIX;

pub(crate) type TxBatch = IoBuf<TX_BUF_SIZE>;

/// Room for transport messages in one batch on `link`.
pub(crate) fn batch_size<P: Platform>(link: &Link<P>) -> usize {
    Z_BATCH_SIZE.min(usize::from(link.mtu))
}

/// Encodes one batch with `fill` and writes it to `link`.
pub(crate) fn write_batch<P, F>(link: &Link<P>, batch: &mut TxBatch, fill: F) -> ZResult<()>
where
    P: Platform,
    F: FnOnce(&mut TxBatch) -> ZResult<()>,
{
    batch.clear();
    let prefix = if link.cap.is_streamed() {
        batch.write_exact(&[0; STREAM_LEN_PREFIX])?;
        STREAM_LEN_PREFIX
    } else {
        0
    };

    fill(batch)?;

    let len = batch.len() - prefix;
    if len > batch_size(link) {
        return Err(ZError::NoBufferSpace);
    }
    if prefix > 0 {
        let len = u16::try_from(len).map_err(|_| ZError::NoBufferSpace)?;
        batch.patch_u16_le(0, len)?;
    }

    link.write_all(batch.as_slice())?;
    Ok(())
}

pub(crate) struct TxState {
    batch: TxBatch,
    /// A zenoh message is encoded here first, to decide whether it needs fragmenting.
    scratch: Vec<u8>,
    sn_reliable: SnGenerator,
    sn_best_effort: SnGenerator,
    /// Something was sent since the lease loop last looked.
    pub transmitted: bool,
}

impl TxState {
    pub fn new(initial_sn: u64, sn_resolution: u64) -> Self {
        TxState {
            batch: IoBuf::new(),
            scratch: Vec::new(),
            sn_reliable: SnGenerator::new(initial_sn, sn_resolution),
            sn_best_effort: SnGenerator::new(initial_sn, sn_resolution),
            transmitted: false,
        }
    }

    fn next_sn(&mut self, reliability: Reliability) -> u64 {
        match reliability {
            Reliability::Reliable => self.sn_reliable.get(),
            Reliability::BestEffort => self.sn_best_effort.get(),
        }
    }

    pub fn send_transport_message<P: Platform>(
        &mut self,
        link: &Link<P>,
        msg: &TransportMessage<'_>,
    ) -> ZResult<()> {
        write_batch(link, &mut self.batch, |b| msg.encode(b))
    }

    pub fn send_zenoh_message<P: Platform>(
        &mut self,
        link: &Link<P>,
        msg: &ZenohMessage<'_>,
        reliability: Reliability,
    ) -> ZResult<()> {
        self.scratch.clear();
        msg.encode(&mut self.scratch)?;

        let room = batch_size(link).saturating_sub(Frame::MAX_HEADER_LEN);
        if self.scratch.len() <= room {
            let sn = self.next_sn(reliability);
            let Self { batch, scratch, .. } = self;
            write_batch(link, batch, |b| {
                Frame::encode_header(b, reliability, sn, None)?;
                b.write_exact(&scratch[..])?;
                Ok(())
            })?;
        } else {
            self.send_fragments(link, reliability, room)?;
        }

        self.transmitted = true;
        Ok(())
    }

    fn send_fragments<P: Platform>(
        &mut self,
        link: &Link<P>,
        reliability: Reliability,
        room: usize,
    ) -> ZResult<()> {
        let total = self.scratch.len();
        if total > Z_FRAG_MAX_SIZE || room == 0 {
            zerror!("Message of {} bytes cannot be fragmented", total);
            return Err(ZError::NoBufferSpace);
        }
        zdebug!("Fragmenting message of {} bytes", total);

        let mut offset = 0;
        while offset < total {
            let end = total.min(offset + room);
            let last = end == total;
            let sn = self.next_sn(reliability);
            let Self { batch, scratch, .. } = self;
            let chunk = &scratch[offset..end];
            write_batch(link, batch, |b| {
                Frame::encode_header(b, reliability, sn, Some((offset as u64, last)))?;
                b.write_exact(chunk)?;
                Ok(())
            })?;
            offset = end;
        }
        Ok(())
    }
}
