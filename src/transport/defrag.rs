use crate::Z_FRAG_MAX_SIZE;

/// Reassembles the fragments of one message on one channel of one peer.
///
/// Fragments carry their byte offset in the message. Offset 0 starts a new message
/// and throws away whatever was pending; any other fragment must continue exactly
/// where the buffer ends, or the pending message is dropped along with it.
#[derive(Debug, Default)]
pub(crate) struct DefragBuffer {
    buf: Vec<u8>,
    /// A message is being reassembled.
    active: bool,
}

impl DefragBuffer {
    pub fn is_empty(&self) -> bool {
        !self.active
    }

    pub fn clear(&mut self) {
        self.buf.clear();
        self.active = false;
    }

    /// Returns the whole message once its last fragment was pushed.
    pub fn push(&mut self, offset: u64, last: bool, data: &[u8]) -> Option<Vec<u8>> {
        if offset == 0 {
            if self.active {
                zwarn!("New fragmented message, discarding {} pending bytes", self.buf.len());
            }
            self.clear();
            self.active = true;
        } else if !self.active || offset != self.buf.len() as u64 {
            zwarn!(
                "Fragment at offset {} does not continue {} buffered bytes, discarding",
                offset,
                self.buf.len()
            );
            self.clear();
            return None;
        }

        if self.buf.len() + data.len() > Z_FRAG_MAX_SIZE {
            zwarn!("Fragmented message over {} bytes, discarding", Z_FRAG_MAX_SIZE);
            self.clear();
            return None;
        }
        self.buf.extend_from_slice(data);

        if last {
            self.active = false;
            Some(std::mem::take(&mut self.buf))
        } else {
            None
        }
    }
}
