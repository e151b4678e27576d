//! Tracks `CHUNK.seq` contiguity per `(id, stream_id)` pair, as required of any
//! reader of the wire protocol: sequence numbers start at 0 and increase by 1.

use crate::error::{Error, Result};
use crate::frame::MessageId;
use std::collections::HashMap;

/// Per-connection tracker for the next expected `CHUNK.seq` of every open stream.
#[derive(Debug, Default)]
pub struct ChunkTracker {
    next_seq: HashMap<(MessageId, String), u64>,
}

impl ChunkTracker {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates that `seq` is the next expected sequence number for
    /// `(id, stream_id)`, advancing the tracker's internal counter.
    ///
    /// Returns `Err(Error::Protocol)` on a gap, per §4.2: readers observing a gap
    /// must treat it as a protocol violation for that request.
    pub fn check(&mut self, id: MessageId, stream_id: &str, seq: u64) -> Result<()> {
        let key = (id, stream_id.to_string());
        let expected = self.next_seq.get(&key).copied().unwrap_or(0);
        if seq != expected {
            return Err(Error::protocol(format!(
                "chunk seq gap on stream {stream_id}: expected {expected}, got {seq}"
            )));
        }
        self.next_seq.insert(key, seq + 1);
        Ok(())
    }

    /// Drops tracking state for a stream once it has ended (`STREAM_END` or an
    /// `eof` chunk).
    pub fn forget(&mut self, id: MessageId, stream_id: &str) {
        self.next_seq.remove(&(id, stream_id.to_string()));
    }
}
