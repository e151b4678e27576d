//! The CBOR frame set exchanged on every wire-protocol stream.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_bytes::ByteBuf;
use std::fmt;

/// A 128-bit correlation id. Frames belonging to the same request (or the same
/// heartbeat round-trip) share an id; continuation frames reuse the originating one.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub [u8; 16]);

impl MessageId {
    /// Generates a fresh random id.
    pub fn random() -> Self {
        use rand::RngCore;
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        MessageId(bytes)
    }
}

impl fmt::Debug for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageId({})", self)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl Serialize for MessageId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for MessageId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bytes = ByteBuf::deserialize(deserializer)?;
        let slice = bytes.as_slice();
        if slice.len() != 16 {
            return Err(D::Error::custom(format!(
                "message id must be 16 bytes, got {}",
                slice.len()
            )));
        }
        let mut id = [0u8; 16];
        id.copy_from_slice(slice);
        Ok(MessageId(id))
    }
}

/// One message on the wire. Internally tagged by the CBOR field `t`, matching the
/// short ASCII tags in the wire protocol table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum Frame {
    /// Handshake bootstrap: proposed limits plus an opaque manifest.
    #[serde(rename = "hello")]
    Hello {
        manifest: ByteBuf,
        max_frame: u64,
        max_chunk: u64,
    },

    /// Keepalive / liveness ping, echoed verbatim by the receiver.
    #[serde(rename = "hb")]
    Heartbeat { id: MessageId },

    /// Starts a request against a capability.
    #[serde(rename = "req")]
    Req {
        id: MessageId,
        cap: String,
        content_type: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<ByteBuf>,
    },

    /// Begins one named input/output stream within a request.
    #[serde(rename = "ss")]
    StreamStart {
        id: MessageId,
        stream_id: String,
        media_urn: String,
    },

    /// One ordered payload fragment of a named stream.
    #[serde(rename = "chunk")]
    Chunk {
        id: MessageId,
        stream_id: String,
        seq: u64,
        payload: ByteBuf,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        eof: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        len: Option<u64>,
    },

    /// Terminates one named stream.
    #[serde(rename = "se")]
    StreamEnd { id: MessageId, stream_id: String },

    /// A complete, single-frame response.
    #[serde(rename = "res")]
    Res {
        id: MessageId,
        content_type: String,
        payload: ByteBuf,
    },

    /// Terminates a multi-frame response; payload is optional.
    #[serde(rename = "end")]
    End {
        id: MessageId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<ByteBuf>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content_type: Option<String>,
    },

    /// Terminates a request with an error. `code` is a short ASCII tag from the
    /// error code registry (§6.3); unknown codes are forwarded verbatim.
    #[serde(rename = "err")]
    Err {
        id: MessageId,
        code: String,
        message: String,
    },

    /// Diagnostic line. The host forwards it transparently; the engine may ignore it.
    #[serde(rename = "log")]
    Log {
        id: MessageId,
        level: String,
        message: String,
    },

    /// Relay-only: announces or updates the downstream capability view.
    #[serde(rename = "rnotify")]
    RelayNotify {
        manifest: ByteBuf,
        max_frame: u64,
        max_chunk: u64,
    },

    /// Relay-only: stores resource info without forwarding.
    #[serde(rename = "rstate")]
    RelayState { payload: ByteBuf },
}

impl Frame {
    /// The correlation id carried by this frame, if any. `HELLO`, `RELAY_NOTIFY`, and
    /// `RELAY_STATE` carry none.
    pub fn id(&self) -> Option<MessageId> {
        match self {
            Frame::Hello { .. } | Frame::RelayNotify { .. } | Frame::RelayState { .. } => None,
            Frame::Heartbeat { id }
            | Frame::Req { id, .. }
            | Frame::StreamStart { id, .. }
            | Frame::Chunk { id, .. }
            | Frame::StreamEnd { id, .. }
            | Frame::Res { id, .. }
            | Frame::End { id, .. }
            | Frame::Err { id, .. }
            | Frame::Log { id, .. } => Some(*id),
        }
    }

    /// `true` for the three frame kinds that terminate a request
    /// (`RES`, `END`, `ERR`) and free its request-table entry.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Frame::Res { .. } | Frame::End { .. } | Frame::Err { .. })
    }
}
