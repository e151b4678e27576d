//! `HELLO` exchange and limit negotiation (§4.3).

use crate::error::{Error, Result};
use crate::framer::{self, UNBOUNDED};
use crate::frame::Frame;
use serde_bytes::ByteBuf;
use tokio::io::{AsyncRead, AsyncWrite};

/// The per-field minimum of both sides' proposed limits, installed on both the
/// reader and the writer once handshake completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegotiatedLimits {
    pub max_frame: u64,
    pub max_chunk: u64,
}

/// Sends this side's `HELLO`, reads the peer's, and computes the negotiated limits.
///
/// Both sides run this the same way: there is no distinguished initiator at the
/// transport level. The returned manifest is whatever the peer put in its `HELLO`;
/// callers that have nothing to say about the peer's manifest can simply ignore it.
///
/// Any non-`HELLO` frame, an oversized `HELLO`, or a closed connection before the
/// peer's `HELLO` arrives is a terminal handshake failure.
pub async fn handshake<S>(
    stream: &mut S,
    local_manifest: Vec<u8>,
    local_max_frame: u64,
    local_max_chunk: u64,
) -> Result<(NegotiatedLimits, Vec<u8>)>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let hello = Frame::Hello {
        manifest: ByteBuf::from(local_manifest),
        max_frame: local_max_frame,
        max_chunk: local_max_chunk,
    };
    framer::write_frame(stream, &hello, UNBOUNDED).await?;

    let peer_frame = framer::read_frame(stream, UNBOUNDED, UNBOUNDED)
        .await?
        .ok_or_else(|| Error::protocol("connection closed before peer HELLO"))?;

    match peer_frame {
        Frame::Hello {
            manifest: peer_manifest,
            max_frame: peer_max_frame,
            max_chunk: peer_max_chunk,
        } => {
            let negotiated = NegotiatedLimits {
                max_frame: local_max_frame.min(peer_max_frame),
                max_chunk: local_max_chunk.min(peer_max_chunk),
            };
            tracing::info!(
                max_frame = negotiated.max_frame,
                max_chunk = negotiated.max_chunk,
                "handshake complete"
            );
            Ok((negotiated, peer_manifest.into_vec()))
        }
        other => Err(Error::protocol(format!(
            "expected HELLO during handshake, got {other:?}"
        ))),
    }
}
