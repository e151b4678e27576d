//! Reads and writes exactly one frame at a time on a byte stream, enforcing
//! negotiated size caps: `u32_be(len) || CBOR(frame)`.

use crate::codec;
use crate::error::{Error, Result};
use crate::frame::Frame;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// No size limit. Used only for the length-prefix check before negotiated limits
/// exist (i.e. while reading/writing the `HELLO` frames themselves).
pub const UNBOUNDED: u64 = u64::MAX;

/// Encodes `frame`, writes the length prefix and body, and flushes.
///
/// Fails with [`Error::Protocol`] if the encoded body exceeds `max_frame`.
pub async fn write_frame<W>(writer: &mut W, frame: &Frame, max_frame: u64) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let body = codec::encode(frame)?;
    if body.len() as u64 > max_frame {
        return Err(Error::protocol(format!(
            "encoded frame is {} bytes, exceeds negotiated max_frame {max_frame}",
            body.len()
        )));
    }
    let len = u32::try_from(body.len())
        .map_err(|_| Error::protocol("encoded frame exceeds u32::MAX bytes"))?;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    tracing::trace!(frame = ?frame, bytes = body.len(), "wrote frame");
    Ok(())
}

/// Reads one frame, or `Ok(None)` on a clean EOF before any bytes of the next frame
/// arrive.
///
/// Rejects a length prefix greater than `max_frame`, and additionally rejects a
/// `CHUNK` whose payload exceeds `max_chunk`, both as [`Error::Protocol`].
pub async fn read_frame<R>(reader: &mut R, max_frame: u64, max_chunk: u64) -> Result<Option<Frame>>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(Error::Io(e)),
    }
    let len = u32::from_be_bytes(len_buf) as u64;
    if len > max_frame {
        return Err(Error::protocol(format!(
            "frame length {len} exceeds negotiated max_frame {max_frame}"
        )));
    }
    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body).await?;
    let frame = codec::decode(&body)?;

    if let Frame::Chunk { payload, .. } = &frame {
        if payload.len() as u64 > max_chunk {
            return Err(Error::protocol(format!(
                "chunk payload is {} bytes, exceeds negotiated max_chunk {max_chunk}",
                payload.len()
            )));
        }
    }

    tracing::trace!(frame = ?frame, bytes = body.len(), "read frame");
    Ok(Some(frame))
}
