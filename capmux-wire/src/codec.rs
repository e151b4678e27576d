//! CBOR encode/decode of a [`Frame`], independent of any I/O.

use crate::error::Result;
use crate::frame::Frame;

/// Encodes one frame to its CBOR body (no length prefix).
pub fn encode(frame: &Frame) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::ser::into_writer(frame, &mut buf)?;
    Ok(buf)
}

/// Decodes one frame from its CBOR body (no length prefix).
pub fn decode(bytes: &[u8]) -> Result<Frame> {
    let frame = ciborium::de::from_reader(bytes)?;
    Ok(frame)
}
