//! The lazy, finite sequence of input frames a handler sees for one request (§4.4).

use tokio::sync::mpsc;

/// One element of a request's input sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputFrame {
    /// The `REQ`'s own payload, synthesized as the leading element.
    Payload(Option<Vec<u8>>),
    /// Begins a named input stream.
    StreamStart { stream_id: String, media_urn: String },
    /// One ordered payload fragment of a named input stream.
    Chunk {
        stream_id: String,
        seq: u64,
        payload: Vec<u8>,
        eof: bool,
    },
    /// Terminates a named input stream.
    StreamEnd { stream_id: String },
}

/// A lazy sequence of [`InputFrame`]s, fed by the runtime's read loop. Pulling a
/// frame only happens when the handler calls [`FrameStream::next`], so a handler
/// that never reads its input streams never forces them into memory.
pub struct FrameStream {
    rx: mpsc::Receiver<InputFrame>,
}

impl FrameStream {
    pub(crate) fn new(rx: mpsc::Receiver<InputFrame>) -> Self {
        FrameStream { rx }
    }

    /// Pulls the next input frame, or `None` once the request's `END` has been
    /// observed (or the connection closed early, cancelling the request).
    pub async fn next(&mut self) -> Option<InputFrame> {
        self.rx.recv().await
    }
}
