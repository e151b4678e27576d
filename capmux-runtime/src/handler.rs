//! The handler contract every registered capability implements (§4.4).

use crate::emitter::Emitter;
use crate::frame_stream::FrameStream;
use crate::peer::PeerInvoker;
use async_trait::async_trait;
use std::sync::Arc;

/// An application-level failure from within a handler. Converted to
/// `ERR(code, message)` by the dispatcher.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{code}: {message}")]
pub struct HandlerError {
    pub code: String,
    pub message: String,
}

impl HandlerError {
    /// Builds a `HandlerError` with the given short ASCII code.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        HandlerError {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Result type a handler returns: success ends the request per the response-shape
/// rules in §4.4; failure ends it with `ERR(e.code, e.message)`.
pub type HandlerResult = core::result::Result<(), HandlerError>;

/// A registered capability handler.
#[async_trait]
pub trait CapHandler: Send + Sync {
    /// Drives this invocation to completion: consumes `frames` (the request's lazy
    /// input sequence), writes output through `emit`, and may call out to `peer`.
    async fn handle(&self, frames: FrameStream, emit: Emitter, peer: Arc<dyn PeerInvoker>) -> HandlerResult;
}
