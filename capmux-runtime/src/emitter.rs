//! The handler-facing object through which a plugin writes log lines and output
//! frames (§4.4). Emission is synchronous from the handler's point of view; the
//! runtime is responsible for framing and for picking the final response shape.

use crate::error::{Error, Result};
use capmux_wire::{Frame, MessageId};
use serde::Serialize;
use serde_bytes::ByteBuf;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// The single-shot response a handler produced, if any, before it returned.
#[derive(Debug, Clone)]
pub(crate) enum SingleShot {
    /// `emit_cbor` — payload is a CBOR-encoded value, `content_type` is fixed.
    Cbor(Vec<u8>),
    /// `emit_bytes` — payload is opaque, `content_type` is handler-chosen.
    Raw { payload: Vec<u8>, content_type: String },
}

/// Tracks what a handler has emitted so the dispatcher can pick the right
/// response-shape conversion once the handler returns (§4.4 "Response shape").
#[derive(Default)]
pub(crate) struct EmitterState {
    pub(crate) used_streaming: bool,
    pub(crate) single_shot: Option<SingleShot>,
    next_seq: HashMap<String, u64>,
    started_streams: HashSet<String>,
}

/// The handler-facing emission surface for one in-flight request.
#[derive(Clone)]
pub struct Emitter {
    id: MessageId,
    tx: mpsc::UnboundedSender<Frame>,
    state: Arc<Mutex<EmitterState>>,
}

impl Emitter {
    pub(crate) fn new(id: MessageId, tx: mpsc::UnboundedSender<Frame>) -> (Self, Arc<Mutex<EmitterState>>) {
        let state = Arc::new(Mutex::new(EmitterState::default()));
        (
            Emitter {
                id,
                tx,
                state: state.clone(),
            },
            state,
        )
    }

    fn send(&self, frame: Frame) -> Result<()> {
        self.tx
            .send(frame)
            .map_err(|_| Error::Wire(capmux_wire::Error::protocol("emitter's writer task is gone")))
    }

    /// A single serialized value as the whole response. Only the first call (when
    /// no streaming output has started) is honored as the eventual `RES`; later
    /// calls, or calls after streaming has begun, are logged and ignored.
    pub fn emit_cbor<T: Serialize>(&self, value: &T) -> Result<()> {
        let mut buf = Vec::new();
        ciborium::ser::into_writer(value, &mut buf)
            .map_err(|e| Error::Wire(capmux_wire::Error::protocol(e.to_string())))?;
        self.set_single_shot(SingleShot::Cbor(buf), "emit_cbor")
    }

    /// A single opaque byte payload as the whole response, with a handler-chosen
    /// `content_type`. Subject to the same first-call-wins rule as `emit_cbor`.
    pub fn emit_bytes(&self, payload: impl Into<Vec<u8>>, content_type: impl Into<String>) -> Result<()> {
        self.set_single_shot(
            SingleShot::Raw {
                payload: payload.into(),
                content_type: content_type.into(),
            },
            "emit_bytes",
        )
    }

    fn set_single_shot(&self, shot: SingleShot, caller: &str) -> Result<()> {
        let mut state = self.state.lock().expect("emitter state poisoned");
        if state.used_streaming {
            tracing::warn!(id = %self.id, caller, "single-shot emission called after streaming output started, ignoring");
            return Ok(());
        }
        if state.single_shot.is_some() {
            tracing::warn!(id = %self.id, caller, "single-shot emission called more than once, keeping first emission");
            return Ok(());
        }
        state.single_shot = Some(shot);
        Ok(())
    }

    /// Begins a named output stream.
    pub fn start_stream(&self, stream_id: impl Into<String>, media_urn: impl Into<String>) -> Result<()> {
        let stream_id = stream_id.into();
        {
            let mut state = self.state.lock().expect("emitter state poisoned");
            state.used_streaming = true;
            state.single_shot = None;
            state.started_streams.insert(stream_id.clone());
        }
        self.send(Frame::StreamStart {
            id: self.id,
            stream_id,
            media_urn: media_urn.into(),
        })
    }

    /// Emits one ordered payload fragment of a named output stream, assigning the
    /// next contiguous `seq` for that stream automatically.
    pub fn emit_chunk(&self, stream_id: impl Into<String>, payload: impl Into<Vec<u8>>, eof: bool) -> Result<()> {
        let stream_id = stream_id.into();
        let seq = {
            let mut state = self.state.lock().expect("emitter state poisoned");
            state.used_streaming = true;
            state.single_shot = None;
            let seq = state.next_seq.entry(stream_id.clone()).or_insert(0);
            let current = *seq;
            *seq += 1;
            current
        };
        self.send(Frame::Chunk {
            id: self.id,
            stream_id,
            seq,
            payload: ByteBuf::from(payload.into()),
            eof: if eof { Some(true) } else { None },
            len: None,
        })
    }

    /// Terminates a named output stream.
    pub fn end_stream(&self, stream_id: impl Into<String>) -> Result<()> {
        let stream_id = stream_id.into();
        {
            let mut state = self.state.lock().expect("emitter state poisoned");
            state.used_streaming = true;
            state.single_shot = None;
        }
        self.send(Frame::StreamEnd { id: self.id, stream_id })
    }

    /// Emits a diagnostic line; the host forwards it transparently.
    pub fn log(&self, level: impl Into<String>, message: impl Into<String>) -> Result<()> {
        self.send(Frame::Log {
            id: self.id,
            level: level.into(),
            message: message.into(),
        })
    }

    /// Emits a free-form status note, carried on the wire as a `LOG` frame tagged
    /// with `kind` as its level so it's distinguishable from ordinary diagnostics.
    pub fn emit_status(&self, kind: impl Into<String>, details: impl Into<String>) -> Result<()> {
        self.send(Frame::Log {
            id: self.id,
            level: format!("status:{}", kind.into()),
            message: details.into(),
        })
    }
}
