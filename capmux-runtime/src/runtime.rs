//! Drives the connected byte stream to the host: dispatches `REQ`s to registered
//! handlers, answers heartbeats, and enforces chunk ordering on input streams.

use crate::args;
use crate::emitter::{Emitter, SingleShot};
use crate::error::Result;
use crate::frame_stream::{FrameStream, InputFrame};
use crate::peer::{NoPeer, PeerInvoker};
use crate::registry::HandlerRegistry;
use capmux_wire::{ChunkTracker, Frame, MessageId, NegotiatedLimits};
use serde_bytes::ByteBuf;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;

const INPUT_STREAM_BUFFER: usize = 32;

/// The plugin-side runtime: owns a handler registry and drives one connected
/// stream to the host, dispatching each `REQ` to its registered handler.
pub struct PluginRuntime {
    registry: Arc<HandlerRegistry>,
    peer: Arc<dyn PeerInvoker>,
}

impl PluginRuntime {
    /// Builds a runtime with no peer-invocation access (handlers get [`NoPeer`]).
    pub fn new(registry: Arc<HandlerRegistry>) -> Self {
        PluginRuntime {
            registry,
            peer: Arc::new(NoPeer),
        }
    }

    /// Builds a runtime that grants handlers the given peer-invocation service.
    pub fn with_peer(registry: Arc<HandlerRegistry>, peer: Arc<dyn PeerInvoker>) -> Self {
        PluginRuntime { registry, peer }
    }

    /// Runs until the host closes its end of `reader`. Each `REQ` is dispatched to
    /// its own task so independent requests can make concurrent progress; heartbeat
    /// replies and chunk-ordering checks happen inline in the read loop.
    pub async fn run<R, W>(&self, mut reader: R, writer: W, limits: NegotiatedLimits) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (writer_tx, mut writer_rx) = mpsc::unbounded_channel::<Frame>();
        let max_frame = limits.max_frame;
        let writer_task = tokio::spawn(async move {
            let mut writer = writer;
            while let Some(frame) = writer_rx.recv().await {
                if let Err(e) = capmux_wire::write_frame(&mut writer, &frame, max_frame).await {
                    tracing::warn!(error = %e, "plugin runtime writer failed, stopping");
                    break;
                }
            }
        });

        let mut requests: HashMap<MessageId, mpsc::Sender<InputFrame>> = HashMap::new();
        let mut chunk_tracker = ChunkTracker::new();

        loop {
            let frame = match capmux_wire::read_frame(&mut reader, limits.max_frame, limits.max_chunk).await {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "plugin runtime reader failed, stopping");
                    break;
                }
            };

            match frame {
                Frame::Heartbeat { id } => {
                    let _ = writer_tx.send(Frame::Heartbeat { id });
                }
                Frame::Req {
                    id,
                    cap,
                    content_type,
                    payload,
                } => {
                    self.start_request(id, &cap, &content_type, payload.map(ByteBuf::into_vec), &writer_tx, &mut requests);
                }
                Frame::StreamStart { id, stream_id, media_urn } => {
                    if let Some(tx) = requests.get(&id) {
                        let _ = tx.send(InputFrame::StreamStart { stream_id, media_urn }).await;
                    }
                }
                Frame::Chunk {
                    id,
                    stream_id,
                    seq,
                    payload,
                    eof,
                    ..
                } => {
                    if let Err(e) = chunk_tracker.check(id, &stream_id, seq) {
                        let _ = writer_tx.send(Frame::Err {
                            id,
                            code: "PROTOCOL".to_string(),
                            message: e.to_string(),
                        });
                        requests.remove(&id);
                        continue;
                    }
                    if let Some(tx) = requests.get(&id) {
                        let _ = tx
                            .send(InputFrame::Chunk {
                                stream_id,
                                seq,
                                payload: payload.into_vec(),
                                eof: eof.unwrap_or(false),
                            })
                            .await;
                    }
                }
                Frame::StreamEnd { id, stream_id } => {
                    chunk_tracker.forget(id, &stream_id);
                    if let Some(tx) = requests.get(&id) {
                        let _ = tx.send(InputFrame::StreamEnd { stream_id }).await;
                    }
                }
                Frame::End { id, .. } => {
                    // Dropping the sender closes the handler's FrameStream.
                    requests.remove(&id);
                }
                other => {
                    tracing::warn!(frame = ?other, "unexpected frame on plugin runtime stream, ignoring");
                }
            }
        }

        drop(writer_tx);
        let _ = writer_task.await;
        Ok(())
    }

    fn start_request(
        &self,
        id: MessageId,
        cap_urn: &str,
        content_type: &str,
        payload: Option<Vec<u8>>,
        writer_tx: &mpsc::UnboundedSender<Frame>,
        requests: &mut HashMap<MessageId, mpsc::Sender<InputFrame>>,
    ) {
        let Some((cap, handler)) = self.registry.lookup(cap_urn) else {
            tracing::warn!(id = %id, cap_urn, "no handler registered");
            let _ = writer_tx.send(Frame::Err {
                id,
                code: "NOT_FOUND".to_string(),
                message: format!("no handler registered for {cap_urn}"),
            });
            return;
        };

        if let Err(e) = args::assemble(&cap, content_type, payload.as_deref()) {
            let _ = writer_tx.send(Frame::Err {
                id,
                code: e.code().to_string(),
                message: e.to_string(),
            });
            return;
        }

        let (input_tx, input_rx) = mpsc::channel(INPUT_STREAM_BUFFER);
        let _ = input_tx.try_send(InputFrame::Payload(payload));
        requests.insert(id, input_tx);

        let peer = self.peer.clone();
        let writer_tx = writer_tx.clone();
        tokio::spawn(async move {
            let frames = FrameStream::new(input_rx);
            let (emitter, state) = Emitter::new(id, writer_tx.clone());
            let result = handler.handle(frames, emitter, peer).await;

            let terminal = match result {
                Err(e) => Frame::Err {
                    id,
                    code: e.code,
                    message: e.message,
                },
                Ok(()) => {
                    let state = state.lock().expect("emitter state poisoned");
                    if state.used_streaming {
                        Frame::End {
                            id,
                            payload: None,
                            content_type: None,
                        }
                    } else {
                        match &state.single_shot {
                            Some(SingleShot::Cbor(payload)) => Frame::Res {
                                id,
                                content_type: "application/cbor".to_string(),
                                payload: ByteBuf::from(payload.clone()),
                            },
                            Some(SingleShot::Raw { payload, content_type }) => Frame::Res {
                                id,
                                content_type: content_type.clone(),
                                payload: ByteBuf::from(payload.clone()),
                            },
                            None => Frame::End {
                                id,
                                payload: None,
                                content_type: None,
                            },
                        }
                    }
                }
            };
            let _ = writer_tx.send(terminal);
        });
    }
}
