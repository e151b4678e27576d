//! Drives a [`PluginRuntime`] end to end over an in-memory duplex stream, playing
//! the role of the host side of the connection.

use async_trait::async_trait;
use capmux_runtime::{CapHandler, Emitter, FrameStream, HandlerRegistry, HandlerResult, InputFrame, PeerInvoker, PluginRuntime};
use capmux_urn::{Cap, CapArg, CapOutput, UrnBuilder};
use capmux_wire::{Frame, MessageId, NegotiatedLimits};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};

fn limits() -> NegotiatedLimits {
    NegotiatedLimits {
        max_frame: 1 << 20,
        max_chunk: 1 << 16,
    }
}

async fn send(writer: &mut (impl AsyncWrite + Unpin), frame: &Frame) {
    capmux_wire::write_frame(writer, frame, limits().max_frame).await.expect("writes");
}

async fn recv(reader: &mut (impl AsyncRead + Unpin)) -> Frame {
    capmux_wire::read_frame(reader, limits().max_frame, limits().max_chunk)
        .await
        .expect("reads")
        .expect("stream open")
}

struct EchoBytes;

#[async_trait]
impl CapHandler for EchoBytes {
    async fn handle(&self, mut frames: FrameStream, emit: Emitter, _peer: Arc<dyn PeerInvoker>) -> HandlerResult {
        let Some(InputFrame::Payload(payload)) = frames.next().await else {
            return Err(capmux_runtime::HandlerError::new("PROTOCOL", "expected a payload frame"));
        };
        let payload = payload.unwrap_or_default();
        emit.emit_bytes(payload, "application/octet-stream")
            .map_err(|e| capmux_runtime::HandlerError::new("PROTOCOL", e.to_string()))
    }
}

struct EchoStream;

#[async_trait]
impl CapHandler for EchoStream {
    async fn handle(&self, _frames: FrameStream, emit: Emitter, _peer: Arc<dyn PeerInvoker>) -> HandlerResult {
        emit.start_stream("out", "media:bytes")
            .map_err(|e| capmux_runtime::HandlerError::new("PROTOCOL", e.to_string()))?;
        emit.emit_chunk("out", b"chunk-one".to_vec(), false)
            .map_err(|e| capmux_runtime::HandlerError::new("PROTOCOL", e.to_string()))?;
        emit.emit_chunk("out", b"chunk-two".to_vec(), true)
            .map_err(|e| capmux_runtime::HandlerError::new("PROTOCOL", e.to_string()))?;
        emit.end_stream("out")
            .map_err(|e| capmux_runtime::HandlerError::new("PROTOCOL", e.to_string()))?;
        Ok(())
    }
}

fn echo_cap(op: &str) -> Cap {
    Cap {
        urn: UrnBuilder::cap().tag("op", op).expect("valid").build(),
        command: "echo".to_string(),
        args: vec![CapArg {
            media_urn: "media:bytes".to_string(),
            required: true,
            sources: vec![],
            description: String::new(),
        }],
        output: CapOutput {
            media_urn: "media:bytes".to_string(),
            description: String::new(),
        },
        media_specs: vec![],
    }
}

#[tokio::test]
async fn engine_observes_raw_res_payload_for_single_shot_bytes() {
    let registry = Arc::new(HandlerRegistry::new());
    registry.register(echo_cap("echo"), Arc::new(EchoBytes));

    let (engine, plugin) = tokio::io::duplex(4096);
    let (mut engine_read, mut engine_write) = tokio::io::split(engine);
    let (plugin_read, plugin_write) = tokio::io::split(plugin);

    let runtime = PluginRuntime::new(registry);
    let runtime_task = tokio::spawn(async move { runtime.run(plugin_read, plugin_write, limits()).await });

    let id = MessageId::random();
    send(
        &mut engine_write,
        &Frame::Req {
            id,
            cap: "cap:op=echo".to_string(),
            content_type: "application/octet-stream".to_string(),
            payload: Some(serde_bytes::ByteBuf::from(b"hi".to_vec())),
        },
    )
    .await;

    match recv(&mut engine_read).await {
        Frame::Res {
            id: res_id,
            content_type,
            payload,
        } => {
            assert_eq!(res_id, id);
            assert_eq!(content_type, "application/octet-stream");
            assert_eq!(payload.into_vec(), b"hi".to_vec());
        }
        other => panic!("expected RES, got {other:?}"),
    }

    drop(engine_write);
    runtime_task.await.expect("runtime task joins").expect("runtime run ok");
}

#[tokio::test]
async fn engine_observes_heartbeat_echoed_back() {
    let registry = Arc::new(HandlerRegistry::new());
    let (engine, plugin) = tokio::io::duplex(4096);
    let (mut engine_read, mut engine_write) = tokio::io::split(engine);
    let (plugin_read, plugin_write) = tokio::io::split(plugin);

    let runtime = PluginRuntime::new(registry);
    let runtime_task = tokio::spawn(async move { runtime.run(plugin_read, plugin_write, limits()).await });

    let id = MessageId::random();
    send(&mut engine_write, &Frame::Heartbeat { id }).await;
    match recv(&mut engine_read).await {
        Frame::Heartbeat { id: echoed } => assert_eq!(echoed, id),
        other => panic!("expected heartbeat echo, got {other:?}"),
    }

    drop(engine_write);
    runtime_task.await.expect("runtime task joins").expect("runtime run ok");
}

#[tokio::test]
async fn engine_observes_streamed_chunks_then_stream_end() {
    let registry = Arc::new(HandlerRegistry::new());
    registry.register(echo_cap("stream"), Arc::new(EchoStream));

    let (engine, plugin) = tokio::io::duplex(4096);
    let (mut engine_read, mut engine_write) = tokio::io::split(engine);
    let (plugin_read, plugin_write) = tokio::io::split(plugin);

    let runtime = PluginRuntime::new(registry);
    let runtime_task = tokio::spawn(async move { runtime.run(plugin_read, plugin_write, limits()).await });

    let id = MessageId::random();
    send(
        &mut engine_write,
        &Frame::Req {
            id,
            cap: "cap:op=stream".to_string(),
            content_type: "application/octet-stream".to_string(),
            payload: Some(serde_bytes::ByteBuf::from(b"ignored".to_vec())),
        },
    )
    .await;

    match recv(&mut engine_read).await {
        Frame::StreamStart { id: sid, stream_id, media_urn } => {
            assert_eq!(sid, id);
            assert_eq!(stream_id, "out");
            assert_eq!(media_urn, "media:bytes");
        }
        other => panic!("expected STREAM_START, got {other:?}"),
    }
    match recv(&mut engine_read).await {
        Frame::Chunk { seq, payload, eof, .. } => {
            assert_eq!(seq, 0);
            assert_eq!(payload.into_vec(), b"chunk-one".to_vec());
            assert!(eof.is_none());
        }
        other => panic!("expected first CHUNK, got {other:?}"),
    }
    match recv(&mut engine_read).await {
        Frame::Chunk { seq, payload, eof, .. } => {
            assert_eq!(seq, 1);
            assert_eq!(payload.into_vec(), b"chunk-two".to_vec());
            assert_eq!(eof, Some(true));
        }
        other => panic!("expected second CHUNK, got {other:?}"),
    }
    match recv(&mut engine_read).await {
        Frame::StreamEnd { stream_id, .. } => assert_eq!(stream_id, "out"),
        other => panic!("expected STREAM_END, got {other:?}"),
    }
    match recv(&mut engine_read).await {
        Frame::End { id: eid, .. } => assert_eq!(eid, id),
        other => panic!("expected terminal END, got {other:?}"),
    }

    drop(engine_write);
    runtime_task.await.expect("runtime task joins").expect("runtime run ok");
}

#[tokio::test]
async fn engine_observes_not_found_for_unregistered_capability() {
    let registry = Arc::new(HandlerRegistry::new());
    let (engine, plugin) = tokio::io::duplex(4096);
    let (mut engine_read, mut engine_write) = tokio::io::split(engine);
    let (plugin_read, plugin_write) = tokio::io::split(plugin);

    let runtime = PluginRuntime::new(registry);
    let runtime_task = tokio::spawn(async move { runtime.run(plugin_read, plugin_write, limits()).await });

    let id = MessageId::random();
    send(
        &mut engine_write,
        &Frame::Req {
            id,
            cap: "cap:op=nonexistent".to_string(),
            content_type: "application/octet-stream".to_string(),
            payload: None,
        },
    )
    .await;

    match recv(&mut engine_read).await {
        Frame::Err { id: eid, code, .. } => {
            assert_eq!(eid, id);
            assert_eq!(code, "NOT_FOUND");
        }
        other => panic!("expected ERR(NOT_FOUND), got {other:?}"),
    }

    drop(engine_write);
    runtime_task.await.expect("runtime task joins").expect("runtime run ok");
}
