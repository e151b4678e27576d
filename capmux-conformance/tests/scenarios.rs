//! Named scenarios S1-S6, exercised end to end.

use async_trait::async_trait;
use capmux_host::Host;
use capmux_runtime::{CapHandler, Emitter, FrameStream, HandlerRegistry, HandlerResult, InputFrame, PeerInvoker, PluginRuntime};
use capmux_testkit::duplex_pair;
use capmux_urn::{best_match, Cap, CapArg, CapOutput, ResolvedMediaSpec, Urn, UrnBuilder};
use capmux_wire::{Frame, MessageId, NegotiatedLimits};
use serde::Deserialize;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

const MAX_FRAME: u64 = 1 << 20;
const MAX_CHUNK: u64 = 1 << 16;

async fn send(writer: &mut (impl AsyncWrite + Unpin), frame: &Frame) {
    capmux_wire::write_frame(writer, frame, MAX_FRAME).await.expect("writes");
}

async fn recv(reader: &mut (impl AsyncRead + Unpin)) -> Frame {
    capmux_wire::read_frame(reader, MAX_FRAME, MAX_CHUNK)
        .await
        .expect("reads")
        .expect("stream open")
}

/// S1 - URN canonicalization. The worked example from spec.md: tag names
/// lowercase, tags reordered alphabetically, an unnecessarily-quoted simple
/// value unquoted, a value needing quoting stays quoted.
#[test]
fn s1_urn_canonicalization_worked_example() {
    let urn = Urn::parse_cap(r#"cap:OP=Transform;FORMAT=JSON;in="media:void";out="media:form=map;textable""#).expect("parses");
    assert_eq!(urn.canonical(), r#"cap:format=JSON;in=media:void;op=Transform;out="media:form=map;textable""#);
}

/// S2 - Best-match specificity: a request with an extra tag matches the more
/// specific of two overlapping cap URNs.
#[test]
fn s2_best_match_prefers_more_specific_cap() {
    let a = UrnBuilder::cap().tag("op", "x").expect("valid").build();
    let b = UrnBuilder::cap().tag("op", "x").expect("valid").tag("lang", "en").expect("valid").build();
    let request = UrnBuilder::cap().tag("op", "x").expect("valid").tag("lang", "en").expect("valid").build();

    let candidates = vec![("A", a), ("B", b)];
    let winner = best_match(&candidates, |(_, urn)| urn, &request).expect("one candidate matches");
    assert_eq!(winner.0, "B");
}

struct EchoArgBytes;

#[derive(Deserialize)]
struct ArgRecord {
    media_urn: String,
    #[serde(with = "serde_bytes")]
    value: Vec<u8>,
}

#[async_trait]
impl CapHandler for EchoArgBytes {
    async fn handle(&self, mut frames: FrameStream, emit: Emitter, _peer: Arc<dyn PeerInvoker>) -> HandlerResult {
        let Some(InputFrame::Payload(payload)) = frames.next().await else {
            return Err(capmux_runtime::HandlerError::new("PROTOCOL", "expected a payload frame"));
        };
        let payload = payload.unwrap_or_default();
        let records: Vec<ArgRecord> =
            ciborium::de::from_reader(payload.as_slice()).map_err(|e| capmux_runtime::HandlerError::new("PROTOCOL", e.to_string()))?;
        let bytes = records.into_iter().next().map(|r| r.value).unwrap_or_default();
        emit.emit_bytes(bytes, "application/octet-stream")
            .map_err(|e| capmux_runtime::HandlerError::new("PROTOCOL", e.to_string()))
    }
}

fn echo_arg_cap(op: &str, media_urn: &str) -> Cap {
    Cap {
        urn: UrnBuilder::cap().tag("op", op).expect("valid").build(),
        command: format!("{op}-plugin"),
        args: vec![CapArg {
            media_urn: media_urn.to_string(),
            required: true,
            sources: vec![],
            description: String::new(),
        }],
        output: CapOutput {
            media_urn: "media:void".to_string(),
            description: String::new(),
        },
        media_specs: vec![(
            media_urn.to_string(),
            ResolvedMediaSpec {
                mime_type: "application/octet-stream".to_string(),
                profile_uri: None,
                schema: None,
                rules: vec![],
            },
        )],
    }
}

fn encode_cbor_arg_array(media_urn: &str, value: &[u8]) -> Vec<u8> {
    #[derive(serde::Serialize)]
    struct Record<'a> {
        media_urn: &'a str,
        #[serde(with = "serde_bytes")]
        value: &'a [u8],
    }
    let mut buf = Vec::new();
    ciborium::ser::into_writer(&[Record { media_urn, value }], &mut buf).expect("encodes");
    buf
}

/// Attaches a plugin registering `cap` under `handler` over a fresh duplex
/// pair, running its `PluginRuntime` on a background task.
async fn attach_plugin(host: &mut Host, cap: Cap, handler: Arc<dyn CapHandler>) -> tokio::task::JoinHandle<capmux_runtime::Result<()>> {
    let (host_side, plugin_side) = duplex_pair();
    let cap_urn = cap.urn.clone();
    let registry = Arc::new(HandlerRegistry::new());
    registry.register(cap, handler);
    let runtime = PluginRuntime::new(registry);
    let plugin_task = tokio::spawn(async move {
        let mut stream = plugin_side;
        let (limits, _manifest) = capmux_wire::handshake(&mut stream, b"plugin".to_vec(), MAX_FRAME, MAX_CHUNK)
            .await
            .expect("plugin side handshake");
        let (reader, writer) = tokio::io::split(stream);
        runtime.run(reader, writer, limits).await
    });
    host.attach_plugin(host_side, vec![cap_urn]).await.expect("host attaches plugin");
    plugin_task
}

/// S3 - Streaming chunk echo with a heartbeat interleaved mid-request.
#[tokio::test]
async fn s3_streaming_chunk_echo_survives_an_interleaved_heartbeat() {
    let mut host = Host::new(b"host".to_vec(), MAX_FRAME, MAX_CHUNK);
    let media_urn = "media:string;textable;form=scalar";
    let plugin_task = attach_plugin(&mut host, echo_arg_cap("echo", media_urn), Arc::new(EchoArgBytes)).await;

    let (engine_side, host_engine_side) = duplex_pair();
    let (mut engine_read, mut engine_write) = tokio::io::split(engine_side);
    let (host_engine_read, host_engine_write) = tokio::io::split(host_engine_side);
    let host_task = tokio::spawn(async move { host.run(host_engine_read, host_engine_write).await });

    let req_id = MessageId::random();
    send(
        &mut engine_write,
        &Frame::Req {
            id: req_id,
            cap: "cap:op=echo".to_string(),
            content_type: "application/cbor".to_string(),
            payload: Some(serde_bytes::ByteBuf::from(encode_cbor_arg_array(media_urn, b"hi"))),
        },
    )
    .await;

    let hb_id = MessageId::random();
    send(&mut engine_write, &Frame::Heartbeat { id: hb_id }).await;

    let mut saw_heartbeat = false;
    let mut saw_echo = false;
    for _ in 0..2 {
        match recv(&mut engine_read).await {
            Frame::Heartbeat { id } => {
                assert_eq!(id, hb_id);
                saw_heartbeat = true;
            }
            Frame::Res { id, payload, .. } => {
                assert_eq!(id, req_id);
                assert_eq!(payload.into_vec(), b"hi".to_vec());
                saw_echo = true;
            }
            other => panic!("unexpected frame {other:?}"),
        }
    }
    assert!(saw_heartbeat && saw_echo);

    engine_write.shutdown().await.expect("shutdown");
    drop(engine_write);
    let _ = host_task.await.expect("host task joins");
    plugin_task.abort();
}

/// S4 - Plugin death mid-stream: exactly one `ERR(PLUGIN_DIED)` for the sole
/// pending request, and the capability disappears from the advertised set.
#[tokio::test]
async fn s4_plugin_death_mid_stream_yields_single_plugin_died_and_clears_capability() {
    let mut host = Host::new(b"host".to_vec(), MAX_FRAME, MAX_CHUNK);
    let cap_urn = UrnBuilder::cap().tag("op", "process").expect("valid").build();
    let (host_plugin_side, mut fake_plugin) = duplex_pair();
    let handshake_task = tokio::spawn(async move {
        capmux_wire::handshake(&mut fake_plugin, b"plugin".to_vec(), MAX_FRAME, MAX_CHUNK)
            .await
            .expect("plugin handshake");
        fake_plugin
    });
    host.attach_plugin(host_plugin_side, vec![cap_urn]).await.expect("attaches");
    let mut fake_plugin = handshake_task.await.expect("joins");
    assert!(host.capabilities().is_some());

    let (engine_side, host_engine_side) = duplex_pair();
    let (mut engine_read, mut engine_write) = tokio::io::split(engine_side);
    let (host_engine_read, host_engine_write) = tokio::io::split(host_engine_side);
    let host_task = tokio::spawn(async move {
        host.run(host_engine_read, host_engine_write).await.expect("run ok");
        host
    });

    let id1 = MessageId::random();
    send(
        &mut engine_write,
        &Frame::Req {
            id: id1,
            cap: "cap:op=process".to_string(),
            content_type: "application/octet-stream".to_string(),
            payload: None,
        },
    )
    .await;

    drop(fake_plugin.shutdown().await);
    drop(fake_plugin);

    match recv(&mut engine_read).await {
        Frame::Err { id, code, .. } => {
            assert_eq!(id, id1);
            assert_eq!(code, "PLUGIN_DIED");
        }
        other => panic!("expected ERR(PLUGIN_DIED), got {other:?}"),
    }

    engine_write.shutdown().await.expect("shutdown");
    drop(engine_write);
    let host = host_task.await.expect("joins");
    assert!(host.capabilities().is_none());
}

/// S5 - Binary round-trip: 256 distinct byte values survive the trip
/// byte-exact.
#[tokio::test]
async fn s5_binary_round_trip_is_byte_exact() {
    let mut host = Host::new(b"host".to_vec(), MAX_FRAME, MAX_CHUNK);
    let plugin_task = attach_plugin(
        &mut host,
        {
            let mut cap = echo_arg_cap("echo", "media:bytes");
            cap.args[0].required = true;
            cap
        },
        Arc::new(RawEchoBytes),
    )
    .await;

    let (engine_side, host_engine_side) = duplex_pair();
    let (mut engine_read, mut engine_write) = tokio::io::split(engine_side);
    let (host_engine_read, host_engine_write) = tokio::io::split(host_engine_side);
    let host_task = tokio::spawn(async move { host.run(host_engine_read, host_engine_write).await });

    let payload: Vec<u8> = (0u32..=255).map(|b| b as u8).collect();
    let id = MessageId::random();
    send(
        &mut engine_write,
        &Frame::Req {
            id,
            cap: "cap:op=echo".to_string(),
            content_type: "application/octet-stream".to_string(),
            payload: Some(serde_bytes::ByteBuf::from(payload.clone())),
        },
    )
    .await;

    match recv(&mut engine_read).await {
        Frame::Res { id: res_id, payload: res_payload, .. } => {
            assert_eq!(res_id, id);
            assert_eq!(res_payload.into_vec(), payload);
        }
        other => panic!("expected RES, got {other:?}"),
    }

    engine_write.shutdown().await.expect("shutdown");
    drop(engine_write);
    let _ = host_task.await.expect("host task joins");
    plugin_task.abort();
}

struct RawEchoBytes;

#[async_trait]
impl CapHandler for RawEchoBytes {
    async fn handle(&self, mut frames: FrameStream, emit: Emitter, _peer: Arc<dyn PeerInvoker>) -> HandlerResult {
        let Some(InputFrame::Payload(payload)) = frames.next().await else {
            return Err(capmux_runtime::HandlerError::new("PROTOCOL", "expected a payload frame"));
        };
        emit.emit_bytes(payload.unwrap_or_default(), "application/octet-stream")
            .map_err(|e| capmux_runtime::HandlerError::new("PROTOCOL", e.to_string()))
    }
}

/// S6 - Relay cap update: the master's view of the manifest and limits
/// updates transparently from a second `RELAY_NOTIFY`, and a normal frame
/// sent in between still passes through untouched.
#[tokio::test]
async fn s6_relay_cap_update_is_transparent_to_the_master() {
    let (local_a, mut local_b) = duplex_pair();
    let (remote_a, master_stream) = duplex_pair();

    let initial_limits = NegotiatedLimits {
        max_frame: MAX_FRAME,
        max_chunk: MAX_CHUNK,
    };
    let (handle, slave_fut) = capmux_relay::spawn_slave(local_a, remote_a, b"[\"cap:op=a\"]".to_vec(), initial_limits, MAX_FRAME, MAX_CHUNK);
    let slave_task = tokio::spawn(slave_fut);

    let mut master = capmux_relay::RelayMaster::connect(master_stream, MAX_FRAME, MAX_CHUNK)
        .await
        .expect("master sees opening notify");
    assert_eq!(master.manifest(), b"[\"cap:op=a\"]");

    let id = MessageId::random();
    send(&mut local_b, &Frame::Heartbeat { id }).await;
    match master.read_frame().await.expect("reads").expect("not eof") {
        Frame::Heartbeat { id: seen } => assert_eq!(seen, id),
        other => panic!("expected passthrough heartbeat, got {other:?}"),
    }

    assert!(handle
        .notify(b"[\"cap:op=a\",\"cap:op=b\"]".to_vec(), initial_limits)
        .await);

    // The updated notify is consumed transparently inside `read_frame`; the
    // next ordinary frame the master reads reflects the new view without the
    // notify itself ever surfacing to this caller.
    let id2 = MessageId::random();
    send(&mut local_b, &Frame::Heartbeat { id: id2 }).await;
    match master.read_frame().await.expect("reads").expect("not eof") {
        Frame::Heartbeat { id: seen } => assert_eq!(seen, id2),
        other => panic!("expected passthrough heartbeat, got {other:?}"),
    }
    assert_eq!(master.manifest(), b"[\"cap:op=a\",\"cap:op=b\"]");

    drop(local_b);
    drop(master);
    let _ = slave_task.await;
}
