//! Host supervisor / router (§4.5): attaches plugins, keeps the cap and request
//! tables current, and multiplexes frames between one upstream "engine" endpoint
//! and the per-plugin endpoints.

use crate::cap_table::CapTable;
use crate::error::{Error, Result};
use crate::plugin::{BoxedReader, BoxedWriter, PluginLauncher, PluginRecord, PluginState};
use crate::request_table::RequestTable;
use capmux_core::PluginSpec;
use capmux_urn::Urn;
use capmux_wire::{ChunkTracker, Frame, MessageId, NegotiatedLimits};
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex as AsyncMutex;

/// The result of one read attempt on a plugin's stream: its index, the reader
/// handed back so it can be polled again, and what was read.
type PluginReadResult = (usize, BoxedReader, capmux_wire::Result<Option<Frame>>);
type PluginReadFuture = Pin<Box<dyn Future<Output = PluginReadResult> + Send>>;

fn plugin_read_future(idx: usize, mut reader: BoxedReader, limits: NegotiatedLimits) -> PluginReadFuture {
    Box::pin(async move {
        let result = capmux_wire::read_frame(&mut reader, limits.max_frame, limits.max_chunk).await;
        (idx, reader, result)
    })
}

/// The host supervisor: owns every attached plugin, the cap table, and the
/// request table, and drives the single cooperative multiplexing loop of §4.5/§5.
pub struct Host {
    plugins: Vec<PluginRecord>,
    spawn_locks: Vec<Arc<AsyncMutex<()>>>,
    cap_table: CapTable,
    request_table: RequestTable,
    launcher: Option<Arc<dyn PluginLauncher>>,
    local_manifest: Vec<u8>,
    max_frame: u64,
    max_chunk: u64,
}

impl Host {
    /// Builds an empty host that proposes `{max_frame, max_chunk}` in its own
    /// `HELLO` during every attach handshake.
    pub fn new(local_manifest: Vec<u8>, max_frame: u64, max_chunk: u64) -> Self {
        Host {
            plugins: Vec::new(),
            spawn_locks: Vec::new(),
            cap_table: CapTable::new(),
            request_table: RequestTable::new(),
            launcher: None,
            local_manifest,
            max_frame,
            max_chunk,
        }
    }

    /// Installs the process launcher used to spawn a registered-but-not-running
    /// plugin on its first matching `REQ`.
    pub fn with_launcher(mut self, launcher: Arc<dyn PluginLauncher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    /// Registers a plugin that is known (by configuration) but not yet spawned.
    /// It occupies a stable `plugin_idx` and advertises `spec.cap_urns` immediately,
    /// so it can be matched and spawned on demand the first time a `REQ` needs it.
    pub fn register_plugin(&mut self, spec: PluginSpec) -> Result<usize> {
        let cap_urns = spec
            .cap_urns
            .iter()
            .map(|s| Urn::parse_cap(s))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let idx = self.plugins.len();
        self.plugins.push(PluginRecord::registered(spec, cap_urns));
        self.spawn_locks.push(Arc::new(AsyncMutex::new(())));
        self.rebuild_cap_table();
        Ok(idx)
    }

    /// Attaches an already-connected plugin stream (§4.5 `attach_plugin`): runs the
    /// host side of the handshake, stores the plugin's manifest and advertised cap
    /// URNs, and appends each `cap_urn -> plugin_idx` row to the cap table.
    ///
    /// `cap_urns` is supplied by the caller rather than parsed out of the opaque
    /// manifest: turning a manifest into capability URNs is the network registry's
    /// job (out of scope here per spec.md §1).
    pub async fn attach_plugin<S>(&mut self, mut stream: S, cap_urns: Vec<Urn>) -> Result<usize>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (limits, manifest) =
            capmux_wire::handshake(&mut stream, self.local_manifest.clone(), self.max_frame, self.max_chunk).await?;
        let (reader, writer) = tokio::io::split(stream);
        let idx = self.plugins.len();
        self.plugins.push(PluginRecord::running(
            Box::pin(reader),
            Box::pin(writer),
            manifest,
            cap_urns,
            limits,
        ));
        self.spawn_locks.push(Arc::new(AsyncMutex::new(())));
        self.rebuild_cap_table();
        tracing::info!(plugin_idx = idx, "plugin attached");
        Ok(idx)
    }

    /// The currently advertised capability set, CBOR-encoded as a sorted,
    /// deduplicated list of canonical URN strings (§4.5 `capabilities()`). `None`
    /// when no plugin is running.
    pub fn capabilities(&self) -> Option<Vec<u8>> {
        let caps = self.cap_table.capabilities();
        if caps.is_empty() {
            return None;
        }
        let mut buf = Vec::new();
        ciborium::ser::into_writer(&caps, &mut buf).ok()?;
        Some(buf)
    }

    /// Exposed for tests: resolves the best-specificity cap table entry for
    /// `cap_urn`.
    pub fn find_plugin_for_cap(&self, cap_urn: &Urn) -> Option<usize> {
        self.cap_table.find_plugin_for_cap(cap_urn)
    }

    /// Number of pending (in-flight) requests. Exposed for tests asserting
    /// request-table cardinality (Testable Property 7).
    pub fn pending_request_count(&self) -> usize {
        self.request_table.len()
    }

    /// How long ago `plugin_idx` was attached or registered, for status/log
    /// surfaces. Fails if the index was never issued by this host.
    pub fn plugin_uptime(&self, plugin_idx: usize) -> Result<std::time::Duration> {
        self.plugins
            .get(plugin_idx)
            .map(PluginRecord::uptime)
            .ok_or(Error::UnknownPlugin(plugin_idx))
    }

    fn rebuild_cap_table(&mut self) {
        let entries: Vec<(&Urn, usize)> = self
            .plugins
            .iter()
            .enumerate()
            .filter(|(_, p)| p.state() == PluginState::Running)
            .flat_map(|(idx, p)| p.cap_urns().iter().map(move |u| (u, idx)))
            .collect();
        self.cap_table.rebuild(entries);
    }

    /// Runs the host's multiplexing loop (§4.5 `run`) until the engine closes its
    /// end. Single cooperative task: plugin reads are polled concurrently via one
    /// future per attached stream (no extra OS threads, no `tokio::spawn` inside
    /// the router's own dispatch — §5's "readiness-based multiplexing" realized as
    /// a `FuturesUnordered` with one entry per live plugin stream).
    pub async fn run<ER, EW>(&mut self, mut engine_read: ER, mut engine_write: EW) -> Result<()>
    where
        ER: AsyncRead + Unpin,
        EW: AsyncWrite + Unpin,
    {
        let mut plugin_reads: FuturesUnordered<PluginReadFuture> = FuturesUnordered::new();
        for (idx, plugin) in self.plugins.iter_mut().enumerate() {
            if let (Some(reader), Some(limits)) = (plugin.reader.take(), plugin.limits) {
                plugin_reads.push(plugin_read_future(idx, reader, limits));
            }
        }

        let mut from_engine = ChunkTracker::new();
        let mut from_plugin = ChunkTracker::new();

        loop {
            tokio::select! {
                engine_frame = capmux_wire::read_frame(&mut engine_read, self.max_frame, self.max_chunk) => {
                    match engine_frame {
                        Ok(Some(frame)) => {
                            if let Err(e) = self.handle_engine_frame(frame, &mut engine_write, &mut plugin_reads, &mut from_engine).await {
                                tracing::warn!(error = %e, "failed writing to engine, closing");
                                break;
                            }
                        }
                        Ok(None) => {
                            tracing::info!("engine closed connection, exiting run loop");
                            break;
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "engine read failed, exiting run loop");
                            break;
                        }
                    }
                }
                Some((idx, reader, result)) = plugin_reads.next() => {
                    match result {
                        Ok(Some(frame)) => {
                            if let Some(limits) = self.plugins[idx].limits {
                                plugin_reads.push(plugin_read_future(idx, reader, limits));
                            }
                            if let Err(e) = self.handle_plugin_frame(idx, frame, &mut engine_write, &mut from_plugin).await {
                                tracing::warn!(error = %e, "failed forwarding plugin frame to engine, exiting run loop");
                                break;
                            }
                        }
                        Ok(None) | Err(_) => {
                            self.handle_plugin_death(idx, &mut engine_write).await;
                        }
                    }
                }
            }
        }

        for plugin in &mut self.plugins {
            plugin.writer = None;
            plugin.reader = None;
        }
        Ok(())
    }

    async fn handle_engine_frame<EW>(
        &mut self,
        frame: Frame,
        engine_write: &mut EW,
        plugin_reads: &mut FuturesUnordered<PluginReadFuture>,
        from_engine: &mut ChunkTracker,
    ) -> Result<()>
    where
        EW: AsyncWrite + Unpin,
    {
        if let Frame::Heartbeat { id } = &frame {
            // Engine-originated heartbeats are answered by the host directly
            // (§4.4's "the host is required to answer with the same id"
            // applies symmetrically at each hop); never forwarded to a
            // plugin, never touching the request table.
            return self.forward_to_engine(engine_write, Frame::Heartbeat { id: *id }).await;
        }

        if let Frame::Chunk { id, stream_id, seq, .. } = &frame {
            if let Err(e) = from_engine.check(*id, stream_id, *seq) {
                return self.send_err(engine_write, *id, "PROTOCOL", &e.to_string()).await;
            }
        }

        let plugin_idx = match &frame {
            Frame::Req { id, cap, .. } => {
                let cap_urn = match Urn::parse_cap(cap) {
                    Ok(u) => u,
                    Err(e) => return self.send_err(engine_write, *id, "PROTOCOL", &e.to_string()).await,
                };
                let Some(idx) = self.find_plugin_for_cap(&cap_urn) else {
                    return self.send_err(engine_write, *id, "NOT_FOUND", "no plugin advertises this capability").await;
                };
                if self.plugins[idx].state() == PluginState::Registered {
                    match self.spawn_plugin(idx, plugin_reads).await {
                        Ok(()) => {}
                        Err(e) => return self.send_err(engine_write, *id, "SPAWN_FAILED", &e.to_string()).await,
                    }
                }
                if self.plugins[idx].state() != PluginState::Running {
                    return self.send_err(engine_write, *id, "PLUGIN_DIED", "plugin is not running").await;
                }
                self.request_table.insert(*id, idx);
                idx
            }
            other => match other.id() {
                Some(id) => match self.request_table.plugin_for(&id) {
                    Some(idx) => idx,
                    None => return Ok(()),
                },
                None => return Ok(()),
            },
        };

        let Some(writer) = self.plugins[plugin_idx].writer.as_mut() else {
            if let Some(id) = frame.id() {
                return self.send_err(engine_write, id, "PLUGIN_DIED", "plugin is not connected").await;
            }
            return Ok(());
        };
        let max_frame = self.plugins[plugin_idx].limits.map(|l| l.max_frame).unwrap_or(self.max_frame);
        if let Err(e) = capmux_wire::write_frame(writer, &frame, max_frame).await {
            tracing::warn!(plugin_idx, error = %e, "write to plugin failed");
            self.handle_plugin_death(plugin_idx, engine_write).await;
        }
        Ok(())
    }

    async fn handle_plugin_frame<EW>(&mut self, idx: usize, frame: Frame, engine_write: &mut EW, from_plugin: &mut ChunkTracker) -> Result<()>
    where
        EW: AsyncWrite + Unpin,
    {
        match &frame {
            Frame::Heartbeat { id } => {
                let id = *id;
                if let Some(writer) = self.plugins[idx].writer.as_mut() {
                    let max_frame = self.plugins[idx].limits.map(|l| l.max_frame).unwrap_or(self.max_frame);
                    let _ = capmux_wire::write_frame(writer, &Frame::Heartbeat { id }, max_frame).await;
                }
                return Ok(());
            }
            Frame::RelayNotify { .. } | Frame::RelayState { .. } => {
                tracing::debug!(plugin_idx = idx, "ignoring relay-only frame outside relay topology");
                return Ok(());
            }
            Frame::Chunk { id, stream_id, seq, .. } => {
                if let Err(e) = from_plugin.check(*id, stream_id, *seq) {
                    let id = *id;
                    self.forward_to_engine(
                        engine_write,
                        Frame::Err {
                            id,
                            code: "PROTOCOL".to_string(),
                            message: e.to_string(),
                        },
                    )
                    .await?;
                    self.request_table.remove(&id);
                    return Ok(());
                }
            }
            _ => {}
        }
        self.forward_terminal_aware(engine_write, frame).await
    }

    async fn forward_terminal_aware<EW>(&mut self, engine_write: &mut EW, frame: Frame) -> Result<()>
    where
        EW: AsyncWrite + Unpin,
    {
        let terminal = frame.is_terminal();
        let id = frame.id();
        self.forward_to_engine(engine_write, frame).await?;
        if terminal {
            if let Some(id) = id {
                self.request_table.remove(&id);
            }
        }
        Ok(())
    }

    async fn forward_to_engine<EW>(&self, engine_write: &mut EW, frame: Frame) -> Result<()>
    where
        EW: AsyncWrite + Unpin,
    {
        capmux_wire::write_frame(engine_write, &frame, self.max_frame).await?;
        Ok(())
    }

    async fn send_err<EW>(&self, engine_write: &mut EW, id: MessageId, code: &str, message: &str) -> Result<()>
    where
        EW: AsyncWrite + Unpin,
    {
        self.forward_to_engine(
            engine_write,
            Frame::Err {
                id,
                code: code.to_string(),
                message: message.to_string(),
            },
        )
        .await
    }

    async fn spawn_plugin(&mut self, idx: usize, plugin_reads: &mut FuturesUnordered<PluginReadFuture>) -> Result<()> {
        let lock = self.spawn_locks[idx].clone();
        let _guard = lock.lock().await;
        // Another concurrent REQ for the same not-yet-running plugin may have
        // already completed the spawn while we waited for the guard.
        if self.plugins[idx].state() != PluginState::Registered {
            return Ok(());
        }
        self.plugins[idx].state = PluginState::Spawning;

        let Some(launcher) = self.launcher.clone() else {
            self.plugins[idx].state = PluginState::Dead;
            return Err(Error::NoLauncher { plugin_idx: idx });
        };
        let Some(spec) = self.plugins[idx].spec.clone() else {
            self.plugins[idx].state = PluginState::Dead;
            return Err(Error::NoLauncher { plugin_idx: idx });
        };

        let (reader, writer) = launcher.launch(&spec).await.map_err(|e| {
            self.plugins[idx].state = PluginState::Dead;
            Error::SpawnFailed {
                plugin_idx: idx,
                reason: e.to_string(),
            }
        })?;

        let mut stream = JoinedStream { reader, writer };
        let (limits, manifest) = capmux_wire::handshake(&mut stream, self.local_manifest.clone(), self.max_frame, self.max_chunk)
            .await
            .map_err(|e| {
                self.plugins[idx].state = PluginState::Dead;
                Error::SpawnFailed {
                    plugin_idx: idx,
                    reason: e.to_string(),
                }
            })?;

        self.plugins[idx].reader = Some(stream.reader);
        self.plugins[idx].writer = Some(stream.writer);
        self.plugins[idx].manifest = manifest;
        self.plugins[idx].limits = Some(limits);
        self.plugins[idx].state = PluginState::Running;
        self.rebuild_cap_table();

        plugin_reads.push(plugin_read_future(idx, self.plugins[idx].reader.take().expect("just set"), limits));
        tracing::info!(plugin_idx = idx, "spawned plugin on demand");
        Ok(())
    }

    /// §4.5 rule 3: fans out `ERR(id, PLUGIN_DIED)` for every request owned by
    /// `idx`, marks it `Dead`, and removes its rows from the cap table.
    async fn handle_plugin_death<EW>(&mut self, idx: usize, engine_write: &mut EW)
    where
        EW: AsyncWrite + Unpin,
    {
        if self.plugins[idx].state() == PluginState::Dead {
            return;
        }
        tracing::warn!(
            plugin_idx = idx,
            uptime_secs = self.plugins[idx].uptime().as_secs_f64(),
            "plugin died, failing its pending requests"
        );
        self.plugins[idx].state = PluginState::Dead;
        self.plugins[idx].writer = None;
        self.plugins[idx].reader = None;
        self.rebuild_cap_table();

        for id in self.request_table.drain_for_plugin(idx) {
            let _ = self
                .forward_to_engine(
                    engine_write,
                    Frame::Err {
                        id,
                        code: "PLUGIN_DIED".to_string(),
                        message: format!("plugin {idx} exited"),
                    },
                )
                .await;
        }
    }
}

/// Joins a launcher's separately-typed reader/writer halves into one
/// `AsyncRead + AsyncWrite` value so [`capmux_wire::handshake`] can run over them.
struct JoinedStream {
    reader: BoxedReader,
    writer: BoxedWriter,
}

impl AsyncRead for JoinedStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        let this = self.get_mut();
        Pin::new(&mut this.reader).poll_read(cx, buf)
    }
}

impl AsyncWrite for JoinedStream {
    fn poll_write(self: Pin<&mut Self>, cx: &mut std::task::Context<'_>, buf: &[u8]) -> std::task::Poll<std::io::Result<usize>> {
        let this = self.get_mut();
        Pin::new(&mut this.writer).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut std::task::Context<'_>) -> std::task::Poll<std::io::Result<()>> {
        let this = self.get_mut();
        Pin::new(&mut this.writer).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut std::task::Context<'_>) -> std::task::Poll<std::io::Result<()>> {
        let this = self.get_mut();
        Pin::new(&mut this.writer).poll_shutdown(cx)
    }
}
