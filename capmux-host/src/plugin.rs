//! Per-plugin bookkeeping and the launcher seam used to spawn a registered-but-not-
//! running plugin on demand (§4.5, §9's `Registered -> Spawning -> Running -> Dead`
//! state machine).

use async_trait::async_trait;
use capmux_core::PluginSpec;
use capmux_urn::Urn;
use capmux_wire::NegotiatedLimits;
use std::pin::Pin;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncWrite};

/// A type-erased connected half, so the host can hold a mixed collection of
/// sockets, pipes, and in-memory duplex halves uniformly.
pub type BoxedReader = Pin<Box<dyn AsyncRead + Send>>;
pub type BoxedWriter = Pin<Box<dyn AsyncWrite + Send>>;

/// The implicit plugin lifecycle (§9): only `Running` routes `REQ`s; `Spawning`
/// marks the one in-flight spawn for a `plugin_idx`; `Dead` is permanent for that
/// index — a later attach gets a fresh index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginState {
    Registered,
    Spawning,
    Running,
    Dead,
}

/// Spawns a registered-but-not-running plugin process and hands back its connected
/// stream. The process launcher itself (argv, environment, working directory) stays
/// an external collaborator behind this trait.
#[async_trait]
pub trait PluginLauncher: Send + Sync {
    async fn launch(&self, spec: &PluginSpec) -> std::io::Result<(BoxedReader, BoxedWriter)>;
}

/// One attached (or attachable) plugin's bookkeeping. Index into `Host::plugins` is
/// the stable `plugin_idx` used throughout routing.
pub struct PluginRecord {
    pub(crate) spec: Option<PluginSpec>,
    pub(crate) reader: Option<BoxedReader>,
    pub(crate) writer: Option<BoxedWriter>,
    pub(crate) manifest: Vec<u8>,
    pub(crate) cap_urns: Vec<Urn>,
    pub(crate) state: PluginState,
    pub(crate) limits: Option<NegotiatedLimits>,
    pub(crate) attached_at: Instant,
}

impl PluginRecord {
    pub(crate) fn registered(spec: PluginSpec, cap_urns: Vec<Urn>) -> Self {
        PluginRecord {
            spec: Some(spec),
            reader: None,
            writer: None,
            manifest: Vec::new(),
            cap_urns,
            state: PluginState::Registered,
            limits: None,
            attached_at: Instant::now(),
        }
    }

    pub(crate) fn running(
        reader: BoxedReader,
        writer: BoxedWriter,
        manifest: Vec<u8>,
        cap_urns: Vec<Urn>,
        limits: NegotiatedLimits,
    ) -> Self {
        PluginRecord {
            spec: None,
            reader: Some(reader),
            writer: Some(writer),
            manifest,
            cap_urns,
            state: PluginState::Running,
            limits: Some(limits),
            attached_at: Instant::now(),
        }
    }

    pub fn state(&self) -> PluginState {
        self.state
    }

    pub fn cap_urns(&self) -> &[Urn] {
        &self.cap_urns
    }

    /// How long ago this record was created (attached or registered), used to
    /// surface plugin uptime in status/log output.
    pub fn uptime(&self) -> Duration {
        self.attached_at.elapsed()
    }
}
