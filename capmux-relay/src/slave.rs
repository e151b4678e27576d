//! Relay slave (§4.7): bridges a local protocol endpoint (typically a host or
//! plugin runtime) to a remote connection to the relay master, transparently
//! copying ordinary protocol frames in both directions while intercepting
//! `RELAY_NOTIFY`/`RELAY_STATE` frames rather than forwarding them.

use crate::error::Result;
use capmux_wire::{Frame, NegotiatedLimits};
use serde_bytes::ByteBuf;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;

/// A downstream-view update the slave can be told to announce mid-stream
/// (§4.7: "the slave MAY synthesize and send a fresh `RELAY_NOTIFY`").
pub struct NotifyUpdate {
    pub manifest: Vec<u8>,
    pub limits: NegotiatedLimits,
}

/// A handle used to trigger a mid-stream `RELAY_NOTIFY` from outside the
/// slave's own forwarding loop (e.g. when the local side attaches a new
/// plugin and the slave's advertised capability set changes).
#[derive(Clone)]
pub struct NotifyHandle(mpsc::Sender<NotifyUpdate>);

impl NotifyHandle {
    pub async fn notify(&self, manifest: Vec<u8>, limits: NegotiatedLimits) -> bool {
        self.0.send(NotifyUpdate { manifest, limits }).await.is_ok()
    }
}

/// Runs the slave's bidirectional forwarding loop until either side closes.
/// Sends the opening `RELAY_NOTIFY` before forwarding begins, per §4.7.
///
/// Returns a [`NotifyHandle`] immediately (before the loop starts) paired with
/// the future that drives forwarding, so a caller can hold the handle while
/// awaiting (or spawning) the loop.
pub fn spawn_slave<L, R>(
    local: L,
    remote: R,
    initial_manifest: Vec<u8>,
    initial_limits: NegotiatedLimits,
    max_frame: u64,
    max_chunk: u64,
) -> (NotifyHandle, impl std::future::Future<Output = Result<()>>)
where
    L: AsyncRead + AsyncWrite + Unpin,
    R: AsyncRead + AsyncWrite + Unpin,
{
    let (tx, rx) = mpsc::channel(8);
    let handle = NotifyHandle(tx);
    let fut = run_slave(local, remote, initial_manifest, initial_limits, max_frame, max_chunk, rx);
    (handle, fut)
}

async fn run_slave<L, R>(
    mut local: L,
    mut remote: R,
    initial_manifest: Vec<u8>,
    initial_limits: NegotiatedLimits,
    max_frame: u64,
    max_chunk: u64,
    mut notify_rx: mpsc::Receiver<NotifyUpdate>,
) -> Result<()>
where
    L: AsyncRead + AsyncWrite + Unpin,
    R: AsyncRead + AsyncWrite + Unpin,
{
    capmux_wire::write_frame(
        &mut remote,
        &Frame::RelayNotify {
            manifest: ByteBuf::from(initial_manifest),
            max_frame: initial_limits.max_frame,
            max_chunk: initial_limits.max_chunk,
        },
        max_frame,
    )
    .await?;

    loop {
        tokio::select! {
            local_frame = capmux_wire::read_frame(&mut local, max_frame, max_chunk) => {
                match local_frame? {
                    Some(Frame::RelayNotify { .. } | Frame::RelayState { .. }) => {
                        tracing::debug!("slave intercepting relay-only frame from local side");
                    }
                    Some(frame) => {
                        capmux_wire::write_frame(&mut remote, &frame, max_frame).await?;
                    }
                    None => {
                        tracing::info!("local side closed, ending relay slave loop");
                        return Ok(());
                    }
                }
            }
            remote_frame = capmux_wire::read_frame(&mut remote, max_frame, max_chunk) => {
                match remote_frame? {
                    Some(Frame::RelayNotify { .. } | Frame::RelayState { .. }) => {
                        tracing::debug!("slave intercepting relay-only frame from remote side");
                    }
                    Some(frame) => {
                        capmux_wire::write_frame(&mut local, &frame, max_frame).await?;
                    }
                    None => {
                        tracing::info!("remote side closed, ending relay slave loop");
                        return Ok(());
                    }
                }
            }
            Some(update) = notify_rx.recv() => {
                capmux_wire::write_frame(
                    &mut remote,
                    &Frame::RelayNotify {
                        manifest: ByteBuf::from(update.manifest),
                        max_frame: update.limits.max_frame,
                        max_chunk: update.limits.max_chunk,
                    },
                    max_frame,
                )
                .await?;
            }
        }
    }
}
