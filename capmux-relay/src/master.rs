//! Relay master (§4.7): the host-side end of a relay pair. Blocks for the
//! slave's first `RELAY_NOTIFY`, then transparently intercepts any later one
//! while reading ordinary protocol frames.

use crate::error::{Error, Result};
use capmux_wire::{Frame, NegotiatedLimits};
use tokio::io::{AsyncRead, AsyncWrite};

/// Wraps a connection to a relay slave, hiding `RELAY_NOTIFY`/`RELAY_STATE`
/// frames from callers of [`RelayMaster::read_frame`] and surfacing their
/// content through [`RelayMaster::manifest`]/[`RelayMaster::limits`]/
/// [`RelayMaster::resource_state`] instead.
pub struct RelayMaster<S> {
    stream: S,
    manifest: Vec<u8>,
    limits: NegotiatedLimits,
    resource_state: Option<Vec<u8>>,
    max_frame: u64,
    max_chunk: u64,
}

impl<S> RelayMaster<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Blocks reading `stream` until the slave's opening `RELAY_NOTIFY` arrives.
    pub async fn connect(mut stream: S, max_frame: u64, max_chunk: u64) -> Result<Self> {
        loop {
            let frame = capmux_wire::read_frame(&mut stream, max_frame, max_chunk)
                .await?
                .ok_or(Error::NoNotifyBeforeClose)?;
            if let Frame::RelayNotify {
                manifest,
                max_frame: peer_max_frame,
                max_chunk: peer_max_chunk,
            } = frame
            {
                return Ok(RelayMaster {
                    stream,
                    manifest: manifest.into_vec(),
                    limits: NegotiatedLimits {
                        max_frame: peer_max_frame,
                        max_chunk: peer_max_chunk,
                    },
                    resource_state: None,
                    max_frame,
                    max_chunk,
                });
            }
            tracing::debug!("discarding non-RELAY_NOTIFY frame while waiting for the opening notify");
        }
    }

    pub fn manifest(&self) -> &[u8] {
        &self.manifest
    }

    pub fn limits(&self) -> NegotiatedLimits {
        self.limits
    }

    pub fn resource_state(&self) -> Option<&[u8]> {
        self.resource_state.as_deref()
    }

    /// Reads the next ordinary protocol frame, transparently consuming and
    /// applying any `RELAY_NOTIFY`/`RELAY_STATE` the slave sends in between.
    /// `Ok(None)` on a clean slave close (§4.7, Scenario S6).
    pub async fn read_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            let Some(frame) = capmux_wire::read_frame(&mut self.stream, self.max_frame, self.max_chunk).await? else {
                return Ok(None);
            };
            match frame {
                Frame::RelayNotify {
                    manifest,
                    max_frame,
                    max_chunk,
                } => {
                    self.manifest = manifest.into_vec();
                    self.limits = NegotiatedLimits { max_frame, max_chunk };
                    tracing::info!("relay master view updated from RELAY_NOTIFY");
                }
                Frame::RelayState { payload } => {
                    self.resource_state = Some(payload.into_vec());
                }
                other => return Ok(Some(other)),
            }
        }
    }

    /// Forwards an ordinary protocol frame to the slave. Relay frames are never
    /// constructed by the master — only the slave originates them.
    pub async fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        capmux_wire::write_frame(&mut self.stream, frame, self.max_frame).await?;
        Ok(())
    }
}
