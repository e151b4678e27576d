//! The default [`PluginLauncher`]: spawns a plugin as a child process and
//! speaks the wire protocol over its stdin/stdout, the transport spec.md §1
//! assumes for a locally-launched plugin.

use crate::plugin::{BoxedReader, BoxedWriter, PluginLauncher};
use async_trait::async_trait;
use capmux_core::PluginSpec;
use std::process::Stdio;
use tokio::process::{Child, Command};

/// Launches a plugin via `tokio::process::Command`, piping its stdin/stdout.
/// The child's stderr is inherited so plugin diagnostics reach the host's own
/// stderr/log stream rather than being silently discarded.
#[derive(Debug, Default)]
pub struct ProcessLauncher;

impl ProcessLauncher {
    pub fn new() -> Self {
        ProcessLauncher
    }
}

#[async_trait]
impl PluginLauncher for ProcessLauncher {
    async fn launch(&self, spec: &PluginSpec) -> std::io::Result<(BoxedReader, BoxedWriter)> {
        let mut child: Child = Command::new(&spec.command)
            .args(&spec.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child.stdin.take().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::Other, "spawned plugin has no stdin pipe")
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::Other, "spawned plugin has no stdout pipe")
        })?;

        // Moves `child` into a reaper task rather than dropping it here: `kill_on_drop`
        // would otherwise kill the process as soon as this function returns.
        tokio::spawn(async move {
            let _ = child.wait().await;
        });

        Ok((Box::pin(stdout), Box::pin(stdin)))
    }
}
