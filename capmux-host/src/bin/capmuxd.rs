//! `capmuxd`: the host process. Loads a `HostConfig`, registers its configured
//! plugins, then accepts the upstream engine connection and runs the router's
//! multiplexing loop until the engine disconnects — then waits for the next one.

use capmux_core::{HostConfig, init_tracing};
use capmux_host::{Host, ProcessLauncher};
use clap::Parser;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Host process for capability-oriented plugins.
#[derive(Debug, Parser)]
#[command(name = "capmuxd", version, about)]
struct Cli {
    /// Path to a TOML `HostConfig` file. Falls back to built-in defaults if omitted.
    #[arg(long, short = 'c')]
    config: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = match cli.config {
        Some(path) => HostConfig::from_file(&path)?,
        None => HostConfig::default(),
    };

    let listener = TcpListener::bind(&config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "capmuxd listening for an engine connection");

    loop {
        let (stream, peer_addr) = listener.accept().await?;
        tracing::info!(%peer_addr, "engine connected");

        let mut host = Host::new(b"capmuxd".to_vec(), config.max_frame, config.max_chunk)
            .with_launcher(Arc::new(ProcessLauncher::new()));
        for plugin in config.plugins.clone() {
            match host.register_plugin(plugin) {
                Ok(idx) => tracing::info!(plugin_idx = idx, "registered plugin from config"),
                Err(e) => tracing::error!(error = %e, "failed to register configured plugin"),
            }
        }

        let (read_half, write_half) = stream.into_split();
        if let Err(e) = host.run(read_half, write_half).await {
            tracing::warn!(error = %e, %peer_addr, "engine session ended with an error");
        } else {
            tracing::info!(%peer_addr, "engine session ended");
        }
    }
}
