//! Main entry point for the httpasset example server.
//!
//! Serves files from the zip archive appended to this binary, or from a local
//! directory when nothing was appended yet.

use anyhow::{Result, anyhow, bail};
use clap::Parser;
use std::sync::Arc;
use tiny_http::Server;
use tracing::info;
use tracing_subscriber::EnvFilter;

use httpasset::{Cli, Lifecycle, serve};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_filter()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let lifecycle = Arc::new(Lifecycle::new(cli.options()));
    let fs = lifecycle.initialize(Some(cli.assets.as_path()));
    if fs.is_archive() {
        info!("serving files from appended archive");
    } else if let Err(err) = fs.open("/") {
        bail!("no assets to serve: {err}");
    } else {
        info!(dir = %cli.assets.display(), "serving files from local directory");
    }

    let server = Server::http(cli.addr).map_err(|err| anyhow!("binding {}: {err}", cli.addr))?;
    info!(addr = ?server.server_addr(), "listening");

    serve::run(server, fs).await;
    Ok(())
}
