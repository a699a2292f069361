//! leafpress-highlight: long-lived syntax highlighting server.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use leafpress_highlight::server::{self, Server};
use leafpress_highlight::shutdown::{self, TerminationSignals};

const PROTOCOL_HELP: &str = r#"Request format:
    LANGUAGE ":" CODE "\0"

Response format:
    (HTML_OUTPUT | "error:" ERROR_MESSAGE) "\0""#;

/// Runs a server that highlights code for leafpress page generation.
#[derive(Debug, Parser)]
#[command(name = "leafpress-highlight", version, about, after_help = PROTOCOL_HELP)]
struct Cli {
    /// Socket path. The server creates a stream-oriented Unix domain socket
    /// here to listen on. It exits automatically if SOCKET is removed.
    socket: PathBuf,

    /// Synchronization file. If provided, the server signals FIFO (opens it
    /// for writing and closes it) when ready to serve requests on SOCKET.
    fifo: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, short)]
    verbose: bool,
}

fn init_tracing(verbose: bool) -> Result<()> {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    let mut signals = TerminationSignals::install().context("failed to install signal handlers")?;
    let server = Server::bind(&cli.socket)?;
    let socket = server.socket_path().to_path_buf();

    if let Some(fifo) = &cli.fifo {
        server::signal_ready(fifo).await?;
    }

    tokio::select! {
        result = server.run() => result?,
        sig = signals.recv() => {
            info!(?sig, "received signal, shutting down");
            server::remove_socket(&socket);
            shutdown::reraise(sig);
        }
    }

    Ok(())
}
