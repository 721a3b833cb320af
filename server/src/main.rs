use anyhow::{Context, Result};
use broker_server::config::Args;
use broker_server::dispatch::{register_builtins, Collaborators, Dispatcher};
use broker_server::net::NetworkManager;
use broker_server::persist::Spooler;
use broker_server::topic::Router;
use broker_std::compression::Compression;
use clap::Parser;
use env_logger::Target;
use log::info;
use std::fs::OpenOptions;
use std::sync::Arc;
use tokio::net::UdpSocket;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args)?;

    let socket = Arc::new(
        UdpSocket::bind(("0.0.0.0", args.port))
            .await
            .with_context(|| format!("failed to bind UDP socket on port {}", args.port))?,
    );
    info!("listening on {}", socket.local_addr()?);

    let compression = Arc::new(Compression::new(args.plain_mode));
    let router = Arc::new(Router::new(socket.clone(), compression.clone()));
    let spooler = Spooler::start(args.persist_config());

    let mut dispatcher = Dispatcher::new();
    register_builtins(&mut dispatcher);

    let collaborators = Collaborators {
        router: router.clone(),
        spooler: spooler.clone(),
    };
    let manager = NetworkManager::new(socket, compression, router.clone(), dispatcher, collaborators);

    tokio::select! {
        _ = manager.run() => {}
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for ctrl-c")?;
            info!("shutdown signal received: preparing to gracefully shut down");
            router.close().await;
        }
    }

    spooler.close().await;
    info!("shutdown complete");
    Ok(())
}

/// `LOG_MESSAGES=false` silences logging entirely; otherwise output goes to
/// `LOG_FILE_NAME` when set, or stderr, at the level implied by `-v`/`-q`.
fn init_logging(args: &Args) -> Result<()> {
    if !args.log_messages {
        return Ok(());
    }

    let mut builder = env_logger::Builder::new();
    builder.filter_level(args.verbosity.log_level_filter());

    if let Some(path) = &args.log_file {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open log file {}", path.display()))?;
        builder.target(Target::Pipe(Box::new(file)));
    }

    builder.init();
    Ok(())
}
