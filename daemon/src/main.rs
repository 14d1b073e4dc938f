use anyhow::Result;
use clap::Parser;
use handcued::{ConfigSource, ControlServer, DefaultBackends, Runner};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "handcued")]
#[command(about = "Gesture and keyword media control daemon", long_about = None)]
#[command(version)]
struct Args {
    /// Config file (defaults to the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Control socket path
    #[arg(short, long)]
    socket: Option<PathBuf>,

    /// Start capture immediately instead of waiting for a start request
    #[arg(long)]
    autostart: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(LevelFilter::INFO)
        .with_target(false)
        .with_env_filter(EnvFilter::from_default_env().add_directive(LevelFilter::INFO.into()))
        .init();

    let args = Args::parse();
    info!("handcue daemon (handcued) starting...");

    let runner = Runner::new(
        ConfigSource::File(args.config),
        Arc::new(DefaultBackends),
    );
    let socket_path = args
        .socket
        .unwrap_or_else(|| runner.config().server.socket_path());

    if args.autostart {
        runner.start().await;
    }

    let server = ControlServer::new(socket_path, runner.clone());

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Control server failed: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown requested");
        }
    }

    runner.stop().await;
    info!("handcue daemon stopped");
    Ok(())
}
