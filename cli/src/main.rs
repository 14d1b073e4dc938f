mod client;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use client::DaemonClient;
use shared::ipc::{Event, Request, Response};
use std::ops::ControlFlow;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "handcue")]
#[command(about = "CLI tool for the handcued gesture and keyword command daemon")]
struct Cli {
    /// Control socket of the daemon
    #[arg(long, global = true)]
    socket: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start capture and dispatch
    Start,
    /// Stop capture and dispatch
    Stop,
    /// Show runner state
    State,
    /// Show or set the output mode (auto, serial, local)
    Output { mode: Option<String> },
    /// Show or toggle keyword spotting
    Kws { toggle: Option<Toggle> },
    /// Show or toggle the landmark overlay on preview frames
    Overlay { toggle: Option<Toggle> },
    /// Save the latest preview frame as JPEG
    Frame {
        #[arg(long, short)]
        out: PathBuf,
    },
    /// Print recognized and dispatched commands as they happen
    Watch,
    /// Queue a command as if it had been recognized
    Test { action: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum Toggle {
    Enable,
    Disable,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = DaemonClient::new(cli.socket);

    if let Commands::Frame { out } = &cli.command {
        return save_frame(&client, out).await;
    }

    let request = build_request(cli.command);
    if request.is_stream() {
        return watch(&client, request).await;
    }

    match client.send(request).await {
        Ok(response) => print_response(response),
        Err(e) => {
            eprintln!("Failed to connect to handcued: {}", e);
            std::process::exit(1);
        }
    }
}

fn build_request(command: Commands) -> Request {
    match command {
        Commands::Start => Request::Start,
        Commands::Stop => Request::Stop,
        Commands::State => Request::State,
        Commands::Output { mode: None } => Request::OutputState,
        Commands::Output { mode: Some(mode) } => Request::SetOutput(mode),
        Commands::Kws { toggle: None } => Request::KwsState,
        Commands::Kws {
            toggle: Some(Toggle::Enable),
        } => Request::KwsEnable,
        Commands::Kws {
            toggle: Some(Toggle::Disable),
        } => Request::KwsDisable,
        Commands::Overlay { toggle: None } => Request::OverlayState,
        Commands::Overlay {
            toggle: Some(Toggle::Enable),
        } => Request::OverlayEnable,
        Commands::Overlay {
            toggle: Some(Toggle::Disable),
        } => Request::OverlayDisable,
        Commands::Frame { .. } => Request::Frame,
        Commands::Watch => Request::Subscribe,
        Commands::Test { action } => Request::TestCommand(action),
    }
}

fn print_response(response: Response) -> Result<()> {
    match response {
        Response::Started => println!("Started"),
        Response::AlreadyRunning => println!("Already running"),
        Response::Stopped => println!("Stopped"),
        Response::NotRunning => {
            eprintln!("Runner is not running");
            std::process::exit(1);
        }
        Response::Status(status) => {
            println!("State:");
            println!("  Running: {}", status.running);
            println!("  Lifecycle: {}", status.lifecycle);
            println!("  Gesture: {}", status.gesture_enabled);
            println!("  Keyword: {}", status.kws_enabled);
        }
        Response::Output(output) => {
            println!("Output:");
            println!("  Mode: {}", output.mode);
            println!("  Serial available: {}", output.serial_available);
        }
        Response::Rejected { reason, output } => {
            eprintln!("Error: {}", reason);
            eprintln!("Output mode stays {}", output.mode);
            std::process::exit(1);
        }
        Response::Toggle(toggle) => {
            println!("{}", if toggle.enabled { "Enabled" } else { "Disabled" });
        }
        Response::Failed(msg) | Response::Error(msg) => {
            eprintln!("Error: {}", msg);
            std::process::exit(1);
        }
        Response::Queued { action } => println!("Queued {}", action),
        Response::InvalidAction(action) => {
            eprintln!("Invalid action: {}", action);
            std::process::exit(1);
        }
        Response::NoFrame => println!("No frame available yet"),
        Response::Frame(_) | Response::Event(_) => {
            bail!("unexpected streaming response")
        }
    }

    Ok(())
}

async fn save_frame(client: &DaemonClient, out: &PathBuf) -> Result<()> {
    match client.send(Request::Frame).await? {
        Response::Frame(image) => {
            std::fs::write(out, &image.jpeg)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Saved {} bytes to {}", image.jpeg.len(), out.display());
            Ok(())
        }
        other => print_response(other),
    }
}

async fn watch(client: &DaemonClient, request: Request) -> Result<()> {
    client
        .stream(request, |response| {
            if let Response::Event(event) = response {
                println!("{}", format_event(&event));
            }
            ControlFlow::Continue(())
        })
        .await?;
    Ok(())
}

fn format_event(event: &Event) -> String {
    let mut line = format!(
        "{:.3} {:?} {} {}",
        event.timestamp, event.kind, event.source, event.action
    );
    if let Some(label) = &event.label {
        line.push_str(&format!(" ({} {:.2})", label, event.confidence));
    }
    if let Some(sink) = &event.sink {
        line.push_str(&format!(" -> {}", sink));
    }
    line
}
