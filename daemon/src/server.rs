use shared::{Request, Response, ToggleStatus};
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, error, info};

use crate::error::RunnerError;
use crate::runner::Runner;

type RequestLines = Lines<BufReader<OwnedReadHalf>>;

/// Control API over a Unix socket. One JSON document per line in each
/// direction; a connection may carry any number of requests.
pub struct ControlServer {
    socket_path: PathBuf,
    runner: Runner,
}

impl ControlServer {
    pub fn new(socket_path: PathBuf, runner: Runner) -> Self {
        Self {
            socket_path,
            runner,
        }
    }

    pub fn socket_path(&self) -> &PathBuf {
        &self.socket_path
    }

    pub fn bind(&self) -> anyhow::Result<UnixListener> {
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)?;
        }

        info!("Starting socket server at {}", self.socket_path.display());
        let listener = UnixListener::bind(&self.socket_path)?;
        debug!("Listener bound successfully");
        Ok(listener)
    }

    pub async fn run(&self) -> anyhow::Result<()> {
        let listener = self.bind()?;
        self.serve(listener).await
    }

    pub async fn serve(&self, listener: UnixListener) -> anyhow::Result<()> {
        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("Connection accepted");
                    let runner = self.runner.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(runner, stream).await {
                            error!("Error handling connection: {}", e);
                        } else {
                            debug!("Connection closed");
                        }
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                }
            }
        }
    }
}

impl Drop for ControlServer {
    fn drop(&mut self) {
        if self.socket_path.exists() {
            let _ = std::fs::remove_file(&self.socket_path);
        }
    }
}

async fn handle_connection(runner: Runner, stream: UnixStream) -> anyhow::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let request: Request = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(e) => {
                write_response(&mut writer, &Response::Error(format!("invalid request: {}", e)))
                    .await?;
                continue;
            }
        };

        info!("Received request: {:?}", request);

        match request {
            Request::Subscribe => return stream_events(&runner, &mut lines, &mut writer).await,
            Request::PreviewStream => return stream_preview(&runner, &mut lines, &mut writer).await,
            request => {
                let response = respond(&runner, request).await;
                write_response(&mut writer, &response).await?;
                debug!("Sent response: {:?}", response);
            }
        }
    }

    Ok(())
}

/// Map one request onto the runner.
pub async fn respond(runner: &Runner, request: Request) -> Response {
    match request {
        Request::Start => {
            if runner.start().await {
                Response::Started
            } else {
                Response::AlreadyRunning
            }
        }
        Request::Stop => {
            if runner.stop().await {
                Response::Stopped
            } else {
                Response::NotRunning
            }
        }
        Request::State => Response::Status(runner.status()),
        Request::OutputState => Response::Output(runner.output_status()),
        Request::SetOutput(mode) => match runner.set_output_mode(&mode) {
            Ok(status) => Response::Output(status),
            Err(RunnerError::NotRunning) => Response::NotRunning,
            Err(e) => Response::Rejected {
                reason: e.to_string(),
                output: runner.output_status(),
            },
        },
        Request::KwsState => toggle(runner.kws_enabled()),
        Request::KwsEnable => match runner.enable_kws().await {
            Ok(()) => toggle(true),
            Err(RunnerError::NotRunning) => Response::NotRunning,
            Err(e) => Response::Failed(e.to_string()),
        },
        Request::KwsDisable => match runner.disable_kws().await {
            Ok(()) => toggle(false),
            Err(RunnerError::NotRunning) => Response::NotRunning,
            Err(e) => Response::Failed(e.to_string()),
        },
        Request::OverlayState => toggle(runner.overlay_enabled()),
        Request::OverlayEnable => match runner.set_overlay(true) {
            Ok(enabled) => toggle(enabled),
            Err(_) => Response::NotRunning,
        },
        Request::OverlayDisable => match runner.set_overlay(false) {
            Ok(enabled) => toggle(enabled),
            Err(_) => Response::NotRunning,
        },
        Request::Frame => match runner.latest_frame() {
            Ok(Some(frame)) => Response::Frame(frame.to_image()),
            Ok(None) => Response::NoFrame,
            Err(_) => Response::NotRunning,
        },
        Request::TestCommand(action) => match runner.inject_command(&action).await {
            Ok(action) => Response::Queued { action },
            Err(RunnerError::InvalidAction(action)) => Response::InvalidAction(action),
            Err(RunnerError::NotRunning) => Response::NotRunning,
            Err(e) => Response::Error(e.to_string()),
        },
        Request::Subscribe | Request::PreviewStream => {
            Response::Error("streaming request needs its own connection".to_string())
        }
    }
}

fn toggle(enabled: bool) -> Response {
    Response::Toggle(ToggleStatus { enabled })
}

/// Forward every published event until the client goes away.
async fn stream_events(
    runner: &Runner,
    lines: &mut RequestLines,
    writer: &mut OwnedWriteHalf,
) -> anyhow::Result<()> {
    let mut subscription = runner.subscribe();
    info!("Event subscriber connected");

    loop {
        tokio::select! {
            event = subscription.recv() => {
                let Some(event) = event else { break };
                if write_response(writer, &Response::Event(event)).await.is_err() {
                    break;
                }
            }
            line = lines.next_line() => {
                if !matches!(line, Ok(Some(_))) {
                    break;
                }
            }
        }
    }

    subscription.unsubscribe();
    info!("Event subscriber disconnected");
    Ok(())
}

/// Push the newest preview every `stream_interval_ms` while the runner runs.
async fn stream_preview(
    runner: &Runner,
    lines: &mut RequestLines,
    writer: &mut OwnedWriteHalf,
) -> anyhow::Result<()> {
    if !runner.is_running() {
        return write_response(writer, &Response::NotRunning).await;
    }

    let period = Duration::from_millis(runner.config().preview.stream_interval_ms.max(1));
    let mut interval = tokio::time::interval(period);
    let mut last_sent = None;

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            line = lines.next_line() => {
                if !matches!(line, Ok(Some(_))) {
                    break;
                }
                continue;
            }
        }

        let frame = match runner.latest_frame() {
            Ok(frame) => frame,
            Err(_) => break,
        };
        let Some(frame) = frame else { continue };
        if last_sent == Some(frame.captured_at) {
            continue;
        }

        if write_response(writer, &Response::Frame(frame.to_image()))
            .await
            .is_err()
        {
            break;
        }
        last_sent = Some(frame.captured_at);
    }

    debug!("Preview stream ended");
    Ok(())
}

async fn write_response<W>(writer: &mut W, response: &Response) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut payload = serde_json::to_vec(response)?;
    payload.push(b'\n');
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DefaultBackends;
    use crate::config::Config;
    use crate::runner::ConfigSource;
    use std::sync::Arc;

    fn runner() -> Runner {
        let mut config = Config::default();
        config.gesture.enabled = false;
        Runner::new(ConfigSource::Fixed(config), Arc::new(DefaultBackends))
    }

    #[tokio::test]
    async fn test_respond_lifecycle() {
        let runner = runner();

        assert_eq!(respond(&runner, Request::Stop).await, Response::NotRunning);
        assert_eq!(respond(&runner, Request::Start).await, Response::Started);
        assert_eq!(respond(&runner, Request::Start).await, Response::AlreadyRunning);

        match respond(&runner, Request::State).await {
            Response::Status(status) => {
                assert!(status.running);
                assert_eq!(status.lifecycle, "running");
            }
            other => panic!("unexpected response: {other:?}"),
        }

        assert_eq!(respond(&runner, Request::Stop).await, Response::Stopped);
    }

    #[tokio::test]
    async fn test_respond_rejects_unknown_output_mode() {
        let runner = runner();
        assert_eq!(
            respond(&runner, Request::SetOutput("serial".into())).await,
            Response::NotRunning
        );

        runner.start().await;
        match respond(&runner, Request::SetOutput("bogus".into())).await {
            Response::Rejected { reason, output } => {
                assert!(reason.contains("bogus"));
                assert_eq!(output.mode, shared::OutputMode::Auto);
            }
            other => panic!("unexpected response: {other:?}"),
        }
        runner.stop().await;
    }

    #[tokio::test]
    async fn test_respond_frame_and_injection_when_stopped() {
        let runner = runner();
        assert_eq!(respond(&runner, Request::Frame).await, Response::NotRunning);
        assert_eq!(
            respond(&runner, Request::TestCommand("playpause".into())).await,
            Response::NotRunning
        );

        runner.start().await;
        assert_eq!(respond(&runner, Request::Frame).await, Response::NoFrame);
        assert_eq!(
            respond(&runner, Request::TestCommand("nope".into())).await,
            Response::InvalidAction("nope".into())
        );
        runner.stop().await;
    }

    #[tokio::test]
    async fn test_overlay_requests() {
        let runner = runner();
        assert_eq!(
            respond(&runner, Request::OverlayDisable).await,
            Response::NotRunning
        );
        assert_eq!(
            respond(&runner, Request::OverlayState).await,
            Response::Toggle(ToggleStatus { enabled: true })
        );

        runner.start().await;
        assert_eq!(
            respond(&runner, Request::OverlayDisable).await,
            Response::Toggle(ToggleStatus { enabled: false })
        );
        assert_eq!(
            respond(&runner, Request::OverlayState).await,
            Response::Toggle(ToggleStatus { enabled: false })
        );
        assert_eq!(
            respond(&runner, Request::OverlayEnable).await,
            Response::Toggle(ToggleStatus { enabled: true })
        );
        runner.stop().await;
    }

    #[tokio::test]
    async fn test_socket_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let server = ControlServer::new(dir.path().join("ctl.sock"), runner());
        let listener = server.bind().unwrap();
        let path = server.socket_path().clone();
        let handle = tokio::spawn(async move { server.serve(listener).await });

        let stream = UnixStream::connect(&path).await.unwrap();
        let (reader, mut writer) = stream.into_split();
        let mut replies = BufReader::new(reader).lines();

        writer.write_all(b"\"Start\"\n\"not json\n\"State\"\n").await.unwrap();

        let started: Response =
            serde_json::from_str(&replies.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(started, Response::Started);

        let bad: Response =
            serde_json::from_str(&replies.next_line().await.unwrap().unwrap()).unwrap();
        assert!(matches!(bad, Response::Error(_)));

        let state: Response =
            serde_json::from_str(&replies.next_line().await.unwrap().unwrap()).unwrap();
        assert!(matches!(state, Response::Status(s) if s.running));

        handle.abort();
    }
}
