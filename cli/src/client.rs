use shared::ipc::{IpcError, Request, Response};
use std::ops::ControlFlow;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::time::{timeout, Duration};
use tracing::warn;

/// Timeout for socket operations (5 seconds)
const SOCKET_TIMEOUT: Duration = Duration::from_secs(5);

/// An open request. The write half stays open so the daemon keeps streaming.
struct Connection {
    lines: Lines<BufReader<OwnedReadHalf>>,
    _writer: OwnedWriteHalf,
}

pub struct DaemonClient {
    socket_path: PathBuf,
}

impl DaemonClient {
    pub fn new(socket_path: Option<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.unwrap_or_else(shared::socket_path),
        }
    }

    /// Send one request and wait for its single response.
    pub async fn send(&self, request: Request) -> Result<Response, IpcError> {
        let mut conn = self.open(&request).await?;

        match timeout(SOCKET_TIMEOUT, conn.lines.next_line()).await {
            Ok(Ok(Some(line))) => Ok(serde_json::from_str(&line)?),
            Ok(Ok(None)) => Err(IpcError::Closed),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => {
                warn!(
                    "Read timeout: no response from daemon within {:?}",
                    SOCKET_TIMEOUT
                );
                Err(IpcError::Timeout)
            }
        }
    }

    /// Send a streaming request and feed every response to `handler` until it
    /// breaks or the daemon closes the connection.
    pub async fn stream<F>(&self, request: Request, mut handler: F) -> Result<(), IpcError>
    where
        F: FnMut(Response) -> ControlFlow<()>,
    {
        let mut conn = self.open(&request).await?;

        while let Some(line) = conn.lines.next_line().await? {
            let response: Response = serde_json::from_str(&line)?;
            if handler(response).is_break() {
                break;
            }
        }

        Ok(())
    }

    async fn open(&self, request: &Request) -> Result<Connection, IpcError> {
        let stream = match timeout(SOCKET_TIMEOUT, UnixStream::connect(&self.socket_path)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e))
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::NotFound | std::io::ErrorKind::ConnectionRefused
                ) =>
            {
                return Err(IpcError::ConnectionRefused);
            }
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                warn!(
                    "Connection timeout: failed to connect to daemon at {} within {:?}",
                    self.socket_path.display(),
                    SOCKET_TIMEOUT
                );
                return Err(IpcError::Timeout);
            }
        };

        let (reader, mut writer) = stream.into_split();

        let mut payload = serde_json::to_vec(request)?;
        payload.push(b'\n');

        match timeout(SOCKET_TIMEOUT, writer.write_all(&payload)).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(
                    "Write timeout: failed to send request to daemon within {:?}",
                    SOCKET_TIMEOUT
                );
                return Err(IpcError::Timeout);
            }
        }

        Ok(Connection {
            lines: BufReader::new(reader).lines(),
            _writer: writer,
        })
    }
}
