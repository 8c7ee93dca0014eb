//! Unix domain socket server for IPC
//!
//! Provides request-response status queries and push notifications of
//! decoder events to subscribed clients.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{debug, error, info, warn};

use crate::events::DecoderEvent;

use super::protocol::{DaemonStatus, Notification, Request, Response, MAX_MESSAGE_LEN};

/// IPC Server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: UnixListener,
    state: Arc<RwLock<ServerState>>,
    shutdown_tx: broadcast::Sender<()>,
    /// Decoder events fanned out to subscribed clients
    events_tx: broadcast::Sender<DecoderEvent>,
}

/// Shared server state
struct ServerState {
    status: DaemonStatus,
    start_time: Instant,
}

impl Server {
    /// Create a new IPC server for the given sample source
    pub fn new(socket_path: &Path, source: &str) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }

        // Remove stale socket if it exists
        if socket_path.exists() {
            std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path).context("failed to bind Unix socket")?;

        // Set socket permissions to owner-only (0600)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);
        let (events_tx, _) = broadcast::channel(64);

        let state = Arc::new(RwLock::new(ServerState {
            status: DaemonStatus::new(source),
            start_time: Instant::now(),
        }));

        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener,
            state,
            shutdown_tx,
            events_tx,
        })
    }

    /// Record a decoder event and forward it to subscribers
    pub async fn record(&self, event: &DecoderEvent) {
        self.state.write().await.status.apply(event);
        // No subscribers is fine
        let _ = self.events_tx.send(event.clone());
    }

    /// Current status snapshot
    pub async fn status(&self) -> DaemonStatus {
        let state = self.state.read().await;
        let mut status = state.status.clone();
        status.uptime_secs = state.start_time.elapsed().as_secs();
        status
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let state = Arc::clone(&self.state);
                    let events_tx = self.events_tx.clone();
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = Self::handle_client(stream, state, events_tx) => {
                                if let Err(e) = result {
                                    warn!(?e, "client handler error");
                                }
                            }
                            _ = shutdown_rx.recv() => {
                                debug!("client handler shutting down");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(?e, "accept error");
                }
            }
        }
    }

    /// Handle a single client connection
    async fn handle_client(
        stream: UnixStream,
        state: Arc<RwLock<ServerState>>,
        events_tx: broadcast::Sender<DecoderEvent>,
    ) -> Result<()> {
        let (mut reader, mut writer) = stream.into_split();
        let (request_tx, mut request_rx) = mpsc::channel::<Vec<u8>>(8);

        // Frames are read on their own task so the loop below can wait on
        // requests and notifications at the same time
        let read_task = tokio::spawn(async move {
            loop {
                match read_frame(&mut reader).await {
                    Ok(Some(frame)) => {
                        if request_tx.send(frame).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        debug!("client disconnected");
                        break;
                    }
                    Err(e) => {
                        warn!(?e, "failed to read request");
                        break;
                    }
                }
            }
        });

        let mut events_rx: Option<broadcast::Receiver<DecoderEvent>> = None;

        let result: Result<()> = async {
            loop {
                tokio::select! {
                    frame = request_rx.recv() => {
                        let Some(frame) = frame else {
                            return Ok(());
                        };

                        let response = match serde_json::from_slice::<Request>(&frame) {
                            Ok(request) => {
                                debug!(?request, "received request");
                                if matches!(request, Request::Subscribe) && events_rx.is_none() {
                                    events_rx = Some(events_tx.subscribe());
                                    debug!("client subscribed to notifications");
                                }
                                Self::process_request(request, &state).await
                            }
                            Err(e) => Response::Error {
                                code: "bad_request".to_string(),
                                message: e.to_string(),
                            },
                        };

                        write_frame(&mut writer, &response).await?;
                    }

                    event = next_event(&mut events_rx) => {
                        let notification = match event {
                            Ok(event) => Notification::Event { event },
                            Err(RecvError::Lagged(skipped)) => {
                                warn!(skipped, "subscriber lagged");
                                Notification::Lagged { skipped }
                            }
                            Err(RecvError::Closed) => {
                                events_rx = None;
                                continue;
                            }
                        };

                        write_frame(&mut writer, &notification).await?;
                    }
                }
            }
        }
        .await;

        read_task.abort();
        result
    }

    /// Process a request and return a response
    async fn process_request(request: Request, state: &Arc<RwLock<ServerState>>) -> Response {
        match request {
            Request::Ping => Response::Pong,

            Request::GetStatus => {
                let mut state = state.write().await;
                state.status.uptime_secs = state.start_time.elapsed().as_secs();
                Response::Status(state.status.clone())
            }

            Request::Subscribe => Response::Subscribed,
        }
    }

    /// Gracefully shutdown the server
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        // Remove socket file
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove socket file");
            }
        }

        info!("IPC server shutdown complete");
    }
}

/// Wait for the next event, or forever when not subscribed
async fn next_event(
    events_rx: &mut Option<broadcast::Receiver<DecoderEvent>>,
) -> Result<DecoderEvent, RecvError> {
    match events_rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Read a length-prefixed message; `None` on clean disconnect
pub(crate) async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];

    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_LEN {
        anyhow::bail!("message too large: {} bytes", len);
    }

    let mut msg_buf = vec![0u8; len];
    reader.read_exact(&mut msg_buf).await?;

    Ok(Some(msg_buf))
}

/// Send a length-prefixed JSON message
pub(crate) async fn write_frame<W, T>(writer: &mut W, msg: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let msg_bytes = serde_json::to_vec(msg)?;
    let msg_len = u32::try_from(msg_bytes.len())
        .context("message too large")?
        .to_le_bytes();

    writer.write_all(&msg_len).await?;
    writer.write_all(&msg_bytes).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chord::Command;
    use tempfile::TempDir;

    async fn start_server(dir: &TempDir) -> (Arc<Server>, UnixStream) {
        let socket_path = dir.path().join("daemon.sock");
        let server = Arc::new(Server::new(&socket_path, "test").unwrap());

        let running = Arc::clone(&server);
        tokio::spawn(async move { running.run().await });

        let client = UnixStream::connect(&socket_path).await.unwrap();
        (server, client)
    }

    async fn roundtrip(client: &mut UnixStream, request: &Request) -> serde_json::Value {
        write_frame(client, request).await.unwrap();
        read_json(client).await
    }

    async fn read_json(client: &mut UnixStream) -> serde_json::Value {
        let frame = read_frame(client).await.unwrap().unwrap();
        serde_json::from_slice(&frame).unwrap()
    }

    #[tokio::test]
    async fn test_ping() {
        let dir = TempDir::new().unwrap();
        let (_server, mut client) = start_server(&dir).await;

        let response = roundtrip(&mut client, &Request::Ping).await;
        assert_eq!(response["type"], "pong");
    }

    #[tokio::test]
    async fn test_status_reflects_events() {
        let dir = TempDir::new().unwrap();
        let (server, mut client) = start_server(&dir).await;

        server
            .record(&DecoderEvent::PulseDetected { sample_index: 7 })
            .await;
        server
            .record(&DecoderEvent::CommandEmitted {
                command: Command::Next,
                presses: 2,
            })
            .await;

        let response = roundtrip(&mut client, &Request::GetStatus).await;
        assert_eq!(response["type"], "status");
        assert_eq!(response["pulses_detected"], 1);
        assert_eq!(response["commands_emitted"], 1);
        assert_eq!(response["last_command"], "next");
        assert_eq!(server.status().await.last_command, Some(Command::Next));
    }

    #[tokio::test]
    async fn test_subscriber_receives_events() {
        let dir = TempDir::new().unwrap();
        let (server, mut client) = start_server(&dir).await;

        let response = roundtrip(&mut client, &Request::Subscribe).await;
        assert_eq!(response["type"], "subscribed");

        server
            .record(&DecoderEvent::CommandEmitted {
                command: Command::Play,
                presses: 1,
            })
            .await;

        let notification = read_json(&mut client).await;
        assert_eq!(notification["type"], "event");
        assert_eq!(notification["event"]["type"], "command_emitted");
        assert_eq!(notification["event"]["command"], "play");
    }

    #[tokio::test]
    async fn test_bad_request_gets_error() {
        let dir = TempDir::new().unwrap();
        let (_server, mut client) = start_server(&dir).await;

        let body = br#"{"type":"set_mode"}"#;
        client
            .write_all(&(body.len() as u32).to_le_bytes())
            .await
            .unwrap();
        client.write_all(body).await.unwrap();

        let response = read_json(&mut client).await;
        assert_eq!(response["type"], "error");
        assert_eq!(response["code"], "bad_request");

        let response = roundtrip(&mut client, &Request::Ping).await;
        assert_eq!(response["type"], "pong");
    }

    #[tokio::test]
    async fn test_replaces_stale_socket_owner_only() {
        use std::os::unix::fs::{FileTypeExt, PermissionsExt};

        let dir = TempDir::new().unwrap();
        let socket_path = dir.path().join("daemon.sock");
        std::fs::write(&socket_path, b"left over").unwrap();

        let server = Server::new(&socket_path, "test").unwrap();

        let metadata = std::fs::metadata(&socket_path).unwrap();
        assert!(metadata.file_type().is_socket());
        assert_eq!(metadata.permissions().mode() & 0o777, 0o600);

        let server = Arc::new(server);
        let running = Arc::clone(&server);
        tokio::spawn(async move { running.run().await });

        let mut client = UnixStream::connect(&socket_path).await.unwrap();
        let response = roundtrip(&mut client, &Request::Ping).await;
        assert_eq!(response["type"], "pong");
    }

    #[tokio::test]
    async fn test_slow_subscriber_is_told_it_lagged() {
        let dir = TempDir::new().unwrap();
        let (server, mut client) = start_server(&dir).await;

        let response = roundtrip(&mut client, &Request::Subscribe).await;
        assert_eq!(response["type"], "subscribed");

        // More events than the broadcast buffer holds, recorded before the
        // client handler gets a chance to run
        for sample_index in 0..200 {
            server
                .record(&DecoderEvent::PulseDetected { sample_index })
                .await;
        }

        let notification = read_json(&mut client).await;
        assert_eq!(notification["type"], "lagged");
        assert!(notification["skipped"].as_u64().unwrap() > 0);

        let notification = read_json(&mut client).await;
        assert_eq!(notification["type"], "event");
        assert_eq!(notification["event"]["type"], "pulse_detected");
    }

    #[tokio::test]
    async fn test_shutdown_removes_socket() {
        let dir = TempDir::new().unwrap();
        let socket_path = dir.path().join("daemon.sock");
        let server = Server::new(&socket_path, "test").unwrap();
        assert!(socket_path.exists());

        server.shutdown().await;
        assert!(!socket_path.exists());
    }
}
