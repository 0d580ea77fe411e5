//! IPC server implementation

use guardian_api::{ClientInfo, ErrorCode, ErrorInfo, Event, Request, Response};
use guardian_util::{ClientId, ParentId};
use std::collections::HashMap;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::{IpcError, IpcResult};

/// Message from client to server
pub enum ServerMessage {
    Request {
        client_id: ClientId,
        request: Request,
    },
    ClientConnected {
        client_id: ClientId,
        info: ClientInfo,
    },
    ClientDisconnected {
        client_id: ClientId,
    },
}

/// IPC Server
pub struct IpcServer {
    socket_path: PathBuf,
    listener: Option<UnixListener>,
    clients: Arc<RwLock<HashMap<ClientId, ClientHandle>>>,
    event_tx: broadcast::Sender<Event>,
    message_tx: mpsc::UnboundedSender<ServerMessage>,
    message_rx: Arc<Mutex<Option<mpsc::UnboundedReceiver<ServerMessage>>>>,
}

struct ClientHandle {
    info: ClientInfo,
    response_tx: mpsc::UnboundedSender<String>,
    subscribed: bool,
    /// Parent this connection is logged in as
    parent_id: Option<ParentId>,
}

impl ClientHandle {
    /// Parent-scoped events reach only that parent's subscribed
    /// connections; service-wide events reach every subscriber.
    fn wants(&self, event: &Event) -> bool {
        if !self.subscribed {
            return false;
        }
        match event.parent_id() {
            Some(parent_id) => self.parent_id == Some(parent_id),
            None => true,
        }
    }
}

impl IpcServer {
    /// Create a new IPC server
    pub fn new(socket_path: impl AsRef<Path>) -> Self {
        let (event_tx, _) = broadcast::channel(100);
        let (message_tx, message_rx) = mpsc::unbounded_channel();

        Self {
            socket_path: socket_path.as_ref().to_path_buf(),
            listener: None,
            clients: Arc::new(RwLock::new(HashMap::new())),
            event_tx,
            message_tx,
            message_rx: Arc::new(Mutex::new(Some(message_rx))),
        }
    }

    /// Start listening
    pub async fn start(&mut self) -> IpcResult<()> {
        // Remove a stale socket from a previous run
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)?;
        }

        if let Some(parent) = self.socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(&self.socket_path)?;

        // Owner and group only
        std::fs::set_permissions(&self.socket_path, std::fs::Permissions::from_mode(0o660))?;

        info!(path = %self.socket_path.display(), "IPC server listening");

        self.listener = Some(listener);

        Ok(())
    }

    /// Get receiver for server messages
    pub async fn take_message_receiver(&self) -> Option<mpsc::UnboundedReceiver<ServerMessage>> {
        self.message_rx.lock().await.take()
    }

    /// Accept connections in a loop
    pub async fn run(&self) -> IpcResult<()> {
        let listener = self
            .listener
            .as_ref()
            .ok_or(IpcError::NotStarted)?;

        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let client_id = ClientId::new();
                    let uid = get_peer_uid(&stream);

                    let info = ClientInfo::new(client_id.clone());
                    let info = match uid {
                        Some(u) => info.with_uid(u),
                        None => info,
                    };

                    info!(client_id = %client_id, uid = ?uid, "Client connected");

                    self.handle_client(stream, client_id, info).await;
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    async fn handle_client(&self, stream: UnixStream, client_id: ClientId, info: ClientInfo) {
        let (read_half, write_half) = stream.into_split();
        let (response_tx, mut response_rx) = mpsc::unbounded_channel::<String>();

        {
            let mut clients = self.clients.write().await;
            clients.insert(
                client_id.clone(),
                ClientHandle {
                    info: info.clone(),
                    response_tx: response_tx.clone(),
                    subscribed: false,
                    parent_id: None,
                },
            );
        }

        let _ = self.message_tx.send(ServerMessage::ClientConnected {
            client_id: client_id.clone(),
            info,
        });

        let clients = self.clients.clone();
        let message_tx = self.message_tx.clone();
        let reader_client_id = client_id.clone();

        // Reader: one request per line
        tokio::spawn(async move {
            let mut reader = BufReader::new(read_half);
            let mut line = String::new();

            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) => {
                        debug!(client_id = %reader_client_id, "Client disconnected (EOF)");
                        break;
                    }
                    Ok(_) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }

                        match serde_json::from_str::<Request>(line) {
                            Ok(request) => {
                                let _ = message_tx.send(ServerMessage::Request {
                                    client_id: reader_client_id.clone(),
                                    request,
                                });
                            }
                            Err(e) => {
                                warn!(
                                    client_id = %reader_client_id,
                                    error = %e,
                                    "Invalid request"
                                );
                                // No request id to correlate with
                                let response = Response::error(
                                    0,
                                    ErrorInfo::new(ErrorCode::InvalidRequest, e.to_string()),
                                );
                                if let Ok(json) = serde_json::to_string(&response) {
                                    let _ = response_tx.send(json);
                                }
                            }
                        }
                    }
                    Err(e) => {
                        debug!(client_id = %reader_client_id, error = %e, "Read error");
                        break;
                    }
                }
            }

            // Dropping the handle closes the writer's response channel
            clients.write().await.remove(&reader_client_id);
            let _ = message_tx.send(ServerMessage::ClientDisconnected {
                client_id: reader_client_id,
            });
        });

        let mut event_rx = self.event_tx.subscribe();
        let clients_writer = self.clients.clone();
        let writer_client_id = client_id;

        // Writer: responses plus events this client wants
        tokio::spawn(async move {
            let mut writer = write_half;

            loop {
                tokio::select! {
                    response = response_rx.recv() => {
                        // Reader gone and handle removed
                        let Some(mut msg) = response else { break };
                        msg.push('\n');
                        if let Err(e) = writer.write_all(msg.as_bytes()).await {
                            debug!(client_id = %writer_client_id, error = %e, "Write error");
                            break;
                        }
                    }

                    received = event_rx.recv() => {
                        let event = match received {
                            Ok(event) => event,
                            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                warn!(client_id = %writer_client_id, skipped, "Client lagging, events dropped");
                                continue;
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        };

                        let wanted = {
                            let clients = clients_writer.read().await;
                            clients
                                .get(&writer_client_id)
                                .map(|h| h.wants(&event))
                                .unwrap_or(false)
                        };

                        if wanted && let Ok(json) = serde_json::to_string(&event) {
                            let mut msg = json;
                            msg.push('\n');
                            if let Err(e) = writer.write_all(msg.as_bytes()).await {
                                debug!(client_id = %writer_client_id, error = %e, "Event write error");
                                break;
                            }
                        }
                    }

                }
            }

            clients_writer.write().await.remove(&writer_client_id);
        });
    }

    /// Send a response to a specific client
    pub async fn send_response(&self, client_id: &ClientId, response: Response) -> IpcResult<()> {
        let json = serde_json::to_string(&response)?;

        let clients = self.clients.read().await;
        if let Some(handle) = clients.get(client_id) {
            handle
                .response_tx
                .send(json)
                .map_err(|_| IpcError::Disconnected)?;
        }

        Ok(())
    }

    /// Bind (or unbind, with `None`) a connection to a logged-in parent
    pub async fn set_client_parent(&self, client_id: &ClientId, parent_id: Option<ParentId>) {
        let mut clients = self.clients.write().await;
        if let Some(handle) = clients.get_mut(client_id) {
            handle.parent_id = parent_id;
            if parent_id.is_none() {
                handle.subscribed = false;
            }
        }
    }

    /// Turn event delivery on or off for a connection
    pub async fn set_subscribed(&self, client_id: &ClientId, subscribed: bool) {
        let mut clients = self.clients.write().await;
        if let Some(handle) = clients.get_mut(client_id) {
            handle.subscribed = subscribed;
        }
    }

    /// Broadcast an event; each connection filters by subscription and parent
    pub fn broadcast_event(&self, event: Event) {
        let _ = self.event_tx.send(event);
    }

    /// Get client info
    pub async fn get_client_info(&self, client_id: &ClientId) -> Option<ClientInfo> {
        let clients = self.clients.read().await;
        clients.get(client_id).map(|h| h.info.clone())
    }

    /// Get connected client count
    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Shutdown the server
    pub fn shutdown(&self) {
        if self.socket_path.exists() {
            let _ = std::fs::remove_file(&self.socket_path);
        }
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Get peer UID from Unix socket
fn get_peer_uid(stream: &UnixStream) -> Option<u32> {
    use std::os::unix::io::AsFd;

    let fd = stream.as_fd();

    match nix::sys::socket::getsockopt(&fd, nix::sys::socket::sockopt::PeerCredentials) {
        Ok(cred) => Some(cred.uid()),
        Err(_) => None,
    }
}
