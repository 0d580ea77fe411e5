//! guardiand - The guardian background service
//!
//! This is the main entry point for the guardiand service.
//! It wires together all the components:
//! - Configuration loading
//! - Store initialization and seeding
//! - Core engine
//! - IPC server with per-connection login

mod dispatch;

use anyhow::{Context, Result};
use clap::Parser;
use guardian_api::{ErrorCode, ErrorInfo, Event, EventPayload, Response};
use guardian_config::{load_config, ServiceConfig, StoreBackend};
use guardian_core::{seed_store, Guardian};
use guardian_ipc::{IpcServer, ServerMessage};
use guardian_store::{MemoryStore, SqliteStore, Store};
use guardian_util::{default_config_path, ClientId, ParentId, RateLimiter};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::dispatch::{to_wire_event, Dispatcher, SessionChange};

/// guardiand - Install evaluation and alerting service for parental controls
#[derive(Parser, Debug)]
#[command(name = "guardiand")]
#[command(about = "Install evaluation and alerting service for parental controls", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/guardian/config.toml)
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Socket path override (or set GUARDIAN_SOCKET env var)
    #[arg(short, long, env = "GUARDIAN_SOCKET")]
    socket: Option<PathBuf>,

    /// Data directory override (or set GUARDIAN_DATA_DIR env var)
    #[arg(short, long, env = "GUARDIAN_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

/// Main service state
struct Service {
    dispatcher: Dispatcher,
    ipc: Arc<IpcServer>,
    /// Logged-in parent per connection
    sessions: HashMap<ClientId, ParentId>,
    rate_limiter: RateLimiter<ClientId>,
}

impl Service {
    async fn new(args: &Args) -> Result<Self> {
        let config = load_config(&args.config)
            .with_context(|| format!("Failed to load config from {:?}", args.config))?;

        info!(
            config_path = %args.config.display(),
            parents = config.parents.len(),
            children = config.children.len(),
            apps = config.apps.len(),
            "Configuration loaded"
        );

        let socket_path = args
            .socket
            .clone()
            .unwrap_or_else(|| config.service.socket_path.clone());

        let store = Self::open_store(args, &config)?;

        if let Some(summary) = seed_store(store.as_ref(), &config).context("Failed to seed store")? {
            debug!(?summary, "Seed complete");
        }

        let guardian = Guardian::new(store);

        let mut ipc = IpcServer::new(&socket_path);
        ipc.start()
            .await
            .with_context(|| format!("Failed to bind socket {:?}", socket_path))?;

        info!(socket_path = %socket_path.display(), "IPC server started");

        let rate_limiter = RateLimiter::new(
            config.service.max_requests_per_second,
            Duration::from_secs(1),
        );

        Ok(Self {
            dispatcher: Dispatcher::new(Arc::new(config), guardian),
            ipc: Arc::new(ipc),
            sessions: HashMap::new(),
            rate_limiter,
        })
    }

    fn open_store(args: &Args, config: &ServiceConfig) -> Result<Arc<dyn Store>> {
        match config.service.store {
            StoreBackend::Memory => {
                info!("Using in-memory store");
                Ok(Arc::new(MemoryStore::new()))
            }
            StoreBackend::Sqlite => {
                let data_dir = args
                    .data_dir
                    .clone()
                    .unwrap_or_else(|| config.service.data_dir.clone());
                let store = SqliteStore::open_in_dir(&data_dir)
                    .with_context(|| format!("Failed to open database in {:?}", data_dir))?;
                info!(data_dir = %data_dir.display(), "Using sqlite store");
                Ok(Arc::new(store))
            }
        }
    }

    async fn run(mut self) -> Result<()> {
        let mut ipc_messages = self
            .ipc
            .take_message_receiver()
            .await
            .context("IPC message receiver already taken")?;

        let ipc_accept = self.ipc.clone();
        tokio::spawn(async move {
            if let Err(e) = ipc_accept.run().await {
                error!(error = %e, "IPC server error");
            }
        });

        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;

        // Drop idle rate-limit buckets now and then
        let mut cleanup_timer = tokio::time::interval(Duration::from_secs(60));

        info!("Service running");

        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down gracefully");
                    break;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down gracefully");
                    break;
                }

                _ = cleanup_timer.tick() => {
                    self.rate_limiter.cleanup(Duration::from_secs(60));
                }

                Some(msg) = ipc_messages.recv() => {
                    self.handle_ipc_message(msg).await;
                }
            }
        }

        info!("Shutting down guardiand");
        self.ipc.broadcast_event(Event::new(EventPayload::Shutdown));
        // Let writers flush the shutdown event
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.ipc.shutdown();

        info!("Shutdown complete");
        Ok(())
    }

    async fn handle_ipc_message(&mut self, msg: ServerMessage) {
        match msg {
            ServerMessage::Request { client_id, request } => {
                if !self.rate_limiter.check(&client_id) {
                    let response = Response::error(
                        request.request_id,
                        ErrorInfo::new(ErrorCode::RateLimited, "Too many requests"),
                    );
                    let _ = self.ipc.send_response(&client_id, response).await;
                    return;
                }

                let parent = self.sessions.get(&client_id).copied();
                let connected = self.ipc.client_count().await;
                let dispatched = self.dispatcher.dispatch(
                    &client_id,
                    parent,
                    request.request_id,
                    request.command,
                    connected,
                );

                match dispatched.session {
                    Some(SessionChange::LoggedIn(parent_id)) => {
                        self.sessions.insert(client_id.clone(), parent_id);
                        self.ipc.set_client_parent(&client_id, Some(parent_id)).await;
                    }
                    Some(SessionChange::LoggedOut) => {
                        self.sessions.remove(&client_id);
                        self.ipc.set_client_parent(&client_id, None).await;
                    }
                    Some(SessionChange::Subscribed(on)) => {
                        self.ipc.set_subscribed(&client_id, on).await;
                    }
                    None => {}
                }

                if let Err(e) = self.ipc.send_response(&client_id, dispatched.response).await {
                    warn!(client_id = %client_id, error = %e, "Failed to send response");
                }

                for event in dispatched.events {
                    self.ipc.broadcast_event(to_wire_event(event));
                }
            }

            ServerMessage::ClientConnected { client_id, info } => {
                info!(client_id = %client_id, uid = ?info.uid, "Client connected");
            }

            ServerMessage::ClientDisconnected { client_id } => {
                debug!(client_id = %client_id, "Client disconnected");
                self.sessions.remove(&client_id);
                self.rate_limiter.remove(&client_id);
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "guardiand starting");

    let service = Service::new(&args).await?;
    service.run().await
}
