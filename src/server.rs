//! Connection listener
//!
//! Owns the shared state, starts the broadcast dispatcher, accepts
//! connections and spawns one session task per connection until shut down.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

use crate::broadcast::{BroadcastEngine, Broadcaster};
use crate::config::ServerConfig;
use crate::credentials::CredentialStore;
use crate::error::AppError;
use crate::handler::{handle_connection, SharedState};
use crate::message;
use crate::registry::MembershipRegistry;

/// The chat server: listener plus shared state
pub struct ChatServer {
    listener: TcpListener,
    state: SharedState,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

/// Cloneable trigger for server shutdown
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    registry: Arc<MembershipRegistry>,
    signal: watch::Sender<bool>,
}

impl ShutdownHandle {
    /// Tell every active member `SHUTDOWN`, then stop accepting
    ///
    /// Sessions blocked on a read end when their peer closes.
    pub async fn shutdown(&self) {
        info!("Shutting down");
        let dropped = self.registry.broadcast_to(message::SHUTDOWN).await;
        if !dropped.is_empty() {
            info!("{} members were already gone at shutdown", dropped.len());
        }
        self.signal.send_replace(true);
    }
}

impl ChatServer {
    /// Bind to `addr` and start the broadcast dispatcher
    pub async fn bind(addr: &str, config: &ServerConfig) -> Result<Self, AppError> {
        let listener = TcpListener::bind(addr).await?;

        let registry = Arc::new(MembershipRegistry::new());
        let (engine, broadcaster) = BroadcastEngine::new(config.queue_capacity, Arc::clone(&registry));
        tokio::spawn(engine.run());

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Self {
            listener,
            state: SharedState {
                credentials: Arc::new(CredentialStore::new()),
                registry,
                broadcaster,
                write_timeout: config.write_timeout,
            },
            shutdown_tx,
            shutdown_rx,
        })
    }

    /// Bind to the configured port on all interfaces
    pub async fn from_config(config: &ServerConfig) -> Result<Self, AppError> {
        Self::bind(&config.bind_addr(), config).await
    }

    pub fn local_addr(&self) -> Result<SocketAddr, AppError> {
        Ok(self.listener.local_addr()?)
    }

    /// Producer handle for console messages
    pub fn broadcaster(&self) -> Broadcaster {
        self.state.broadcaster.clone()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            registry: Arc::clone(&self.state.registry),
            signal: self.shutdown_tx.clone(),
        }
    }

    pub fn credentials(&self) -> Arc<CredentialStore> {
        Arc::clone(&self.state.credentials)
    }

    pub fn registry(&self) -> Arc<MembershipRegistry> {
        Arc::clone(&self.state.registry)
    }

    /// Accept loop
    ///
    /// Returns after shutdown; the listener is dropped on return.
    pub async fn run(self) -> Result<(), AppError> {
        let Self {
            listener,
            state,
            shutdown_tx: _keep_open,
            mut shutdown_rx,
        } = self;

        info!("Accepting connections on {}", listener.local_addr()?);

        loop {
            if *shutdown_rx.borrow_and_update() {
                break;
            }

            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        info!("New connection from {}", addr);
                        let state = state.clone();

                        // Spawn session task for each connection
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, state).await {
                                error!("Session error: {}", e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                    }
                },
                changed = shutdown_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("Listener closed");
        Ok(())
    }
}
