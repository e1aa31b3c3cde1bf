//! Server session handler
//!
//! Drives one accepted connection through
//! `Unauthenticated → CredentialsPending → Active → Terminated`. An Active
//! session also ends when the dispatcher evicts its connection after a
//! failed write.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_util::codec::FramedRead;
use tracing::{debug, info, warn};

use crate::broadcast::Broadcaster;
use crate::codec::ChatCodec;
use crate::connection::ConnectionHandle;
use crate::credentials::CredentialStore;
use crate::error::AppError;
use crate::message::{self, AuthMode, AuthReply, BroadcastMessage};
use crate::registry::MembershipRegistry;
use crate::types::SessionId;

/// Everything a session shares with the rest of the server
#[derive(Debug, Clone)]
pub struct SharedState {
    pub credentials: Arc<CredentialStore>,
    pub registry: Arc<MembershipRegistry>,
    pub broadcaster: Broadcaster,
    pub write_timeout: Duration,
}

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    CredentialsPending(AuthMode),
    Active,
    Terminated,
}

/// Handle a new TCP connection until its session terminates
pub async fn handle_connection(stream: TcpStream, state: SharedState) -> Result<(), AppError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    let (reader, writer) = stream.into_split();
    let session = Session::new(reader, writer, state);
    debug!("Session {} started for {}", session.id, peer_addr);

    session.run().await
}

/// One connection's server-side state
pub struct Session<R> {
    id: SessionId,
    state: SessionState,
    username: Option<String>,
    lines: FramedRead<R, ChatCodec>,
    handle: ConnectionHandle,
    shared: SharedState,
}

impl<R> Session<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new<W>(reader: R, writer: W, shared: SharedState) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let id = SessionId::new();
        Self {
            id,
            state: SessionState::Unauthenticated,
            username: None,
            lines: FramedRead::new(reader, ChatCodec::new()),
            handle: ConnectionHandle::new(id, writer, shared.write_timeout),
            shared,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Run the state machine to completion
    ///
    /// Transport failures before authentication end the session quietly;
    /// once Active, the session always leaves the registry on the way out.
    pub async fn run(mut self) -> Result<(), AppError> {
        let result = self.drive().await;

        if let Err(e) = &result {
            if self.state == SessionState::Active {
                warn!("Session {} failed while active: {}", self.id, e);
                self.leave().await;
            } else {
                debug!("Session {} ended before admission: {}", self.id, e);
            }
            self.state = SessionState::Terminated;
        }

        // Only a dead broadcast queue is worth reporting upward
        match result {
            Err(AppError::ChannelSend) => Err(AppError::ChannelSend),
            _ => Ok(()),
        }
    }

    async fn drive(&mut self) -> Result<(), AppError> {
        loop {
            self.state = match self.state {
                SessionState::Unauthenticated => self.select_mode().await?,
                SessionState::CredentialsPending(mode) => self.authenticate(mode).await?,
                SessionState::Active => self.chat().await?,
                SessionState::Terminated => return Ok(()),
            };
        }
    }

    async fn read_line(&mut self) -> Result<String, AppError> {
        match self.lines.next().await {
            Some(line) => Ok(line?),
            None => Err(AppError::ConnectionClosed),
        }
    }

    async fn select_mode(&mut self) -> Result<SessionState, AppError> {
        let line = self.read_line().await?;
        match AuthMode::parse(&line) {
            Some(mode) => {
                debug!("Session {} selected {:?}", self.id, mode);
                Ok(SessionState::CredentialsPending(mode))
            }
            None => {
                warn!("Session {} sent invalid mode {:?}, closing", self.id, line);
                let _ = self.handle.close().await;
                Ok(SessionState::Terminated)
            }
        }
    }

    async fn authenticate(&mut self, mode: AuthMode) -> Result<SessionState, AppError> {
        let username = self.read_line().await?;
        let password = self.read_line().await?;

        let accepted = match mode {
            AuthMode::Login => self.shared.credentials.verify(&username, &password).await,
            AuthMode::Register => {
                self.shared
                    .credentials
                    .register_if_absent(&username, &password)
                    .await
            }
        };

        if !accepted {
            debug!("Session {} {:?} rejected for '{}'", self.id, mode, username);
            self.handle.send_line(AuthReply::Failure.as_wire()).await?;
            return Ok(SessionState::CredentialsPending(mode));
        }

        // SUCCESS goes out before the handle can receive any broadcast
        self.shared
            .registry
            .admit(&username, self.handle.clone(), AuthReply::Success.as_wire())
            .await?;

        info!("Session {} authenticated as '{}'", self.id, username);
        self.username = Some(username.clone());
        self.state = SessionState::Active;
        self.shared
            .broadcaster
            .send(BroadcastMessage::Joined { username })
            .await?;
        Ok(SessionState::Active)
    }

    async fn chat(&mut self) -> Result<SessionState, AppError> {
        let next = tokio::select! {
            biased;
            _ = self.handle.evicted() => None,
            next = self.lines.next() => Some(next),
        };
        let Some(next) = next else {
            return Ok(self.end_evicted().await);
        };

        let line = match next {
            Some(Ok(line)) => line,
            Some(Err(e)) => {
                debug!("Session {} read failed: {}", self.id, e);
                self.leave().await;
                return Ok(SessionState::Terminated);
            }
            None => {
                debug!("Session {} closed by peer", self.id);
                self.leave().await;
                return Ok(SessionState::Terminated);
            }
        };

        // The line may have raced a failed write to this peer
        if self.handle.is_evicted() {
            return Ok(self.end_evicted().await);
        }

        if message::is_control(&line, message::DISCONNECT) {
            self.disconnect().await;
            return Ok(SessionState::Terminated);
        }

        let from = self.username.clone().unwrap_or_default();
        self.shared
            .broadcaster
            .send(BroadcastMessage::Chat { from, text: line })
            .await?;
        Ok(SessionState::Active)
    }

    /// Graceful leave on the peer's request
    async fn disconnect(&mut self) {
        let Some(username) = self.username.take() else {
            return;
        };
        let removed = self.shared.registry.remove(&username, self.id).await;
        let _ = self.handle.send_line(message::DISCONNECT).await;
        if removed {
            self.announce_left(username).await;
        }
        let _ = self.handle.close().await;
        info!("Session {} disconnected", self.id);
    }

    /// Leave after the connection failed
    async fn leave(&mut self) {
        let Some(username) = self.username.take() else {
            return;
        };
        if self.shared.registry.remove(&username, self.id).await {
            self.announce_left(username).await;
        }
        info!("Session {} closed", self.id);
    }

    /// End a session the dispatcher already removed and announced
    async fn end_evicted(&mut self) -> SessionState {
        let username = self.username.take().unwrap_or_default();
        info!("Session {} for '{}' evicted after a failed write", self.id, username);
        let _ = self.handle.close().await;
        SessionState::Terminated
    }

    async fn announce_left(&self, username: String) {
        if self
            .shared
            .broadcaster
            .send(BroadcastMessage::Left { username })
            .await
            .is_err()
        {
            warn!("Broadcast queue closed, leave notice for session {} lost", self.id);
        }
    }
}
