//! Client session
//!
//! Peer side of the line protocol: a synchronous authentication phase,
//! then a sender half forwarding local input and a receiver half
//! interpreting server lines.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, warn};

use crate::codec::ChatCodec;
use crate::config::MAX_LINE_LENGTH;
use crate::error::AppError;
use crate::message::{self, AuthMode, AuthReply, ServerEvent};

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// A connected client, before it splits into sender and receiver
pub struct ClientSession {
    sender: ClientSender,
    receiver: ClientReceiver,
}

impl ClientSession {
    /// Connect over TCP to `addr` (`host:port`)
    pub async fn connect(addr: &str, write_timeout: Duration) -> Result<Self, AppError> {
        let stream = TcpStream::connect(addr).await?;
        debug!("Connected to {}", addr);
        let (reader, writer) = stream.into_split();
        Ok(Self::from_parts(reader, writer, write_timeout))
    }

    /// Build from any byte stream halves
    pub fn from_parts<R, W>(reader: R, writer: W, write_timeout: Duration) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let reader: BoxedReader = Box::new(reader);
        let writer: BoxedWriter = Box::new(writer);
        Self {
            sender: ClientSender {
                sink: FramedWrite::new(writer, ChatCodec::new()),
                write_timeout,
            },
            receiver: ClientReceiver {
                lines: FramedRead::new(reader, ChatCodec::new()),
            },
        }
    }

    /// Send the mode selection line
    pub async fn select_mode(&mut self, mode: AuthMode) -> Result<(), AppError> {
        self.sender.send_line(mode.as_wire()).await
    }

    /// Send one username/password pair and wait for the verdict
    pub async fn submit_credentials(
        &mut self,
        username: &str,
        password: &str,
    ) -> Result<AuthReply, AppError> {
        self.sender.send_line(username).await?;
        self.sender.send_line(password).await?;

        let reply = self.receiver.read_line().await?;
        AuthReply::parse(&reply).ok_or(AppError::UnexpectedReply(reply))
    }

    /// Split into independently driven halves
    pub fn split(self) -> (ClientSender, ClientReceiver) {
        (self.sender, self.receiver)
    }
}

/// Why the sender loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderExit {
    /// `DISCONNECT` was forwarded
    Disconnected,
    /// Local input ended
    InputClosed,
    /// A write failed or timed out
    Unreachable,
}

/// Write half of a client connection
pub struct ClientSender {
    sink: FramedWrite<BoxedWriter, ChatCodec>,
    write_timeout: Duration,
}

impl ClientSender {
    /// Write one line within the deadline
    pub async fn send_line(&mut self, line: &str) -> Result<(), AppError> {
        match tokio::time::timeout(self.write_timeout, self.sink.send(line)).await {
            Ok(result) => result.map_err(AppError::from),
            Err(_) => Err(AppError::WriteTimeout(self.write_timeout)),
        }
    }

    /// Forward every line of `input` verbatim until disconnect, EOF or failure
    ///
    /// Lines over `MAX_LINE_LENGTH` bytes are not sent; the server would
    /// discard them anyway.
    pub async fn forward<I>(&mut self, mut input: I) -> SenderExit
    where
        I: AsyncBufRead + Unpin,
    {
        loop {
            let mut line = String::new();
            match input.read_line(&mut line).await {
                Ok(0) | Err(_) => return SenderExit::InputClosed,
                Ok(_) => {}
            }
            let line = line.trim_end_matches(['\n', '\r']);
            if line.len() > MAX_LINE_LENGTH {
                warn!(
                    "Message not sent: {} bytes is over the {}-byte limit",
                    line.len(),
                    MAX_LINE_LENGTH
                );
                continue;
            }

            if let Err(e) = self.send_line(line).await {
                debug!("Forward failed: {}", e);
                return SenderExit::Unreachable;
            }
            if message::is_control(line, message::DISCONNECT) {
                return SenderExit::Disconnected;
            }
        }
    }
}

/// Read half of a client connection
pub struct ClientReceiver {
    lines: FramedRead<BoxedReader, ChatCodec>,
}

impl ClientReceiver {
    async fn read_line(&mut self) -> Result<String, AppError> {
        match self.lines.next().await {
            Some(line) => Ok(line?),
            None => Err(AppError::ConnectionClosed),
        }
    }

    /// Next interpreted server line; `Unreachable` on any read failure
    pub async fn next_event(&mut self) -> ServerEvent {
        match self.read_line().await {
            Ok(line) => ServerEvent::from_line(line),
            Err(e) => {
                debug!("Receive failed: {}", e);
                ServerEvent::Unreachable
            }
        }
    }
}
