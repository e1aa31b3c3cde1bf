//! Error types for the chat service
//!
//! Defines application-level errors and broadcast queue send errors.
//! Uses thiserror for ergonomic error definitions.

use std::time::Duration;

use thiserror::Error;
use tokio_util::codec::LinesCodecError;

/// Application-level errors
///
/// Transport errors end the session they occur in and are never
/// propagated to other sessions.
#[derive(Debug, Error)]
pub enum AppError {
    /// IO error (fatal for the connection)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Line framing error: oversized line or underlying IO failure
    #[error("Line codec error: {0}")]
    Codec(#[from] LinesCodecError),

    /// A write did not complete within its deadline
    #[error("Write timed out after {0:?}")]
    WriteTimeout(Duration),

    /// The peer closed the stream
    #[error("Connection closed by peer")]
    ConnectionClosed,

    /// Broadcast queue is gone (engine stopped)
    #[error("Channel send error")]
    ChannelSend,

    /// Peer answered with something outside the protocol
    #[error("Unexpected reply: {0}")]
    UnexpectedReply(String),

    /// Port argument is not a valid port number
    #[error("Invalid port: {0}")]
    InvalidPort(String),
}

/// Message send errors
///
/// Occurs when enqueuing into a broadcast queue whose dispatcher has stopped.
#[derive(Debug, Error)]
pub enum SendError {
    /// The receiving end of the channel has been closed
    #[error("Channel closed")]
    ChannelClosed,
}

impl From<SendError> for AppError {
    fn from(_: SendError) -> Self {
        AppError::ChannelSend
    }
}
