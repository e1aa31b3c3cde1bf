//! Broadcast engine
//!
//! A bounded FIFO queue fed by any number of [`Broadcaster`] handles and
//! drained by exactly one dispatcher task, which fans every message out to
//! the full membership in enqueue order.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::error::SendError;
use crate::message::BroadcastMessage;
use crate::registry::MembershipRegistry;

/// Producer handle for the broadcast queue
///
/// `send` waits while the queue is full; messages are never dropped.
#[derive(Debug, Clone)]
pub struct Broadcaster {
    sender: mpsc::Sender<BroadcastMessage>,
}

impl Broadcaster {
    /// Enqueue a message, waiting for capacity
    pub async fn send(&self, msg: BroadcastMessage) -> Result<(), SendError> {
        self.sender
            .send(msg)
            .await
            .map_err(|_| SendError::ChannelClosed)
    }
}

/// The single dispatcher
pub struct BroadcastEngine {
    receiver: mpsc::Receiver<BroadcastMessage>,
    registry: Arc<MembershipRegistry>,
    /// Disconnect notices produced by the dispatcher itself; drained before
    /// the shared queue so the dispatcher never waits on its own channel
    backlog: VecDeque<BroadcastMessage>,
}

impl BroadcastEngine {
    /// Create the engine and its first producer handle
    pub fn new(capacity: usize, registry: Arc<MembershipRegistry>) -> (Self, Broadcaster) {
        let (sender, receiver) = mpsc::channel(capacity);
        let engine = Self {
            receiver,
            registry,
            backlog: VecDeque::new(),
        };
        (engine, Broadcaster { sender })
    }

    /// Run the dispatch loop
    ///
    /// Ends once every `Broadcaster` is dropped and the queue is drained.
    pub async fn run(mut self) {
        info!("Broadcast engine started");

        while let Some(msg) = self.next_message().await {
            self.dispatch(msg).await;
        }

        info!("Broadcast engine shutting down");
    }

    async fn next_message(&mut self) -> Option<BroadcastMessage> {
        match self.backlog.pop_front() {
            Some(msg) => Some(msg),
            None => self.receiver.recv().await,
        }
    }

    async fn dispatch(&mut self, msg: BroadcastMessage) {
        let line = msg.to_string();
        info!("{}", line);

        // Registry lock is released once broadcast_to returns
        let dropped = self.registry.broadcast_to(&line).await;
        for username in dropped {
            debug!("Queueing disconnect notice for '{}'", username);
            self.backlog.push_back(BroadcastMessage::Left { username });
        }
    }
}
