//! Multi-user Line Chat Library
//!
//! A TCP chat service with a newline-delimited text protocol: clients log in
//! or register, then every line an active client sends is relayed to every
//! active client.
//!
//! # Features
//! - Login / register with a volatile credential store
//! - Shared broadcast session with join and leave notices
//! - Graceful `DISCONNECT` and server-wide `SHUTDOWN`
//! - Interactive client with separate sender and receiver loops
//!
//! # Architecture
//! - `CredentialStore` and `MembershipRegistry` are shared behind coarse
//!   locks and expose compound atomic operations (`register_if_absent`,
//!   `admit`)
//! - One task per connection runs the session state machine
//! - `BroadcastEngine` is the single dispatcher draining a bounded queue;
//!   sessions hold a cloneable `Broadcaster`
//! - A member whose write fails is evicted: the dispatcher announces it once
//!   and its session ends
//!
//! # Example
//! ```ignore
//! use broadcast_chat::{ChatServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ServerConfig::default();
//!     let server = ChatServer::from_config(&config).await.unwrap();
//!     let shutdown = server.shutdown_handle();
//!
//!     tokio::spawn(async move {
//!         tokio::signal::ctrl_c().await.ok();
//!         shutdown.shutdown().await;
//!     });
//!
//!     server.run().await.unwrap();
//! }
//! ```

pub mod broadcast;
pub mod client;
pub mod codec;
pub mod config;
pub mod connection;
pub mod credentials;
pub mod error;
pub mod handler;
pub mod message;
pub mod registry;
pub mod server;
pub mod types;

// Re-export main types for convenience
pub use broadcast::{BroadcastEngine, Broadcaster};
pub use client::{ClientReceiver, ClientSender, ClientSession, SenderExit};
pub use codec::ChatCodec;
pub use config::{ClientConfig, ServerConfig};
pub use connection::ConnectionHandle;
pub use credentials::CredentialStore;
pub use error::{AppError, SendError};
pub use handler::{handle_connection, Session, SessionState, SharedState};
pub use message::{AuthMode, AuthReply, BroadcastMessage, ServerEvent};
pub use registry::MembershipRegistry;
pub use server::{ChatServer, ShutdownHandle};
pub use types::SessionId;
