//! Server and client configuration
//!
//! Positional command-line arguments only; everything else is a constant.

use std::time::Duration;

use crate::error::AppError;

/// Port the server listens on when none is given
pub const DEFAULT_PORT: u16 = 5000;

/// Capacity of the broadcast queue; producers block when it is full
pub const DEFAULT_QUEUE_CAPACITY: usize = 16;

/// Deadline for every line write, server and client side
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(15);

/// Longest accepted line in bytes (excluding the newline)
pub const MAX_LINE_LENGTH: usize = 8192;

/// Server settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub port: u16,
    pub queue_capacity: usize,
    pub write_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            write_timeout: WRITE_TIMEOUT,
        }
    }
}

impl ServerConfig {
    /// Build from arguments following the program name: `[port]`
    pub fn from_args<I>(mut args: I) -> Result<Self, AppError>
    where
        I: Iterator<Item = String>,
    {
        let mut config = Self::default();
        if let Some(port) = args.next() {
            config.port = port
                .trim()
                .parse()
                .map_err(|_| AppError::InvalidPort(port.clone()))?;
        }
        Ok(config)
    }

    /// Address to bind: all interfaces on the configured port
    pub fn bind_addr(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }
}

/// Client settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// `host:port`; `None` means ask interactively
    pub addr: Option<String>,
    pub write_timeout: Duration,
}

impl ClientConfig {
    /// Build from arguments following the program name: `[host:port]`
    pub fn from_args<I>(mut args: I) -> Self
    where
        I: Iterator<Item = String>,
    {
        Self {
            addr: args
                .next()
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty()),
            write_timeout: WRITE_TIMEOUT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> impl Iterator<Item = String> {
        list.iter().map(|s| s.to_string()).collect::<Vec<_>>().into_iter()
    }

    #[test]
    fn test_server_defaults() {
        let config = ServerConfig::from_args(args(&[])).unwrap();
        assert_eq!(config.port, 5000);
        assert_eq!(config.queue_capacity, 16);
        assert_eq!(config.write_timeout, Duration::from_secs(15));
        assert_eq!(config.bind_addr(), "0.0.0.0:5000");
    }

    #[test]
    fn test_server_port_argument() {
        let config = ServerConfig::from_args(args(&["6001"])).unwrap();
        assert_eq!(config.bind_addr(), "0.0.0.0:6001");
    }

    #[test]
    fn test_server_rejects_bad_port() {
        let err = ServerConfig::from_args(args(&["http"])).unwrap_err();
        assert!(matches!(err, AppError::InvalidPort(p) if p == "http"));
        assert!(ServerConfig::from_args(args(&["70000"])).is_err());
    }

    #[test]
    fn test_client_address() {
        assert_eq!(ClientConfig::from_args(args(&[])).addr, None);
        assert_eq!(
            ClientConfig::from_args(args(&[" localhost:5000 "])).addr.as_deref(),
            Some("localhost:5000")
        );
    }
}
