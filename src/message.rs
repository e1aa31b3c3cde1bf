//! Line protocol definitions
//!
//! Newline-delimited UTF-8 text. Control tokens and auth replies are
//! reserved lines; everything else is chat text.

use std::fmt;

/// Graceful leave, sent by the client and echoed back by the server
pub const DISCONNECT: &str = "DISCONNECT";
/// Server-initiated termination
pub const SHUTDOWN: &str = "SHUTDOWN";
/// Credentials accepted
pub const SUCCESS: &str = "SUCCESS";
/// Credentials rejected
pub const FAILURE: &str = "FAILURE";

/// Authentication mode chosen by the client's first line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// `"1"`: existing account
    Login,
    /// `"2"`: new account
    Register,
}

impl AuthMode {
    /// Parse a mode selection line (`"1"` or `"2"`, surrounding whitespace ignored)
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim() {
            "1" => Some(AuthMode::Login),
            "2" => Some(AuthMode::Register),
            _ => None,
        }
    }

    /// Wire token for this mode
    pub fn as_wire(&self) -> &'static str {
        match self {
            AuthMode::Login => "1",
            AuthMode::Register => "2",
        }
    }

    /// What the client tells its user after a `FAILURE` reply
    pub fn failure_message(&self) -> &'static str {
        match self {
            AuthMode::Login => "Username or password incorrect. Please try again.",
            AuthMode::Register => "Username already exists on this server. Please try again.",
        }
    }
}

/// Server reply to a credentials submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthReply {
    Success,
    Failure,
}

impl AuthReply {
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim() {
            SUCCESS => Some(AuthReply::Success),
            FAILURE => Some(AuthReply::Failure),
            _ => None,
        }
    }

    pub fn as_wire(&self) -> &'static str {
        match self {
            AuthReply::Success => SUCCESS,
            AuthReply::Failure => FAILURE,
        }
    }
}

/// Returns true if `line`, trimmed, is exactly the control `token`
pub fn is_control(line: &str, token: &str) -> bool {
    line.trim() == token
}

/// A message queued for fan-out to every active member
///
/// Each variant renders to one wire line carrying its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BroadcastMessage {
    /// Chat line from an active user
    Chat { from: String, text: String },
    /// Line typed on the server console
    Console { text: String },
    /// User entered the chat
    Joined { username: String },
    /// User left or was dropped
    Left { username: String },
}

impl fmt::Display for BroadcastMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BroadcastMessage::Chat { from, text } => write!(f, "{}: {}", from, text),
            BroadcastMessage::Console { text } => write!(f, "Server: {}", text),
            BroadcastMessage::Joined { username } => write!(f, "{} has entered the chat!", username),
            BroadcastMessage::Left { username } => write!(f, "{} has disconnected.", username),
        }
    }
}

/// What the client receiver makes of one incoming line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// Displayable text (chat line or notice)
    Line(String),
    /// Server is shutting down
    Shutdown,
    /// Server confirmed our disconnect
    Disconnect,
    /// Read failed or the server closed the stream
    Unreachable,
}

impl ServerEvent {
    /// Classify a line received from the server
    pub fn from_line(line: String) -> Self {
        if is_control(&line, SHUTDOWN) {
            ServerEvent::Shutdown
        } else if is_control(&line, DISCONNECT) {
            ServerEvent::Disconnect
        } else {
            ServerEvent::Line(line)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_mode_parse() {
        assert_eq!(AuthMode::parse("1"), Some(AuthMode::Login));
        assert_eq!(AuthMode::parse(" 2\r"), Some(AuthMode::Register));
        assert_eq!(AuthMode::parse("3"), None);
        assert_eq!(AuthMode::parse(""), None);
    }

    #[test]
    fn test_auth_reply_parse() {
        assert_eq!(AuthReply::parse("SUCCESS"), Some(AuthReply::Success));
        assert_eq!(AuthReply::parse("FAILURE\r"), Some(AuthReply::Failure));
        assert_eq!(AuthReply::parse("success"), None);
    }

    #[test]
    fn test_broadcast_rendering() {
        let chat = BroadcastMessage::Chat {
            from: "alice".to_string(),
            text: "hi".to_string(),
        };
        assert_eq!(chat.to_string(), "alice: hi");

        let console = BroadcastMessage::Console {
            text: "maintenance at noon".to_string(),
        };
        assert_eq!(console.to_string(), "Server: maintenance at noon");

        let joined = BroadcastMessage::Joined {
            username: "bob".to_string(),
        };
        assert_eq!(joined.to_string(), "bob has entered the chat!");

        let left = BroadcastMessage::Left {
            username: "bob".to_string(),
        };
        assert_eq!(left.to_string(), "bob has disconnected.");
    }

    #[test]
    fn test_server_event_classification() {
        assert_eq!(ServerEvent::from_line("SHUTDOWN".into()), ServerEvent::Shutdown);
        assert_eq!(ServerEvent::from_line(" DISCONNECT ".into()), ServerEvent::Disconnect);
        assert_eq!(
            ServerEvent::from_line("alice: DISCONNECT".into()),
            ServerEvent::Line("alice: DISCONNECT".into())
        );
    }

    #[test]
    fn test_failure_messages_differ_by_mode() {
        assert!(AuthMode::Login.failure_message().starts_with("Username or password incorrect"));
        assert!(AuthMode::Register.failure_message().starts_with("Username already exists"));
    }
}
