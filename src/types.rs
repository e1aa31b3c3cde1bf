//! Basic type definitions for the chat service
//!
//! Provides newtype wrappers for type safety:
//! - `SessionId`: UUID-based unique identifier for one accepted connection

use uuid::Uuid;

/// Unique session identifier (newtype pattern)
///
/// Distinguishes two sessions that used the same username at different
/// times, so a stale session never evicts a newer registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Create a new random session ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
