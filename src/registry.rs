//! Membership registry
//!
//! Username → connection handle for every Active session. The registry is a
//! view over active sessions: an entry exists exactly while its session is
//! Active.
//!
//! Lock order is registry first, then a connection's writer. Nothing takes
//! the registry lock while holding a writer. Only the dispatcher writes
//! under the registry lock; admission acknowledges before locking.

use std::collections::HashMap;

use futures_util::future::join_all;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::connection::ConnectionHandle;
use crate::error::AppError;
use crate::types::SessionId;

/// Thread-safe registry of active members
///
/// One username may be active from several connections at once; each
/// session keeps its own entry and receives every broadcast.
#[derive(Debug, Default)]
pub struct MembershipRegistry {
    members: Mutex<HashMap<String, Vec<ConnectionHandle>>>,
}

impl MembershipRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write `ack` to the handle, then insert it
    ///
    /// The handle receives no broadcasts until it is inserted, so nothing
    /// reaches the peer ahead of `ack`. A slow peer delays only its own
    /// admission. On a write failure nothing is inserted.
    pub async fn admit(
        &self,
        username: &str,
        handle: ConnectionHandle,
        ack: &str,
    ) -> Result<(), AppError> {
        handle.send_line(ack).await?;

        let mut members = self.members.lock().await;
        let sessions = members.entry(username.to_string()).or_default();
        sessions.push(handle);
        if sessions.len() > 1 {
            debug!("'{}' now active from {} connections", username, sessions.len());
        }
        info!("'{}' joined ({} active users)", username, members.len());
        Ok(())
    }

    /// Insert without acknowledging
    pub async fn add(&self, username: &str, handle: ConnectionHandle) {
        self.members
            .lock()
            .await
            .entry(username.to_string())
            .or_default()
            .push(handle);
    }

    /// Remove the entry `session` holds for `username`
    ///
    /// Returns whether an entry was removed. A session already dropped by
    /// the dispatcher removes nothing.
    pub async fn remove(&self, username: &str, session: SessionId) -> bool {
        let mut members = self.members.lock().await;
        let removed = remove_session(&mut members, username, session).is_some();
        if removed {
            info!("'{}' left ({} active users)", username, members.len());
        }
        removed
    }

    /// True while at least one session for `username` is active
    pub async fn exists(&self, username: &str) -> bool {
        self.members.lock().await.contains_key(username)
    }

    /// Number of distinct active usernames
    pub async fn len(&self) -> usize {
        self.members.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.members.lock().await.is_empty()
    }

    /// Number of active sessions across all usernames
    pub async fn session_count(&self) -> usize {
        self.members.lock().await.values().map(Vec::len).sum()
    }

    /// Snapshot of active usernames, sorted
    pub async fn usernames(&self) -> Vec<String> {
        let mut names: Vec<String> = self.members.lock().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Write `line` to every member session, holding the lock
    ///
    /// Writes run concurrently so one stalled member costs at most one write
    /// deadline. Sessions whose write failed are removed, their handles
    /// evicted, and their usernames returned once per dropped session; the
    /// caller decides what to announce.
    pub async fn broadcast_to(&self, line: &str) -> Vec<String> {
        let mut members = self.members.lock().await;

        let sends = members.iter().flat_map(|(username, sessions)| {
            sessions.iter().map(move |handle| async move {
                (username.clone(), handle.id(), handle.send_line(line).await)
            })
        });
        let results = join_all(sends).await;

        let mut dropped = Vec::new();
        for (username, session, result) in results {
            if let Err(e) = result {
                warn!("Dropping '{}' ({}) after failed write: {}", username, session, e);
                if let Some(handle) = remove_session(&mut members, &username, session) {
                    handle.evict();
                }
                dropped.push(username);
            }
        }
        dropped
    }
}

fn remove_session(
    members: &mut HashMap<String, Vec<ConnectionHandle>>,
    username: &str,
    session: SessionId,
) -> Option<ConnectionHandle> {
    let sessions = members.get_mut(username)?;
    let index = sessions.iter().position(|h| h.id() == session)?;
    let handle = sessions.remove(index);
    if sessions.is_empty() {
        members.remove(username);
    }
    Some(handle)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use futures_util::StreamExt;
    use tokio::io::DuplexStream;
    use tokio_util::codec::{FramedRead, LinesCodec};

    use super::*;

    fn member() -> (ConnectionHandle, FramedRead<DuplexStream, LinesCodec>) {
        let (local, remote) = tokio::io::duplex(1024);
        let handle = ConnectionHandle::new(SessionId::new(), local, Duration::from_millis(200));
        (handle, FramedRead::new(remote, LinesCodec::new()))
    }

    async fn next_line(lines: &mut FramedRead<DuplexStream, LinesCodec>) -> String {
        lines.next().await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_admit_writes_ack_and_inserts() {
        let registry = MembershipRegistry::new();
        let (handle, mut peer) = member();

        registry.admit("alice", handle, "SUCCESS").await.unwrap();
        assert!(registry.exists("alice").await);
        assert_eq!(next_line(&mut peer).await, "SUCCESS");
    }

    #[tokio::test]
    async fn test_same_username_from_two_sessions() {
        let registry = MembershipRegistry::new();
        let (first, mut peer1) = member();
        let (second, mut peer2) = member();
        let first_id = first.id();
        let second_id = second.id();

        registry.admit("alice", first, "SUCCESS").await.unwrap();
        registry.admit("alice", second, "SUCCESS").await.unwrap();
        assert_eq!(registry.len().await, 1);
        assert_eq!(registry.session_count().await, 2);
        assert_eq!(next_line(&mut peer1).await, "SUCCESS");
        assert_eq!(next_line(&mut peer2).await, "SUCCESS");

        registry.broadcast_to("alice: hi").await;
        assert_eq!(next_line(&mut peer1).await, "alice: hi");
        assert_eq!(next_line(&mut peer2).await, "alice: hi");

        // Username stays active until its last session leaves
        assert!(registry.remove("alice", first_id).await);
        assert!(registry.exists("alice").await);
        assert!(registry.remove("alice", second_id).await);
        assert!(!registry.exists("alice").await);
    }

    #[tokio::test]
    async fn test_admit_fails_on_dead_peer() {
        let registry = MembershipRegistry::new();
        let (handle, peer) = member();
        drop(peer);

        assert!(registry.admit("alice", handle, "SUCCESS").await.is_err());
        assert!(!registry.exists("alice").await);
    }

    #[tokio::test]
    async fn test_remove_checks_session() {
        let registry = MembershipRegistry::new();
        let (handle, _peer) = member();
        let id = handle.id();
        registry.add("alice", handle).await;

        assert!(!registry.remove("alice", SessionId::new()).await);
        assert!(registry.exists("alice").await);
        assert!(registry.remove("alice", id).await);
        assert!(!registry.remove("alice", id).await);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_member() {
        let registry = MembershipRegistry::new();
        let (a, mut peer_a) = member();
        let (b, mut peer_b) = member();
        registry.add("alice", a).await;
        registry.add("bob", b).await;

        let dropped = registry.broadcast_to("alice: hi").await;
        assert!(dropped.is_empty());
        assert_eq!(next_line(&mut peer_a).await, "alice: hi");
        assert_eq!(next_line(&mut peer_b).await, "alice: hi");
        assert_eq!(registry.usernames().await, vec!["alice", "bob"]);
    }

    #[tokio::test]
    async fn test_broadcast_drops_failed_members_only() {
        let registry = MembershipRegistry::new();
        let (a, mut peer_a) = member();
        let (b, peer_b) = member();
        registry.add("alice", a).await;
        registry.add("bob", b).await;
        drop(peer_b);

        let dropped = registry.broadcast_to("hello").await;
        assert_eq!(dropped, vec!["bob".to_string()]);
        assert_eq!(next_line(&mut peer_a).await, "hello");
        assert_eq!(registry.usernames().await, vec!["alice"]);
    }

    #[tokio::test]
    async fn test_dropped_member_is_evicted() {
        let registry = MembershipRegistry::new();
        let (a, _peer_a) = member();
        let (b, peer_b) = member();
        let alice = a.clone();
        let bob = b.clone();
        registry.add("alice", a).await;
        registry.add("bob", b).await;
        drop(peer_b);

        registry.broadcast_to("hello").await;
        assert!(bob.is_evicted());
        assert!(!alice.is_evicted());
    }

    #[tokio::test]
    async fn test_slow_admission_does_not_hold_the_registry() {
        let registry = Arc::new(MembershipRegistry::new());
        let (a, mut peer_a) = member();
        let alice_id = a.id();
        registry.add("alice", a).await;

        // The ack does not fit in the unread buffer, so admission stalls
        let (local, _stalled_peer) = tokio::io::duplex(4);
        let slow = ConnectionHandle::new(SessionId::new(), local, Duration::from_secs(2));
        let admitting = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.admit("slow", slow, "SUCCESS").await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let dropped = tokio::time::timeout(
            Duration::from_millis(500),
            registry.broadcast_to("alice: still here"),
        )
        .await
        .expect("broadcast waited on a pending admission");
        assert!(dropped.is_empty());
        assert_eq!(next_line(&mut peer_a).await, "alice: still here");

        let removed = tokio::time::timeout(
            Duration::from_millis(500),
            registry.remove("alice", alice_id),
        )
        .await
        .expect("remove waited on a pending admission");
        assert!(removed);

        let err = admitting.await.unwrap().unwrap_err();
        assert!(matches!(err, AppError::WriteTimeout(_)));
        assert!(!registry.exists("slow").await);
    }

    #[tokio::test]
    async fn test_stalled_member_does_not_block_others() {
        let registry = MembershipRegistry::new();
        let (a, mut peer_a) = member();
        // Nobody reads from the stalled peer and its buffer is tiny
        let (local, _stalled_peer) = tokio::io::duplex(4);
        let stalled = ConnectionHandle::new(SessionId::new(), local, Duration::from_millis(100));
        registry.add("alice", a).await;
        registry.add("slow", stalled).await;

        let dropped = registry.broadcast_to("a line longer than four bytes").await;
        assert_eq!(dropped, vec!["slow".to_string()]);
        assert_eq!(next_line(&mut peer_a).await, "a line longer than four bytes");
    }
}
