//! Outstanding-request tracker.
//!
//! The push channel broadcasts every committed write, including this
//! client's own. Without the tracker every local save would apply twice:
//! once via the REST success handler and again moments later via the
//! broadcast — double-applying benign updates, or resurrecting a resource
//! the user just deleted when delete/recreate messages race.

use fieldlink_core::session::SessionId;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
struct Entry {
    uuid: Uuid,
    issued_at: Instant,
}

/// Session ids of in-flight local writes, retained until the matching echo
/// is observed or the TTL elapses.
///
/// Membership testing is the primary operation; each entry additionally
/// carries the issuing resource's UUID so an echo observed before the REST
/// response lands can still pin the `(kind, id)` mapping onto the right
/// resource.
#[derive(Debug)]
pub struct OutstandingRequests {
    ttl: Duration,
    entries: HashMap<SessionId, Entry>,
}

impl OutstandingRequests {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    /// Mint a session id for a dispatched local write.
    pub fn begin(&mut self, uuid: Uuid) -> SessionId {
        let session = SessionId::mint();
        self.entries.insert(
            session,
            Entry {
                uuid,
                issued_at: Instant::now(),
            },
        );
        session
    }

    pub fn is_outstanding(&self, session: &SessionId) -> bool {
        self.entries
            .get(session)
            .is_some_and(|e| e.issued_at.elapsed() < self.ttl)
    }

    /// The UUID of the resource whose write minted this session, if still
    /// tracked.
    pub fn uuid_for(&self, session: &SessionId) -> Option<Uuid> {
        self.entries.get(session).map(|e| e.uuid)
    }

    /// Drop an entry once its echo is observed (or its request failed, in
    /// which case no echo will come). Returns the issuing UUID.
    pub fn end(&mut self, session: &SessionId) -> Option<Uuid> {
        self.entries.remove(session).map(|e| e.uuid)
    }

    /// Defensive bound against dropped broadcasts: evict entries past the
    /// TTL. Returns how many were dropped.
    pub fn prune_expired(&mut self) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries.retain(|_, e| e.issued_at.elapsed() < ttl);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
