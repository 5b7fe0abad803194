use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use super::Session;
use crate::message::SessionId;

/// Counters kept by a [`SessionStore`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub hits: u64,
    pub misses: u64,
    /// Lookups that found an expired session.
    pub timeouts: u64,
    /// Sessions removed to make room.
    pub evictions: u64,
    /// Handshakes started by clients using the store.
    pub connects: u64,
    /// Handshakes that completed.
    pub completed: u64,
    /// Completed handshakes that resumed a cached session.
    pub resumed: u64,
}

/// In-memory cache of resumable sessions keyed by session id.
///
/// Shared between connections as `Arc<SessionStore>`. Holds at most
/// `capacity` sessions, evicting the oldest insert first. A capacity of 0
/// means unbounded.
#[derive(Debug)]
pub struct SessionStore {
    inner: Mutex<Inner>,
    capacity: usize,
}

#[derive(Debug, Default)]
struct Inner {
    sessions: HashMap<SessionId, Arc<Session>>,
    // Insertion order, one entry per cached session.
    order: VecDeque<SessionId>,
    stats: StoreStats,
}

impl SessionStore {
    /// OpenSSL's default cache size.
    pub const DEFAULT_CAPACITY: usize = 20 * 1024;

    pub fn new(capacity: usize) -> Self {
        SessionStore {
            inner: Mutex::new(Inner::default()),
            capacity,
        }
    }

    /// Find a live session for `id`.
    ///
    /// An expired session is removed and counted as a timeout.
    pub fn lookup(&self, id: &SessionId, now: Instant) -> Option<Arc<Session>> {
        if id.is_empty() {
            return None;
        }

        let mut inner = self.inner.lock();

        let Some(session) = inner.sessions.get(id).cloned() else {
            inner.stats.misses += 1;
            return None;
        };

        if session.is_expired(now) {
            debug!("Session expired: {}", id);
            inner.sessions.remove(id);
            inner.order.retain(|o| o != id);
            inner.stats.timeouts += 1;
            inner.stats.misses += 1;
            return None;
        }

        inner.stats.hits += 1;
        Some(session)
    }

    /// Insert `session`, replacing any previous session with the same id.
    ///
    /// Sessions without an id, and those marked not resumable, are ignored.
    pub fn insert(&self, session: Arc<Session>) {
        if session.session_id().is_empty() || !session.is_resumable() {
            trace!("Not caching session: {:?}", session.session_id());
            return;
        }

        let id = *session.session_id();
        let mut inner = self.inner.lock();

        if inner.sessions.insert(id, session).is_some() {
            // Replacing moves the entry to the back of the eviction order.
            inner.order.retain(|o| *o != id);
        }
        inner.order.push_back(id);
        debug_assert_eq!(inner.order.len(), inner.sessions.len());

        if self.capacity > 0 {
            while inner.sessions.len() > self.capacity {
                let Some(oldest) = inner.order.pop_front() else {
                    break;
                };
                if inner.sessions.remove(&oldest).is_some() {
                    debug!("Evict session: {}", oldest);
                    inner.stats.evictions += 1;
                }
            }
        }
    }

    pub fn remove(&self, id: &SessionId) -> Option<Arc<Session>> {
        let mut inner = self.inner.lock();
        let removed = inner.sessions.remove(id);
        if removed.is_some() {
            inner.order.retain(|o| o != id);
        }
        removed
    }

    /// Remove every session that expires before `time`. Returns how many.
    pub fn flush_before(&self, time: Instant) -> usize {
        let mut inner = self.inner.lock();
        let before = inner.sessions.len();
        inner.sessions.retain(|_, s| s.expires_at() >= time);
        let removed = before - inner.sessions.len();

        if removed > 0 {
            let Inner {
                sessions, order, ..
            } = &mut *inner;
            order.retain(|o| sessions.contains_key(o));
            debug!("Flushed {} expired sessions", removed);
        }

        removed
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.sessions.clear();
        inner.order.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> StoreStats {
        self.inner.lock().stats
    }

    pub(crate) fn count_connect(&self) {
        self.inner.lock().stats.connects += 1;
    }

    pub(crate) fn count_completed(&self, resumed: bool) {
        let mut inner = self.inner.lock();
        inner.stats.completed += 1;
        if resumed {
            inner.stats.resumed += 1;
        }
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        SessionStore::new(Self::DEFAULT_CAPACITY)
    }
}
