//! Session manager
//!
//! Two independent maps: Streamable HTTP sessions and legacy SSE sessions.
//! An id lives in at most one of them; looking it up through the other
//! transport is a distinct "wrong transport" error.
//!
//! SSE sessions live exactly as long as their stream. Streamable HTTP
//! sessions end on `DELETE /` or once they sit idle past the configured
//! timeout with no request in flight and no `GET /` stream open.

use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::{Mutex as TurnLock, OwnedMutexGuard, broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};
use uuid::Uuid;

use crate::credentials::Credential;
use crate::{Error, Result};

/// A Streamable HTTP session
#[derive(Debug)]
pub struct StreamableSession {
    id: String,
    last_active: Mutex<Instant>,
    order: Arc<TurnLock<()>>,
    notifications: broadcast::Sender<Value>,
}

impl StreamableSession {
    /// Session id
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Record activity, restarting the idle clock
    pub fn touch(&self) {
        *self.last_active.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    /// Wait for this session's turn. Requests holding the returned guard
    /// run one at a time, in arrival order.
    pub async fn acquire(&self) -> OwnedMutexGuard<()> {
        self.touch();
        Arc::clone(&self.order).lock_owned().await
    }

    /// Subscribe to server-initiated messages (GET stream)
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Value> {
        self.touch();
        self.notifications.subscribe()
    }

    /// Idle for at least `timeout`, with nothing in flight and no stream open
    fn is_idle(&self, timeout: Duration) -> bool {
        let last_active = *self.last_active.lock().unwrap_or_else(PoisonError::into_inner);
        last_active.elapsed() >= timeout
            && self.notifications.receiver_count() == 0
            && self.order.try_lock().is_ok()
    }
}

/// A legacy SSE session
#[derive(Debug)]
pub struct SseSession {
    id: String,
    sender: mpsc::Sender<Value>,
    credential: Option<Credential>,
}

impl SseSession {
    /// Session id
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Credential presented when the stream was opened
    #[must_use]
    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    /// Queue a message for the stream
    pub async fn send(&self, message: Value) -> Result<()> {
        self.sender
            .send(message)
            .await
            .map_err(|_| Error::Transport(format!("SSE stream {} is closed", self.id)))
    }
}

#[derive(Debug, Default)]
struct Inner {
    streamable: DashMap<String, Arc<StreamableSession>>,
    sse: DashMap<String, Arc<SseSession>>,
}

/// Owner of every live session. Cheap to clone.
#[derive(Debug, Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
    buffer_size: usize,
}

impl SessionManager {
    /// Create a manager; `buffer_size` bounds each session's outbound queue
    #[must_use]
    pub fn new(buffer_size: usize) -> Self {
        Self {
            inner: Arc::new(Inner::default()),
            buffer_size: buffer_size.max(1),
        }
    }

    fn new_id(&self) -> String {
        loop {
            let id = Uuid::new_v4().to_string();
            if !self.inner.streamable.contains_key(&id) && !self.inner.sse.contains_key(&id) {
                return id;
            }
        }
    }

    /// Open a Streamable HTTP session
    #[must_use]
    pub fn create_streamable(&self) -> Arc<StreamableSession> {
        let id = self.new_id();
        let (notifications, _) = broadcast::channel(self.buffer_size);
        let session = Arc::new(StreamableSession {
            id: id.clone(),
            last_active: Mutex::new(Instant::now()),
            order: Arc::new(TurnLock::new(())),
            notifications,
        });
        self.inner.streamable.insert(id.clone(), Arc::clone(&session));
        info!(session_id = %id, "Streamable HTTP session opened");
        session
    }

    /// Open a legacy SSE session.
    ///
    /// Returns the session, the receiving end of its message queue, and a
    /// guard that closes the session when the stream is dropped.
    #[must_use]
    pub fn create_sse(
        &self,
        credential: Option<Credential>,
    ) -> (Arc<SseSession>, mpsc::Receiver<Value>, SessionGuard) {
        let id = self.new_id();
        let (sender, receiver) = mpsc::channel(self.buffer_size);
        let session = Arc::new(SseSession {
            id: id.clone(),
            sender,
            credential,
        });
        self.inner.sse.insert(id.clone(), Arc::clone(&session));
        info!(session_id = %id, "SSE session opened");

        let guard = SessionGuard {
            manager: self.clone(),
            id,
        };
        (session, receiver, guard)
    }

    /// Look up a Streamable HTTP session, restarting its idle clock
    pub fn streamable(&self, id: &str) -> Result<Arc<StreamableSession>> {
        if let Some(session) = self.inner.streamable.get(id) {
            session.touch();
            return Ok(Arc::clone(session.value()));
        }
        if self.inner.sse.contains_key(id) {
            return Err(Error::WrongTransport);
        }
        Err(Error::SessionNotFound)
    }

    /// Look up a legacy SSE session
    pub fn sse(&self, id: &str) -> Result<Arc<SseSession>> {
        if let Some(session) = self.inner.sse.get(id) {
            return Ok(Arc::clone(session.value()));
        }
        if self.inner.streamable.contains_key(id) {
            return Err(Error::WrongTransport);
        }
        Err(Error::SessionNotFound)
    }

    /// Close a session of either kind. Idempotent; returns whether
    /// anything was removed.
    pub fn close(&self, id: &str) -> bool {
        if self.inner.streamable.remove(id).is_some() {
            info!(session_id = %id, "Streamable HTTP session closed");
            return true;
        }
        if self.inner.sse.remove(id).is_some() {
            info!(session_id = %id, "SSE session closed");
            return true;
        }
        debug!(session_id = %id, "Close on unknown session ignored");
        false
    }

    /// Close every Streamable HTTP session idle for at least `timeout`.
    /// Returns how many were closed.
    pub fn expire_idle(&self, timeout: Duration) -> usize {
        expire_idle(&self.inner, timeout)
    }

    /// Sweep idle Streamable HTTP sessions every half `timeout`.
    ///
    /// The task stops on its own once every manager handle is dropped.
    #[must_use]
    pub fn spawn_idle_sweeper(&self, timeout: Duration) -> JoinHandle<()> {
        let inner: Weak<Inner> = Arc::downgrade(&self.inner);
        let period = (timeout / 2).max(Duration::from_millis(10));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(inner) = inner.upgrade() else {
                    break;
                };
                expire_idle(&inner, timeout);
            }
        })
    }

    /// Number of live Streamable HTTP sessions
    #[must_use]
    pub fn streamable_count(&self) -> usize {
        self.inner.streamable.len()
    }

    /// Number of live SSE sessions
    #[must_use]
    pub fn sse_count(&self) -> usize {
        self.inner.sse.len()
    }
}

fn expire_idle(inner: &Inner, timeout: Duration) -> usize {
    let mut expired = 0;
    inner.streamable.retain(|id, session| {
        let idle = session.is_idle(timeout);
        if idle {
            info!(session_id = %id, "Streamable HTTP session expired");
            expired += 1;
        }
        !idle
    });
    expired
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(100)
    }
}

/// Closes its session on drop
#[derive(Debug)]
pub struct SessionGuard {
    manager: SessionManager,
    id: String,
}

impl SessionGuard {
    /// Guarded session id
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.manager.close(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn streamable_lifecycle() {
        let manager = SessionManager::default();
        let session = manager.create_streamable();
        let id = session.id().to_string();

        assert!(manager.streamable(&id).is_ok());
        assert!(matches!(manager.sse(&id), Err(Error::WrongTransport)));
        assert!(manager.close(&id));
        assert!(matches!(manager.streamable(&id), Err(Error::SessionNotFound)));
    }

    #[test]
    fn close_is_idempotent() {
        let manager = SessionManager::default();
        let id = manager.create_streamable().id().to_string();
        assert!(manager.close(&id));
        assert!(!manager.close(&id));
        assert!(!manager.close("never-existed"));
    }

    #[test]
    fn ids_are_unique() {
        let manager = SessionManager::default();
        let a = manager.create_streamable();
        let b = manager.create_streamable();
        let (c, _rx, _guard) = manager.create_sse(None);
        assert_ne!(a.id(), b.id());
        assert_ne!(a.id(), c.id());
        assert_eq!(manager.streamable_count(), 2);
        assert_eq!(manager.sse_count(), 1);
    }

    #[test]
    fn cross_transport_lookup_is_wrong_transport() {
        let manager = SessionManager::default();
        let streamable = manager.create_streamable();
        let (sse, _rx, _guard) = manager.create_sse(None);

        assert!(matches!(manager.sse(streamable.id()), Err(Error::WrongTransport)));
        assert!(matches!(manager.streamable(sse.id()), Err(Error::WrongTransport)));
        assert!(matches!(manager.sse("unknown"), Err(Error::SessionNotFound)));
    }

    #[test]
    fn dropping_guard_removes_sse_session() {
        let manager = SessionManager::default();
        let (session, rx, guard) = manager.create_sse(None);
        let id = session.id().to_string();
        assert!(manager.sse(&id).is_ok());

        drop(guard);
        drop(rx);
        assert!(matches!(manager.sse(&id), Err(Error::SessionNotFound)));
    }

    #[test]
    fn sse_session_keeps_connect_credential() {
        let manager = SessionManager::default();
        let (session, _rx, _guard) = manager.create_sse(Credential::new("k1"));
        let found = manager.sse(session.id()).unwrap();
        assert_eq!(found.credential().map(Credential::expose), Some("k1"));
    }

    #[tokio::test]
    async fn sse_send_reaches_receiver_until_closed() {
        let manager = SessionManager::default();
        let (session, mut rx, guard) = manager.create_sse(None);
        session.send(json!({"n": 1})).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), json!({"n": 1}));

        drop(rx);
        drop(guard);
        assert!(session.send(json!({"n": 2})).await.is_err());
    }

    #[tokio::test]
    async fn streamable_requests_are_serialized() {
        let manager = SessionManager::default();
        let session = manager.create_streamable();

        let first = session.acquire().await;
        let second = {
            let session = Arc::clone(&session);
            tokio::spawn(async move {
                let _g = session.acquire().await;
            })
        };
        tokio::task::yield_now().await;
        assert!(!second.is_finished());
        drop(first);
        second.await.unwrap();
    }

    #[tokio::test]
    async fn idle_streamable_sessions_expire() {
        let manager = SessionManager::default();
        let a = manager.create_streamable();
        let b = manager.create_streamable();
        let (sse, _rx, _guard) = manager.create_sse(None);

        assert_eq!(manager.expire_idle(Duration::from_secs(3600)), 0);
        assert_eq!(manager.expire_idle(Duration::ZERO), 2);
        assert!(matches!(manager.streamable(a.id()), Err(Error::SessionNotFound)));
        assert!(matches!(manager.streamable(b.id()), Err(Error::SessionNotFound)));
        // SSE sessions follow their stream, not the idle clock
        assert!(manager.sse(sse.id()).is_ok());
    }

    #[tokio::test]
    async fn busy_streamable_sessions_survive_expiry() {
        let manager = SessionManager::default();
        let in_flight = manager.create_streamable();
        let streaming = manager.create_streamable();

        let turn = in_flight.acquire().await;
        let rx = streaming.subscribe();
        assert_eq!(manager.expire_idle(Duration::ZERO), 0);

        drop(turn);
        drop(rx);
        assert_eq!(manager.expire_idle(Duration::ZERO), 2);
        assert_eq!(manager.streamable_count(), 0);
    }

    #[tokio::test]
    async fn sweeper_closes_idle_sessions() {
        let manager = SessionManager::default();
        let id = manager.create_streamable().id().to_string();
        let sweeper = manager.spawn_idle_sweeper(Duration::from_millis(20));

        tokio::time::timeout(Duration::from_secs(5), async {
            while manager.streamable(&id).is_ok() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        sweeper.abort();
    }

    #[tokio::test]
    async fn sweeper_stops_with_its_manager() {
        let manager = SessionManager::default();
        let sweeper = manager.spawn_idle_sweeper(Duration::from_millis(20));
        drop(manager);
        tokio::time::timeout(Duration::from_secs(5), sweeper)
            .await
            .unwrap()
            .unwrap();
    }
}
