//! In-process session table: conversation memory plus the active request of each session.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::types::Message;

/// Server-side record keyed by a client-supplied or generated identifier.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    /// Request id of the generation currently allowed to answer for this session.
    pub current_request: Option<String>,
    /// Set when a client asked to cancel `current_request`.
    pub cancelled: bool,
    cancel_token: Option<CancellationToken>,
    /// Completed user/assistant turns, oldest first.
    pub memory: Vec<Message>,
}

impl Session {
    fn new(id: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            created_at: now,
            last_accessed: now,
            current_request: None,
            cancelled: false,
            cancel_token: None,
            memory: Vec::new(),
        }
    }
}

/// Issued by [`SessionStore::begin_request`]; the token fires when the request is cancelled.
#[derive(Debug, Clone)]
pub struct RequestTicket {
    pub request_id: String,
    pub token: CancellationToken,
}

/// Session table behind a single lock.
///
/// Every read-modify-write happens inside one lock scope, and the lock is never held
/// across an `.await`.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<String, Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the id of an existing or newly created session and refreshes its access time.
    ///
    /// A missing or blank id yields a fresh `session_<uuid>` identifier.
    pub fn resolve(&self, requested: Option<&str>) -> String {
        let id = requested
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .unwrap_or_else(new_session_id);

        let mut sessions = self.sessions.lock();
        match sessions.get_mut(&id) {
            Some(session) => session.last_accessed = Utc::now(),
            None => {
                debug!(session_id = %id, "creating session");
                sessions.insert(id.clone(), Session::new(id.clone()));
            }
        }
        id
    }

    /// Makes `request_id` the session's current request and hands out a fresh token.
    ///
    /// The previous request is superseded but its token is left untouched; use
    /// [`SessionStore::cancel_current`] first to stop it.
    pub fn begin_request(&self, session_id: &str, request_id: impl Into<String>) -> RequestTicket {
        let request_id = request_id.into();
        let token = CancellationToken::new();

        let mut sessions = self.sessions.lock();
        let session = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Session::new(session_id.to_string()));
        if let Some(previous) = session.current_request.replace(request_id.clone()) {
            debug!(session_id, previous = %previous, current = %request_id, "request superseded");
        }
        session.cancelled = false;
        session.cancel_token = Some(token.clone());
        session.last_accessed = Utc::now();

        RequestTicket { request_id, token }
    }

    /// Cancels the in-flight request of the session, if any. Returns whether one was cancelled.
    pub fn cancel_current(&self, session_id: &str) -> bool {
        let mut sessions = self.sessions.lock();
        let Some(session) = sessions.get_mut(session_id) else {
            return false;
        };
        let Some(request_id) = session.current_request.as_deref() else {
            return false;
        };
        info!(session_id, request_id, "cancelling in-flight request");
        session.cancelled = true;
        if let Some(token) = session.cancel_token.take() {
            token.cancel();
        }
        true
    }

    pub fn is_current(&self, session_id: &str, request_id: &str) -> bool {
        self.sessions
            .lock()
            .get(session_id)
            .and_then(|session| session.current_request.as_deref())
            == Some(request_id)
    }

    pub fn is_cancelled(&self, session_id: &str) -> bool {
        self.sessions
            .lock()
            .get(session_id)
            .is_some_and(|session| session.cancelled)
    }

    /// Last `limit` stored messages, oldest first.
    ///
    /// An odd `limit` is rounded down so the window always starts on a user turn.
    pub fn recent_turns(&self, session_id: &str, limit: usize) -> Vec<Message> {
        let sessions = self.sessions.lock();
        let Some(session) = sessions.get(session_id) else {
            return Vec::new();
        };
        let start = session.memory.len().saturating_sub(limit - limit % 2);
        session.memory[start..].to_vec()
    }

    /// Appends one completed exchange to the session memory.
    pub fn record_exchange(&self, session_id: &str, user: &str, assistant: &str) {
        let mut sessions = self.sessions.lock();
        let session = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Session::new(session_id.to_string()));
        session.memory.push(Message::user(user));
        session.memory.push(Message::assistant(assistant));
    }

    /// Records the exchange only while `request_id` is still the session's live request.
    ///
    /// The check and the write share one lock scope, so a request superseded or cancelled
    /// concurrently never reaches memory. Returns whether the exchange was stored.
    pub fn record_if_current(
        &self,
        session_id: &str,
        request_id: &str,
        user: &str,
        assistant: &str,
    ) -> bool {
        let mut sessions = self.sessions.lock();
        let Some(session) = sessions.get_mut(session_id) else {
            return false;
        };
        if session.cancelled || session.current_request.as_deref() != Some(request_id) {
            debug!(session_id, request_id, "skipping memory for stale request");
            return false;
        }
        session.memory.push(Message::user(user));
        session.memory.push(Message::assistant(assistant));
        true
    }

    /// Drops sessions not accessed within `ttl`, cancelling their in-flight requests.
    pub fn evict_idle(&self, ttl: Duration) -> usize {
        let Ok(ttl) = chrono::Duration::from_std(ttl) else {
            return 0;
        };
        let cutoff = Utc::now() - ttl;

        let mut sessions = self.sessions.lock();
        let before = sessions.len();
        sessions.retain(|_, session| {
            let keep = session.last_accessed >= cutoff;
            if !keep {
                if let Some(token) = &session.cancel_token {
                    token.cancel();
                }
            }
            keep
        });
        before - sessions.len()
    }

    pub fn get(&self, session_id: &str) -> Option<Session> {
        self.sessions.lock().get(session_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Periodically evicts sessions idle for longer than `ttl`, checking every `ttl / 2`.
pub fn spawn_session_eviction(sessions: Arc<SessionStore>, ttl: Duration) -> JoinHandle<()> {
    let period = (ttl / 2).max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let evicted = sessions.evict_idle(ttl);
            if evicted > 0 {
                info!(evicted, remaining = sessions.len(), "evicted idle sessions");
            }
        }
    })
}

fn new_session_id() -> String {
    format!("session_{}", Uuid::new_v4())
}
