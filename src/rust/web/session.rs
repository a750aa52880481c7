use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::classifier::{ImageMetadata, Prediction};
use crate::config::{DEFAULT_MAX_SESSIONS, DEFAULT_SESSION_TTL_SECS};

/// Where a session is in the upload → predict cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    NoImage,
    ImageUploaded,
    Preprocessing,
    Predicted,
}

/// The last successful result of a session, shared between the result view
/// and the chart view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredResult {
    pub image: ImageMetadata,
    pub prediction: Prediction,
}

#[derive(Debug, Clone)]
struct SessionEntry {
    state: SessionState,
    last: Option<StoredResult>,
    touched: Instant,
}

impl SessionEntry {
    fn new() -> Self {
        Self {
            state: SessionState::NoImage,
            last: None,
            touched: Instant::now(),
        }
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.touched.elapsed() >= ttl
    }
}

/// Per-session result store, keyed by session identifier.
///
/// Only the web layer knows about sessions; the classifier returns plain
/// [`Prediction`] values which are recorded here.
///
/// The store is bounded: sessions idle for longer than the TTL are treated as
/// absent and pruned on the next insert, and once `max_sessions` entries are
/// live the least recently written one is evicted.
#[derive(Debug, Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, SessionEntry>>>,
    max_sessions: usize,
    ttl: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::with_limits(DEFAULT_MAX_SESSIONS, Duration::from_secs(DEFAULT_SESSION_TTL_SECS))
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(max_sessions: usize, ttl: Duration) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            max_sessions: max_sessions.max(1),
            ttl,
        }
    }

    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    pub async fn state(&self, session: &str) -> SessionState {
        self.sessions
            .read()
            .await
            .get(session)
            .filter(|entry| !entry.is_expired(self.ttl))
            .map(|entry| entry.state)
            .unwrap_or_default()
    }

    /// A new upload restarts the cycle from any state.
    pub async fn upload_received(&self, session: &str) {
        let mut sessions = self.sessions.write().await;
        self.touch(&mut sessions, session).state = SessionState::ImageUploaded;
    }

    pub async fn preprocessing_started(&self, session: &str) {
        let mut sessions = self.sessions.write().await;
        if let Some(entry) = sessions.get_mut(session) {
            if entry.state == SessionState::ImageUploaded && !entry.is_expired(self.ttl) {
                entry.state = SessionState::Preprocessing;
                entry.touched = Instant::now();
            }
        }
    }

    pub async fn record_prediction(&self, session: &str, result: StoredResult) {
        let mut sessions = self.sessions.write().await;
        let entry = self.touch(&mut sessions, session);
        entry.state = SessionState::Predicted;
        entry.last = Some(result);
    }

    /// The upload was rejected; keep any earlier result and return to rest.
    /// A session with nothing stored is dropped rather than kept as `NoImage`.
    pub async fn record_rejection(&self, session: &str) {
        let mut sessions = self.sessions.write().await;
        let keep = match sessions.get_mut(session) {
            Some(entry) if entry.last.is_some() && !entry.is_expired(self.ttl) => {
                entry.state = SessionState::Predicted;
                entry.touched = Instant::now();
                true
            }
            Some(_) => false,
            None => return,
        };
        if !keep {
            sessions.remove(session);
        }
    }

    pub async fn last_result(&self, session: &str) -> Option<StoredResult> {
        self.sessions
            .read()
            .await
            .get(session)
            .filter(|entry| !entry.is_expired(self.ttl))
            .and_then(|entry| entry.last.clone())
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Returns the live entry for `session`, creating it if needed, and marks
    /// it as just used.
    fn touch<'a>(
        &self,
        sessions: &'a mut HashMap<String, SessionEntry>,
        session: &str,
    ) -> &'a mut SessionEntry {
        let live = sessions
            .get(session)
            .is_some_and(|entry| !entry.is_expired(self.ttl));
        if !live {
            sessions.remove(session);
            self.make_room(sessions);
        }
        let entry = sessions
            .entry(session.to_string())
            .or_insert_with(SessionEntry::new);
        entry.touched = Instant::now();
        entry
    }

    fn make_room(&self, sessions: &mut HashMap<String, SessionEntry>) {
        if sessions.len() < self.max_sessions {
            return;
        }
        let ttl = self.ttl;
        sessions.retain(|_, entry| !entry.is_expired(ttl));

        while sessions.len() >= self.max_sessions {
            let oldest = sessions
                .iter()
                .min_by_key(|(_, entry)| entry.touched)
                .map(|(id, _)| id.clone());
            match oldest {
                Some(id) => {
                    log::debug!("Evicting least recently used session {}", id);
                    sessions.remove(&id);
                }
                None => break,
            }
        }
    }
}
