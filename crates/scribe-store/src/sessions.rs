use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info};

use scribe_core::{SessionId, Turn};

pub const DEFAULT_MAX_TURNS: usize = 10;
pub const DEFAULT_IDLE_TTL: Duration = Duration::from_secs(3600);

#[derive(Clone, Debug)]
pub struct SessionStoreConfig {
    /// Rolling history cap per session.
    pub max_turns: usize,
    /// Sessions idle longer than this are dropped by the sweeper.
    pub idle_ttl: Duration,
}

impl Default for SessionStoreConfig {
    fn default() -> Self {
        Self {
            max_turns: DEFAULT_MAX_TURNS,
            idle_ttl: DEFAULT_IDLE_TTL,
        }
    }
}

/// One conversation's rolling history. Only successful, non-clarification
/// turns are recorded, so the history always carries usable SQL context.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    turns: Vec<Turn>,
    last_active: Instant,
    max_turns: usize,
}

impl Session {
    fn new(id: SessionId, max_turns: usize) -> Self {
        Self {
            id,
            turns: Vec::new(),
            last_active: Instant::now(),
            max_turns,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn history(&self) -> &[Turn] {
        &self.turns
    }

    pub fn turn_count(&self) -> usize {
        self.turns.len()
    }

    /// Append a turn, dropping the oldest once the cap is reached.
    pub fn push_turn(&mut self, turn: Turn) {
        self.turns.push(turn);
        if self.turns.len() > self.max_turns {
            let excess = self.turns.len() - self.max_turns;
            self.turns.drain(..excess);
        }
        self.touch();
    }

    pub fn touch(&mut self) {
        self.last_active = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_active.elapsed()
    }
}

/// In-process session registry. History lives for the lifetime of the server;
/// there is no cross-restart persistence.
pub struct SessionStore {
    sessions: DashMap<String, Arc<Mutex<Session>>>,
    config: SessionStoreConfig,
}

impl SessionStore {
    pub fn new(config: SessionStoreConfig) -> Self {
        Self {
            sessions: DashMap::new(),
            config,
        }
    }

    /// Get or create the session. Callers hold the returned lock for the
    /// whole run, which serializes concurrent queries on the same session.
    pub fn entry(&self, session_id: &SessionId) -> Arc<Mutex<Session>> {
        self.sessions
            .entry(session_id.as_str().to_string())
            .or_insert_with(|| {
                debug!(session_id = %session_id, "session created");
                Arc::new(Mutex::new(Session::new(
                    session_id.clone(),
                    self.config.max_turns,
                )))
            })
            .clone()
    }

    pub fn get(&self, session_id: &SessionId) -> Option<Arc<Mutex<Session>>> {
        self.sessions.get(session_id.as_str()).map(|s| s.clone())
    }

    /// Remove a session, returning whether it existed.
    pub fn remove(&self, session_id: &SessionId) -> bool {
        let removed = self.sessions.remove(session_id.as_str()).is_some();
        if removed {
            info!(session_id = %session_id, "session removed");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn idle_ttl(&self) -> Duration {
        self.config.idle_ttl
    }

    /// Drop sessions idle past the TTL. Sessions currently locked by a run
    /// are always kept. Returns how many were evicted.
    pub fn evict_idle(&self) -> usize {
        let ttl = self.config.idle_ttl;
        let before = self.sessions.len();
        self.sessions.retain(|_, session| match session.try_lock() {
            Ok(guard) => guard.idle_for() <= ttl,
            Err(_) => true,
        });
        let evicted = before.saturating_sub(self.sessions.len());
        if evicted > 0 {
            info!(evicted, "idle sessions evicted");
        }
        evicted
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(SessionStoreConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use scribe_core::ExtractedEntities;

    fn turn(utterance: &str) -> Turn {
        Turn {
            utterance: utterance.to_string(),
            resolved_query: utterance.to_string(),
            sql: format!("SELECT 1 -- {utterance}"),
            results_summary: "3 rows".to_string(),
            key_entities: ExtractedEntities::default(),
            timestamp: Utc::now(),
            is_followup: false,
        }
    }

    #[tokio::test]
    async fn entry_creates_then_reuses() {
        let store = SessionStore::default();
        let id = SessionId::from_raw("browser-tab-42");

        let first = store.entry(&id);
        let second = store.entry(&id);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(store.len(), 1);
        assert_eq!(first.lock().await.id().as_str(), "browser-tab-42");
    }

    #[tokio::test]
    async fn history_caps_at_max_turns() {
        let store = SessionStore::new(SessionStoreConfig {
            max_turns: 10,
            idle_ttl: DEFAULT_IDLE_TTL,
        });
        let id = SessionId::new();
        let session = store.entry(&id);

        {
            let mut guard = session.lock().await;
            for i in 0..15 {
                guard.push_turn(turn(&format!("query {i}")));
            }
        }

        let guard = session.lock().await;
        assert_eq!(guard.turn_count(), 10);
        // Oldest dropped first
        assert_eq!(guard.history()[0].utterance, "query 5");
        assert_eq!(guard.history()[9].utterance, "query 14");
    }

    #[tokio::test]
    async fn remove_reports_existence() {
        let store = SessionStore::default();
        let id = SessionId::new();
        store.entry(&id);

        assert!(store.remove(&id));
        assert!(!store.remove(&id));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn evict_idle_drops_stale_sessions() {
        let store = SessionStore::new(SessionStoreConfig {
            max_turns: 10,
            idle_ttl: Duration::from_millis(20),
        });
        let stale = SessionId::from_raw("stale");
        let fresh = SessionId::from_raw("fresh");
        store.entry(&stale);
        tokio::time::sleep(Duration::from_millis(40)).await;
        store.entry(&fresh);

        let evicted = store.evict_idle();
        assert_eq!(evicted, 1);
        assert!(store.get(&stale).is_none());
        assert!(store.get(&fresh).is_some());
    }

    #[tokio::test]
    async fn locked_sessions_survive_eviction() {
        let store = SessionStore::new(SessionStoreConfig {
            max_turns: 10,
            idle_ttl: Duration::from_millis(10),
        });
        let id = SessionId::from_raw("busy");
        let session = store.entry(&id);

        let guard = session.lock().await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(store.evict_idle(), 0);
        drop(guard);
    }

    #[tokio::test]
    async fn push_turn_refreshes_activity() {
        let store = SessionStore::new(SessionStoreConfig {
            max_turns: 10,
            idle_ttl: Duration::from_millis(50),
        });
        let id = SessionId::new();
        let session = store.entry(&id);

        tokio::time::sleep(Duration::from_millis(30)).await;
        session.lock().await.push_turn(turn("still here"));
        tokio::time::sleep(Duration::from_millis(30)).await;

        // 60ms since creation but only 30ms since the last turn
        assert_eq!(store.evict_idle(), 0);
        assert_eq!(store.len(), 1);
    }
}
