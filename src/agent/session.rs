//! Per-session conversation state.
//!
//! A session is created on first reference to its key and lives until it is
//! evicted or the process exits. Loading a dataset is the only way to reset
//! it. Each session sits behind its own async mutex, held for the whole of an
//! agent invocation, so calls on the same key run one after the other while
//! different keys never contend beyond the brief map lookup.

use crate::agent::llm::ChatMessage;
use crate::analysis::AnalysisCache;
use crate::data::Dataset;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::info;

/// Shared handle to one session.
pub type SessionHandle = Arc<tokio::sync::Mutex<Session>>;

#[derive(Debug)]
pub struct Session {
    key: String,
    dataset: Option<Arc<Dataset>>,
    pub(crate) history: Vec<ChatMessage>,
    pub(crate) cache: AnalysisCache,
    pub(crate) charts: Vec<String>,
}

impl Session {
    fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            dataset: None,
            history: Vec::new(),
            cache: AnalysisCache::new(),
            charts: Vec::new(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn dataset(&self) -> Option<Arc<Dataset>> {
        self.dataset.clone()
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn cache(&self) -> &AnalysisCache {
        &self.cache
    }

    /// Every chart produced in this session, oldest first.
    pub fn charts(&self) -> &[String] {
        &self.charts
    }

    /// Install a dataset and start a fresh conversation.
    pub fn load(&mut self, dataset: Arc<Dataset>) {
        self.dataset = Some(dataset);
        self.history.clear();
        self.cache.clear();
        self.charts.clear();
    }
}

/// Keyed session state, owned by whoever serves requests.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<String, SessionHandle>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self) -> MutexGuard<'_, HashMap<String, SessionHandle>> {
        // The map holds no invariants a panicking holder could break.
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Return the session for `key`, creating an empty one if needed.
    pub fn get_or_create(&self, key: &str) -> SessionHandle {
        let mut sessions = self.map();
        sessions
            .entry(key.to_string())
            .or_insert_with(|| {
                info!("Creating session {}", key);
                Arc::new(tokio::sync::Mutex::new(Session::new(key)))
            })
            .clone()
    }

    /// Install `dataset` into the session for `key`, clearing history,
    /// cached analyses and charts.
    pub async fn load_dataset(&self, key: &str, dataset: impl Into<Arc<Dataset>>) {
        let handle = self.get_or_create(key);
        let mut session = handle.lock().await;
        let dataset = dataset.into();
        info!(
            "Loading {} records into session {} (conversation reset)",
            dataset.len(),
            key
        );
        session.load(dataset);
    }

    /// Drop the session for `key`. Returns whether one existed.
    pub fn evict(&self, key: &str) -> bool {
        let removed = self.map().remove(key).is_some();
        if removed {
            info!("Evicted session {}", key);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{run_analysis, AnalysisKind};
    use crate::data::Column;

    fn dataset(rows: usize) -> Dataset {
        Dataset::from_columns(vec![
            Column::text("Machine", (0..rows).map(|i| format!("M{}", i % 3))),
            Column::numeric("Target", (0..rows).map(|i| (i % 4 == 0) as u8 as f64)),
        ])
        .unwrap()
    }

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let store = SessionStore::new();
        assert!(store.is_empty());

        let a = store.get_or_create("s1");
        let b = store.get_or_create("s1");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(store.len(), 1);

        let session = a.lock().await;
        assert_eq!(session.key(), "s1");
        assert!(session.dataset().is_none());
        assert!(session.history().is_empty());
    }

    #[tokio::test]
    async fn test_load_dataset_resets_everything() {
        let store = SessionStore::new();
        store.load_dataset("s1", dataset(8)).await;

        {
            let handle = store.get_or_create("s1");
            let mut session = handle.lock().await;
            let ds = session.dataset().unwrap();
            session.history.push(ChatMessage::user("hello"));
            session.charts.push("data:image/svg+xml;base64,AAAA".to_string());
            let output = run_analysis(AnalysisKind::FailureRates, &ds, 0.05).unwrap();
            session.cache.insert(output);
        }

        store.load_dataset("s1", dataset(12)).await;

        let handle = store.get_or_create("s1");
        let session = handle.lock().await;
        assert_eq!(session.dataset().unwrap().len(), 12);
        assert!(session.history().is_empty());
        assert!(session.charts().is_empty());
        assert!(session.cache().is_empty());
    }

    #[tokio::test]
    async fn test_sessions_are_independent() {
        let store = SessionStore::new();
        store.load_dataset("a", dataset(4)).await;
        store.load_dataset("b", dataset(6)).await;

        store.get_or_create("a").lock().await.history.push(ChatMessage::user("only a"));

        assert!(store.get_or_create("b").lock().await.history().is_empty());
        assert_eq!(store.get_or_create("a").lock().await.history().len(), 1);
    }

    #[test]
    fn test_evict() {
        let store = SessionStore::new();
        store.get_or_create("s1");
        store.get_or_create("s2");
        assert_eq!(store.len(), 2);
        assert!(store.evict("s1"));
        assert!(!store.evict("s1"));
        assert_eq!(store.len(), 1);

        // A later lookup starts from a blank session.
        let fresh = store.get_or_create("s1");
        assert!(fresh.try_lock().unwrap().dataset().is_none());
    }
}
