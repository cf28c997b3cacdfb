//! Short-lived record of recently reconciled sessions.
//!
//! The guard collapses near-simultaneous duplicate verification calls without
//! touching the payment processor. It lives in process memory, is empty after
//! a restart and is not shared between instances, so it never decides whether
//! an order gets created. That is the job of the storage constraint on
//! `orders.bag_id`.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::reconciler::ReconcileOutcome;

/// Default time an entry stays valid.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct Entry {
    recorded_at: Instant,
    outcome: ReconcileOutcome,
}

/// Time-bounded map from session reference to its reconcile outcome.
///
/// Expired entries are evicted on every access. A zero window disables the
/// guard.
#[derive(Debug)]
pub struct ProcessedSessions {
    window: Duration,
    entries: Mutex<HashMap<String, Entry>>,
}

impl Default for ProcessedSessions {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl ProcessedSessions {
    /// Creates an empty guard with the given eviction window.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the eviction window.
    pub fn window(&self) -> Duration {
        self.window
    }

    fn evict_expired(&self, entries: &mut HashMap<String, Entry>, now: Instant) {
        entries.retain(|_, entry| now.duration_since(entry.recorded_at) < self.window);
    }

    /// Returns the outcome recorded for a session within the window.
    pub async fn get(&self, session_id: &str) -> Option<ReconcileOutcome> {
        let mut entries = self.entries.lock().await;
        self.evict_expired(&mut entries, Instant::now());
        entries.get(session_id).map(|entry| entry.outcome)
    }

    /// Records (or refreshes) the outcome for a session.
    pub async fn record(&self, session_id: &str, outcome: ReconcileOutcome) {
        if self.window.is_zero() {
            return;
        }
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        self.evict_expired(&mut entries, now);
        entries.insert(
            session_id.to_string(),
            Entry {
                recorded_at: now,
                outcome,
            },
        );
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        let mut entries = self.entries.lock().await;
        self.evict_expired(&mut entries, Instant::now());
        entries.len()
    }

    /// Returns true if no live entries remain.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drops every entry.
    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }
}
