//! Active attempt tracking
//!
//! Every in-flight pairing attempt has an entry keyed by its attempt ID,
//! updated by the runner on each lifecycle transition and removed when the
//! attempt ends. The registry also enforces `max_active_attempts`, so an
//! abandoned attempt retrying forever cannot starve new callers for longer
//! than its configured bounds allow.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use pairing::AttemptState;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{Error, Result};

/// Snapshot of one active attempt.
#[derive(Debug, Clone)]
pub struct AttemptEntry {
    pub state: &'static str,
    pub retries: u32,
    pub started_at: Instant,
}

/// Registry of active attempts plus lifetime counters.
pub struct AttemptRegistry {
    attempts: RwLock<HashMap<String, AttemptEntry>>,
    max_active: usize,
    succeeded: AtomicU64,
    failed: AtomicU64,
}

impl AttemptRegistry {
    pub fn new(max_active: usize) -> Self {
        Self {
            attempts: RwLock::new(HashMap::new()),
            max_active,
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    /// Register a new attempt, refusing when the limit is reached or the ID
    /// is already in use.
    pub async fn admit(&self, attempt_id: &str) -> Result<()> {
        let mut attempts = self.attempts.write().await;
        if attempts.len() >= self.max_active || attempts.contains_key(attempt_id) {
            return Err(Error::AtCapacity(self.max_active));
        }
        attempts.insert(
            attempt_id.to_string(),
            AttemptEntry {
                state: AttemptState::initial().label(),
                retries: 0,
                started_at: Instant::now(),
            },
        );
        debug!(attempt_id, active = attempts.len(), "attempt admitted");
        Ok(())
    }

    /// Record a lifecycle transition.
    pub async fn update(&self, attempt_id: &str, state: &AttemptState) {
        if let Some(entry) = self.attempts.write().await.get_mut(attempt_id) {
            entry.state = state.label();
            entry.retries = state.retries();
        }
    }

    /// Remove a finished attempt and count its outcome.
    pub async fn finish(&self, attempt_id: &str, succeeded: bool) {
        self.attempts.write().await.remove(attempt_id);
        if succeeded {
            self.succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[cfg(test)]
    pub async fn get(&self, attempt_id: &str) -> Option<AttemptEntry> {
        self.attempts.read().await.get(attempt_id).cloned()
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.attempts.read().await.len()
    }

    /// JSON summary for the health and attempts endpoints.
    pub async fn snapshot(&self) -> serde_json::Value {
        let attempts = self.attempts.read().await;
        let mut listed: Vec<serde_json::Value> = attempts
            .iter()
            .map(|(id, entry)| {
                serde_json::json!({
                    "id": id,
                    "state": entry.state,
                    "retries": entry.retries,
                    "age_seconds": entry.started_at.elapsed().as_secs(),
                })
            })
            .collect();
        listed.sort_by(|a, b| a["id"].as_str().cmp(&b["id"].as_str()));

        serde_json::json!({
            "active": attempts.len(),
            "max_active": self.max_active,
            "succeeded_total": self.succeeded.load(Ordering::Relaxed),
            "failed_total": self.failed.load(Ordering::Relaxed),
            "attempts": listed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn admit_tracks_initial_state() {
        let registry = AttemptRegistry::new(4);
        registry.admit("a1").await.unwrap();

        let entry = registry.get("a1").await.unwrap();
        assert_eq!(entry.state, "initializing");
        assert_eq!(entry.retries, 0);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn admit_refuses_when_full() {
        let registry = AttemptRegistry::new(2);
        registry.admit("a1").await.unwrap();
        registry.admit("a2").await.unwrap();

        let err = registry.admit("a3").await.unwrap_err();
        assert!(matches!(err, Error::AtCapacity(2)));

        registry.finish("a1", true).await;
        registry.admit("a3").await.unwrap();
    }

    #[tokio::test]
    async fn admit_refuses_duplicate_id() {
        let registry = AttemptRegistry::new(8);
        registry.admit("dup").await.unwrap();
        assert!(registry.admit("dup").await.is_err());
    }

    #[tokio::test]
    async fn update_records_label_and_retries() {
        let registry = AttemptRegistry::new(4);
        registry.admit("a1").await.unwrap();
        registry
            .update("a1", &AttemptState::Retrying { retries: 3 })
            .await;

        let entry = registry.get("a1").await.unwrap();
        assert_eq!(entry.state, "retrying");
        assert_eq!(entry.retries, 3);
    }

    #[tokio::test]
    async fn update_unknown_attempt_is_ignored() {
        let registry = AttemptRegistry::new(4);
        registry
            .update("ghost", &AttemptState::Connecting { retries: 0 })
            .await;
        assert!(registry.get("ghost").await.is_none());
    }

    #[tokio::test]
    async fn snapshot_counts_outcomes() {
        let registry = AttemptRegistry::new(4);
        for id in ["b", "a", "c"] {
            registry.admit(id).await.unwrap();
        }
        registry.finish("c", true).await;
        registry.finish("b", false).await;

        let snapshot = registry.snapshot().await;
        assert_eq!(snapshot["active"], 1);
        assert_eq!(snapshot["max_active"], 4);
        assert_eq!(snapshot["succeeded_total"], 1);
        assert_eq!(snapshot["failed_total"], 1);
        assert_eq!(snapshot["attempts"][0]["id"], "a");
        assert_eq!(snapshot["attempts"][0]["state"], "initializing");
    }
}
