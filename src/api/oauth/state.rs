//! CSRF `state` values for the authorization redirect.
//!
//! Each `state` is bound to the session that started the flow and is
//! consumed by the first callback that presents it.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Pending authorization started by a session
#[derive(Clone, Debug)]
pub struct PendingAuthorization {
    pub session: String,
    pub created_at: DateTime<Utc>,
}

/// Issued states with expiry
#[derive(Clone)]
pub struct StateManager {
    states: Arc<Mutex<HashMap<String, PendingAuthorization>>>,
    expiry: Duration,
}

impl StateManager {
    /// # Arguments
    /// * `expiry_seconds` - How long a state stays valid (configured default: 600)
    pub fn new(expiry_seconds: i64) -> Self {
        Self {
            states: Arc::new(Mutex::new(HashMap::new())),
            expiry: Duration::seconds(expiry_seconds),
        }
    }

    /// Issues a fresh state (UUID v4) for `session`.
    pub fn issue(&self, session: &str) -> String {
        let state = Uuid::new_v4().to_string();
        let pending = PendingAuthorization {
            session: session.to_string(),
            created_at: Utc::now(),
        };

        self.states.lock().unwrap().insert(state.clone(), pending);
        state
    }

    /// Removes `state` and returns its authorization if it has not expired.
    pub fn consume(&self, state: &str) -> Option<PendingAuthorization> {
        let pending = self.states.lock().unwrap().remove(state)?;
        if Utc::now() - pending.created_at > self.expiry {
            return None;
        }
        Some(pending)
    }

    /// Drops expired states.
    pub fn prune_expired(&self) -> usize {
        let mut states = self.states.lock().unwrap();
        let before = states.len();
        let now = Utc::now();
        states.retain(|_, pending| now - pending.created_at <= self.expiry);
        before - states.len()
    }

    pub fn pending(&self) -> usize {
        self.states.lock().unwrap().len()
    }
}

/// Periodically prunes expired states. Runs until the task is aborted.
pub async fn run_state_cleanup(manager: StateManager, interval_seconds: u64) {
    let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(interval_seconds.max(1)));

    loop {
        interval.tick().await;
        let pruned = manager.prune_expired();
        tracing::debug!(pruned, remaining = manager.pending(), "OAuth state cleanup complete");
    }
}
