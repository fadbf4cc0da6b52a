//! Session store: in-memory map from user to active form session.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::model::UserId;
use super::state::FormSession;

/// Keyed store of active form sessions.
///
/// At most one session per user; `set` overwrites. The lock is never held
/// across an await on anything else.
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<UserId, FormSession>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the user's session.
    pub async fn get(&self, user_id: &UserId) -> Option<FormSession> {
        self.sessions.read().await.get(user_id).cloned()
    }

    /// Insert or replace the user's session.
    pub async fn set(&self, session: FormSession) {
        let mut sessions = self.sessions.write().await;
        if let Some(old) = sessions.insert(session.user_id.clone(), session) {
            debug!(user_id = %old.user_id, step = %old.current_step(), "Replaced form session");
        }
    }

    /// Drop the user's session, returning it if there was one.
    pub async fn clear(&self, user_id: &UserId) -> Option<FormSession> {
        self.sessions.write().await.remove(user_id)
    }

    /// Number of active sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Remove sessions untouched for longer than `max_idle`. Returns how many.
    pub async fn prune_stale(&self, max_idle: Duration) -> usize {
        let Ok(max_idle) = chrono::Duration::from_std(max_idle) else {
            return 0;
        };
        let cutoff = Utc::now() - max_idle;

        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.updated_at >= cutoff);
        let pruned = before - sessions.len();
        if pruned > 0 {
            info!(pruned, "Pruned stale form sessions");
        }
        pruned
    }
}
