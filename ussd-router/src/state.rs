//! Screen-state cache.
//!
//! Remembers which screen each session is parked on. Entries are refreshed on
//! every write and swept once idle for the configured TTL. Eviction is
//! advisory: a session whose entry was swept simply lands back on the index
//! screen on its next request.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::time::Duration;

use crate::session::has_expired;

#[derive(Debug, Clone)]
struct ScreenState {
    screen: String,
    updated_at: DateTime<Utc>,
}

/// Session id → current screen name.
#[derive(Debug, Default)]
pub struct ScreenStateCache {
    entries: DashMap<String, ScreenState>,
}

impl ScreenStateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current screen for the session, `None` meaning the index screen.
    pub fn get(&self, session_id: &str) -> Option<String> {
        self.entries
            .get(session_id)
            .map(|entry| entry.screen.clone())
    }

    /// Park the session on `screen`, restarting its idle clock.
    pub fn set(&self, session_id: &str, screen: &str) {
        self.set_at(session_id, screen, Utc::now());
    }

    pub(crate) fn set_at(&self, session_id: &str, screen: &str, updated_at: DateTime<Utc>) {
        self.entries.insert(
            session_id.to_string(),
            ScreenState {
                screen: screen.to_string(),
                updated_at,
            },
        );
    }

    pub fn remove(&self, session_id: &str) {
        self.entries.remove(session_id);
    }

    /// Drop entries not updated for at least `ttl`. Returns how many were removed.
    pub fn evict(&self, ttl: Duration) -> usize {
        let now = Utc::now();
        let before = self.entries.len();
        self.entries
            .retain(|_, state| !has_expired(state.updated_at, now, ttl));
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
