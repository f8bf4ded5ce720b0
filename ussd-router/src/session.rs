//! Session objects and the session store.
//!
//! A [`Session`] lives for one dialog with one subscriber. Sessions expire by
//! age: [`SessionStore::vacuum`] removes every session created at least `ttl`
//! ago, even one that is still active. This bounds how long a dialog can run.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use ussd_common::{Error, Result};

use crate::value::Value;

/// How the next submitted fragment is interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InputMode {
    /// Fragment is an option code matched against the menu tree
    #[default]
    ExpectOption,
    /// Fragment is free-form input handed to the current handler
    ExpectInput,
}

/// Per-session read state maintained by the protocol adapter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cursor {
    pub mode: InputMode,
    /// Byte offset into the carrier's cumulative text where the next fragment starts
    pub read_pointer: usize,
    /// Last option code read in expect-option mode
    pub option: String,
    /// Last free-form input read in expect-input mode
    pub input: String,
    /// Clamp `read_pointer` to the text length instead of rejecting the request
    pub auto_adjust: bool,
}

/// One dialog with one subscriber.
#[derive(Debug)]
pub struct Session {
    id: String,
    created_at: DateTime<Utc>,
    attributes: DashMap<String, Value>,
    cursor: Mutex<Cursor>,
}

impl Session {
    /// Create a session stamped with the current time.
    pub fn new(id: impl Into<String>) -> Self {
        Self::with_created_at(id, Utc::now())
    }

    pub fn with_created_at(id: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            created_at,
            attributes: DashMap::new(),
            cursor: Mutex::new(Cursor::default()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Store an attribute, replacing any previous value under `key`.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.attributes.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.attributes.get(key).map(|v| v.value().clone())
    }

    /// Like [`Session::get`] but absence is an error.
    pub fn get_required(&self, key: &str) -> Result<Value> {
        self.get(key)
            .ok_or_else(|| Error::AttributeNotFound(key.to_string()))
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.attributes.remove(key).map(|(_, v)| v)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.attributes.contains_key(key)
    }

    /// Snapshot of the adapter read state.
    pub fn cursor(&self) -> Cursor {
        self.lock_cursor().clone()
    }

    /// Mutate the adapter read state under the session lock.
    pub fn update_cursor<R>(&self, f: impl FnOnce(&mut Cursor) -> R) -> R {
        f(&mut self.lock_cursor())
    }

    pub fn mode(&self) -> InputMode {
        self.lock_cursor().mode
    }

    pub fn set_mode(&self, mode: InputMode) {
        self.lock_cursor().mode = mode;
    }

    /// Clamp the read cursor to the submitted text instead of rejecting
    /// requests whose text is shorter than the cursor. Useful when a handler
    /// drives several prompts itself.
    pub fn set_auto_adjust_read_pointer(&self, auto_adjust: bool) {
        self.lock_cursor().auto_adjust = auto_adjust;
    }

    pub fn is_read_pointer_auto_adjusted(&self) -> bool {
        self.lock_cursor().auto_adjust
    }

    // A panicking handler never holds this lock, so a poisoned cursor is still consistent.
    fn lock_cursor(&self) -> MutexGuard<'_, Cursor> {
        self.cursor.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Storage contract for sessions.
///
/// Implementations must tolerate concurrent `set` calls on the same id; the
/// last write wins.
pub trait SessionStore: Send + Sync {
    fn set(&self, id: &str, session: Arc<Session>);

    fn get(&self, id: &str) -> Option<Arc<Session>>;

    fn delete(&self, id: &str);

    /// Remove sessions created at least `ttl` ago. Returns how many were removed.
    fn vacuum(&self, ttl: Duration) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Process-local session store.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: DashMap<String, Arc<Session>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for InMemorySessionStore {
    fn set(&self, id: &str, session: Arc<Session>) {
        self.sessions.insert(id.to_string(), session);
    }

    fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.get(id).map(|s| Arc::clone(s.value()))
    }

    fn delete(&self, id: &str) {
        self.sessions.remove(id);
    }

    fn vacuum(&self, ttl: Duration) -> usize {
        let now = Utc::now();
        let before = self.sessions.len();
        self.sessions
            .retain(|_, session| !has_expired(session.created_at(), now, ttl));
        before.saturating_sub(self.sessions.len())
    }

    fn len(&self) -> usize {
        self.sessions.len()
    }
}

/// True when `stamp` is at least `ttl` before `now`.
pub(crate) fn has_expired(stamp: DateTime<Utc>, now: DateTime<Utc>, ttl: Duration) -> bool {
    now.signed_duration_since(stamp)
        .to_std()
        .map(|age| age >= ttl)
        .unwrap_or(false)
}
