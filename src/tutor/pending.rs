//! Group questions waiting for the asker to pick a destination.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

/// How long a question waits for a button press before it is dropped.
pub fn default_ttl() -> Duration {
    Duration::hours(1)
}

/// Identifies one user's pending question inside one chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PendingKey {
    pub chat_id: i64,
    pub user_id: i64,
}

impl PendingKey {
    pub fn new(chat_id: i64, user_id: i64) -> Self {
        Self { chat_id, user_id }
    }
}

struct Pending {
    question: String,
    asked_at: DateTime<Utc>,
}

/// At most one question per key. Newer mentions overwrite older ones.
///
/// Entries older than the TTL are never handed out and are pruned on the next stash.
pub struct PendingQuestions {
    inner: Mutex<HashMap<PendingKey, Pending>>,
    ttl: Duration,
}

impl Default for PendingQuestions {
    fn default() -> Self {
        Self::with_ttl(default_ttl())
    }
}

impl PendingQuestions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    fn is_live(&self, pending: &Pending, now: DateTime<Utc>) -> bool {
        now - pending.asked_at < self.ttl
    }

    /// Store `question`, returning the live one it replaced.
    pub fn stash(&self, key: PendingKey, question: String, now: DateTime<Utc>) -> Option<String> {
        let mut map = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        map.retain(|_, p| self.is_live(p, now));
        map.insert(key, Pending { question, asked_at: now }).map(|p| p.question)
    }

    /// Remove and return the pending question, unless it has expired.
    pub fn take(&self, key: PendingKey, now: DateTime<Utc>) -> Option<String> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&key)
            .filter(|p| self.is_live(p, now))
            .map(|p| p.question)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
