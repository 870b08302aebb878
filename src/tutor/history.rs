//! Persistent SQLite log of answered questions.

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{Connection, params};
use std::fmt;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::info;

/// Fixed-width so that lexical order in SQLite matches chronological order.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

const SCHEMA_VERSION: i32 = 1;

/// One answered question.
#[derive(Debug, Clone, PartialEq)]
pub struct Interaction {
    pub user_id: i64,
    pub timestamp: DateTime<Utc>,
    pub user_message: String,
    pub bot_reply: String,
}

#[derive(Debug)]
pub enum StoreError {
    Sqlite(rusqlite::Error),
    /// A timestamp column did not parse.
    BadTimestamp(String),
    /// Another thread panicked while holding the connection.
    Poisoned,
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sqlite(e) => write!(f, "sqlite error: {e}"),
            Self::BadTimestamp(t) => write!(f, "bad timestamp in store: {t}"),
            Self::Poisoned => write!(f, "database lock poisoned"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Sqlite(e) => Some(e),
            Self::BadTimestamp(_) | Self::Poisoned => None,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Sqlite(e)
    }
}

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, StoreError> {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|_| StoreError::BadTimestamp(s.to_string()))
}

/// Append-only interaction log.
pub struct HistoryStore {
    conn: Mutex<Connection>,
}

impl HistoryStore {
    /// Open (or create) the database file. Call [`HistoryStore::migrate`] before use.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Bring the schema up to date. Safe to run on every start.
    pub fn migrate(&self) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

        if version < 1 {
            conn.execute_batch(r#"
                CREATE TABLE IF NOT EXISTS chat_history (
                    user_id INTEGER NOT NULL,
                    timestamp TEXT NOT NULL,
                    user_message TEXT NOT NULL,
                    bot_reply TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_chat_history_user_time ON chat_history(user_id, timestamp);
            "#)?;
            conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
            info!("Migrated history schema from v{} to v{}", version, SCHEMA_VERSION);
        }

        Ok(())
    }

    pub fn append(&self, interaction: &Interaction) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO chat_history (user_id, timestamp, user_message, bot_reply) VALUES (?1, ?2, ?3, ?4)",
            params![
                interaction.user_id,
                format_timestamp(&interaction.timestamp),
                interaction.user_message,
                interaction.bot_reply
            ],
        )?;
        Ok(())
    }

    /// Question texts asked by `user_id` strictly after `since`. Unordered.
    pub fn questions_since(&self, user_id: i64, since: DateTime<Utc>) -> Result<Vec<String>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT user_message FROM chat_history WHERE user_id = ?1 AND timestamp > ?2",
        )?;
        let rows = stmt.query_map(params![user_id, format_timestamp(&since)], |row| row.get(0))?;
        Ok(rows.collect::<Result<Vec<String>, _>>()?)
    }

    /// Up to `limit` most recent interactions, newest first.
    pub fn recent(&self, user_id: i64, limit: usize) -> Result<Vec<Interaction>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT timestamp, user_message, bot_reply FROM chat_history
             WHERE user_id = ?1 ORDER BY timestamp DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![user_id, limit as i64], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (timestamp, user_message, bot_reply) = row?;
            out.push(Interaction {
                user_id,
                timestamp: parse_timestamp(&timestamp)?,
                user_message,
                bot_reply,
            });
        }
        Ok(out)
    }

    pub fn count(&self, user_id: i64) -> Result<usize, StoreError> {
        let conn = self.lock()?;
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM chat_history WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }

    /// Make every later statement fail.
    #[cfg(test)]
    pub(crate) fn break_for_test(&self) {
        self.lock().unwrap().execute_batch("DROP TABLE chat_history").unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn store() -> HistoryStore {
        let store = HistoryStore::open_in_memory().unwrap();
        store.migrate().unwrap();
        store
    }

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 9, minute, 0).unwrap()
    }

    fn record(user_id: i64, minute: u32, q: &str) -> Interaction {
        Interaction {
            user_id,
            timestamp: at(minute),
            user_message: q.to_string(),
            bot_reply: format!("answer to {q}"),
        }
    }

    #[test]
    fn test_timestamp_format_is_fixed_width() {
        let a = format_timestamp(&at(5));
        let b = format_timestamp(&(at(5) + Duration::microseconds(123)));
        assert_eq!(a, "2026-03-14T09:05:00.000000Z");
        assert_eq!(b, "2026-03-14T09:05:00.000123Z");
        assert_eq!(parse_timestamp(&b).unwrap(), at(5) + Duration::microseconds(123));
    }

    #[test]
    fn test_recent_is_newest_first_and_limited() {
        let store = store();
        for minute in 0..12 {
            store.append(&record(7, minute, &format!("q{minute}"))).unwrap();
        }

        let recent = store.recent(7, 10).unwrap();
        assert_eq!(recent.len(), 10);
        assert_eq!(recent[0].user_message, "q11");
        assert_eq!(recent[9].user_message, "q2");
        assert_eq!(recent[0].timestamp, at(11));
    }

    #[test]
    fn test_users_are_isolated() {
        let store = store();
        store.append(&record(1, 0, "mine")).unwrap();
        store.append(&record(2, 1, "theirs")).unwrap();

        let recent = store.recent(1, 10).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].user_message, "mine");
        assert_eq!(store.count(2).unwrap(), 1);
        assert_eq!(store.count(3).unwrap(), 0);
    }

    #[test]
    fn test_questions_since_is_strictly_after() {
        let store = store();
        store.append(&record(1, 0, "old")).unwrap();
        store.append(&record(1, 10, "boundary")).unwrap();
        store.append(&record(1, 20, "new")).unwrap();

        let mut questions = store.questions_since(1, at(10)).unwrap();
        questions.sort();
        assert_eq!(questions, vec!["new".to_string()]);
    }

    #[test]
    fn test_duplicates_allowed() {
        let store = store();
        store.append(&record(1, 0, "same")).unwrap();
        store.append(&record(1, 0, "same")).unwrap();
        assert_eq!(store.count(1).unwrap(), 2);
    }

    #[test]
    fn test_migrate_is_idempotent() {
        let store = store();
        store.append(&record(1, 0, "kept")).unwrap();
        store.migrate().unwrap();
        assert_eq!(store.count(1).unwrap(), 1);
    }

    #[test]
    fn test_unmigrated_store_fails_cleanly() {
        let store = HistoryStore::open_in_memory().unwrap();
        let err = store.append(&record(1, 0, "q")).unwrap_err();
        assert!(matches!(err, StoreError::Sqlite(_)));
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("robotutor.db");

        {
            let store = HistoryStore::open(&path).unwrap();
            store.migrate().unwrap();
            store.append(&record(42, 3, "What is gravity?")).unwrap();
        }

        let store = HistoryStore::open(&path).unwrap();
        store.migrate().unwrap();
        let recent = store.recent(42, 10).unwrap();
        assert_eq!(recent, vec![record(42, 3, "What is gravity?")]);
    }
}
