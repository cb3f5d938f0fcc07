//! Message persistence collaborator.
//!
//! The relay itself only depends on the `MessageStore` trait: store the
//! message, return it enriched with the sender's display metadata. The
//! SQLite implementation below is the concrete store the binary wires in.

use chrono::Utc;
use rusqlite::OptionalExtension;
use thiserror::Error;

use crate::db::models::ChatMessage;
use crate::db::DbPool;
use crate::relay::{RoomId, UserId};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sender {0} does not exist")]
    UnknownSender(UserId),
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("database lock poisoned")]
    LockPoisoned,
}

/// Stores one message and returns it enriched with sender display metadata.
/// Called from connection read tasks via `spawn_blocking`; implementations
/// may block.
pub trait MessageStore: Send + Sync {
    fn save_message(
        &self,
        room_id: RoomId,
        sender_id: UserId,
        text: &str,
    ) -> Result<ChatMessage, StoreError>;
}

/// SQLite-backed store. Avatar paths are stored relative; the configured
/// CDN base URL is prepended when building the outbound record.
pub struct SqliteStore {
    db: DbPool,
    cdn_base_url: Option<String>,
}

impl SqliteStore {
    pub fn new(db: DbPool, cdn_base_url: Option<String>) -> Self {
        Self { db, cdn_base_url }
    }
}

impl MessageStore for SqliteStore {
    fn save_message(
        &self,
        room_id: RoomId,
        sender_id: UserId,
        text: &str,
    ) -> Result<ChatMessage, StoreError> {
        let conn = self.db.lock().map_err(|_| StoreError::LockPoisoned)?;

        let (username, profile_image) = conn
            .query_row(
                "SELECT username, profile_image FROM users WHERE id = ?1",
                [sender_id],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?)),
            )
            .optional()?
            .ok_or(StoreError::UnknownSender(sender_id))?;

        let created_at = Utc::now();
        conn.execute(
            "INSERT INTO chat_messages (event_id, user_id, message, created_at) \
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![room_id, sender_id, text, created_at.to_rfc3339()],
        )?;
        let id = conn.last_insert_rowid();

        let profile_image = profile_image.map(|path| match &self.cdn_base_url {
            Some(base) => format!("{base}{path}"),
            None => path,
        });

        Ok(ChatMessage {
            id,
            event_id: room_id,
            user_id: sender_id,
            username,
            profile_image,
            message: text.to_string(),
            created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn test_db() -> (tempfile::TempDir, DbPool) {
        let tmp = tempfile::tempdir().unwrap();
        let pool = db::init_db(tmp.path().to_str().unwrap()).unwrap();
        {
            let conn = pool.lock().unwrap();
            conn.execute_batch(
                "INSERT INTO users (id, username, profile_image) VALUES
                     (1, 'alice', NULL),
                     (2, 'bob', '/avatars/bob.png');",
            )
            .unwrap();
        }
        (tmp, pool)
    }

    #[test]
    fn save_message_enriches_with_sender_metadata() {
        let (_tmp, pool) = test_db();
        let store = SqliteStore::new(pool, None);

        let saved = store.save_message(42, 1, "hello").unwrap();
        assert!(saved.id > 0);
        assert_eq!(saved.event_id, 42);
        assert_eq!(saved.user_id, 1);
        assert_eq!(saved.username, "alice");
        assert_eq!(saved.profile_image, None);
        assert_eq!(saved.message, "hello");

        // Messages get distinct, increasing ids.
        let next = store.save_message(42, 1, "again").unwrap();
        assert!(next.id > saved.id);
    }

    #[test]
    fn avatar_path_gets_cdn_prefix() {
        let (_tmp, pool) = test_db();
        let store = SqliteStore::new(pool, Some("https://cdn.example.com".to_string()));

        let saved = store.save_message(42, 2, "hi").unwrap();
        assert_eq!(
            saved.profile_image.as_deref(),
            Some("https://cdn.example.com/avatars/bob.png")
        );
    }

    #[test]
    fn unknown_sender_is_an_error_and_stores_nothing() {
        let (_tmp, pool) = test_db();
        let store = SqliteStore::new(pool.clone(), None);

        let err = store.save_message(42, 99, "ghost").unwrap_err();
        assert!(matches!(err, StoreError::UnknownSender(99)));

        let conn = pool.lock().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM chat_messages", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
