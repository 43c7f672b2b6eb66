//! Persistent session state using SQLite
//!
//! Key-value settings store holding the bearer token and the serialized
//! user under the same fixed keys the browser client used, so a restart
//! resumes the session until logout or a failed validation clears it.

use crate::error::Result;
use crate::models::AuthUser;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;

const KEY_TOKEN: &str = "jwt";
const KEY_USER: &str = "chatUser";

pub struct SessionStore {
    conn: Mutex<Connection>,
}

impl SessionStore {
    pub fn new(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let db_path = data_dir.join("roomchat.db");
        let conn = Connection::open(db_path)?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;

        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    fn save_setting(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    fn get_setting(&self, key: &str) -> Option<String> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT value FROM settings WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .ok()
    }

    fn delete_setting(&self, key: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM settings WHERE key = ?1", params![key])?;
        Ok(())
    }

    pub fn save_session(&self, token: &str, user: &AuthUser) -> Result<()> {
        self.save_setting(KEY_TOKEN, token)?;
        self.save_setting(KEY_USER, &serde_json::to_string(user)?)?;
        Ok(())
    }

    pub fn token(&self) -> Option<String> {
        self.get_setting(KEY_TOKEN)
    }

    /// Stored user, if present and still parseable.
    pub fn current_user(&self) -> Option<AuthUser> {
        let raw = self.get_setting(KEY_USER)?;
        serde_json::from_str(&raw).ok()
    }

    /// Drop the whole stored session (logout, failed validation).
    pub fn clear(&self) -> Result<()> {
        self.delete_setting(KEY_TOKEN)?;
        self.delete_setting(KEY_USER)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> AuthUser {
        AuthUser {
            username: "alice".to_string(),
            email: Some("alice@example.com".to_string()),
            full_name: Some("Alice Smith".to_string()),
        }
    }

    #[test]
    fn session_roundtrips_across_reopen() {
        let dir = tempfile::tempdir().unwrap();

        {
            let store = SessionStore::new(dir.path()).unwrap();
            store.save_session("tok-123", &user()).unwrap();
        }

        let store = SessionStore::new(dir.path()).unwrap();
        assert_eq!(store.token().as_deref(), Some("tok-123"));
        let restored = store.current_user().unwrap();
        assert_eq!(restored.username, "alice");
        assert_eq!(restored.full_name.as_deref(), Some("Alice Smith"));
    }

    #[test]
    fn clear_removes_both_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path()).unwrap();
        store.save_session("tok-123", &user()).unwrap();

        store.clear().unwrap();
        assert!(store.token().is_none());
        assert!(store.current_user().is_none());
    }

    #[test]
    fn empty_store_has_no_session() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path()).unwrap();
        assert!(store.token().is_none());
        assert!(store.current_user().is_none());
    }
}
