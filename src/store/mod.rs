use std::path::Path;
use std::sync::{ Arc, Mutex };

use chrono::Utc;
use rusqlite::{ params, Connection };
use thiserror::Error;
use tokio::task;

use crate::models::subscriber::Subscriber;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("blocking task failed: {0}")]
    Join(#[from] task::JoinError),
    #[error("invalid keyword data: {0}")]
    Keywords(#[from] serde_json::Error),
}

/// Durable subscriber registry. One table, unique on phone; rows live until
/// they are explicitly removed.
#[derive(Clone)]
pub struct SubscriberStore {
    conn: Arc<Mutex<Connection>>,
}

impl SubscriberStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS subscribers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                phone TEXT NOT NULL UNIQUE,
                keywords TEXT,
                created_at INTEGER
            );",
        )?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    /// Insert-or-replace keyed by phone. Subscribing twice with the same phone
    /// leaves exactly one row carrying the latest keywords.
    pub async fn upsert(&self, phone: &str, keywords: &[String]) -> Result<(), StoreError> {
        let conn = self.conn.clone();
        let phone = phone.to_string();
        let keywords_json = serde_json::to_string(keywords)?;
        task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            conn.execute(
                "INSERT OR REPLACE INTO subscribers (phone, keywords, created_at) VALUES (?1, ?2, ?3)",
                params![phone, keywords_json, Utc::now().timestamp_millis()],
            )?;
            Ok(())
        })
        .await?
    }

    pub async fn list(&self) -> Result<Vec<Subscriber>, StoreError> {
        let conn = self.conn.clone();
        task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            let mut stmt = conn.prepare(
                "SELECT id, phone, keywords, created_at FROM subscribers ORDER BY created_at DESC",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    let keywords_json: Option<String> = row.get(2)?;
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        keywords_json,
                        row.get::<_, i64>(3)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            let mut subscribers = Vec::with_capacity(rows.len());
            for (id, phone, keywords_json, created_at) in rows {
                let keywords = match keywords_json {
                    Some(json) => serde_json::from_str(&json)?,
                    None => Vec::new(),
                };
                subscribers.push(Subscriber { id, phone, keywords, created_at });
            }
            Ok(subscribers)
        })
        .await?
    }

    /// Deletes at most one row. A missing id affects zero rows and is not an
    /// error.
    pub async fn remove_by_id(&self, id: i64) -> Result<usize, StoreError> {
        let conn = self.conn.clone();
        task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            let affected = conn.execute("DELETE FROM subscribers WHERE id = ?1", params![id])?;
            Ok(affected)
        })
        .await?
    }
}
