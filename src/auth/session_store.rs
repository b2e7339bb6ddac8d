use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Invalid session table name: {0}")]
    InvalidTable(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Key/value client for session entries (token -> serialized user id).
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, SessionError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), SessionError>;
    async fn delete(&self, key: &str) -> Result<(), SessionError>;
}

/// Process-local session store.
#[derive(Default)]
pub struct MemorySessionStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, key: &str) -> Result<Option<String>, SessionError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), SessionError> {
        self.entries.write().await.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), SessionError> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

/// Session store kept in a PostgreSQL table, usually on a lazily connected pool.
pub struct PgSessionStore {
    pool: PgPool,
    table: String,
}

impl PgSessionStore {
    pub fn new(pool: PgPool, table: &str) -> Result<Self, SessionError> {
        if !Self::is_valid_table_name(table) {
            return Err(SessionError::InvalidTable(table.to_string()));
        }
        Ok(Self {
            pool,
            table: table.to_string(),
        })
    }

    /// DDL for the backing table.
    pub fn create_table_sql(table: &str) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" (\n    \"key\" TEXT PRIMARY KEY,\n    \"value\" TEXT NOT NULL,\n    \"updated_at\" TIMESTAMPTZ NOT NULL DEFAULT now()\n)",
            table
        )
    }

    pub fn drop_table_sql(table: &str) -> String {
        format!("DROP TABLE IF EXISTS \"{}\"", table)
    }

    fn is_valid_table_name(name: &str) -> bool {
        !name.is_empty()
            && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
            && !name.starts_with(|c: char| c.is_ascii_digit())
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn get(&self, key: &str) -> Result<Option<String>, SessionError> {
        let sql = format!("SELECT \"value\" FROM \"{}\" WHERE \"key\" = $1", self.table);
        let value: Option<String> = sqlx::query_scalar(&sql).bind(key).fetch_optional(&self.pool).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), SessionError> {
        let sql = format!(
            "INSERT INTO \"{}\" (\"key\", \"value\") VALUES ($1, $2) \
             ON CONFLICT (\"key\") DO UPDATE SET \"value\" = EXCLUDED.\"value\", \"updated_at\" = now()",
            self.table
        );
        sqlx::query(&sql).bind(key).bind(value).execute(&self.pool).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), SessionError> {
        let sql = format!("DELETE FROM \"{}\" WHERE \"key\" = $1", self.table);
        sqlx::query(&sql).bind(key).execute(&self.pool).await?;
        Ok(())
    }
}
