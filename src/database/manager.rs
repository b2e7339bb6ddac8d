use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::config::AppConfig;

/// Errors from DatabaseManager
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Missing configuration: {0}")]
    ConfigMissing(&'static str),

    #[error("Invalid database URL")]
    InvalidDatabaseUrl,

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Which configured database a pool points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseTarget {
    Default,
    Test,
}

impl DatabaseTarget {
    pub fn from_test_flag(test: bool) -> Self {
        if test {
            DatabaseTarget::Test
        } else {
            DatabaseTarget::Default
        }
    }
}

/// Builds connection pools from configuration. Pools are owned by the caller
/// and passed into the storage and session collaborators.
pub struct DatabaseManager;

impl DatabaseManager {
    /// Connect eagerly to the selected target.
    pub async fn connect(config: &AppConfig, target: DatabaseTarget) -> Result<PgPool, DatabaseError> {
        let url = Self::connection_string(config, target)?;
        let pool = Self::pool_options(config).connect(url).await?;
        info!("Created database pool for: {}", Self::redact(url));
        Ok(pool)
    }

    /// Pool that connects on first use.
    pub fn connect_lazy(config: &AppConfig, target: DatabaseTarget) -> Result<PgPool, DatabaseError> {
        let url = Self::connection_string(config, target)?;
        let pool = Self::pool_options(config).connect_lazy(url)?;
        info!("Created lazy database pool for: {}", Self::redact(url));
        Ok(pool)
    }

    fn pool_options(config: &AppConfig) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(config.database.max_connections)
            .acquire_timeout(Duration::from_secs(config.database.connection_timeout))
    }

    fn connection_string(config: &AppConfig, target: DatabaseTarget) -> Result<&str, DatabaseError> {
        let url = config
            .database_url(target == DatabaseTarget::Test)
            .ok_or(DatabaseError::ConfigMissing("DB_DEFAULT"))?;
        url::Url::parse(url).map_err(|_| DatabaseError::InvalidDatabaseUrl)?;
        Ok(url)
    }

    /// Connection string safe for logs: the password is replaced.
    pub fn redact(raw: &str) -> String {
        match url::Url::parse(raw) {
            Ok(mut url) => {
                if url.password().is_some() {
                    let _ = url.set_password(Some("***"));
                }
                url.to_string()
            }
            Err(_) => "<invalid database url>".to_string(),
        }
    }

    /// Execute statements in order inside one transaction.
    pub async fn execute_all(pool: &PgPool, statements: &[String]) -> Result<(), DatabaseError> {
        let mut tx = pool.begin().await?;
        for statement in statements {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
