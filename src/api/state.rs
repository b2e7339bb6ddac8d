use anyhow::Context;
use std::sync::Arc;
use tracing::info;

use crate::apps;
use crate::auth::{Authenticator, EntityUserLookup, MemorySessionStore, PgSessionStore, SessionStore};
use crate::config::{AppConfig, StorageBackend};
use crate::database::{DatabaseManager, DatabaseTarget, MemoryStorage, PgStorage, Storage};
use crate::services::CrudEngine;

/// Collaborators shared by every route, wired once at startup.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub engine: CrudEngine,
    pub auth: Authenticator,
}

impl AppState {
    pub fn new(config: AppConfig, storage: Arc<dyn Storage>, sessions: Arc<dyn SessionStore>) -> Self {
        let users = Arc::new(EntityUserLookup::new(storage.clone(), &apps::account::USER));
        Self {
            config: Arc::new(config),
            engine: CrudEngine::new(storage),
            auth: Authenticator::new(sessions, users),
        }
    }

    /// Memory storage and memory sessions, whatever the configured backends.
    pub fn in_memory(config: AppConfig) -> Self {
        let storage = Arc::new(MemoryStorage::new(apps::entities()));
        Self::new(config, storage, Arc::new(MemorySessionStore::new()))
    }

    /// Build the collaborators the configuration selects.
    pub async fn connect(config: AppConfig, target: DatabaseTarget) -> anyhow::Result<Self> {
        let storage: Arc<dyn Storage> = match config.database.backend {
            StorageBackend::Postgres => {
                let pool = DatabaseManager::connect(&config, target)
                    .await
                    .context("failed to connect to the database")?;
                Arc::new(PgStorage::new(pool))
            }
            StorageBackend::Memory => {
                info!("Using in-memory storage; data is lost on exit");
                Arc::new(MemoryStorage::new(apps::entities()))
            }
        };

        let sessions: Arc<dyn SessionStore> = match config.session.backend {
            StorageBackend::Postgres => {
                let pool = DatabaseManager::connect_lazy(&config, target).context("invalid session database")?;
                Arc::new(PgSessionStore::new(pool, &config.session.table)?)
            }
            StorageBackend::Memory => Arc::new(MemorySessionStore::new()),
        };

        Ok(Self::new(config, storage, sessions))
    }
}
