use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

use crate::database::entity::EntityMeta;
use crate::database::storage::{Storage, StorageError};
use crate::filter::FilterSet;

/// The resolved identity of a request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthUser {
    pub id: i64,
    pub username: Option<String>,
}

impl AuthUser {
    pub fn new(id: i64, username: Option<String>) -> Self {
        Self { id, username }
    }
}

/// Loads a user by primary key for session resolution.
#[async_trait]
pub trait UserLookup: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<AuthUser>, StorageError>;
}

/// `UserLookup` backed by the storage collaborator and a user entity.
pub struct EntityUserLookup {
    storage: Arc<dyn Storage>,
    entity: &'static EntityMeta,
}

impl EntityUserLookup {
    pub fn new(storage: Arc<dyn Storage>, entity: &'static EntityMeta) -> Self {
        Self { storage, entity }
    }
}

#[async_trait]
impl UserLookup for EntityUserLookup {
    async fn find_by_id(&self, id: i64) -> Result<Option<AuthUser>, StorageError> {
        let mut session = self.storage.begin().await?;
        let filters = FilterSet::new().with(self.entity.primary_key, id);
        let found = session.fetch_one(self.entity, &filters).await;
        session.rollback().await?;
        match found {
            Ok(record) => Ok(Some(AuthUser {
                id,
                username: record.get("username").and_then(|v| v.as_str()).map(str::to_string),
            })),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }
}
