use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;

use super::RequestContext;
use crate::database::entity::EntityMeta;
use crate::database::record::Record;
use crate::database::storage::{StorageError, StorageSession};
use crate::error::{ErrorList, FieldErrors};
use crate::filter::QueryFilter;
use crate::schema::Schema;

/// Failure raised by a resource hook.
#[derive(Debug, Error)]
pub enum HookError {
    /// Pre-formatted taxonomy items, returned to the client as-is
    #[error("rejected with {} error(s)", .0.len())]
    Rejected(ErrorList),

    /// Plain message, reported as Database-Write-Fail
    #[error("{0}")]
    Invalid(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Per-resource extension points around the CRUD engine's write paths.
/// Every method defaults to a no-op.
#[async_trait]
pub trait ResourceHooks: Send + Sync {
    /// Field overrides applied to every created record.
    fn insert_defaults(&self, _ctx: &RequestContext) -> Map<String, Value> {
        Map::new()
    }

    /// Field overrides applied to every updated record.
    fn update_defaults(&self, _ctx: &RequestContext) -> Map<String, Value> {
        Map::new()
    }

    async fn pre_create(&self, _ctx: &RequestContext, _record: &mut Record) -> Result<(), HookError> {
        Ok(())
    }

    /// When true the engine flushes the parent and calls `pre_create_commit`
    /// before committing.
    fn flushes_before_commit(&self) -> bool {
        false
    }

    async fn pre_create_commit(
        &self,
        _ctx: &RequestContext,
        _session: &mut dyn StorageSession,
        _record: &mut Record,
    ) -> Result<(), HookError> {
        Ok(())
    }

    /// Runs after commit; cannot fail the request.
    async fn post_create(&self, _ctx: &RequestContext, _record: &Record) {}

    /// Sees the stored instance and the payload parsed on its own, before the
    /// payload is merged into the instance.
    async fn pre_update(
        &self,
        _ctx: &RequestContext,
        _existing: &mut Record,
        _parsed: &Result<Record, FieldErrors>,
    ) -> Result<(), HookError> {
        Ok(())
    }

    /// Runs after commit; cannot fail the request.
    async fn post_update(&self, _ctx: &RequestContext, _record: &Record) {}
}

/// Hooks that do nothing.
pub struct NoHooks;

impl ResourceHooks for NoHooks {}

/// Everything the CRUD engine needs to serve one entity.
#[derive(Clone)]
pub struct Resource {
    pub entity: &'static EntityMeta,
    pub schema: &'static dyn Schema,
    pub filter: QueryFilter,
    /// Stamp the authenticated user into the created-by column on create
    pub save_creator: bool,
    /// Relations cascaded on create
    pub related_fields_to_create: Vec<&'static str>,
    /// Relations cascaded on update
    pub related_fields_to_update: Vec<&'static str>,
    pub hooks: Arc<dyn ResourceHooks>,
}

impl Resource {
    pub fn new(entity: &'static EntityMeta, schema: &'static dyn Schema) -> Self {
        Self {
            entity,
            schema,
            filter: QueryFilter::default(),
            save_creator: true,
            related_fields_to_create: Vec::new(),
            related_fields_to_update: Vec::new(),
            hooks: Arc::new(NoHooks),
        }
    }

    pub fn filter(mut self, filter: QueryFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn without_creator(mut self) -> Self {
        self.save_creator = false;
        self
    }

    pub fn cascade_on_create(mut self, relations: &[&'static str]) -> Self {
        self.related_fields_to_create = relations.to_vec();
        self
    }

    pub fn cascade_on_update(mut self, relations: &[&'static str]) -> Self {
        self.related_fields_to_update = relations.to_vec();
        self
    }

    pub fn hooks(mut self, hooks: impl ResourceHooks + 'static) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }
}

impl std::fmt::Debug for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resource")
            .field("entity", &self.entity.name)
            .field("filter", &self.filter)
            .field("related_fields_to_create", &self.related_fields_to_create)
            .field("related_fields_to_update", &self.related_fields_to_update)
            .finish()
    }
}
