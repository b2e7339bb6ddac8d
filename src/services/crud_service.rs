use axum::http::StatusCode;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::cascade::cascade_related;
use super::{HookError, OperationResult, RequestContext, Resource};
use crate::database::entity::{CREATED_BY, CREATED_FROM, UPDATED_BY};
use crate::database::record::Record;
use crate::database::storage::{AttributeError, Storage, StorageError, StorageSession};
use crate::error::{generate_error, ApiError, ErrorType, FieldErrors};
use crate::filter::FilterSet;

/// CRUD Engine: list, view, create, update and delete for any declared
/// resource.
///
/// Domain failures come back as `OperationResult::Failure`; only
/// infrastructure faults surface as `ApiError`. Every write path rolls back
/// before returning a failure, so a failed cascade never leaves related rows
/// behind.
#[derive(Clone)]
pub struct CrudEngine {
    storage: Arc<dyn Storage>,
}

impl CrudEngine {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    fn filters(&self, resource: &Resource, ctx: &RequestContext) -> Option<FilterSet> {
        match resource.filter.compose(resource.entity, ctx) {
            Ok(filters) => Some(filters),
            Err(err) => {
                debug!("Filter composition for {} failed: {}", resource.entity.name, err);
                None
            }
        }
    }

    // ========================================
    // Reads
    // ========================================

    pub async fn list(&self, resource: &Resource, ctx: &RequestContext) -> Result<OperationResult, ApiError> {
        let Some(filters) = self.filters(resource, ctx) else {
            return Ok(OperationResult::failure(ErrorType::DataNotFound));
        };

        let mut session = self.storage.begin().await?;
        let records = session.fetch_many(resource.entity, &filters).await;
        session.rollback().await?;

        Ok(OperationResult::ok(resource.schema.dump_many(&records?)))
    }

    pub async fn view(&self, resource: &Resource, ctx: &RequestContext) -> Result<OperationResult, ApiError> {
        match self.fetch_item(resource, ctx).await? {
            Some(record) => Ok(OperationResult::ok(resource.schema.dump(&record))),
            None => Ok(OperationResult::failure(ErrorType::DataNotFound)),
        }
    }

    /// The single row the resource's filters select, or `None` when zero or
    /// several rows match.
    pub async fn fetch_item(&self, resource: &Resource, ctx: &RequestContext) -> Result<Option<Record>, ApiError> {
        let Some(filters) = self.filters(resource, ctx) else {
            return Ok(None);
        };

        let mut session = self.storage.begin().await?;
        let fetched = session.fetch_one(resource.entity, &filters).await;
        session.rollback().await?;

        match fetched {
            Ok(record) => Ok(Some(record)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    // ========================================
    // Writes
    // ========================================

    pub async fn create(&self, resource: &Resource, ctx: &RequestContext) -> Result<OperationResult, ApiError> {
        let entity = resource.entity;
        let mut record = match resource.schema.load(ctx.payload(), None) {
            Ok(record) => record,
            Err(errors) => return Ok(OperationResult::failure(ErrorType::SchemaError(&errors))),
        };

        if let Some(ip) = ctx.client_ip.as_deref() {
            if entity.has_column(CREATED_FROM) {
                record.set(CREATED_FROM, ip);
            }
        }
        if resource.save_creator && entity.has_column(CREATED_BY) {
            if let Some(user_id) = ctx.user_id() {
                record.set_if_empty(CREATED_BY, user_id);
            }
        }
        for (field, value) in resource.hooks.insert_defaults(ctx) {
            record.set(field, value);
        }

        let mut session = self.storage.begin().await?;
        if let Err(err) = self.write_create(resource, ctx, session.as_mut(), &mut record).await {
            session.rollback().await?;
            return write_failure(err);
        }

        info!("Created {} {:?}", entity.name, record.get(entity.primary_key));
        resource.hooks.post_create(ctx, &record).await;
        Ok(OperationResult::created(resource.schema.dump(&record)))
    }

    async fn write_create(
        &self,
        resource: &Resource,
        ctx: &RequestContext,
        session: &mut dyn StorageSession,
        record: &mut Record,
    ) -> Result<(), HookError> {
        resource.hooks.pre_create(ctx, record).await?;
        cascade_related(
            session,
            resource.entity,
            record,
            &resource.related_fields_to_create,
            ctx.client_ip.as_deref(),
        )
        .await?;
        session.persist(resource.entity, record, false).await?;
        if resource.hooks.flushes_before_commit() {
            session.flush().await?;
            resource.hooks.pre_create_commit(ctx, session, record).await?;
        }
        session.commit().await?;
        Ok(())
    }

    pub async fn update(&self, resource: &Resource, ctx: &RequestContext) -> Result<OperationResult, ApiError> {
        let Some(filters) = self.filters(resource, ctx) else {
            return Ok(OperationResult::failure(ErrorType::DataNotFound));
        };

        let mut session = self.storage.begin().await?;
        let existing = match session.fetch_one(resource.entity, &filters).await {
            Ok(record) => record,
            Err(err) => {
                session.rollback().await?;
                return if err.is_not_found() {
                    Ok(OperationResult::failure(ErrorType::DataNotFound))
                } else {
                    Err(err.into())
                };
            }
        };

        match self.write_update(resource, ctx, session.as_mut(), existing).await {
            Ok(Ok(record)) => {
                debug!("Updated {} {:?}", resource.entity.name, record.get(resource.entity.primary_key));
                resource.hooks.post_update(ctx, &record).await;
                Ok(OperationResult::ok(resource.schema.dump(&record)))
            }
            Ok(Err(errors)) => {
                session.rollback().await?;
                Ok(OperationResult::failure(ErrorType::SchemaError(&errors)))
            }
            Err(err) => {
                session.rollback().await?;
                write_failure(err)
            }
        }
    }

    /// The inner result carries schema failures of the merge.
    async fn write_update(
        &self,
        resource: &Resource,
        ctx: &RequestContext,
        session: &mut dyn StorageSession,
        mut existing: Record,
    ) -> Result<Result<Record, FieldErrors>, HookError> {
        let entity = resource.entity;
        let payload = ctx.payload();

        let parsed = resource.schema.load(payload, None);
        resource.hooks.pre_update(ctx, &mut existing, &parsed).await?;
        attach_existing_related(resource, session, &mut existing, payload).await?;

        let mut record = match resource.schema.load(payload, Some(existing)) {
            Ok(record) => record,
            Err(errors) => return Ok(Err(errors)),
        };

        if resource.save_creator && entity.has_column(UPDATED_BY) {
            if let Some(user_id) = ctx.user_id() {
                record.set_if_empty(UPDATED_BY, user_id);
            }
        }
        for (field, value) in resource.hooks.update_defaults(ctx) {
            record.set(field, value);
        }

        cascade_related(
            session,
            entity,
            &mut record,
            &resource.related_fields_to_update,
            ctx.client_ip.as_deref(),
        )
        .await?;
        session.persist(entity, &mut record, false).await?;
        session.commit().await?;
        Ok(Ok(record))
    }

    pub async fn delete(&self, resource: &Resource, ctx: &RequestContext) -> Result<OperationResult, ApiError> {
        let Some(filters) = self.filters(resource, ctx) else {
            return Ok(OperationResult::failure(ErrorType::DataNotFound));
        };

        let mut session = self.storage.begin().await?;
        let record = match session.fetch_one(resource.entity, &filters).await {
            Ok(record) => record,
            Err(err) => {
                session.rollback().await?;
                return if err.is_not_found() {
                    Ok(OperationResult::failure(ErrorType::DataNotFound))
                } else {
                    Err(err.into())
                };
            }
        };

        let written = match session.delete(resource.entity, &record).await {
            Ok(()) => session.commit().await,
            Err(err) => Err(err),
        };
        if let Err(err) = written {
            session.rollback().await?;
            return storage_failure(err);
        }

        info!("Deleted {} {:?}", resource.entity.name, record.get(resource.entity.primary_key));
        Ok(OperationResult::ok(resource.schema.dump(&record)))
    }
}

/// Load the stored related rows named in an update payload, so the schema
/// merges into them instead of creating fresh ones.
async fn attach_existing_related(
    resource: &Resource,
    session: &mut dyn StorageSession,
    existing: &mut Record,
    payload: &Value,
) -> Result<(), StorageError> {
    for &relation in &resource.related_fields_to_update {
        if !matches!(payload.get(relation), Some(Value::Object(_))) || existing.related(relation).is_some() {
            continue;
        }
        let Some(fk) = resource.entity.foreign_key_for(relation) else {
            continue;
        };
        let Some(key) = existing.get(fk.column).filter(|v| !v.is_null()).cloned() else {
            continue;
        };

        let filters = FilterSet::new().with(fk.target_column, key);
        match session.fetch_one(fk.target(), &filters).await {
            Ok(related) => {
                existing.attach_related(relation, related);
            }
            Err(err) if err.is_not_found() => {
                warn!("{}.{} points at a missing {} row", resource.entity.name, fk.column, fk.target().name);
            }
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

fn write_failure(err: HookError) -> Result<OperationResult, ApiError> {
    match err {
        HookError::Rejected(errors) => Ok(OperationResult::failure_with(StatusCode::BAD_REQUEST, errors)),
        HookError::Invalid(message) => {
            warn!("Write rejected by hook: {}", message);
            Ok(OperationResult::failure(ErrorType::DatabaseWriteFail(None)))
        }
        HookError::Storage(err) => storage_failure(err),
    }
}

fn storage_failure(err: StorageError) -> Result<OperationResult, ApiError> {
    match err {
        StorageError::Integrity(failure) => {
            debug!("Integrity violation: {:?}", failure);
            Ok(OperationResult::failure(ErrorType::DatabaseWriteFail(Some(&failure))))
        }
        StorageError::Attribute(AttributeError::Structured(errors)) => {
            Ok(OperationResult::failure_with(StatusCode::BAD_REQUEST, errors))
        }
        StorageError::Attribute(AttributeError::Message(message)) => {
            debug!("Attribute failure: {}", message);
            Ok(OperationResult::failure(ErrorType::DatabaseWriteFail(None)))
        }
        err if err.is_not_found() => Ok(OperationResult::failure_with(
            StatusCode::BAD_REQUEST,
            generate_error(ErrorType::DataNotFound, None),
        )),
        err => Err(err.into()),
    }
}
