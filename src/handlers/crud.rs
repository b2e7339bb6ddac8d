use async_trait::async_trait;
use std::sync::Arc;

use super::Controller;
use crate::error::ApiError;
use crate::middleware::Reply;
use crate::services::{CrudEngine, RequestContext, Resource};
use crate::types::Method;

/// GET lists, POST creates.
pub struct CollectionController {
    engine: CrudEngine,
    resource: Arc<Resource>,
}

impl CollectionController {
    pub fn new(engine: CrudEngine, resource: Resource) -> Self {
        Self {
            engine,
            resource: Arc::new(resource),
        }
    }
}

#[async_trait]
impl Controller for CollectionController {
    fn methods(&self) -> &'static [Method] {
        &[Method::Get, Method::Post]
    }

    async fn handle_get(&self, ctx: RequestContext) -> Result<Reply, ApiError> {
        Ok(self.engine.list(&self.resource, &ctx).await?.into())
    }

    async fn handle_post(&self, ctx: RequestContext) -> Result<Reply, ApiError> {
        Ok(self.engine.create(&self.resource, &ctx).await?.into())
    }
}

/// GET views, PUT updates, DELETE deletes one row.
pub struct ItemController {
    engine: CrudEngine,
    resource: Arc<Resource>,
}

impl ItemController {
    pub fn new(engine: CrudEngine, resource: Resource) -> Self {
        Self {
            engine,
            resource: Arc::new(resource),
        }
    }
}

#[async_trait]
impl Controller for ItemController {
    fn methods(&self) -> &'static [Method] {
        &[Method::Get, Method::Put, Method::Delete]
    }

    async fn handle_get(&self, ctx: RequestContext) -> Result<Reply, ApiError> {
        Ok(self.engine.view(&self.resource, &ctx).await?.into())
    }

    async fn handle_put(&self, ctx: RequestContext) -> Result<Reply, ApiError> {
        Ok(self.engine.update(&self.resource, &ctx).await?.into())
    }

    async fn handle_delete(&self, ctx: RequestContext) -> Result<Reply, ApiError> {
        Ok(self.engine.delete(&self.resource, &ctx).await?.into())
    }
}
