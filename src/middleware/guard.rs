use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use super::Reply;
use crate::auth::Authenticator;
use crate::database::entity::CREATED_BY;
use crate::error::{ApiError, ErrorType};
use crate::services::{CrudEngine, RequestContext, Resource};

/// Outcome of one pipeline stage.
#[derive(Debug)]
pub enum Stage {
    /// Hand the (possibly enriched) request to the next stage
    Continue(RequestContext),
    /// Stop here and send this reply
    Respond(Reply),
}

/// A request pipeline stage run before the controller.
#[async_trait]
pub trait Guard: Send + Sync {
    async fn check(&self, ctx: RequestContext) -> Result<Stage, ApiError>;
}

/// Rejects anonymous requests with 401.
pub struct RequireLogin {
    auth: Authenticator,
}

impl RequireLogin {
    pub fn new(auth: Authenticator) -> Self {
        Self { auth }
    }
}

#[async_trait]
impl Guard for RequireLogin {
    async fn check(&self, mut ctx: RequestContext) -> Result<Stage, ApiError> {
        match self.auth.authenticate(&mut ctx).await? {
            Some(_) => Ok(Stage::Continue(ctx)),
            None => {
                debug!("Login required for {} request", ctx.method);
                Ok(Stage::Respond(Reply::failure(ErrorType::Unauthorized)))
            }
        }
    }
}

/// Login plus ownership of the target row.
///
/// Users on the allow-list pass unconditionally. Everyone else must own the
/// row the target resource selects for this request: 404 when no single row
/// matches, 403 when its owner column holds another user.
pub struct RequireOwnership {
    auth: Authenticator,
    engine: CrudEngine,
    target: Arc<Resource>,
    owner_field: &'static str,
    allowed_user_ids: Vec<i64>,
}

impl RequireOwnership {
    pub fn new(auth: Authenticator, engine: CrudEngine, target: Resource) -> Self {
        let owner_field = target.entity.owner_column.unwrap_or(CREATED_BY);
        Self {
            auth,
            engine,
            target: Arc::new(target),
            owner_field,
            allowed_user_ids: Vec::new(),
        }
    }

    pub fn allow_users(mut self, ids: &[i64]) -> Self {
        self.allowed_user_ids.extend_from_slice(ids);
        self
    }
}

#[async_trait]
impl Guard for RequireOwnership {
    async fn check(&self, mut ctx: RequestContext) -> Result<Stage, ApiError> {
        let Some(user) = self.auth.authenticate(&mut ctx).await? else {
            return Ok(Stage::Respond(Reply::failure(ErrorType::Unauthorized)));
        };
        if self.allowed_user_ids.contains(&user.id) {
            return Ok(Stage::Continue(ctx));
        }

        let Some(target) = self.engine.fetch_item(&self.target, &ctx).await? else {
            return Ok(Stage::Respond(Reply::failure(ErrorType::DataNotFound)));
        };
        if target.get_i64(self.owner_field) == Some(user.id) {
            Ok(Stage::Continue(ctx))
        } else {
            debug!(
                "User {} does not own {} {:?}",
                user.id,
                self.target.entity.name,
                target.get(self.target.entity.primary_key)
            );
            Ok(Stage::Respond(Reply::failure(ErrorType::Forbidden)))
        }
    }
}
