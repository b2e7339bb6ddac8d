use std::sync::Arc;
use tracing::debug;

use super::controller::{dispatch, method_not_allowed};
use super::Controller;
use crate::error::ApiError;
use crate::middleware::{Guard, Reply, Stage};
use crate::services::RequestContext;
use crate::types::Method;

/// A controller behind an ordered guard pipeline.
///
/// Guards run in registration order for the verbs they were registered on;
/// the first one that responds ends the request. Verbs the controller does
/// not serve answer 405 before any guard runs.
#[derive(Clone)]
pub struct Endpoint {
    controller: Arc<dyn Controller>,
    guards: Vec<(Vec<Method>, Arc<dyn Guard>)>,
}

impl Endpoint {
    pub fn new(controller: impl Controller + 'static) -> Self {
        Self {
            controller: Arc::new(controller),
            guards: Vec::new(),
        }
    }

    /// Guard every verb the controller serves.
    pub fn guard(self, guard: impl Guard + 'static) -> Self {
        let methods = self.controller.methods();
        self.guard_on(methods, guard)
    }

    /// Guard only the given verbs.
    pub fn guard_on(mut self, methods: &[Method], guard: impl Guard + 'static) -> Self {
        self.guards.push((methods.to_vec(), Arc::new(guard)));
        self
    }

    pub async fn serve(&self, mut ctx: RequestContext) -> Result<Reply, ApiError> {
        if !self.controller.methods().contains(&ctx.method) {
            return Ok(method_not_allowed(ctx.method));
        }
        for (methods, guard) in &self.guards {
            if !methods.contains(&ctx.method) {
                continue;
            }
            match guard.check(ctx).await? {
                Stage::Continue(next) => ctx = next,
                Stage::Respond(reply) => {
                    debug!("Guard answered {}", reply.status);
                    return Ok(reply);
                }
            }
        }
        dispatch(self.controller.as_ref(), ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorType;
    use async_trait::async_trait;
    use axum::http::StatusCode;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl Controller for Echo {
        fn methods(&self) -> &'static [Method] {
            &[Method::Get, Method::Delete]
        }

        async fn handle_get(&self, ctx: RequestContext) -> Result<Reply, ApiError> {
            Ok(Reply::ok(json!({"user": ctx.user_id()})))
        }

        async fn handle_delete(&self, _ctx: RequestContext) -> Result<Reply, ApiError> {
            Ok(Reply::ok(json!({"deleted": true})))
        }
    }

    struct Deny;

    #[async_trait]
    impl Guard for Deny {
        async fn check(&self, _ctx: RequestContext) -> Result<Stage, ApiError> {
            Ok(Stage::Respond(Reply::failure(ErrorType::Unauthorized)))
        }
    }

    struct Stamp;

    #[async_trait]
    impl Guard for Stamp {
        async fn check(&self, ctx: RequestContext) -> Result<Stage, ApiError> {
            Ok(Stage::Continue(ctx.with_user(crate::auth::AuthUser::new(7, None))))
        }
    }

    #[tokio::test]
    async fn guards_apply_only_to_their_verbs() {
        let endpoint = Endpoint::new(Echo).guard_on(&[Method::Delete], Deny);

        let open = endpoint.serve(RequestContext::new(Method::Get)).await.unwrap();
        assert_eq!(open.status, StatusCode::OK);

        let guarded = endpoint.serve(RequestContext::new(Method::Delete)).await.unwrap();
        assert_eq!(guarded.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn enriched_context_reaches_the_controller() {
        let endpoint = Endpoint::new(Echo).guard(Stamp);
        let reply = endpoint.serve(RequestContext::new(Method::Get)).await.unwrap();
        assert_eq!(reply.body, json!({"user": 7}));
    }

    #[tokio::test]
    async fn unsupported_verbs_skip_the_guards() {
        let endpoint = Endpoint::new(Echo).guard(Deny);
        let reply = endpoint.serve(RequestContext::new(Method::Put)).await.unwrap();
        assert_eq!(reply.status, StatusCode::METHOD_NOT_ALLOWED);
    }
}
