use async_trait::async_trait;

use crate::error::{ApiError, ErrorType};
use crate::middleware::Reply;
use crate::services::RequestContext;
use crate::types::Method;

/// Verb handlers of one route.
///
/// A controller lists the verbs it serves in `methods` and overrides the
/// matching `handle_*`; every other verb answers 405.
#[async_trait]
pub trait Controller: Send + Sync {
    fn methods(&self) -> &'static [Method];

    async fn handle_get(&self, ctx: RequestContext) -> Result<Reply, ApiError> {
        Ok(method_not_allowed(ctx.method))
    }

    async fn handle_post(&self, ctx: RequestContext) -> Result<Reply, ApiError> {
        Ok(method_not_allowed(ctx.method))
    }

    async fn handle_put(&self, ctx: RequestContext) -> Result<Reply, ApiError> {
        Ok(method_not_allowed(ctx.method))
    }

    async fn handle_delete(&self, ctx: RequestContext) -> Result<Reply, ApiError> {
        Ok(method_not_allowed(ctx.method))
    }
}

/// Invalid-Method reply carrying the requested verb.
pub fn method_not_allowed(method: impl AsRef<str>) -> Reply {
    Reply::failure(ErrorType::InvalidMethod(method.as_ref()))
}

/// Route the request to the controller's handler for its verb.
pub async fn dispatch(controller: &dyn Controller, ctx: RequestContext) -> Result<Reply, ApiError> {
    if !controller.methods().contains(&ctx.method) {
        return Ok(method_not_allowed(ctx.method));
    }
    match ctx.method {
        Method::Get => controller.handle_get(ctx).await,
        Method::Post => controller.handle_post(ctx).await,
        Method::Put => controller.handle_put(ctx).await,
        Method::Delete => controller.handle_delete(ctx).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use serde_json::json;

    struct ReadOnly;

    #[async_trait]
    impl Controller for ReadOnly {
        fn methods(&self) -> &'static [Method] {
            &[Method::Get]
        }

        async fn handle_get(&self, _ctx: RequestContext) -> Result<Reply, ApiError> {
            Ok(Reply::ok(json!({"ok": true})))
        }
    }

    #[tokio::test]
    async fn dispatches_declared_verbs() {
        let reply = dispatch(&ReadOnly, RequestContext::new(Method::Get)).await.unwrap();
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.body, json!({"ok": true}));
    }

    #[tokio::test]
    async fn undeclared_verbs_are_method_not_allowed() {
        let reply = dispatch(&ReadOnly, RequestContext::new(Method::Delete)).await.unwrap();
        assert_eq!(reply.status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(
            reply.body,
            json!([{"code": 11, "message": "METHOD_NOT_ALLOWED", "field": "DELETE", "context": null}])
        );
    }
}
