pub mod controllers;
pub mod models;

pub use controllers::{credential_hash, register_resource, LoginController, SessionController};
pub use models::{USER, USER_AUTH};

use async_trait::async_trait;
use axum::Router;

use crate::api::{mount, AppState};
use crate::error::ApiError;
use crate::handlers::{CollectionController, Controller, Endpoint};
use crate::middleware::{Reply, RequireLogin};
use crate::services::RequestContext;
use crate::types::Method;

pub fn routes(state: &AppState) -> Router {
    let secret_key = &state.config.security.secret_key;

    let register = Endpoint::new(RegisterController(CollectionController::new(
        state.engine.clone(),
        register_resource(secret_key),
    )));
    let login = Endpoint::new(LoginController::new(state.engine.clone(), state.auth.clone(), secret_key.as_str()));
    let session = Endpoint::new(SessionController::new(state.auth.clone())).guard(RequireLogin::new(state.auth.clone()));

    Router::new()
        .route("/auth/register", mount(register))
        .route("/auth/login", mount(login))
        .route("/auth/session", mount(session))
}

/// Registration only creates; listing credentials is not exposed.
struct RegisterController(CollectionController);

#[async_trait]
impl Controller for RegisterController {
    fn methods(&self) -> &'static [Method] {
        &[Method::Post]
    }

    async fn handle_post(&self, ctx: RequestContext) -> Result<Reply, ApiError> {
        self.0.handle_post(ctx).await
    }
}
