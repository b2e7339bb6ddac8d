// Application modules: entities, resources and routes per feature area.

pub mod account;
pub mod password;

use axum::Router;

use crate::api::AppState;
use crate::database::entity::{EntityError, EntityMeta};

/// Every registered entity, parents before children.
pub fn entities() -> Vec<&'static EntityMeta> {
    vec![
        &*account::USER,
        &*account::USER_AUTH,
        &*password::QUESTION,
        &*password::PASSWORD,
        &*password::PASSWORD_QUESTION,
    ]
}

/// Startup check of every entity declaration.
pub fn validate_entities() -> Result<(), EntityError> {
    entities().into_iter().try_for_each(EntityMeta::validate)
}

/// Routes of every app, relative to the `/api` prefix.
pub fn routes(state: &AppState) -> Router {
    Router::new()
        .merge(account::routes(state))
        .merge(password::routes(state))
}
