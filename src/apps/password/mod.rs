pub mod controllers;
pub mod fixtures;
pub mod models;

pub use fixtures::load_fixtures;
pub use models::{PASSWORD, PASSWORD_QUESTION, QUESTION};

use axum::Router;

use crate::api::{mount, AppState};
use crate::handlers::{CollectionController, Endpoint, ItemController};
use crate::middleware::{RequireLogin, RequireOwnership};
use crate::types::Method;

pub fn routes(state: &AppState) -> Router {
    let engine = &state.engine;
    let auth = &state.auth;

    let questions = Endpoint::new(CollectionController::new(engine.clone(), controllers::question_list()));
    let question = Endpoint::new(ItemController::new(engine.clone(), controllers::question_item()))
        .guard_on(&[Method::Put, Method::Delete], RequireLogin::new(auth.clone()));

    let passwords = Endpoint::new(CollectionController::new(engine.clone(), controllers::password_list()))
        .guard(RequireLogin::new(auth.clone()));
    let password = Endpoint::new(ItemController::new(engine.clone(), controllers::password_item("id"))).guard(
        RequireOwnership::new(auth.clone(), engine.clone(), controllers::password_item("id")),
    );
    let password_questions = Endpoint::new(CollectionController::new(
        engine.clone(),
        controllers::password_question_list(),
    ))
    .guard(RequireOwnership::new(
        auth.clone(),
        engine.clone(),
        controllers::password_item("password_id"),
    ));
    let generate = Endpoint::new(controllers::GenerateController::new(
        engine.clone(),
        state.config.security.secret_key.as_str(),
    ))
    .guard(RequireOwnership::new(
        auth.clone(),
        engine.clone(),
        controllers::password_item("password_id"),
    ));

    Router::new()
        .route("/questions", mount(questions))
        .route("/questions/:id", mount(question))
        .route("/passwords", mount(passwords))
        .route("/passwords/:id", mount(password))
        .route("/passwords/:password_id/questions", mount(password_questions))
        .route("/passwords/:password_id/generate", mount(generate))
}
