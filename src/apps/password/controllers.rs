use async_trait::async_trait;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use super::models::{
    ANSWER_ITEM_SCHEMA, GENERATED_PASSWORD_SCHEMA, PASSWORD, PASSWORD_QUESTION, PASSWORD_QUESTION_SCHEMA,
    PASSWORD_SCHEMA, QUESTION, QUESTION_SCHEMA,
};
use crate::database::record::Record;
use crate::error::{ApiError, ErrorCode, ErrorType, FieldErrors};
use crate::filter::{FilterSet, QueryFilter};
use crate::handlers::Controller;
use crate::middleware::Reply;
use crate::schema::Schema;
use crate::services::{CrudEngine, RequestContext, Resource, ResourceHooks};
use crate::types::Method;

const GENERATED_LENGTH: usize = 20;
const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz23456789!#$%&*+-=?@^_";

pub fn question_list() -> Resource {
    Resource::new(&QUESTION, &*QUESTION_SCHEMA)
        .filter(QueryFilter::new().allow("data_type", "data_type").allow("related_id", "related_id"))
        .without_creator()
        .cascade_on_create(&["related"])
}

pub fn question_item() -> Resource {
    Resource::new(&QUESTION, &*QUESTION_SCHEMA)
        .filter(QueryFilter::new().url_part("id", "id"))
        .without_creator()
        .cascade_on_update(&["related"])
}

/// The caller's own passwords.
pub fn password_list() -> Resource {
    Resource::new(&PASSWORD, &*PASSWORD_SCHEMA).filter(QueryFilter::new().by_creator())
}

/// One password by id. Not scoped to the creator so ownership guards can
/// tell a foreign row from a missing one.
pub fn password_item(capture: &'static str) -> Resource {
    Resource::new(&PASSWORD, &*PASSWORD_SCHEMA).filter(QueryFilter::new().url_part(capture, "id"))
}

pub fn password_question_list() -> Resource {
    Resource::new(&PASSWORD_QUESTION, &*PASSWORD_QUESTION_SCHEMA)
        .filter(QueryFilter::new().url_part("password_id", "password_id"))
        .without_creator()
        .cascade_on_create(&["question"])
        .hooks(AttachToPassword)
}

/// Binds a new password question to the password in the URL.
pub struct AttachToPassword;

impl ResourceHooks for AttachToPassword {
    fn insert_defaults(&self, ctx: &RequestContext) -> Map<String, Value> {
        let mut defaults = Map::new();
        if let Some(id) = ctx.captures.get("password_id").and_then(|raw| raw.parse::<i64>().ok()) {
            defaults.insert("password_id".to_string(), Value::from(id));
        }
        defaults
    }
}

/// POST /api/passwords/<password_id>/generate derives the password from the
/// caller's answers to every question chosen for it. Neither the answers nor
/// the result are stored.
pub struct GenerateController {
    engine: CrudEngine,
    secret_key: String,
}

impl GenerateController {
    pub fn new(engine: CrudEngine, secret_key: impl Into<String>) -> Self {
        Self {
            engine,
            secret_key: secret_key.into(),
        }
    }

    async fn chosen_questions(&self, password_id: i64) -> Result<BTreeSet<i64>, ApiError> {
        let mut session = self.engine.storage().begin().await?;
        let chosen = session
            .fetch_many(&PASSWORD_QUESTION, &FilterSet::new().with("password_id", password_id))
            .await;
        session.rollback().await?;
        Ok(chosen?.iter().filter_map(|row| row.get_i64("question_id")).collect())
    }
}

#[async_trait]
impl Controller for GenerateController {
    fn methods(&self) -> &'static [Method] {
        &[Method::Post]
    }

    async fn handle_post(&self, ctx: RequestContext) -> Result<Reply, ApiError> {
        let Some(password_id) = ctx.captures.get("password_id").and_then(|raw| raw.parse::<i64>().ok()) else {
            return Ok(Reply::failure(ErrorType::DataNotFound));
        };
        let answers = match load_answers(ctx.payload()) {
            Ok(answers) => answers,
            Err(errors) => return Ok(Reply::failure(ErrorType::SchemaError(&errors))),
        };

        let chosen = self.chosen_questions(password_id).await?;
        if chosen.is_empty() || !chosen.iter().eq(answers.keys()) {
            let mut errors = FieldErrors::new();
            errors.add("answers", ErrorCode::InvalidValue);
            return Ok(Reply::failure(ErrorType::SchemaError(&errors)));
        }

        let mut generated = Record::new();
        generated.set("password", derive_password(&self.secret_key, password_id, &answers));
        debug!("Generated password {} from {} answers", password_id, answers.len());
        Ok(Reply::ok(GENERATED_PASSWORD_SCHEMA.dump(&generated)))
    }
}

/// Trimmed answers keyed by question id. Item failures nest under their
/// index in `answers`.
fn load_answers(payload: &Value) -> Result<BTreeMap<i64, String>, FieldErrors> {
    let mut errors = FieldErrors::new();
    let items = match payload.get("answers") {
        Some(Value::Array(items)) => items,
        None | Some(Value::Null) => {
            errors.add("answers", ErrorCode::MissingRequiredField);
            return Err(errors);
        }
        Some(_) => {
            errors.add("answers", ErrorCode::InvalidInputType);
            return Err(errors);
        }
    };

    let mut answers = BTreeMap::new();
    let mut nested = FieldErrors::new();
    for (index, item) in items.iter().enumerate() {
        match ANSWER_ITEM_SCHEMA.load(item, None) {
            Ok(record) => {
                let question_id = record.get_i64("question_id").unwrap_or_default();
                let answer = record.get("answer").and_then(Value::as_str).unwrap_or_default();
                if answers.insert(question_id, answer.trim().to_string()).is_some() {
                    let mut duplicate = FieldErrors::new();
                    duplicate.add("question_id", ErrorCode::InvalidValue);
                    nested.nest(index.to_string(), duplicate);
                }
            }
            Err(item_errors) => {
                nested.nest(index.to_string(), item_errors);
            }
        }
    }

    if !nested.is_empty() {
        errors.nest("answers", nested);
        return Err(errors);
    }
    Ok(answers)
}

/// Keyed SHA-256 over the password id and the answers in question order,
/// mapped onto a printable alphabet.
pub fn derive_password(secret_key: &str, password_id: i64, answers: &BTreeMap<i64, String>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret_key.as_bytes());
    hasher.update(password_id.to_be_bytes());
    for (question_id, answer) in answers {
        hasher.update(question_id.to_be_bytes());
        hasher.update((answer.len() as u64).to_be_bytes());
        hasher.update(answer.as_bytes());
    }
    hasher
        .finalize()
        .iter()
        .take(GENERATED_LENGTH)
        .map(|byte| ALPHABET[*byte as usize % ALPHABET.len()] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apps::account::USER;
    use crate::auth::AuthUser;
    use crate::database::memory::MemoryStorage;
    use crate::services::CrudEngine;
    use crate::types::Method;
    use axum::http::StatusCode;
    use serde_json::json;
    use std::sync::Arc;

    fn engine() -> (Arc<MemoryStorage>, CrudEngine) {
        let storage = Arc::new(MemoryStorage::new([&*USER, &*QUESTION, &*PASSWORD, &*PASSWORD_QUESTION]));
        (storage.clone(), CrudEngine::new(storage))
    }

    fn post(body: Value) -> RequestContext {
        RequestContext::new(Method::Post).with_body(body).with_client_ip("127.0.0.1")
    }

    #[tokio::test]
    async fn question_is_created_with_its_parent() {
        let (storage, engine) = engine();
        let result = engine
            .create(
                &question_list(),
                &post(json!({
                    "text": "Place of marriage",
                    "password_text": "Where did you get married?",
                    "data_type": "place",
                    "related": {"text": "Married", "password_text": "Marital details", "data_type": "category"}
                })),
            )
            .await
            .unwrap();

        assert_eq!(result.status(), StatusCode::CREATED);
        let rows = storage.rows(&QUESTION).await;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1]["related_id"], rows[0]["id"]);
    }

    #[tokio::test]
    async fn password_question_is_bound_to_the_url_password() {
        let (storage, engine) = engine();
        let user = engine
            .create(
                &Resource::new(&USER, &*crate::apps::account::models::USER_SCHEMA).without_creator(),
                &post(json!({"username": "alice"})),
            )
            .await
            .unwrap();
        let user_id = user.into_body()["id"].as_i64().unwrap();

        let owner = RequestContext::new(Method::Post)
            .with_body(json!({"name": "bank"}))
            .with_client_ip("127.0.0.1")
            .with_user(AuthUser::new(user_id, Some("alice".into())));
        let password = engine.create(&password_list(), &owner).await.unwrap().into_body();
        assert_eq!(password["created_by_id"], json!(user_id));

        let ctx = post(json!({"question": {"text": "Pet", "password_text": "Pet name?", "data_type": "string"}}))
            .with_capture("password_id", password["id"].as_i64().unwrap().to_string());
        let result = engine.create(&password_question_list(), &ctx).await.unwrap();
        assert_eq!(result.status(), StatusCode::CREATED);

        let rows = storage.rows(&PASSWORD_QUESTION).await;
        assert_eq!(rows[0]["password_id"], password["id"]);
        assert_eq!(rows[0]["question_id"], json!(1));

        let listed = engine
            .list(&password_question_list(), &RequestContext::new(Method::Get).with_capture("password_id", "1"))
            .await
            .unwrap()
            .into_body();
        assert_eq!(listed.as_array().map(Vec::len), Some(1));
    }

    /// A password owned by a fresh user, with the given questions chosen.
    async fn password_with_questions(engine: &CrudEngine, questions: &[&str]) -> i64 {
        engine
            .create(
                &Resource::new(&USER, &*crate::apps::account::models::USER_SCHEMA).without_creator(),
                &post(json!({"username": "alice"})),
            )
            .await
            .unwrap();
        let owner = post(json!({"name": "bank"})).with_user(AuthUser::new(1, Some("alice".into())));
        let password_id = engine.create(&password_list(), &owner).await.unwrap().into_body()["id"]
            .as_i64()
            .unwrap();

        for text in questions {
            let ctx = post(json!({"question": {"text": text, "password_text": "?", "data_type": "string"}}))
                .with_capture("password_id", password_id.to_string());
            engine.create(&password_question_list(), &ctx).await.unwrap();
        }
        password_id
    }

    fn answers(password_id: i64, body: Value) -> RequestContext {
        post(body).with_capture("password_id", password_id.to_string())
    }

    #[tokio::test]
    async fn generation_is_deterministic_per_answer_set() {
        let (_, engine) = engine();
        let password_id = password_with_questions(&engine, &["Pet", "City"]).await;
        let controller = GenerateController::new(engine, "k");

        let body = json!({"answers": [{"question_id": 2, "answer": "Paris"}, {"question_id": 1, "answer": " Rex "}]});
        let first = controller.handle_post(answers(password_id, body)).await.unwrap();
        assert_eq!(first.status, StatusCode::OK);
        let password = first.body["password"].as_str().unwrap().to_string();
        assert_eq!(password.chars().count(), 20);

        let reordered = json!({"answers": [{"question_id": 1, "answer": "Rex"}, {"question_id": 2, "answer": "Paris"}]});
        let again = controller.handle_post(answers(password_id, reordered)).await.unwrap();
        assert_eq!(again.body["password"], json!(password));

        let changed = json!({"answers": [{"question_id": 1, "answer": "Max"}, {"question_id": 2, "answer": "Paris"}]});
        let other = controller.handle_post(answers(password_id, changed)).await.unwrap();
        assert_ne!(other.body["password"], json!(password));
    }

    #[tokio::test]
    async fn generation_needs_an_answer_for_every_chosen_question() {
        let (_, engine) = engine();
        let password_id = password_with_questions(&engine, &["Pet", "City"]).await;
        let controller = GenerateController::new(engine, "k");

        let partial = json!({"answers": [{"question_id": 1, "answer": "Rex"}]});
        let reply = controller.handle_post(answers(password_id, partial)).await.unwrap();
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
        assert_eq!(reply.body[0]["field"], json!("answers"));
        assert_eq!(reply.body[0]["code"], json!(16));

        let missing = controller.handle_post(answers(password_id, json!({}))).await.unwrap();
        assert_eq!(missing.body[0]["code"], json!(13));
    }

    #[test]
    fn answer_items_report_errors_by_index() {
        let errors = load_answers(&json!({"answers": [
            {"question_id": 1, "answer": "Rex"},
            {"question_id": 1, "answer": "Max"},
            {"answer": "Paris"}
        ]}))
        .unwrap_err();
        match errors.get("answers") {
            Some(crate::error::FieldError::Nested(items)) => {
                assert!(items.get("0").is_none());
                assert!(items.get("1").is_some());
                assert!(items.get("2").is_some());
            }
            other => panic!("expected nested errors, got {:?}", other),
        }
    }
}
