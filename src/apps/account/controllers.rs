use async_trait::async_trait;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use super::models::{LOGIN_SCHEMA, USER, USER_AUTH, USER_AUTH_SCHEMA, USER_SCHEMA};
use crate::auth::{AuthUser, Authenticator};
use crate::database::entity::CREATED_BY;
use crate::database::record::Record;
use crate::error::{ApiError, ErrorCode, ErrorType};
use crate::filter::FilterSet;
use crate::handlers::Controller;
use crate::middleware::Reply;
use crate::schema::Schema;
use crate::services::{CrudEngine, HookError, RequestContext, Resource, ResourceHooks};
use crate::types::Method;

/// Stored form of a password: hex SHA-256 of `secret:password`.
pub fn credential_hash(secret_key: &str, password: &str) -> String {
    format!("{:x}", Sha256::digest(format!("{}:{}", secret_key, password).as_bytes()))
}

/// Replaces the plain password in `token` with its digest before insert.
pub struct HashCredential {
    secret_key: String,
}

impl HashCredential {
    pub fn new(secret_key: impl Into<String>) -> Self {
        Self {
            secret_key: secret_key.into(),
        }
    }
}

#[async_trait]
impl ResourceHooks for HashCredential {
    async fn pre_create(&self, _ctx: &RequestContext, record: &mut Record) -> Result<(), HookError> {
        let Some(password) = record.get("token").and_then(Value::as_str).map(str::to_string) else {
            return Err(HookError::Invalid("credential token missing".to_string()));
        };
        record.set("token", credential_hash(&self.secret_key, &password));
        Ok(())
    }
}

/// POST /api/auth/register: a credential with its user cascaded in front.
pub fn register_resource(secret_key: &str) -> Resource {
    Resource::new(&USER_AUTH, &*USER_AUTH_SCHEMA)
        .without_creator()
        .cascade_on_create(&["created_by"])
        .hooks(HashCredential::new(secret_key))
}

/// POST /api/auth/login
pub struct LoginController {
    engine: CrudEngine,
    auth: Authenticator,
    secret_key: String,
}

impl LoginController {
    pub fn new(engine: CrudEngine, auth: Authenticator, secret_key: impl Into<String>) -> Self {
        Self {
            engine,
            auth,
            secret_key: secret_key.into(),
        }
    }

    /// The user whose `EMAIL` credential matches, if any.
    async fn verify(&self, username: &str, password: &str) -> Result<Option<Record>, ApiError> {
        let mut session = self.engine.storage().begin().await?;
        let user = session
            .fetch_one(&USER, &FilterSet::new().with("username", username))
            .await;
        let user = match user {
            Ok(user) => user,
            Err(err) => {
                session.rollback().await?;
                return if err.is_not_found() { Ok(None) } else { Err(err.into()) };
            }
        };

        let Some(user_id) = user.get_i64("id") else {
            session.rollback().await?;
            return Ok(None);
        };
        let credentials = session
            .fetch_many(
                &USER_AUTH,
                &FilterSet::new().with(CREATED_BY, user_id).with("auth_type", "EMAIL"),
            )
            .await;
        session.rollback().await?;

        let digest = credential_hash(&self.secret_key, password);
        let matched = credentials?
            .iter()
            .any(|credential| credential.get("token").and_then(Value::as_str) == Some(digest.as_str()));
        Ok(matched.then_some(user))
    }
}

#[async_trait]
impl Controller for LoginController {
    fn methods(&self) -> &'static [Method] {
        &[Method::Post]
    }

    async fn handle_post(&self, ctx: RequestContext) -> Result<Reply, ApiError> {
        let payload = match LOGIN_SCHEMA.load(ctx.payload(), None) {
            Ok(payload) => payload,
            Err(errors) => return Ok(Reply::failure(ErrorType::SchemaError(&errors))),
        };
        let username = payload.get("username").and_then(Value::as_str).unwrap_or_default();
        let password = payload.get("password").and_then(Value::as_str).unwrap_or_default();

        let Some(user) = self.verify(username, password).await? else {
            warn!("Rejected login for {:?}", username);
            return Ok(Reply::failure(ErrorType::Custom {
                code: ErrorCode::InvalidEmailPassword,
                field: None,
                context: None,
            }));
        };

        let identity = AuthUser::new(user.get_i64("id").unwrap_or_default(), Some(username.to_string()));
        let token = self.auth.issue_token(ctx.authorization.as_deref());
        let token = self.auth.login(&identity, &token).await?;
        info!("User {} logged in", identity.id);

        Ok(Reply::ok(json!({
            "token": token,
            "user": USER_SCHEMA.dump(&user),
        })))
    }
}

/// GET /api/auth/session answers who is logged in; DELETE logs out.
pub struct SessionController {
    auth: Authenticator,
}

impl SessionController {
    pub fn new(auth: Authenticator) -> Self {
        Self { auth }
    }
}

#[async_trait]
impl Controller for SessionController {
    fn methods(&self) -> &'static [Method] {
        &[Method::Get, Method::Delete]
    }

    async fn handle_get(&self, ctx: RequestContext) -> Result<Reply, ApiError> {
        Ok(Reply::ok(json!({ "user": ctx.user })))
    }

    async fn handle_delete(&self, ctx: RequestContext) -> Result<Reply, ApiError> {
        let ended = self.auth.logout(ctx.authorization.as_deref()).await?;
        if let Some(user_id) = ctx.user_id() {
            info!("User {} logged out", user_id);
        }
        Ok(Reply::ok(json!({ "logged_out": ended.is_some() })))
    }
}
