use serde_json::Value;
use std::collections::HashMap;

use crate::auth::AuthUser;
use crate::types::Method;

/// A parsed request as seen by guards, controllers and the CRUD engine.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub method: Method,
    /// Path captures of the matched route (`id`, `password_id`, ...)
    pub captures: HashMap<String, String>,
    pub query: HashMap<String, String>,
    pub body: Option<Value>,
    pub client_ip: Option<String>,
    /// Raw `Authorization` header
    pub authorization: Option<String>,
    pub user: Option<AuthUser>,
    /// Set once the session lookup has run, whatever its outcome
    pub session_resolved: bool,
}

static NULL: Value = Value::Null;

impl RequestContext {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            captures: HashMap::new(),
            query: HashMap::new(),
            body: None,
            client_ip: None,
            authorization: None,
            user: None,
            session_resolved: false,
        }
    }

    pub fn with_capture(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.captures.insert(name.into(), value.into());
        self
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_client_ip(mut self, ip: impl Into<String>) -> Self {
        self.client_ip = Some(ip.into());
        self
    }

    pub fn with_authorization(mut self, header: impl Into<String>) -> Self {
        self.authorization = Some(header.into());
        self
    }

    /// Attach an already resolved user.
    pub fn with_user(mut self, user: AuthUser) -> Self {
        self.user = Some(user);
        self.session_resolved = true;
        self
    }

    /// The JSON body, or null when the request had none.
    pub fn payload(&self) -> &Value {
        self.body.as_ref().unwrap_or(&NULL)
    }

    pub fn user_id(&self) -> Option<i64> {
        self.user.as_ref().map(|u| u.id)
    }
}
