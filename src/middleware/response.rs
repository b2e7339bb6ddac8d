use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::Value;

use crate::error::{generate_error, ErrorType};
use crate::services::OperationResult;

/// Status code plus JSON body, the shape every handler produces.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: StatusCode,
    pub body: Value,
}

impl Reply {
    pub fn new(status: StatusCode, body: Value) -> Self {
        Self { status, body }
    }

    /// Create a 200 OK reply
    pub fn ok(body: Value) -> Self {
        Self::new(StatusCode::OK, body)
    }

    /// Error list for a single taxonomy kind, with that kind's status
    pub fn failure(error: ErrorType<'_>) -> Self {
        let status = error.status();
        Self::new(status, errors_to_value(generate_error(error, None)))
    }
}

fn errors_to_value(errors: crate::error::ErrorList) -> Value {
    match serde_json::to_value(errors) {
        Ok(value) => value,
        Err(e) => {
            tracing::error!("Failed to serialize error list: {}", e);
            Value::Array(Vec::new())
        }
    }
}

impl From<OperationResult> for Reply {
    fn from(result: OperationResult) -> Self {
        Self::new(result.status(), result.into_body())
    }
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
