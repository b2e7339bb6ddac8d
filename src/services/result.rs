use axum::http::StatusCode;
use serde_json::Value;

use crate::error::{generate_error, ErrorList, ErrorType};

/// Outcome of every CRUD engine operation.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationResult {
    Success { status: StatusCode, body: Value },
    Failure { status: StatusCode, errors: ErrorList },
}

impl OperationResult {
    pub fn ok(body: Value) -> Self {
        OperationResult::Success {
            status: StatusCode::OK,
            body,
        }
    }

    pub fn created(body: Value) -> Self {
        OperationResult::Success {
            status: StatusCode::CREATED,
            body,
        }
    }

    /// Failure built from one taxonomy kind, with that kind's status.
    pub fn failure(error: ErrorType<'_>) -> Self {
        let status = error.status();
        OperationResult::Failure {
            status,
            errors: generate_error(error, None),
        }
    }

    /// Failure with an explicit status, for write paths that report 400
    /// regardless of kind.
    pub fn failure_with(status: StatusCode, errors: ErrorList) -> Self {
        OperationResult::Failure { status, errors }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            OperationResult::Success { status, .. } | OperationResult::Failure { status, .. } => *status,
        }
    }

    pub fn into_body(self) -> Value {
        match self {
            OperationResult::Success { body, .. } => body,
            OperationResult::Failure { errors, .. } => serde_json::to_value(errors).unwrap_or(Value::Null),
        }
    }
}
