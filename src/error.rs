// Error taxonomy and transport-level API errors
//
// Every wire-visible failure is built through `generate_error`, which appends
// normalized `{code, message, field, context}` items to an accumulator. The
// `ApiError` type at the bottom is reserved for infrastructure faults that have
// no place in the taxonomy (storage unreachable, session store down).

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use serde_json::{json, Value};

use crate::auth::{AuthError, SessionError};
use crate::database::storage::StorageError;

/// Stable numeric failure codes. The discriminant is the wire `code`,
/// the variant name in SCREAMING_SNAKE_CASE is the wire `message`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    InvalidEmailPassword = 1,
    PasswordMismatch = 2,
    EmailIdNotFound = 3,
    EmailAlreadyVerified = 4,
    EmailVerificationFailed = 5,
    InvalidPhoneNumber = 6,
    PhoneVerificationFailed = 7,
    InvalidToken = 8,
    NotAuthorised = 9,
    DatabaseWriteFail = 10,
    MethodNotAllowed = 11,
    DataNotFound = 12,
    MissingRequiredField = 13,
    InvalidInputType = 14,
    NullFieldNotAllowed = 15,
    InvalidValue = 16,
}

impl ErrorCode {
    pub fn code(self) -> u16 {
        self as u16
    }

    pub fn name(self) -> &'static str {
        match self {
            ErrorCode::InvalidEmailPassword => "INVALID_EMAIL_PASSWORD",
            ErrorCode::PasswordMismatch => "PASSWORD_MISMATCH",
            ErrorCode::EmailIdNotFound => "EMAIL_ID_NOT_FOUND",
            ErrorCode::EmailAlreadyVerified => "EMAIL_ALREADY_VERIFIED",
            ErrorCode::EmailVerificationFailed => "EMAIL_VERIFICATION_FAILED",
            ErrorCode::InvalidPhoneNumber => "INVALID_PHONE_NUMBER",
            ErrorCode::PhoneVerificationFailed => "PHONE_VERIFICATION_FAILED",
            ErrorCode::InvalidToken => "INVALID_TOKEN",
            ErrorCode::NotAuthorised => "NOT_AUTHORISED",
            ErrorCode::DatabaseWriteFail => "DATABASE_WRITE_FAIL",
            ErrorCode::MethodNotAllowed => "METHOD_NOT_ALLOWED",
            ErrorCode::DataNotFound => "DATA_NOT_FOUND",
            ErrorCode::MissingRequiredField => "MISSING_REQUIRED_FIELD",
            ErrorCode::InvalidInputType => "INVALID_INPUT_TYPE",
            ErrorCode::NullFieldNotAllowed => "NULL_FIELD_NOT_ALLOWED",
            ErrorCode::InvalidValue => "INVALID_VALUE",
        }
    }
}

/// One normalized failure, the unit composed into every error response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorItem {
    pub code: u16,
    pub message: String,
    pub field: Option<String>,
    pub context: Option<Value>,
}

impl ErrorItem {
    pub fn new(code: ErrorCode, field: Option<String>, context: Option<Value>) -> Self {
        Self {
            code: code.code(),
            message: code.name().to_string(),
            field,
            context,
        }
    }
}

pub type ErrorList = Vec<ErrorItem>;

/// Field-level validation failures as reported by the serializer bridge:
/// `{field -> codes}` with one level of nesting per nested schema.
/// Entries keep the order in which fields were validated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldErrors {
    entries: Vec<(String, FieldError)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldError {
    Codes(Vec<ErrorCode>),
    Nested(FieldErrors),
}

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Record a code against a field, appending to any codes already reported for it.
    pub fn add(&mut self, field: impl Into<String>, code: ErrorCode) -> &mut Self {
        let field = field.into();
        match self.entries.iter_mut().find(|(name, _)| *name == field) {
            Some((_, FieldError::Codes(codes))) => codes.push(code),
            Some((_, slot)) => *slot = FieldError::Codes(vec![code]),
            None => self.entries.push((field, FieldError::Codes(vec![code]))),
        }
        self
    }

    /// Attach the failures of a nested schema under `field`.
    pub fn nest(&mut self, field: impl Into<String>, nested: FieldErrors) -> &mut Self {
        if !nested.is_empty() {
            self.entries.push((field.into(), FieldError::Nested(nested)));
        }
        self
    }

    pub fn get(&self, field: &str) -> Option<&FieldError> {
        self.entries.iter().find(|(name, _)| name == field).map(|(_, e)| e)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldError)> {
        self.entries.iter().map(|(name, e)| (name.as_str(), e))
    }
}

/// Diagnostics reported by the store for an integrity violation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteFailure {
    pub column: Option<String>,
    pub constraint: Option<String>,
    pub detail: Option<String>,
}

/// Failure kinds understood by `generate_error`, each carrying its own data.
#[derive(Debug, Clone)]
pub enum ErrorType<'a> {
    SchemaError(&'a FieldErrors),
    InvalidMethod(&'a str),
    DataNotFound,
    DatabaseWriteFail(Option<&'a WriteFailure>),
    Unauthorized,
    Forbidden,
    Custom {
        code: ErrorCode,
        field: Option<String>,
        context: Option<Value>,
    },
}

impl ErrorType<'_> {
    /// Status the failure is reported with when it is the reason a request ends.
    pub fn status(&self) -> StatusCode {
        match self {
            ErrorType::SchemaError(_) => StatusCode::BAD_REQUEST,
            ErrorType::InvalidMethod(_) => StatusCode::METHOD_NOT_ALLOWED,
            ErrorType::DataNotFound => StatusCode::NOT_FOUND,
            ErrorType::DatabaseWriteFail(_) => StatusCode::BAD_REQUEST,
            ErrorType::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorType::Forbidden => StatusCode::FORBIDDEN,
            ErrorType::Custom { .. } => StatusCode::BAD_REQUEST,
        }
    }
}

/// Append the normalized items for `error` to `previous` (or a fresh list) and return it.
pub fn generate_error(error: ErrorType<'_>, previous: Option<ErrorList>) -> ErrorList {
    let mut errors = previous.unwrap_or_default();
    match error {
        ErrorType::SchemaError(field_errors) => handle_schema_errors(field_errors, None, &mut errors),
        ErrorType::InvalidMethod(method) => errors.push(ErrorItem::new(
            ErrorCode::MethodNotAllowed,
            Some(method.to_string()),
            None,
        )),
        ErrorType::DataNotFound => errors.push(ErrorItem::new(ErrorCode::DataNotFound, None, None)),
        ErrorType::DatabaseWriteFail(failure) => errors.push(database_write_fail(failure)),
        ErrorType::Unauthorized => errors.push(ErrorItem::new(
            ErrorCode::NotAuthorised,
            None,
            Some(Value::String("unauthenticated".into())),
        )),
        ErrorType::Forbidden => errors.push(ErrorItem::new(
            ErrorCode::NotAuthorised,
            None,
            Some(Value::String("unauthorized".into())),
        )),
        ErrorType::Custom { code, field, context } => errors.push(ErrorItem::new(code, field, context)),
    }
    errors
}

fn handle_schema_errors(field_errors: &FieldErrors, prefix: Option<&str>, errors: &mut ErrorList) {
    for (name, error) in field_errors.iter() {
        let path = match prefix {
            Some(prefix) => format!("{}.{}", prefix, name),
            None => name.to_string(),
        };
        match error {
            FieldError::Codes(codes) => {
                if let Some(code) = codes.first() {
                    errors.push(ErrorItem::new(*code, Some(path), None));
                }
            }
            FieldError::Nested(nested) => handle_schema_errors(nested, Some(&path), errors),
        }
    }
}

fn database_write_fail(failure: Option<&WriteFailure>) -> ErrorItem {
    let (field, context) = match failure {
        Some(failure) => {
            let field = failure
                .column
                .clone()
                .filter(|c| !c.is_empty())
                .or_else(|| failure.constraint.clone())
                .unwrap_or_default();
            (field, failure.detail.clone().unwrap_or_default())
        }
        None => (String::new(), String::new()),
    };
    ErrorItem::new(ErrorCode::DatabaseWriteFail, Some(field), Some(Value::String(context)))
}

// ========================================
// Transport-level faults
// ========================================

/// Infrastructure failure with no recovery policy; ends the request with 5xx.
#[derive(Debug)]
pub enum ApiError {
    // 500 Internal Server Error
    InternalServerError(String),

    // 503 Service Unavailable
    ServiceUnavailable(String),
}

impl ApiError {
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::InternalServerError(_) => 500,
            ApiError::ServiceUnavailable(_) => 503,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ApiError::InternalServerError(msg) => msg,
            ApiError::ServiceUnavailable(msg) => msg,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
            ApiError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
        }
    }

    pub fn to_json(&self) -> Value {
        json!({
            "error": true,
            "message": self.message(),
            "code": self.error_code()
        })
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        ApiError::InternalServerError(message.into())
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        ApiError::ServiceUnavailable(message.into())
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        // Log the real error but return a generic message
        tracing::error!("Storage fault: {}", err);
        if err.is_unavailable() {
            ApiError::service_unavailable("Database temporarily unavailable")
        } else {
            ApiError::internal_server_error("Database error occurred")
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        tracing::error!("Session store fault: {}", err);
        ApiError::service_unavailable("Session store temporarily unavailable")
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Session(e) => e.into(),
            AuthError::Storage(e) => e.into(),
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_json())).into_response()
    }
}
