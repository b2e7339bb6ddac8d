use thiserror::Error;

/// Reasons a Filter Set could not be composed. Every variant fails closed:
/// the engine reports Data-Not-Found rather than running an unscoped query.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FilterError {
    #[error("Owner-scoped filter requires an authenticated user")]
    Unauthenticated,

    #[error("Missing URL capture: {0}")]
    MissingCapture(&'static str),

    #[error("Unknown column {entity}.{column}")]
    InvalidColumn { entity: &'static str, column: &'static str },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}
