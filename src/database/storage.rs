use async_trait::async_trait;
use thiserror::Error;

use crate::database::entity::EntityMeta;
use crate::database::record::Record;
use crate::error::{ErrorList, WriteFailure};
use crate::filter::FilterSet;

/// Attribute-level failure raised while writing a record.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeError {
    /// Pre-formatted taxonomy items, passed through to the client as-is
    Structured(ErrorList),
    /// Anything else; reported as a generic Database-Write-Fail
    Message(String),
}

impl std::fmt::Display for AttributeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttributeError::Structured(errors) => write!(f, "{} structured error(s)", errors.len()),
            AttributeError::Message(message) => f.write_str(message),
        }
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("No row matched the filter")]
    NotFound,

    #[error("More than one row matched the filter")]
    MultipleResults,

    #[error("Integrity violation: {}", .0.detail.as_deref().unwrap_or("no detail"))]
    Integrity(WriteFailure),

    #[error("Attribute error: {0}")]
    Attribute(AttributeError),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Sqlx(sqlx::Error),
}

impl StorageError {
    /// Infrastructure outage rather than a fault in this request's data.
    pub fn is_unavailable(&self) -> bool {
        match self {
            StorageError::Unavailable(_) => true,
            StorageError::Sqlx(err) => matches!(
                err,
                sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) | sqlx::Error::Tls(_)
            ),
            _ => false,
        }
    }

    /// The "no unique result" family: zero rows or several rows.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound | StorageError::MultipleResults)
    }

    pub fn attribute(message: impl Into<String>) -> Self {
        StorageError::Attribute(AttributeError::Message(message.into()))
    }
}

/// Transactional storage collaborator. Each request works through its own
/// session obtained from `begin`.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StorageSession>, StorageError>;

    /// Connectivity check for the health endpoint.
    async fn ping(&self) -> Result<(), StorageError>;
}

/// Unit of work. A transaction opens lazily on first use; `commit` and
/// `rollback` end it and leave the session reusable.
#[async_trait]
pub trait StorageSession: Send {
    /// Exactly one matching row; `NotFound` for zero, `MultipleResults` for more.
    async fn fetch_one(&mut self, entity: &'static EntityMeta, filters: &FilterSet) -> Result<Record, StorageError>;

    /// Every matching row, in primary key order.
    async fn fetch_many(&mut self, entity: &'static EntityMeta, filters: &FilterSet)
        -> Result<Vec<Record>, StorageError>;

    /// Insert when the primary key is unset, else update the modified columns.
    /// Storage-assigned values are copied back into the record.
    async fn persist(&mut self, entity: &'static EntityMeta, record: &mut Record, commit: bool)
        -> Result<(), StorageError>;

    async fn delete(&mut self, entity: &'static EntityMeta, record: &Record) -> Result<(), StorageError>;

    /// Send pending writes without ending the transaction.
    async fn flush(&mut self) -> Result<(), StorageError>;

    async fn commit(&mut self) -> Result<(), StorageError>;

    async fn rollback(&mut self) -> Result<(), StorageError>;
}
