use thiserror::Error;

use crate::analytics::AnalyticsError;
use crate::config::ConfigError;
use crate::integrity::{IntegrityError, RelationshipViolation};
use crate::repository::RepositoryError;
use crate::store::StoreError;

/// Error returned by the [`EduHub`](crate::EduHub) facade.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Relationship(#[from] RelationshipViolation),
    #[error(transparent)]
    Analytics(#[from] AnalyticsError),
}

impl Error {
    /// Whether retrying the same call may succeed. Only store timeouts are.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Store(e) => e.is_transient(),
            Error::Repository(e) => e.is_transient(),
            Error::Analytics(e) => e.is_transient(),
            Error::Config(_) | Error::Relationship(_) => false,
        }
    }

    pub fn relationship(&self) -> Option<&RelationshipViolation> {
        match self {
            Error::Relationship(v) => Some(v),
            _ => None,
        }
    }
}

impl From<IntegrityError> for Error {
    fn from(err: IntegrityError) -> Self {
        match err {
            IntegrityError::Violation(v) => Error::Relationship(v),
            IntegrityError::Repository(e) => Error::Repository(e),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
