use thiserror::Error;

use crate::document::DocumentError;
use crate::schema::ValidationErrors;
use crate::store::StoreError;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RepositoryError {
    #[error("{collection}: missing required field `{field}`")]
    MissingField { collection: String, field: String },
    #[error("{collection}: {errors}")]
    Validation {
        collection: String,
        errors: ValidationErrors,
    },
    #[error("{collection}: field `{field}` cannot be changed")]
    ImmutableField { collection: String, field: String },
    #[error("{collection}: duplicate key for `{constraint}`: {key}")]
    DuplicateKey {
        collection: String,
        constraint: String,
        key: String,
    },
    #[error("{collection}: no document with id {id}")]
    NotFound { collection: String, id: String },
    #[error("{collection} documents cannot be soft-deleted")]
    SoftDeleteUnsupported { collection: String },
    #[error(transparent)]
    Serde(#[from] DocumentError),
    #[error("store error: {0}")]
    Store(StoreError),
}

impl RepositoryError {
    pub(crate) fn invalid(collection: &str, errors: ValidationErrors) -> Self {
        match errors.missing_field() {
            Some(field) => RepositoryError::MissingField {
                collection: collection.to_string(),
                field: field.to_string(),
            },
            None => RepositoryError::Validation {
                collection: collection.to_string(),
                errors,
            },
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, RepositoryError::Store(e) if e.is_transient())
    }

    /// Name of the violated unique constraint, for duplicate-key failures.
    pub fn duplicate_constraint(&self) -> Option<&str> {
        match self {
            RepositoryError::DuplicateKey { constraint, .. } => Some(constraint),
            _ => None,
        }
    }
}

impl From<StoreError> for RepositoryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateKey {
                collection,
                constraint,
                key,
            } => RepositoryError::DuplicateKey {
                collection,
                constraint,
                key,
            },
            StoreError::DocumentValidation { collection, errors } => {
                RepositoryError::invalid(&collection, errors)
            }
            other => RepositoryError::Store(other),
        }
    }
}
