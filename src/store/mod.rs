//! DocumentStore - the query/command contract of the backing document store.
//!
//! The crate never talks to a concrete database directly; repositories,
//! integrity checks and analytics go through this trait.
//! [`InMemoryDocumentStore`] is the bundled implementation.

mod in_memory;

use std::time::Duration;

use thiserror::Error;

use crate::document::Fields;
use crate::filter::{Filter, FilterError, Sort};
use crate::pipeline::{Pipeline, PipelineError};
use crate::schema::{CollectionSchema, ValidationErrors, ValidationLevel};

pub use in_memory::InMemoryDocumentStore;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("duplicate key in {collection} for constraint `{constraint}`: {key}")]
    DuplicateKey {
        collection: String,
        constraint: String,
        key: String,
    },
    #[error("document failed validation for {collection}: {errors}")]
    DocumentValidation {
        collection: String,
        errors: ValidationErrors,
    },
    #[error("{operation} on {collection} timed out after {timeout:?}")]
    Timeout {
        collection: String,
        operation: &'static str,
        timeout: Duration,
    },
    #[error("aggregation on {collection} exceeded the working set of {limit} documents")]
    WorkingSetExceeded { collection: String, limit: usize },
    #[error(transparent)]
    InvalidFilter(#[from] FilterError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl StoreError {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Timeout { .. })
    }

    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, StoreError::DuplicateKey { .. })
    }
}

/// Outcome of an update: documents matched by the filter and documents
/// whose contents actually changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpdateResult {
    pub matched: usize,
    pub modified: usize,
}

/// A unique constraint over one or more fields. With a `partial` filter only
/// documents matching it take part.
#[derive(Debug, Clone, PartialEq)]
pub struct UniqueConstraint {
    pub name: String,
    pub fields: Vec<String>,
    pub partial: Option<Filter>,
}

impl UniqueConstraint {
    pub fn on(field: impl Into<String>) -> Self {
        let field = field.into();
        Self {
            name: field.clone(),
            fields: vec![field],
            partial: None,
        }
    }

    pub fn compound<I, F>(name: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<String>,
    {
        Self {
            name: name.into(),
            fields: fields.into_iter().map(Into::into).collect(),
            partial: None,
        }
    }

    pub fn partial(mut self, filter: Filter) -> Self {
        self.partial = Some(filter);
        self
    }

    /// Whether a document takes part in this constraint.
    pub fn applies_to(&self, doc: &Fields) -> bool {
        self.partial.as_ref().map_or(true, |f| f.matches(doc))
    }
}

/// Read options for [`DocumentStore::find`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FindOptions {
    pub filter: Filter,
    pub sort: Option<Sort>,
    pub skip: usize,
    pub limit: Option<usize>,
}

impl FindOptions {
    pub fn new(filter: Filter) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }

    pub fn sort(mut self, sort: Sort) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Options for [`DocumentStore::aggregate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AggregateOptions {
    /// Let intermediate results grow past the store's working set.
    pub allow_disk_use: bool,
    /// Overrides the store's operation timeout for this call.
    pub timeout: Option<Duration>,
}

impl AggregateOptions {
    pub fn allow_disk_use() -> Self {
        Self {
            allow_disk_use: true,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Abstract document storage.
pub trait DocumentStore: Send + Sync {
    /// Insert a document, returning its internal `_id`.
    fn insert(&self, collection: &str, doc: Fields) -> Result<String, StoreError>;

    /// Find documents matching the options' filter, in insertion order unless
    /// a sort is given.
    fn find(&self, collection: &str, options: &FindOptions) -> Result<Vec<Fields>, StoreError>;

    /// Set the `patch` fields on every document matching `filter`. Fields
    /// absent from the patch are left untouched.
    fn update(
        &self,
        collection: &str,
        filter: &Filter,
        patch: &Fields,
    ) -> Result<UpdateResult, StoreError>;

    fn aggregate(
        &self,
        collection: &str,
        pipeline: &Pipeline,
        options: &AggregateOptions,
    ) -> Result<Vec<Fields>, StoreError>;

    /// Register a unique constraint. Re-registering a name replaces it.
    fn create_unique_constraint(
        &self,
        collection: &str,
        constraint: UniqueConstraint,
    ) -> Result<(), StoreError>;

    /// Attach a schema to a collection at the given enforcement level.
    fn set_schema(
        &self,
        collection: &str,
        schema: CollectionSchema,
        level: ValidationLevel,
    ) -> Result<(), StoreError>;

    fn count(&self, collection: &str, filter: &Filter) -> Result<usize, StoreError> {
        Ok(self.find(collection, &FindOptions::new(filter.clone()))?.len())
    }

    fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Fields>, StoreError> {
        let options = FindOptions::new(filter.clone()).limit(1);
        Ok(self.find(collection, &options)?.into_iter().next())
    }
}
