extern crate self as eduhub;

pub mod analytics;
pub mod config;
pub mod document;
pub mod error;
pub mod filter;
pub mod integrity;
pub mod model;
pub mod pipeline;
pub mod repository;
pub mod schema;
pub mod service;
pub mod store;

pub use analytics::{
    Analytics, AnalyticsError, CategoryPopularity, CourseEnrollmentStats, EnrollmentTrend,
    Report, StudentEnrollment, StudentPerformance,
};
pub use config::{ConfigError, StoreConfig};
pub use document::{from_fields, lookup_path, to_fields, Document, DocumentError, Fields};
pub use error::{Error, Result};
pub use filter::{Filter, FilterError, Matcher, Sort, SortOrder};
pub use integrity::{IntegrityError, IntegrityValidator, RelationshipCheck, RelationshipViolation};
pub use model::{
    Assignment, Course, Enrollment, EnrollmentStatus, Entity, Lesson, Level, Profile, Role,
    Submission, User,
};
pub use pipeline::{
    Accumulator, Expr, Group, Lookup, LookupSource, Pipeline, PipelineBuilder, PipelineError,
    Project, Projection, Stage, Unwind,
};
pub use repository::{DocumentRepository, DocumentsExt, RepositoryError};
pub use schema::{
    CollectionSchema, FieldRule, FieldType, SchemaViolation, ValidationErrors, ValidationLevel,
};
pub use service::{CourseSearch, EduHub};
pub use store::{
    AggregateOptions, DocumentStore, FindOptions, InMemoryDocumentStore, StoreError,
    UniqueConstraint, UpdateResult,
};

// Re-export the derive macro
pub use eduhub_macros::Document;
