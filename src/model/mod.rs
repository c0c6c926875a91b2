//! Entity models for the course-management domain.
//!
//! Each entity is a serde struct with a derived [`Document`] impl plus an
//! [`Entity`] impl describing how the repository treats it: schema, unique
//! constraints, defaults filled in on create, which fields may change, and
//! what a soft delete means.

mod assignment;
mod course;
mod enrollment;
mod lesson;
mod submission;
mod user;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

use crate::document::{Document, Fields, INTERNAL_ID};
use crate::schema::CollectionSchema;
use crate::store::UniqueConstraint;

pub use assignment::Assignment;
pub use course::{Course, Level};
pub use enrollment::{Enrollment, EnrollmentStatus, ACTIVE_ENROLLMENT};
pub use lesson::Lesson;
pub use submission::Submission;
pub use user::{Profile, Role, User, EMAIL_PATTERN};

/// Repository behaviour of a stored entity kind.
pub trait Entity: Document {
    /// Fields that may never change after creation, besides the id field.
    const IMMUTABLE_FIELDS: &'static [&'static str] = &[];

    fn schema() -> CollectionSchema;

    fn unique_constraints() -> Vec<UniqueConstraint> {
        vec![UniqueConstraint::on(Self::ID_FIELD)]
    }

    /// Fill in absent defaulted fields before validation.
    fn apply_defaults(_fields: &mut Fields, _now: DateTime<Utc>) {}

    /// Patch applied by a soft delete. `None` when the kind has no soft delete.
    fn soft_delete_patch() -> Option<Fields> {
        None
    }

    /// Add fields refreshed on every update.
    fn touch(_patch: &mut Fields, _now: DateTime<Utc>) {}

    fn is_mutable(field: &str) -> bool {
        field != Self::ID_FIELD && field != INTERNAL_ID && !Self::IMMUTABLE_FIELDS.contains(&field)
    }
}

/// Stored representation of a timestamp.
pub fn timestamp(at: DateTime<Utc>) -> Value {
    Value::String(at.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

fn default_field(fields: &mut Fields, key: &str, value: Value) {
    fields.entry(key.to_string()).or_insert(value);
}

fn patch(entries: &[(&str, Value)]) -> Fields {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

/// Every collection schema, in registration order.
pub fn all_schemas() -> Vec<CollectionSchema> {
    vec![
        User::schema(),
        Course::schema(),
        Enrollment::schema(),
        Lesson::schema(),
        Assignment::schema(),
        Submission::schema(),
    ]
}

/// Every unique constraint, paired with its collection.
pub fn all_constraints() -> Vec<(&'static str, UniqueConstraint)> {
    fn of<E: Entity>() -> impl Iterator<Item = (&'static str, UniqueConstraint)> {
        E::unique_constraints()
            .into_iter()
            .map(|c| (E::COLLECTION, c))
    }
    of::<User>()
        .chain(of::<Course>())
        .chain(of::<Enrollment>())
        .chain(of::<Lesson>())
        .chain(of::<Assignment>())
        .chain(of::<Submission>())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_are_rfc3339_utc() {
        let at = DateTime::parse_from_rfc3339("2025-03-01T10:00:00+02:00")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(timestamp(at), Value::from("2025-03-01T08:00:00Z"));
    }

    #[test]
    fn every_collection_has_a_schema_and_id_constraint() {
        let schemas = all_schemas();
        assert_eq!(schemas.len(), 6);
        let constraints = all_constraints();
        for schema in &schemas {
            assert!(constraints.iter().any(|(c, _)| *c == schema.collection));
        }
        let names: Vec<&str> = constraints.iter().map(|(_, c)| c.name.as_str()).collect();
        for expected in [
            "userId",
            "email",
            "courseId",
            "enrollmentId",
            "active_enrollment",
            "lessonId",
            "assignmentId",
            "submissionId",
        ] {
            assert!(names.contains(&expected), "missing {}", expected);
        }
    }
}
