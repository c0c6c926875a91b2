use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::document::Fields;
use crate::Document;
use crate::filter::Filter;
use crate::schema::{CollectionSchema, FieldRule};
use crate::store::UniqueConstraint;

use super::{default_field, patch, timestamp, Entity};

/// Name of the partial unique constraint allowing one active enrollment per
/// student and course.
pub const ACTIVE_ENROLLMENT: &str = "active_enrollment";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrollmentStatus {
    #[default]
    Active,
    Completed,
    Dropped,
}

impl EnrollmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrollmentStatus::Active => "active",
            EnrollmentStatus::Completed => "completed",
            EnrollmentStatus::Dropped => "dropped",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Document)]
#[document(collection = "enrollments")]
#[serde(rename_all = "camelCase")]
pub struct Enrollment {
    #[document(id)]
    pub enrollment_id: String,
    pub user_id: String,
    pub course_id: String,
    pub enrolled_at: DateTime<Utc>,
    pub status: EnrollmentStatus,
    /// Percent complete, 0 to 100.
    pub progress: f64,
}

impl Enrollment {
    pub fn new(user_id: impl Into<String>, course_id: impl Into<String>) -> Self {
        Self {
            enrollment_id: generate_id(),
            user_id: user_id.into(),
            course_id: course_id.into(),
            enrolled_at: Utc::now(),
            status: EnrollmentStatus::Active,
            progress: 0.0,
        }
    }
}

pub(crate) fn generate_id() -> String {
    format!("E-{}", Uuid::new_v4().simple())
}

impl Entity for Enrollment {
    const IMMUTABLE_FIELDS: &'static [&'static str] = &["userId", "courseId", "enrolledAt"];

    fn schema() -> CollectionSchema {
        CollectionSchema::new(Self::COLLECTION)
            .field("enrollmentId", FieldRule::string().required())
            .field("userId", FieldRule::string().required())
            .field("courseId", FieldRule::string().required())
            .field("enrolledAt", FieldRule::date().required())
            .field(
                "status",
                FieldRule::string().required().one_of([
                    EnrollmentStatus::Active.as_str(),
                    EnrollmentStatus::Completed.as_str(),
                    EnrollmentStatus::Dropped.as_str(),
                ]),
            )
            .field("progress", FieldRule::number().required().min(0.0).max(100.0))
    }

    fn unique_constraints() -> Vec<UniqueConstraint> {
        vec![
            UniqueConstraint::on("enrollmentId"),
            UniqueConstraint::compound(ACTIVE_ENROLLMENT, ["userId", "courseId"])
                .partial(Filter::eq("status", EnrollmentStatus::Active.as_str())),
        ]
    }

    fn apply_defaults(fields: &mut Fields, now: DateTime<Utc>) {
        default_field(fields, "enrollmentId", Value::String(generate_id()));
        default_field(fields, "enrolledAt", timestamp(now));
        default_field(
            fields,
            "status",
            Value::from(EnrollmentStatus::Active.as_str()),
        );
        default_field(fields, "progress", Value::from(0.0));
    }

    fn soft_delete_patch() -> Option<Fields> {
        Some(patch(&[(
            "status",
            Value::from(EnrollmentStatus::Dropped.as_str()),
        )]))
    }
}
