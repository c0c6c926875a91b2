use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::Fields;
use crate::Document;
use crate::schema::{CollectionSchema, FieldRule};

use super::{default_field, timestamp, Entity};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Document)]
#[document(collection = "assignment_submissions")]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    #[document(id)]
    pub submission_id: String,
    pub assignment_id: String,
    #[serde(rename = "userId")]
    pub student_id: String,
    pub submitted_at: DateTime<Utc>,
    /// `None` until graded.
    pub grade: Option<f64>,
}

impl Submission {
    pub fn new(
        submission_id: impl Into<String>,
        assignment_id: impl Into<String>,
        student_id: impl Into<String>,
    ) -> Self {
        Self {
            submission_id: submission_id.into(),
            assignment_id: assignment_id.into(),
            student_id: student_id.into(),
            submitted_at: Utc::now(),
            grade: None,
        }
    }

    pub fn graded(mut self, grade: f64) -> Self {
        self.grade = Some(grade);
        self
    }
}

impl Entity for Submission {
    fn schema() -> CollectionSchema {
        CollectionSchema::new(Self::COLLECTION)
            .field("submissionId", FieldRule::string().required())
            .field("assignmentId", FieldRule::string().required())
            .field("userId", FieldRule::string().required())
            .field("submittedAt", FieldRule::date().required())
            .field("grade", FieldRule::number().nullable().min(0.0))
    }

    fn apply_defaults(fields: &mut Fields, now: DateTime<Utc>) {
        default_field(fields, "submittedAt", timestamp(now));
        default_field(fields, "grade", Value::Null);
    }

    /// Only the grade changes once work is submitted.
    fn is_mutable(field: &str) -> bool {
        field == "grade"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::to_fields;
    use serde_json::json;

    #[test]
    fn student_is_stored_as_user_id() {
        let fields = to_fields(&Submission::new("S1", "A1", "U100")).unwrap();
        assert_eq!(fields["userId"], json!("U100"));
        assert_eq!(fields["grade"], Value::Null);
        assert!(Submission::schema().validate(&fields).is_ok());
        assert_eq!(Submission::COLLECTION, "assignment_submissions");
    }

    #[test]
    fn only_grade_is_mutable() {
        assert!(Submission::is_mutable("grade"));
        assert!(!Submission::is_mutable("userId"));
        assert!(!Submission::is_mutable("submittedAt"));
    }
}
