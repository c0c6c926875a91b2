use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::Fields;
use crate::Document;
use crate::schema::{CollectionSchema, FieldRule};

use super::{default_field, Entity};

pub const DEFAULT_MAX_POINTS: u32 = 100;

fn default_max_points() -> u32 {
    DEFAULT_MAX_POINTS
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Document)]
#[document(collection = "assignments")]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    #[document(id)]
    pub assignment_id: String,
    pub course_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub due_date: DateTime<Utc>,
    #[serde(default = "default_max_points")]
    pub max_points: u32,
}

impl Assignment {
    pub fn new(
        assignment_id: impl Into<String>,
        course_id: impl Into<String>,
        title: impl Into<String>,
        due_date: DateTime<Utc>,
    ) -> Self {
        Self {
            assignment_id: assignment_id.into(),
            course_id: course_id.into(),
            title: title.into(),
            description: None,
            due_date,
            max_points: DEFAULT_MAX_POINTS,
        }
    }

    pub fn with_max_points(mut self, max_points: u32) -> Self {
        self.max_points = max_points;
        self
    }
}

impl Entity for Assignment {
    const IMMUTABLE_FIELDS: &'static [&'static str] = &["courseId"];

    fn schema() -> CollectionSchema {
        CollectionSchema::new(Self::COLLECTION)
            .field("assignmentId", FieldRule::string().required())
            .field("courseId", FieldRule::string().required())
            .field("title", FieldRule::string().required())
            .field("description", FieldRule::string().nullable())
            .field("dueDate", FieldRule::date().required())
            .field("maxPoints", FieldRule::int().required().min(0.0))
    }

    fn apply_defaults(fields: &mut Fields, _now: DateTime<Utc>) {
        default_field(fields, "maxPoints", Value::from(DEFAULT_MAX_POINTS));
    }
}
