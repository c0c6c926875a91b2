use serde::{Deserialize, Serialize};

use crate::Document;
use crate::schema::{CollectionSchema, FieldRule};

use super::Entity;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Document)]
#[document(collection = "lessons")]
#[serde(rename_all = "camelCase")]
pub struct Lesson {
    #[document(id)]
    pub lesson_id: String,
    pub course_id: String,
    pub title: String,
    pub order: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_ref: Option<String>,
}

impl Lesson {
    pub fn new(
        lesson_id: impl Into<String>,
        course_id: impl Into<String>,
        title: impl Into<String>,
        order: u32,
    ) -> Self {
        Self {
            lesson_id: lesson_id.into(),
            course_id: course_id.into(),
            title: title.into(),
            order,
            content_ref: None,
        }
    }
}

impl Entity for Lesson {
    const IMMUTABLE_FIELDS: &'static [&'static str] = &["courseId"];

    fn schema() -> CollectionSchema {
        CollectionSchema::new(Self::COLLECTION)
            .field("lessonId", FieldRule::string().required())
            .field("courseId", FieldRule::string().required())
            .field("title", FieldRule::string().required())
            .field("order", FieldRule::int().required().min(0.0))
            .field("contentRef", FieldRule::string().nullable())
    }
}
