use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::Fields;
use crate::Document;
use crate::schema::{CollectionSchema, FieldRule};

use super::{default_field, patch, timestamp, Entity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Beginner,
    Intermediate,
    Advanced,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Beginner => "beginner",
            Level::Intermediate => "intermediate",
            Level::Advanced => "advanced",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Document)]
#[document(collection = "courses")]
#[serde(rename_all = "camelCase")]
pub struct Course {
    #[document(id)]
    pub course_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub instructor_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub level: Level,
    /// Hours.
    pub duration: u32,
    pub price: f64,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_published: bool,
}

impl Course {
    pub fn new(
        course_id: impl Into<String>,
        title: impl Into<String>,
        instructor_id: impl Into<String>,
        level: Level,
    ) -> Self {
        let now = Utc::now();
        Self {
            course_id: course_id.into(),
            title: title.into(),
            description: None,
            instructor_id: instructor_id.into(),
            category: None,
            level,
            duration: 1,
            price: 0.0,
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
            is_published: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_duration(mut self, hours: u32) -> Self {
        self.duration = hours;
        self
    }

    pub fn with_price(mut self, price: f64) -> Self {
        self.price = price;
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn published(mut self) -> Self {
        self.is_published = true;
        self
    }
}

impl Entity for Course {
    const IMMUTABLE_FIELDS: &'static [&'static str] = &["createdAt"];

    fn schema() -> CollectionSchema {
        CollectionSchema::new(Self::COLLECTION)
            .field("courseId", FieldRule::string().required())
            .field("title", FieldRule::string().required())
            .field("description", FieldRule::string().nullable())
            .field("instructorId", FieldRule::string().required())
            .field("category", FieldRule::string().nullable())
            .field(
                "level",
                FieldRule::string().required().one_of([
                    Level::Beginner.as_str(),
                    Level::Intermediate.as_str(),
                    Level::Advanced.as_str(),
                ]),
            )
            .field("duration", FieldRule::int().required().min(1.0))
            .field("price", FieldRule::number().required().min(0.0))
            .field("tags", FieldRule::array(FieldRule::string()))
            .field("createdAt", FieldRule::date().required())
            .field("updatedAt", FieldRule::date().required())
            .field("isPublished", FieldRule::bool().required())
    }

    fn apply_defaults(fields: &mut Fields, now: DateTime<Utc>) {
        default_field(fields, "tags", Value::Array(Vec::new()));
        default_field(fields, "createdAt", timestamp(now));
        default_field(fields, "updatedAt", timestamp(now));
        default_field(fields, "isPublished", Value::Bool(false));
    }

    fn soft_delete_patch() -> Option<Fields> {
        Some(patch(&[("isPublished", Value::Bool(false))]))
    }

    fn touch(patch: &mut Fields, now: DateTime<Utc>) {
        patch.insert("updatedAt".to_string(), timestamp(now));
    }
}
