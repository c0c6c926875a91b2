//! Document types defined outside the crate.

use eduhub::{CollectionSchema, Document, Entity, FieldRule, Fields};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Defaults: collection from the type name, id from the `id` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Document)]
pub struct StudyNote {
    pub id: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Document)]
#[document(collection = "badges")]
#[serde(rename_all = "camelCase")]
pub struct Badge {
    #[document(id)]
    pub badge_code: String,
    pub label: String,
    pub archived: bool,
}

impl Badge {
    pub fn new(code: &str, label: &str) -> Self {
        Self {
            badge_code: code.into(),
            label: label.into(),
            archived: false,
        }
    }
}

impl Entity for Badge {
    const IMMUTABLE_FIELDS: &'static [&'static str] = &["label"];

    fn schema() -> CollectionSchema {
        CollectionSchema::new(Self::COLLECTION)
            .field("badgeCode", FieldRule::string().required())
            .field("label", FieldRule::string().required())
            .field("archived", FieldRule::bool())
    }

    fn soft_delete_patch() -> Option<Fields> {
        let mut patch = Fields::new();
        patch.insert("archived".into(), Value::Bool(true));
        Some(patch)
    }
}

/// A field-level serde rename decides the stored id key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Document)]
#[serde(rename_all = "camelCase")]
pub struct Cohort {
    #[document(id)]
    #[serde(rename = "slug")]
    pub key: String,
    pub intake_year: i32,
}
