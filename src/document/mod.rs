//! Documents - typed entities stored as schema-flexible JSON objects.
//!
//! A [`Document`] knows its collection and the key of its business id. The
//! derive macro fills both in:
//!
//! ```ignore
//! use eduhub::Document;
//!
//! #[derive(Serialize, Deserialize, Clone, Document)]
//! #[document(collection = "lessons")]
//! #[serde(rename_all = "camelCase")]
//! struct Lesson {
//!     #[document(id)]
//!     pub lesson_id: String,
//!     pub title: String,
//! }
//!
//! assert_eq!(Lesson::ID_FIELD, "lessonId");
//! ```

use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Raw document body: a JSON object keyed by field name.
pub type Fields = Map<String, Value>;

/// Key of the store-assigned internal identifier.
pub const INTERNAL_ID: &str = "_id";

/// Trait for types that can be stored as documents.
pub trait Document: Serialize + DeserializeOwned + Clone + Send + Sync {
    /// The collection name for this document type (e.g., "users", "courses").
    const COLLECTION: &'static str;

    /// Stored key of the business identifier (e.g., "userId").
    const ID_FIELD: &'static str;

    /// Returns the business identifier of this document.
    fn id(&self) -> &str;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentError {
    #[error("{collection}: document serialization error: {message}")]
    Serde { collection: String, message: String },
    #[error("{collection}: document does not serialize to a JSON object")]
    NotAnObject { collection: String },
}

/// Serialize a document into its stored field map.
pub fn to_fields<D: Document>(document: &D) -> Result<Fields, DocumentError> {
    match serde_json::to_value(document) {
        Ok(Value::Object(fields)) => Ok(fields),
        Ok(_) => Err(DocumentError::NotAnObject {
            collection: D::COLLECTION.to_string(),
        }),
        Err(e) => Err(DocumentError::Serde {
            collection: D::COLLECTION.to_string(),
            message: e.to_string(),
        }),
    }
}

/// Decode a stored field map. Unknown keys such as `_id` are ignored.
pub fn from_fields<D: Document>(fields: Fields) -> Result<D, DocumentError> {
    serde_json::from_value(Value::Object(fields)).map_err(|e| DocumentError::Serde {
        collection: D::COLLECTION.to_string(),
        message: e.to_string(),
    })
}

/// Resolve a dotted path (`"course.category"`) inside a document.
pub fn lookup_path<'a>(fields: &'a Fields, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = fields.get(first)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Set a dotted path, creating intermediate objects as needed.
pub fn set_path(fields: &mut Fields, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            fields.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let entry = fields
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            if let Value::Object(child) = entry {
                set_path(child, rest, value);
            }
        }
    }
}

/// First segment of a dotted path.
pub(crate) fn root_of(path: &str) -> &str {
    path.split('.').next().unwrap_or(path)
}
