//! Schema validation for collections.
//!
//! A [`CollectionSchema`] is a rule set `{field: {type, required, enum?,
//! pattern?, minimum?, maximum?}}` enforced by the store at a
//! [`ValidationLevel`], and checked locally by repositories before a write is
//! attempted.

use std::collections::BTreeMap;
use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::document::Fields;
use crate::filter::values_equal;

// =============================================================================
// Validation level
// =============================================================================

/// How strictly a store applies a collection's schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationLevel {
    /// Every insert and update is validated.
    #[default]
    Strict,
    /// Inserts, and updates of documents that already conform, are validated.
    /// Documents that did not conform before the schema was applied are exempt.
    Moderate,
    Off,
}

// =============================================================================
// Field types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Int,
    Double,
    /// Int or double.
    Number,
    Bool,
    /// RFC 3339 timestamp string.
    Date,
    Object,
    Array,
}

impl FieldType {
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Int => value.is_i64() || value.is_u64(),
            Self::Double => value.is_f64(),
            Self::Number => value.is_number(),
            Self::Bool => value.is_boolean(),
            Self::Date => value
                .as_str()
                .is_some_and(|s| chrono::DateTime::parse_from_rfc3339(s).is_ok()),
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "string",
            Self::Int => "int",
            Self::Double => "double",
            Self::Number => "number",
            Self::Bool => "bool",
            Self::Date => "date",
            Self::Object => "object",
            Self::Array => "array",
        };
        f.write_str(name)
    }
}

fn value_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "double",
        Value::Number(_) => "int",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// =============================================================================
// Violations
// =============================================================================

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaViolation {
    #[error("missing required field `{field}`")]
    MissingField { field: String },
    #[error("field `{field}` expected {expected}, found {found}")]
    TypeMismatch {
        field: String,
        expected: FieldType,
        found: &'static str,
    },
    #[error("field `{field}` value {value} is not one of [{allowed}]")]
    NotInEnum {
        field: String,
        value: Value,
        allowed: String,
    },
    #[error("field `{field}` does not match pattern `{pattern}`")]
    PatternMismatch { field: String, pattern: String },
    #[error("field `{field}` has an invalid pattern `{pattern}`")]
    InvalidPattern { field: String, pattern: String },
    #[error("field `{field}` value {value} is below the minimum {minimum}")]
    BelowMinimum {
        field: String,
        value: f64,
        minimum: f64,
    },
    #[error("field `{field}` value {value} is above the maximum {maximum}")]
    AboveMaximum {
        field: String,
        value: f64,
        maximum: f64,
    },
}

/// Every violation found in one document.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValidationErrors(pub Vec<SchemaViolation>);

impl ValidationErrors {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SchemaViolation> {
        self.0.iter()
    }

    /// The first missing required field, if any.
    pub fn missing_field(&self) -> Option<&str> {
        self.0.iter().find_map(|v| match v {
            SchemaViolation::MissingField { field } => Some(field.as_str()),
            _ => None,
        })
    }

    fn into_result(self) -> Result<(), Self> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, violation) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}", violation)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

// =============================================================================
// Field rules
// =============================================================================

/// Rule for a single field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRule {
    pub field_type: FieldType,
    pub required: bool,
    pub nullable: bool,
    pub enum_values: Option<Vec<Value>>,
    pub pattern: Option<String>,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    pub items: Option<Box<FieldRule>>,
    pub properties: Option<BTreeMap<String, FieldRule>>,
}

impl FieldRule {
    pub fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            required: false,
            nullable: false,
            enum_values: None,
            pattern: None,
            minimum: None,
            maximum: None,
            items: None,
            properties: None,
        }
    }

    pub fn string() -> Self {
        Self::new(FieldType::String)
    }

    pub fn int() -> Self {
        Self::new(FieldType::Int)
    }

    pub fn double() -> Self {
        Self::new(FieldType::Double)
    }

    pub fn number() -> Self {
        Self::new(FieldType::Number)
    }

    pub fn bool() -> Self {
        Self::new(FieldType::Bool)
    }

    pub fn date() -> Self {
        Self::new(FieldType::Date)
    }

    pub fn object() -> Self {
        Self::new(FieldType::Object)
    }

    pub fn array(items: FieldRule) -> Self {
        let mut rule = Self::new(FieldType::Array);
        rule.items = Some(Box::new(items));
        rule
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn one_of<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Value>,
    {
        self.enum_values = Some(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn min(mut self, minimum: f64) -> Self {
        self.minimum = Some(minimum);
        self
    }

    pub fn max(mut self, maximum: f64) -> Self {
        self.maximum = Some(maximum);
        self
    }

    pub fn property(mut self, name: impl Into<String>, rule: FieldRule) -> Self {
        self.properties
            .get_or_insert_with(BTreeMap::new)
            .insert(name.into(), rule);
        self
    }

    fn check(&self, field: &str, value: &Value, out: &mut Vec<SchemaViolation>) {
        if value.is_null() {
            if !self.nullable {
                out.push(SchemaViolation::TypeMismatch {
                    field: field.to_string(),
                    expected: self.field_type,
                    found: "null",
                });
            }
            return;
        }

        if !self.field_type.matches(value) {
            out.push(SchemaViolation::TypeMismatch {
                field: field.to_string(),
                expected: self.field_type,
                found: value_type(value),
            });
            return;
        }

        if let Some(allowed) = &self.enum_values {
            if !allowed.iter().any(|a| values_equal(a, value)) {
                out.push(SchemaViolation::NotInEnum {
                    field: field.to_string(),
                    value: value.clone(),
                    allowed: allowed
                        .iter()
                        .map(|a| a.to_string())
                        .collect::<Vec<_>>()
                        .join(", "),
                });
            }
        }

        if let (Some(pattern), Some(text)) = (&self.pattern, value.as_str()) {
            match Regex::new(pattern) {
                Ok(re) if re.is_match(text) => {}
                Ok(_) => out.push(SchemaViolation::PatternMismatch {
                    field: field.to_string(),
                    pattern: pattern.clone(),
                }),
                Err(_) => out.push(SchemaViolation::InvalidPattern {
                    field: field.to_string(),
                    pattern: pattern.clone(),
                }),
            }
        }

        if let Some(number) = value.as_f64() {
            if let Some(minimum) = self.minimum {
                if number < minimum {
                    out.push(SchemaViolation::BelowMinimum {
                        field: field.to_string(),
                        value: number,
                        minimum,
                    });
                }
            }
            if let Some(maximum) = self.maximum {
                if number > maximum {
                    out.push(SchemaViolation::AboveMaximum {
                        field: field.to_string(),
                        value: number,
                        maximum,
                    });
                }
            }
        }

        if let (Some(items), Value::Array(values)) = (&self.items, value) {
            for (i, item) in values.iter().enumerate() {
                items.check(&format!("{}.{}", field, i), item, out);
            }
        }

        if let (Some(properties), Value::Object(map)) = (&self.properties, value) {
            check_fields(properties, map, Some(field), out);
        }
    }
}

fn check_fields(
    rules: &BTreeMap<String, FieldRule>,
    doc: &Fields,
    prefix: Option<&str>,
    out: &mut Vec<SchemaViolation>,
) {
    for (name, rule) in rules {
        let path = match prefix {
            Some(prefix) => format!("{}.{}", prefix, name),
            None => name.clone(),
        };
        match doc.get(name) {
            Some(value) => rule.check(&path, value, out),
            None if rule.required => out.push(SchemaViolation::MissingField { field: path }),
            None => {}
        }
    }
}

// =============================================================================
// Collection schema
// =============================================================================

/// Rule set for one collection. Fields without a rule are accepted as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSchema {
    pub collection: String,
    pub fields: BTreeMap<String, FieldRule>,
}

impl CollectionSchema {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn field(mut self, name: impl Into<String>, rule: FieldRule) -> Self {
        self.fields.insert(name.into(), rule);
        self
    }

    pub fn rule(&self, field: &str) -> Option<&FieldRule> {
        self.fields.get(field)
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|(_, rule)| rule.required)
            .map(|(name, _)| name.as_str())
    }

    /// Validate a complete document.
    pub fn validate(&self, doc: &Fields) -> Result<(), ValidationErrors> {
        let mut violations = Vec::new();
        check_fields(&self.fields, doc, None, &mut violations);
        ValidationErrors(violations).into_result()
    }

    /// Validate only the fields present in a partial update.
    pub fn validate_patch(&self, patch: &Fields) -> Result<(), ValidationErrors> {
        let mut violations = Vec::new();
        for (name, value) in patch {
            if let Some(rule) = self.fields.get(name) {
                rule.check(name, value, &mut violations);
            }
        }
        ValidationErrors(violations).into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Fields {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn schema() -> CollectionSchema {
        CollectionSchema::new("users")
            .field("userId", FieldRule::string().required())
            .field(
                "email",
                FieldRule::string()
                    .required()
                    .pattern(r"^[\w.-]+@[\w.-]+\.[a-zA-Z]{2,}$"),
            )
            .field("role", FieldRule::string().required().one_of(["student", "instructor"]))
            .field("progress", FieldRule::number().min(0.0).max(100.0))
            .field(
                "profile",
                FieldRule::object().property("skills", FieldRule::array(FieldRule::string())),
            )
    }

    #[test]
    fn valid_document_passes() {
        let d = doc(json!({
            "userId": "U001",
            "email": "a@x.com",
            "role": "student",
            "progress": 0,
            "profile": {"skills": ["rust"]},
            "extra": true
        }));
        assert!(schema().validate(&d).is_ok());
    }

    #[test]
    fn reports_every_violation() {
        let d = doc(json!({
            "email": "not-an-email",
            "role": "admin",
            "progress": 120.5,
            "profile": {"skills": ["rust", 3]}
        }));
        let errors = schema().validate(&d).unwrap_err();
        assert_eq!(errors.missing_field(), Some("userId"));
        assert!(errors.iter().any(|v| matches!(
            v,
            SchemaViolation::PatternMismatch { field, .. } if field == "email"
        )));
        assert!(errors
            .iter()
            .any(|v| matches!(v, SchemaViolation::NotInEnum { field, .. } if field == "role")));
        assert!(errors
            .iter()
            .any(|v| matches!(v, SchemaViolation::AboveMaximum { .. })));
        assert!(errors.iter().any(|v| matches!(
            v,
            SchemaViolation::TypeMismatch { field, .. } if field == "profile.skills.1"
        )));
    }

    #[test]
    fn patch_validation_ignores_absent_required_fields() {
        let s = schema();
        assert!(s.validate_patch(&doc(json!({"progress": 50}))).is_ok());
        let errors = s.validate_patch(&doc(json!({"role": Value::Null}))).unwrap_err();
        assert!(matches!(
            errors.0.as_slice(),
            [SchemaViolation::TypeMismatch { found: "null", .. }]
        ));
    }

    #[test]
    fn date_type_requires_rfc3339() {
        assert!(FieldType::Date.matches(&json!("2025-01-01T00:00:00Z")));
        assert!(!FieldType::Date.matches(&json!("yesterday")));
        assert!(FieldType::Int.matches(&json!(3)));
        assert!(!FieldType::Int.matches(&json!(3.5)));
    }
}
