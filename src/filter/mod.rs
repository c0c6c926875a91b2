//! Filters - typed predicates over stored documents.
//!
//! The same filter tree backs `DocumentStore::find`, repository reads and the
//! `Match` pipeline stage. Field names are dotted paths into the document.

mod sort;

use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::DateTime;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use thiserror::Error;

use crate::document::{lookup_path, Fields};

pub use sort::{Sort, SortOrder};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("invalid pattern `{pattern}`: {message}")]
    InvalidPattern { pattern: String, message: String },
}

/// A filter condition.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum Filter {
    /// Matches every document.
    #[default]
    All,
    Eq { field: String, value: Value },
    Ne { field: String, value: Value },
    Gt { field: String, value: Value },
    Gte { field: String, value: Value },
    Lt { field: String, value: Value },
    Lte { field: String, value: Value },
    In { field: String, values: Vec<Value> },
    Nin { field: String, values: Vec<Value> },
    Exists { field: String, exists: bool },
    Regex {
        field: String,
        pattern: String,
        case_insensitive: bool,
    },
    /// Any search term appears as a whole word in any of the fields
    /// (case-insensitive).
    Text { fields: Vec<String>, search: String },
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    pub fn all() -> Self {
        Self::All
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Ne {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Gt {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Gte {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Lt {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn lte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Lte {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn is_in(field: impl Into<String>, values: Vec<Value>) -> Self {
        Self::In {
            field: field.into(),
            values,
        }
    }

    pub fn not_in(field: impl Into<String>, values: Vec<Value>) -> Self {
        Self::Nin {
            field: field.into(),
            values,
        }
    }

    pub fn exists(field: impl Into<String>, exists: bool) -> Self {
        Self::Exists {
            field: field.into(),
            exists,
        }
    }

    pub fn regex(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::Regex {
            field: field.into(),
            pattern: pattern.into(),
            case_insensitive: false,
        }
    }

    pub fn iregex(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::Regex {
            field: field.into(),
            pattern: pattern.into(),
            case_insensitive: true,
        }
    }

    pub fn text<I, S>(fields: I, search: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Text {
            fields: fields.into_iter().map(Into::into).collect(),
            search: search.into(),
        }
    }

    pub fn negate(filter: Filter) -> Self {
        Self::Not(Box::new(filter))
    }

    /// Conjunction, flattening nested `And`s and dropping `All`.
    pub fn and(self, other: Filter) -> Self {
        match (self, other) {
            (Self::All, f) | (f, Self::All) => f,
            (Self::And(mut left), Self::And(right)) => {
                left.extend(right);
                Self::And(left)
            }
            (Self::And(mut left), f) => {
                left.push(f);
                Self::And(left)
            }
            (f, Self::And(mut right)) => {
                right.insert(0, f);
                Self::And(right)
            }
            (a, b) => Self::And(vec![a, b]),
        }
    }

    /// Disjunction, flattening nested `Or`s.
    pub fn or(self, other: Filter) -> Self {
        match (self, other) {
            (Self::Or(mut left), Self::Or(right)) => {
                left.extend(right);
                Self::Or(left)
            }
            (Self::Or(mut left), f) => {
                left.push(f);
                Self::Or(left)
            }
            (a, b) => Self::Or(vec![a, b]),
        }
    }

    /// Check if a document matches this filter. Use [`Filter::matcher`]
    /// when testing many documents.
    pub fn matches(&self, doc: &Fields) -> bool {
        self.matcher().matches(doc)
    }

    /// Compile every pattern in the tree once.
    pub fn matcher(&self) -> Matcher<'_> {
        let mut patterns = HashMap::new();
        self.compile_patterns(&mut patterns);
        Matcher {
            filter: self,
            patterns,
        }
    }

    fn compile_patterns<'a>(&'a self, out: &mut Patterns<'a>) {
        match self {
            Self::Regex {
                pattern,
                case_insensitive,
                ..
            } => {
                let key = (pattern.as_str(), *case_insensitive);
                if !out.contains_key(&key) {
                    // Invalid patterns match nothing; `validate` reports them.
                    if let Ok(re) = compile(pattern, *case_insensitive) {
                        out.insert(key, re);
                    }
                }
            }
            Self::And(filters) | Self::Or(filters) => {
                filters.iter().for_each(|f| f.compile_patterns(out))
            }
            Self::Not(filter) => filter.compile_patterns(out),
            _ => {}
        }
    }

    fn matches_with(&self, doc: &Fields, patterns: &Patterns<'_>) -> bool {
        match self {
            Self::All => true,
            Self::Eq { field, value } => eq_matches(lookup_path(doc, field), value),
            Self::Ne { field, value } => !eq_matches(lookup_path(doc, field), value),
            Self::Gt { field, value } => {
                range_matches(doc, field, value, |o| o == Ordering::Greater)
            }
            Self::Gte { field, value } => {
                range_matches(doc, field, value, |o| o != Ordering::Less)
            }
            Self::Lt { field, value } => range_matches(doc, field, value, |o| o == Ordering::Less),
            Self::Lte { field, value } => {
                range_matches(doc, field, value, |o| o != Ordering::Greater)
            }
            Self::In { field, values } => {
                let actual = lookup_path(doc, field);
                values.iter().any(|v| eq_matches(actual, v))
            }
            Self::Nin { field, values } => {
                let actual = lookup_path(doc, field);
                !values.iter().any(|v| eq_matches(actual, v))
            }
            Self::Exists { field, exists } => lookup_path(doc, field).is_some() == *exists,
            Self::Regex {
                field,
                pattern,
                case_insensitive,
            } => patterns
                .get(&(pattern.as_str(), *case_insensitive))
                .is_some_and(|re| strings_at(doc, field).any(|s| re.is_match(s))),
            Self::Text { fields, search } => {
                let terms: Vec<String> = words(search).collect();
                if terms.is_empty() {
                    return false;
                }
                fields.iter().any(|field| {
                    strings_at(doc, field).any(|s| words(s).any(|w| terms.contains(&w)))
                })
            }
            Self::And(filters) => filters.iter().all(|f| f.matches_with(doc, patterns)),
            Self::Or(filters) => filters.iter().any(|f| f.matches_with(doc, patterns)),
            Self::Not(filter) => !filter.matches_with(doc, patterns),
        }
    }

    /// Check that every pattern in the tree compiles.
    pub fn validate(&self) -> Result<(), FilterError> {
        match self {
            Self::Regex {
                pattern,
                case_insensitive,
                ..
            } => compile(pattern, *case_insensitive)
                .map(|_| ())
                .map_err(|e| FilterError::InvalidPattern {
                    pattern: pattern.clone(),
                    message: e.to_string(),
                }),
            Self::And(filters) | Self::Or(filters) => {
                filters.iter().try_for_each(|f| f.validate())
            }
            Self::Not(filter) => filter.validate(),
            _ => Ok(()),
        }
    }

    /// Every field path referenced by this filter.
    pub fn fields(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::All => {}
            Self::Eq { field, .. }
            | Self::Ne { field, .. }
            | Self::Gt { field, .. }
            | Self::Gte { field, .. }
            | Self::Lt { field, .. }
            | Self::Lte { field, .. }
            | Self::In { field, .. }
            | Self::Nin { field, .. }
            | Self::Exists { field, .. }
            | Self::Regex { field, .. } => out.push(field),
            Self::Text { fields, .. } => out.extend(fields.iter().map(String::as_str)),
            Self::And(filters) | Self::Or(filters) => {
                filters.iter().for_each(|f| f.collect_fields(out))
            }
            Self::Not(filter) => filter.collect_fields(out),
        }
    }
}

type Patterns<'a> = HashMap<(&'a str, bool), Regex>;

/// A [`Filter`] with its patterns compiled, reusable across documents.
pub struct Matcher<'a> {
    filter: &'a Filter,
    patterns: Patterns<'a>,
}

impl Matcher<'_> {
    pub fn matches(&self, doc: &Fields) -> bool {
        self.filter.matches_with(doc, &self.patterns)
    }
}

fn compile(pattern: &str, case_insensitive: bool) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern)
        .case_insensitive(case_insensitive)
        .build()
}

fn eq_matches(actual: Option<&Value>, expected: &Value) -> bool {
    match actual {
        None => expected.is_null(),
        Some(Value::Array(items)) if !expected.is_array() => {
            items.iter().any(|item| values_equal(item, expected))
        }
        Some(value) => values_equal(value, expected),
    }
}

fn range_matches(
    doc: &Fields,
    field: &str,
    bound: &Value,
    accept: impl Fn(Ordering) -> bool,
) -> bool {
    lookup_path(doc, field)
        .and_then(|v| compare_values(v, bound))
        .map(accept)
        .unwrap_or(false)
}

fn strings_at<'a>(doc: &'a Fields, field: &str) -> impl Iterator<Item = &'a str> {
    let values: Vec<&'a str> = match lookup_path(doc, field) {
        Some(Value::String(s)) => vec![s.as_str()],
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    };
    values.into_iter()
}

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
}

/// Equality that treats `80` and `80.0` as the same value.
pub(crate) fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => compare_values(a, b) == Some(Ordering::Equal),
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(l, r)| values_equal(l, r))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x
                    .iter()
                    .all(|(k, v)| y.get(k).is_some_and(|w| values_equal(v, w)))
        }
        _ => a == b,
    }
}

/// Ordering between two comparable values. Numbers compare exactly across
/// integer and float representations. RFC 3339 strings compare as instants
/// and sort before other strings.
pub(crate) fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => compare_numbers(x, y),
        (Value::String(x), Value::String(y)) => Some(compare_strings(x, y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn compare_numbers(x: &Number, y: &Number) -> Option<Ordering> {
    match (integer(x), integer(y)) {
        (Some(x), Some(y)) => Some(x.cmp(&y)),
        (Some(x), None) => compare_integer_float(x, y.as_f64()?),
        (None, Some(y)) => compare_integer_float(y, x.as_f64()?).map(Ordering::reverse),
        (None, None) => x.as_f64()?.partial_cmp(&y.as_f64()?),
    }
}

fn integer(n: &Number) -> Option<i128> {
    n.as_i64()
        .map(i128::from)
        .or_else(|| n.as_u64().map(i128::from))
}

/// Rounding to f64 is monotone, so only a tie needs the exact check.
fn compare_integer_float(i: i128, f: f64) -> Option<Ordering> {
    match (i as f64).partial_cmp(&f)? {
        Ordering::Equal => Some(i.cmp(&(f as i128))),
        ord => Some(ord),
    }
}

fn compare_strings(x: &str, y: &str) -> Ordering {
    match (DateTime::parse_from_rfc3339(x), DateTime::parse_from_rfc3339(y)) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => x.cmp(y),
    }
}

fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Number(_)) => 1,
        Some(Value::String(_)) => 2,
        Some(Value::Object(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Bool(_)) => 5,
    }
}

/// Total order used for sorting: missing and null first, then numbers,
/// strings, objects, arrays, booleans.
pub(crate) fn sort_cmp(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    type_rank(a).cmp(&type_rank(b)).then_with(|| match (a, b) {
        // Same instant written two ways still needs a fixed order.
        (Some(Value::String(x)), Some(Value::String(y))) => {
            compare_strings(x, y).then_with(|| x.cmp(y))
        }
        (Some(a), Some(b)) => compare_values(a, b).unwrap_or(Ordering::Equal),
        _ => Ordering::Equal,
    })
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

    #[test]
    fn eq_is_numeric_aware_and_matches_array_members() {
        let d = doc(json!({"grade": 80, "tags": ["python", "data"]}));
        assert!(Filter::eq("grade", 80.0).matches(&d));
        assert!(Filter::eq("tags", "python").matches(&d));
        assert!(!Filter::eq("tags", "rust").matches(&d));
        assert!(Filter::eq("missing", Value::Null).matches(&d));
    }

    #[test]
    fn range_filters_on_numbers() {
        let d = doc(json!({"price": 50.0}));
        assert!(Filter::gte("price", 50).matches(&d));
        assert!(Filter::lt("price", 60).matches(&d));
        assert!(!Filter::gt("price", 50).matches(&d));
        assert!(!Filter::lt("missing", 10).matches(&d));
    }

    #[test]
    fn range_filters_compare_timestamps_chronologically() {
        let d = doc(json!({"enrolledAt": "2025-03-01T10:00:00.250Z"}));
        assert!(Filter::gt("enrolledAt", "2025-03-01T10:00:00Z").matches(&d));
        assert!(Filter::lt("enrolledAt", "2025-03-01T11:00:00+00:00").matches(&d));
    }

    #[test]
    fn in_and_not_in() {
        let d = doc(json!({"status": "active"}));
        assert!(Filter::is_in("status", vec![json!("active"), json!("completed")]).matches(&d));
        assert!(!Filter::not_in("status", vec![json!("active")]).matches(&d));
    }

    #[test]
    fn regex_and_text_search() {
        let d = doc(json!({
            "title": "Python for Beginners",
            "description": "Learn Python from scratch",
            "email": "a@x.com"
        }));
        assert!(Filter::regex("email", r"@x\.com$").matches(&d));
        assert!(Filter::iregex("title", "^python").matches(&d));
        assert!(!Filter::regex("title", "^python").matches(&d));
        assert!(Filter::text(["title", "description"], "python").matches(&d));
        assert!(Filter::text(["title"], "rust beginners").matches(&d));
        assert!(!Filter::text(["title"], "begin").matches(&d));
    }

    #[test]
    fn invalid_pattern_is_reported_by_validate() {
        let filter = Filter::eq("a", 1).and(Filter::regex("b", "("));
        assert!(matches!(
            filter.validate(),
            Err(FilterError::InvalidPattern { .. })
        ));
        assert!(!filter.matches(&doc(json!({"a": 1, "b": "("}))));
    }

    #[test]
    fn and_flattens_and_drops_all() {
        let f = Filter::all()
            .and(Filter::eq("a", 1))
            .and(Filter::eq("b", 2))
            .and(Filter::eq("c", 3));
        match &f {
            Filter::And(parts) => assert_eq!(parts.len(), 3),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(f.fields(), vec!["a", "b", "c"]);
    }

    #[test]
    fn or_and_not() {
        let d = doc(json!({"role": "student", "isActive": false}));
        let f = Filter::eq("role", "instructor").or(Filter::eq("isActive", false));
        assert!(f.matches(&d));
        assert!(!Filter::negate(f).matches(&d));
    }

    #[test]
    fn matcher_reuses_compiled_patterns_across_documents() {
        let filter = Filter::iregex("title", "^rust")
            .or(Filter::regex("tags", "sys").and(Filter::iregex("title", "^rust")));
        let matcher = filter.matcher();
        assert_eq!(matcher.patterns.len(), 2);

        let docs = [
            doc(json!({"title": "Rust Fundamentals"})),
            doc(json!({"title": "Visual Design", "tags": ["systems"]})),
            doc(json!({"title": "rustic furniture"})),
        ];
        let hits: Vec<bool> = docs.iter().map(|d| matcher.matches(d)).collect();
        assert_eq!(hits, [true, false, true]);
        for d in &docs {
            assert_eq!(matcher.matches(d), filter.matches(d));
        }
    }

    #[test]
    fn sort_order_is_total_over_mixed_strings() {
        let mut values = vec![
            json!("zebra"),
            json!("2025-01-01T00:00:00Z"),
            json!("2025-01-01T00:00:00+02:00"),
            json!("apple"),
            json!("2024-12-31T22:00:00Z"),
        ];
        values.sort_by(|a, b| sort_cmp(Some(a), Some(b)));
        assert_eq!(
            values,
            [
                json!("2024-12-31T22:00:00Z"),
                json!("2025-01-01T00:00:00+02:00"),
                json!("2025-01-01T00:00:00Z"),
                json!("apple"),
                json!("zebra"),
            ]
        );

        // Same instant, different text: equal for filters, ordered for sorts.
        let a = json!("2025-01-01T00:00:00+02:00");
        let b = json!("2024-12-31T22:00:00Z");
        assert_eq!(compare_values(&a, &b), Some(Ordering::Equal));
        assert_eq!(sort_cmp(Some(&a), Some(&b)), Ordering::Greater);
    }

    #[test]
    fn large_integers_compare_exactly_against_floats() {
        let two_53 = 9_007_199_254_740_992_i64;
        let float = json!(9_007_199_254_740_992.0);
        assert_eq!(compare_values(&json!(two_53), &float), Some(Ordering::Equal));
        assert_eq!(compare_values(&json!(two_53 + 1), &float), Some(Ordering::Greater));
        assert_eq!(compare_values(&float, &json!(two_53 + 1)), Some(Ordering::Less));
        assert_eq!(compare_values(&json!(u64::MAX), &json!(1.5)), Some(Ordering::Greater));
    }

    #[test]
    fn sort_order_puts_missing_first() {
        assert_eq!(sort_cmp(None, Some(&json!(1))), Ordering::Less);
        assert_eq!(sort_cmp(Some(&json!(2)), Some(&json!(1.5))), Ordering::Greater);
        assert_eq!(sort_cmp(Some(&json!("b")), Some(&json!(100))), Ordering::Greater);
    }
}
