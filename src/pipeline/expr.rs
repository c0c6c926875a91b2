use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::document::{lookup_path, Fields};
use crate::filter::values_equal;

/// An expression evaluated against one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// Value at a dotted path; null when missing.
    Field(String),
    Literal(Value),
    Eq(Box<Expr>, Box<Expr>),
    Cond {
        when: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Multiply(Vec<Expr>),
    /// Null when either side is not a number or the divisor is zero.
    Divide(Box<Expr>, Box<Expr>),
    /// Length of an array.
    Size(Box<Expr>),
    /// Calendar year of an RFC 3339 timestamp (UTC).
    Year(Box<Expr>),
    /// Calendar month (1-12) of an RFC 3339 timestamp (UTC).
    Month(Box<Expr>),
    Object(Vec<(String, Expr)>),
}

impl Expr {
    pub fn field(path: impl Into<String>) -> Self {
        Self::Field(path.into())
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal(value.into())
    }

    pub fn equals(left: Expr, right: Expr) -> Self {
        Self::Eq(Box::new(left), Box::new(right))
    }

    pub fn cond(when: Expr, then: Expr, otherwise: Expr) -> Self {
        Self::Cond {
            when: Box::new(when),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        }
    }

    pub fn multiply(factors: Vec<Expr>) -> Self {
        Self::Multiply(factors)
    }

    pub fn divide(dividend: Expr, divisor: Expr) -> Self {
        Self::Divide(Box::new(dividend), Box::new(divisor))
    }

    pub fn size(array: Expr) -> Self {
        Self::Size(Box::new(array))
    }

    pub fn year(date: Expr) -> Self {
        Self::Year(Box::new(date))
    }

    pub fn month(date: Expr) -> Self {
        Self::Month(Box::new(date))
    }

    pub fn object<K: Into<String>>(entries: Vec<(K, Expr)>) -> Self {
        Self::Object(entries.into_iter().map(|(k, e)| (k.into(), e)).collect())
    }

    /// `1` when `field == value`, else `0`; the counting idiom for `Sum`.
    pub fn one_if_eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::cond(
            Self::equals(Self::field(field), Self::literal(value)),
            Self::literal(1),
            Self::literal(0),
        )
    }

    pub fn evaluate(&self, doc: &Fields) -> Value {
        match self {
            Self::Field(path) => lookup_path(doc, path).cloned().unwrap_or(Value::Null),
            Self::Literal(value) => value.clone(),
            Self::Eq(left, right) => {
                Value::Bool(values_equal(&left.evaluate(doc), &right.evaluate(doc)))
            }
            Self::Cond {
                when,
                then,
                otherwise,
            } => {
                if truthy(&when.evaluate(doc)) {
                    then.evaluate(doc)
                } else {
                    otherwise.evaluate(doc)
                }
            }
            Self::Multiply(factors) => multiply(factors.iter().map(|f| f.evaluate(doc))),
            Self::Divide(dividend, divisor) => {
                match (dividend.evaluate(doc).as_f64(), divisor.evaluate(doc).as_f64()) {
                    (Some(a), Some(b)) if b != 0.0 => Value::from(a / b),
                    _ => Value::Null,
                }
            }
            Self::Size(array) => match array.evaluate(doc) {
                Value::Array(items) => Value::from(items.len()),
                _ => Value::Null,
            },
            Self::Year(date) => timestamp(&date.evaluate(doc))
                .map(|t| Value::from(t.year()))
                .unwrap_or(Value::Null),
            Self::Month(date) => timestamp(&date.evaluate(doc))
                .map(|t| Value::from(t.month()))
                .unwrap_or(Value::Null),
            Self::Object(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(k, e)| (k.clone(), e.evaluate(doc)))
                    .collect::<Map<_, _>>(),
            ),
        }
    }

    pub(crate) fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Field(path) => out.push(path),
            Self::Literal(_) => {}
            Self::Eq(a, b) | Self::Divide(a, b) => {
                a.collect_fields(out);
                b.collect_fields(out);
            }
            Self::Cond {
                when,
                then,
                otherwise,
            } => {
                when.collect_fields(out);
                then.collect_fields(out);
                otherwise.collect_fields(out);
            }
            Self::Multiply(factors) => factors.iter().for_each(|f| f.collect_fields(out)),
            Self::Size(e) | Self::Year(e) | Self::Month(e) => e.collect_fields(out),
            Self::Object(entries) => entries.iter().for_each(|(_, e)| e.collect_fields(out)),
        }
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        _ => true,
    }
}

fn multiply(values: impl Iterator<Item = Value>) -> Value {
    let mut int_product: Option<i64> = Some(1);
    let mut float_product = 1.0_f64;
    for value in values {
        let Value::Number(n) = value else {
            return Value::Null;
        };
        int_product = match (int_product, n.as_i64()) {
            (Some(acc), Some(x)) => acc.checked_mul(x),
            _ => None,
        };
        match n.as_f64() {
            Some(x) => float_product *= x,
            None => return Value::Null,
        }
    }
    match int_product {
        Some(product) => Value::from(product),
        None => Value::from(float_product),
    }
}

fn timestamp(value: &Value) -> Option<DateTime<Utc>> {
    let text = value.as_str()?;
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|t| t.with_timezone(&Utc))
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
    fn completion_rate_expression_guards_zero() {
        let rate = Expr::cond(
            Expr::equals(Expr::field("total"), Expr::literal(0)),
            Expr::literal(0),
            Expr::multiply(vec![
                Expr::divide(Expr::field("completed"), Expr::field("total")),
                Expr::literal(100),
            ]),
        );
        assert_eq!(rate.evaluate(&doc(json!({"total": 0, "completed": 0}))), json!(0));
        assert_eq!(
            rate.evaluate(&doc(json!({"total": 4, "completed": 1}))),
            json!(25.0)
        );
    }

    #[test]
    fn divide_by_zero_is_null() {
        let e = Expr::divide(Expr::literal(1), Expr::literal(0));
        assert_eq!(e.evaluate(&Fields::new()), Value::Null);
    }

    #[test]
    fn multiply_keeps_integers_when_possible() {
        let e = Expr::multiply(vec![Expr::literal(3), Expr::literal(4)]);
        assert_eq!(e.evaluate(&Fields::new()), json!(12));
        let e = Expr::multiply(vec![Expr::literal(3), Expr::field("missing")]);
        assert_eq!(e.evaluate(&Fields::new()), Value::Null);
    }

    #[test]
    fn date_parts_and_size() {
        let d = doc(json!({"at": "2025-02-03T23:30:00-05:00", "ids": ["a", "b"]}));
        assert_eq!(Expr::year(Expr::field("at")).evaluate(&d), json!(2025));
        assert_eq!(Expr::month(Expr::field("at")).evaluate(&d), json!(2));
        assert_eq!(Expr::size(Expr::field("ids")).evaluate(&d), json!(2));
    }

    #[test]
    fn one_if_eq_counts_matches() {
        let e = Expr::one_if_eq("status", "active");
        assert_eq!(e.evaluate(&doc(json!({"status": "active"}))), json!(1));
        assert_eq!(e.evaluate(&doc(json!({"status": "dropped"}))), json!(0));
    }
}
